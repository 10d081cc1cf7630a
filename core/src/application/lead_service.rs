// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Lead Creation
//!
//! The single entry point for turning a submission into a stored [`Lead`].
//! Persistence is the first durable action; the optional post-create hook
//! (queueing notifications and webhooks) only runs afterwards, and its
//! failure never removes the stored lead.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::attribution::derive_lead_source;
use crate::domain::lead::{Attribution, FormData, Lead, LeadId};
use crate::domain::repository::{LeadRepository, LeadSourceRuleRepository, RepositoryError};
use crate::domain::site::SiteId;

#[derive(Debug, thiserror::Error)]
pub enum LeadError {
    #[error("{field} is required")]
    Validation { field: &'static str },

    #[error("failed to persist lead: {0}")]
    Repository(#[from] RepositoryError),

    /// The lead was stored; only the follow-up action failed.
    #[error("post-create hook failed for lead {lead_id}: {source}")]
    PostCreateHook {
        lead_id: LeadId,
        #[source]
        source: anyhow::Error,
    },
}

/// Submission fields accepted by [`LeadService::create_lead_from_submission`].
#[derive(Debug, Clone, Default)]
pub struct NewLead {
    pub name: String,
    pub email: String,
    pub message: String,
    pub form_type: String,
    pub phone: Option<String>,
    pub form_data: Option<FormData>,
    pub source_page: Option<String>,
    pub site_id: Option<SiteId>,
    pub attribution: Attribution,
}

/// Follow-up action run with the persisted lead.
#[async_trait]
pub trait PostCreateHook: Send + Sync {
    async fn after_create(&self, lead: &Lead) -> anyhow::Result<()>;
}

#[async_trait]
pub trait LeadService: Send + Sync {
    async fn create_lead_from_submission(
        &self,
        submission: NewLead,
        hook: Option<&dyn PostCreateHook>,
    ) -> Result<Lead, LeadError>;
}

pub struct StandardLeadService {
    leads: Arc<dyn LeadRepository>,
    rules: Arc<dyn LeadSourceRuleRepository>,
}

impl StandardLeadService {
    pub fn new(leads: Arc<dyn LeadRepository>, rules: Arc<dyn LeadSourceRuleRepository>) -> Self {
        Self { leads, rules }
    }
}

fn required(value: &str, field: &'static str) -> Result<String, LeadError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LeadError::Validation { field });
    }
    Ok(trimmed.to_string())
}

#[async_trait]
impl LeadService for StandardLeadService {
    async fn create_lead_from_submission(
        &self,
        submission: NewLead,
        hook: Option<&dyn PostCreateHook>,
    ) -> Result<Lead, LeadError> {
        let name = required(&submission.name, "name")?;
        let email = required(&submission.email, "email")?;
        let message = required(&submission.message, "message")?;
        let form_type = required(&submission.form_type, "form_type")?;

        let rules = match self.rules.list_active().await {
            Ok(rules) => rules,
            Err(e) => {
                warn!(error = %e, "Lead source rules unavailable, using defaults");
                Vec::new()
            }
        };
        let attribution = submission.attribution;
        let (lead_source, detail) = derive_lead_source(
            &attribution.utm_source,
            &attribution.utm_medium,
            &attribution.utm_campaign,
            &attribution.referrer_url,
            &rules,
        );

        let lead = Lead::new(
            submission.site_id,
            name,
            email,
            submission.phone.as_deref().map(str::trim).unwrap_or_default().to_string(),
            message,
            form_type,
            submission.form_data.unwrap_or_default(),
            submission.source_page,
            attribution,
        )
        .with_lead_source(lead_source, detail);

        self.leads.insert(&lead).await?;
        metrics::counter!("sum_leads_created_total", "form_type" => lead.form_type.clone())
            .increment(1);
        info!(
            lead_id = %lead.id,
            site_id = ?lead.site_id,
            form_type = %lead.form_type,
            lead_source = %lead.lead_source,
            "Lead created"
        );

        if let Some(hook) = hook {
            if let Err(source) = hook.after_create(&lead).await {
                error!(lead_id = %lead.id, error = %source, "Post-create hook failed; lead retained");
                return Err(LeadError::PostCreateHook {
                    lead_id: lead.id,
                    source,
                });
            }
        }

        Ok(lead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::attribution::LeadSource;
    use crate::domain::lead::LeadStatus;
    use crate::infrastructure::repositories::{InMemoryLeadRepository, InMemoryLeadSourceRuleRepository};

    fn service() -> (StandardLeadService, Arc<InMemoryLeadRepository>) {
        let leads = Arc::new(InMemoryLeadRepository::new());
        let rules = Arc::new(InMemoryLeadSourceRuleRepository::new(Vec::new()));
        (StandardLeadService::new(leads.clone(), rules), leads)
    }

    fn submission() -> NewLead {
        NewLead {
            name: "  Jane Doe ".into(),
            email: "jane@example.com".into(),
            message: "Please call me".into(),
            form_type: "contact".into(),
            phone: Some(" 07700 900123 ".into()),
            ..Default::default()
        }
    }

    struct FailingHook;

    #[async_trait]
    impl PostCreateHook for FailingHook {
        async fn after_create(&self, _lead: &Lead) -> anyhow::Result<()> {
            anyhow::bail!("broker unavailable")
        }
    }

    #[tokio::test]
    async fn test_creates_exactly_one_new_lead() {
        let (service, repo) = service();
        let lead = service
            .create_lead_from_submission(submission(), None)
            .await
            .unwrap();
        assert_eq!(lead.status, LeadStatus::New);
        assert_eq!(lead.name, "Jane Doe");
        assert_eq!(lead.phone, "07700 900123");
        assert_eq!(lead.lead_source, LeadSource::Direct);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_blank_required_field_fails_before_persistence() {
        let (service, repo) = service();
        for field in ["name", "email", "message", "form_type"] {
            let mut input = submission();
            match field {
                "name" => input.name = "   ".into(),
                "email" => input.email = String::new(),
                "message" => input.message = "\n\t".into(),
                _ => input.form_type = " ".into(),
            }
            let err = service
                .create_lead_from_submission(input, None)
                .await
                .unwrap_err();
            assert!(matches!(err, LeadError::Validation { field: f } if f == field));
        }
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_hook_failure_keeps_lead() {
        let (service, repo) = service();
        let err = service
            .create_lead_from_submission(submission(), Some(&FailingHook))
            .await
            .unwrap_err();
        let LeadError::PostCreateHook { lead_id, .. } = err else {
            panic!("expected hook error, got {err:?}");
        };
        assert!(repo.find_by_id(lead_id).await.unwrap().is_some());
        let by_email = repo.find_by_email("jane@example.com").await.unwrap();
        assert_eq!(by_email.len(), 1);
        assert_eq!(by_email[0].id, lead_id);
    }

    #[tokio::test]
    async fn test_attribution_is_derived() {
        let (service, _) = service();
        let mut input = submission();
        input.attribution.utm_source = "google".into();
        input.attribution.utm_medium = "cpc".into();
        input.attribution.utm_campaign = "boilers".into();
        let lead = service.create_lead_from_submission(input, None).await.unwrap();
        assert_eq!(lead.lead_source, LeadSource::GoogleAds);
        assert_eq!(lead.lead_source_detail, "campaign=boilers");
    }
}
