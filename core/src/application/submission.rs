// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Form Submission Handling
//!
//! Accepts contact/quote and dynamic form submissions, runs spam checks and
//! validation, stores the lead, and queues its delivery jobs.
//!
//! # Architecture
//!
//! - **Layer:** Application
//! - **Purpose:** Orchestrate site resolution, spam protection, validation,
//!   lead creation and job queueing for one request
//!
//! # Ordering
//!
//! Spam checks run cheapest first: honeypot, rate limit, time token. The
//! lead is persisted before any job is queued, and a queueing failure only
//! marks the affected channel as failed.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

use crate::application::form_definition_service::FormDefinitionService;
use crate::application::lead_service::{LeadError, LeadService, NewLead, PostCreateHook};
use crate::application::spam::{SpamCheck, SpamGuard, SpamVerdict};
use crate::domain::contact::{is_valid_email, is_valid_uk_phone};
use crate::domain::delivery::{DeliveryJob, JobKind, JobQueue};
use crate::domain::form::{FieldKind, FormDefinition};
use crate::domain::lead::{Attribution, FormData, Lead, LeadId};
use crate::domain::repository::{
    FormConfigurationRepository, LeadRepository, RepositoryError, SiteRepository,
};
use crate::domain::site::{FormConfiguration, Site};

pub const SUCCESS_MESSAGE: &str = "Thank you for your submission";
pub const TIME_TOKEN_FIELD: &str = "_time_token";

const ATTRIBUTION_FIELDS: [&str; 8] = [
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "landing_page_url",
    "page_url",
    "referrer_url",
];
const CONTACT_FIELDS: [&str; 5] = ["name", "email", "phone", "message", "form_type"];
const CSRF_FIELD: &str = "csrfmiddlewaretoken";

#[derive(Debug, Clone, Default)]
pub struct SubmissionRequest {
    /// Raw `Host` header; any port is ignored.
    pub host: String,
    pub client_ip: String,
    pub data: FormData,
    pub is_xhr: bool,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionAccepted {
    pub lead_id: LeadId,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("Invalid request data")]
    InvalidRequest,

    #[error("Site not found")]
    SiteNotFound,

    #[error("Form not found")]
    FormNotFound,

    #[error("Too many requests")]
    RateLimited,

    #[error("Spam rejected: {reason}")]
    Spam { reason: String, is_xhr: bool },

    #[error("Submission failed validation")]
    Validation(BTreeMap<String, Vec<String>>),

    #[error(transparent)]
    Lead(LeadError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl SubmissionError {
    /// Message safe to show the client for a spam rejection.
    ///
    /// Bots get a generic answer; XHR clients get a hint for the two timing
    /// failures a real visitor can hit.
    pub fn spam_message(reason: &str, is_xhr: bool) -> &'static str {
        if is_xhr && reason.starts_with("Submitted too quickly") {
            "Please wait a moment and try again."
        } else if is_xhr && reason == "Time token expired" {
            "Please refresh the page and try again."
        } else {
            "Invalid submission"
        }
    }
}

/// Text value of a submitted field. Non-string scalars are stringified.
fn field_str(data: &FormData, key: &str) -> String {
    match data.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn attribution_from(data: &FormData) -> Attribution {
    Attribution {
        utm_source: field_str(data, "utm_source"),
        utm_medium: field_str(data, "utm_medium"),
        utm_campaign: field_str(data, "utm_campaign"),
        utm_term: field_str(data, "utm_term"),
        utm_content: field_str(data, "utm_content"),
        landing_page_url: field_str(data, "landing_page_url"),
        page_url: field_str(data, "page_url"),
        referrer_url: field_str(data, "referrer_url"),
    }
}

fn is_internal_field(key: &str, honeypot: &str) -> bool {
    key.starts_with('_')
        || key == CSRF_FIELD
        || key == honeypot
        || ATTRIBUTION_FIELDS.contains(&key)
}

/// Fields not covered by the contact columns or attribution.
pub fn extra_form_data(data: &FormData, honeypot: &str) -> FormData {
    data.iter()
        .filter(|(key, _)| !is_internal_field(key, honeypot) && !CONTACT_FIELDS.contains(&key.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn dynamic_form_data(data: &FormData, honeypot: &str) -> FormData {
    data.iter()
        .filter(|(key, _)| !is_internal_field(key, honeypot))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn push_error(errors: &mut BTreeMap<String, Vec<String>>, field: &str, message: &str) {
    errors
        .entry(field.to_string())
        .or_default()
        .push(message.to_string());
}

/// Field errors for a contact/quote submission; empty when valid.
pub fn validate_contact_submission(
    data: &FormData,
    config: &FormConfiguration,
) -> BTreeMap<String, Vec<String>> {
    let mut errors = BTreeMap::new();
    for (field, message) in [
        ("name", "Name is required"),
        ("email", "Email is required"),
        ("message", "Message is required"),
    ] {
        if field_str(data, field).is_empty() {
            push_error(&mut errors, field, message);
        }
    }

    let email = field_str(data, "email");
    if !email.is_empty() && !is_valid_email(&email) {
        push_error(&mut errors, "email", "Please enter a valid email address");
    }

    let phone = field_str(data, "phone");
    if !phone.is_empty() && !is_valid_uk_phone(&phone) {
        push_error(&mut errors, "phone", "Please enter a valid UK phone number");
    }

    if field_str(data, "form_type").is_empty() && config.default_form_type().is_none() {
        push_error(&mut errors, "form_type", "Form type is required");
    }
    errors
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Bool(b)) => !b,
        _ => false,
    }
}

/// Field errors for a dynamic form submission; empty when valid.
pub fn validate_dynamic_submission(
    form: &FormDefinition,
    data: &FormData,
) -> BTreeMap<String, Vec<String>> {
    let mut errors = BTreeMap::new();
    for field in &form.fields {
        let value = data.get(&field.field_name);
        if is_blank(value) {
            if field.required {
                push_error(&mut errors, &field.field_name, "This field is required.");
            }
            continue;
        }
        let text = field_str(data, &field.field_name);
        match field.kind {
            FieldKind::Email if !is_valid_email(&text) => {
                push_error(&mut errors, &field.field_name, "Please enter a valid email address");
            }
            FieldKind::Phone if !is_valid_uk_phone(&text) => {
                push_error(&mut errors, &field.field_name, "Please enter a valid UK phone number");
            }
            FieldKind::Select | FieldKind::Radio
                if !field.choices.is_empty() && !field.choices.contains(&text) =>
            {
                push_error(&mut errors, &field.field_name, "Select a valid choice.");
            }
            _ => {}
        }
    }

    if submitter_email(form, data).is_empty() && !errors.contains_key("email") {
        push_error(&mut errors, "email", "Email is required");
    }
    errors
}

/// The `email` field, else the first email-typed field.
fn submitter_email(form: &FormDefinition, data: &FormData) -> String {
    let direct = field_str(data, "email");
    if !direct.is_empty() {
        return direct;
    }
    form.fields
        .iter()
        .filter(|f| f.kind == FieldKind::Email)
        .map(|f| field_str(data, &f.field_name))
        .find(|v| !v.is_empty())
        .unwrap_or_default()
}

/// Queues delivery jobs once the lead is stored.
struct EnqueueJobs<'a> {
    queue: &'a dyn JobQueue,
    leads: &'a dyn LeadRepository,
    kinds: Vec<JobKind>,
    request_id: Option<String>,
}

#[async_trait]
impl PostCreateHook for EnqueueJobs<'_> {
    async fn after_create(&self, lead: &Lead) -> anyhow::Result<()> {
        for kind in &self.kinds {
            let job = DeliveryJob::new(lead.id, kind.clone(), self.request_id.clone());
            let channel = job.channel();
            if let Err(e) = self.queue.enqueue(job).await {
                error!(
                    lead_id = %lead.id,
                    channel = channel.as_str(),
                    error = %e,
                    "Failed to queue delivery job"
                );
                let mut state = lead.delivery(channel);
                state.mark_failed(&format!("Failed to queue task: {e}"));
                self.leads.update_delivery(lead.id, channel, &state).await?;
            }
        }
        Ok(())
    }
}

pub struct FormSubmissionService {
    sites: Arc<dyn SiteRepository>,
    form_configs: Arc<dyn FormConfigurationRepository>,
    forms: Arc<FormDefinitionService>,
    lead_service: Arc<dyn LeadService>,
    leads: Arc<dyn LeadRepository>,
    spam: SpamGuard,
    queue: Arc<dyn JobQueue>,
}

impl FormSubmissionService {
    pub fn new(
        sites: Arc<dyn SiteRepository>,
        form_configs: Arc<dyn FormConfigurationRepository>,
        forms: Arc<FormDefinitionService>,
        lead_service: Arc<dyn LeadService>,
        leads: Arc<dyn LeadRepository>,
        spam: SpamGuard,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            sites,
            form_configs,
            forms,
            lead_service,
            leads,
            spam,
            queue,
        }
    }

    pub fn spam_guard(&self) -> &SpamGuard {
        &self.spam
    }

    /// Site for the host, falling back to the default site.
    pub async fn resolve_site(&self, host: &str) -> Result<Site, SubmissionError> {
        if !host.trim().is_empty() {
            if let Some(site) = self.sites.find_by_hostname(host).await? {
                return Ok(site);
            }
        }
        self.sites
            .default_site()
            .await?
            .ok_or(SubmissionError::SiteNotFound)
    }

    async fn check_spam(
        &self,
        request: &SubmissionRequest,
        site: &Site,
        config: &FormConfiguration,
    ) -> Result<(), SubmissionError> {
        let time_token = field_str(&request.data, TIME_TOKEN_FIELD);
        let verdict = self
            .spam
            .run(SpamCheck {
                data: &request.data,
                site_id: site.id,
                client_ip: &request.client_ip,
                time_token: &time_token,
                config,
            })
            .await;
        match verdict {
            SpamVerdict::Clean => Ok(()),
            SpamVerdict::RateLimited => Err(SubmissionError::RateLimited),
            SpamVerdict::Spam { reason } => Err(SubmissionError::Spam {
                reason,
                is_xhr: request.is_xhr,
            }),
        }
    }

    /// Contact and quote form submission.
    pub async fn submit(
        &self,
        request: SubmissionRequest,
    ) -> Result<SubmissionAccepted, SubmissionError> {
        let site = self.resolve_site(&request.host).await?;
        let config = self.form_configs.get_for_site(site.id).await?;
        self.check_spam(&request, &site, &config).await?;

        let errors = validate_contact_submission(&request.data, &config);
        if !errors.is_empty() {
            return Err(SubmissionError::Validation(errors));
        }

        let data = &request.data;
        let form_type = match field_str(data, "form_type") {
            t if !t.is_empty() => t,
            _ => config.default_form_type().unwrap_or("unknown").to_string(),
        };
        let extra = extra_form_data(data, &config.honeypot_field_name);
        let phone = field_str(data, "phone");
        let submission = NewLead {
            name: field_str(data, "name"),
            email: field_str(data, "email"),
            message: field_str(data, "message"),
            form_type,
            phone: (!phone.is_empty()).then_some(phone),
            form_data: (!extra.is_empty()).then_some(extra),
            source_page: None,
            site_id: Some(site.id),
            attribution: attribution_from(data),
        };

        let hook = EnqueueJobs {
            queue: self.queue.as_ref(),
            leads: self.leads.as_ref(),
            kinds: vec![
                JobKind::LeadNotification {
                    site_id: Some(site.id),
                },
                JobKind::LeadWebhook,
                JobKind::ZapierWebhook { site_id: site.id },
            ],
            request_id: request.request_id.clone(),
        };
        let lead_id = self.create_lead(submission, &hook).await?;
        info!(lead_id = %lead_id, site_id = %site.id, request_id = ?request.request_id, "Form submission accepted");

        Ok(SubmissionAccepted {
            lead_id,
            message: SUCCESS_MESSAGE.to_string(),
        })
    }

    /// Submission for a site-defined dynamic form.
    pub async fn submit_dynamic(
        &self,
        slug: &str,
        request: SubmissionRequest,
    ) -> Result<SubmissionAccepted, SubmissionError> {
        let site = self.resolve_site(&request.host).await?;
        let config = self.form_configs.get_for_site(site.id).await?;
        self.check_spam(&request, &site, &config).await?;
        let Some(form) = self.forms.get_active_by_slug(site.id, slug).await? else {
            return Err(SubmissionError::FormNotFound);
        };

        let errors = validate_dynamic_submission(&form, &request.data);
        if !errors.is_empty() {
            return Err(SubmissionError::Validation(errors));
        }

        let data = &request.data;
        let email = submitter_email(&form, data);
        let name = match field_str(data, "name") {
            n if !n.is_empty() => n,
            _ => email.clone(),
        };
        let message = match field_str(data, "message") {
            m if !m.is_empty() => m,
            _ => format!("{} submission", form.name),
        };
        let phone = field_str(data, "phone");
        let submission = NewLead {
            name,
            email,
            message,
            form_type: form.slug.clone(),
            phone: (!phone.is_empty()).then_some(phone),
            form_data: Some(dynamic_form_data(data, &config.honeypot_field_name)),
            source_page: None,
            site_id: Some(site.id),
            attribution: attribution_from(data),
        };

        let hook = EnqueueJobs {
            queue: self.queue.as_ref(),
            leads: self.leads.as_ref(),
            kinds: vec![
                JobKind::FormNotification { form_id: form.id },
                JobKind::AutoReply { form_id: form.id },
                JobKind::FormWebhook { form_id: form.id },
            ],
            request_id: request.request_id.clone(),
        };
        let lead_id = self.create_lead(submission, &hook).await?;
        info!(
            lead_id = %lead_id,
            site_id = %site.id,
            form_slug = %form.slug,
            request_id = ?request.request_id,
            "Dynamic form submission accepted"
        );

        Ok(SubmissionAccepted {
            lead_id,
            message: form.success_message.clone(),
        })
    }

    async fn create_lead(
        &self,
        submission: NewLead,
        hook: &EnqueueJobs<'_>,
    ) -> Result<LeadId, SubmissionError> {
        match self
            .lead_service
            .create_lead_from_submission(submission, Some(hook))
            .await
        {
            Ok(lead) => Ok(lead.id),
            // Stored; the client still gets a success response.
            Err(LeadError::PostCreateHook { lead_id, .. }) => Ok(lead_id),
            Err(LeadError::Repository(e)) => Err(SubmissionError::Repository(e)),
            Err(e) => Err(SubmissionError::Lead(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::cache_versioning::VersionedCache;
    use crate::application::lead_service::StandardLeadService;
    use crate::application::spam::TimeTokenSigner;
    use crate::domain::delivery::QueueError;
    use crate::domain::form::FormField;
    use crate::domain::lead::{DeliveryChannel, DeliveryStatus};
    use crate::infrastructure::cache_store::InMemoryCacheStore;
    use crate::infrastructure::repositories::{
        InMemoryFormConfigurationRepository, InMemoryFormDefinitionRepository,
        InMemoryLeadRepository, InMemoryLeadSourceRuleRepository, InMemorySiteRepository,
    };
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingQueue {
        jobs: Mutex<Vec<DeliveryJob>>,
        closed: bool,
    }

    #[async_trait]
    impl JobQueue for RecordingQueue {
        async fn enqueue(&self, job: DeliveryJob) -> Result<(), QueueError> {
            if self.closed {
                return Err(QueueError::Closed);
            }
            self.jobs.lock().push(job);
            Ok(())
        }

        async fn schedule_retry(&self, job: DeliveryJob, _delay: Duration) -> Result<(), QueueError> {
            self.enqueue(job).await
        }
    }

    struct Fixture {
        service: FormSubmissionService,
        leads: Arc<InMemoryLeadRepository>,
        queue: Arc<RecordingQueue>,
        forms: Arc<FormDefinitionService>,
        site: Site,
    }

    fn fixture(queue: RecordingQueue, config: FormConfiguration) -> Fixture {
        let site = Site::new("acme.test", "Acme").with_default(true);
        let leads = Arc::new(InMemoryLeadRepository::new());
        let configs = InMemoryFormConfigurationRepository::new();
        configs.insert(site.id, config);
        let cache = Arc::new(InMemoryCacheStore::new());
        let forms = Arc::new(FormDefinitionService::new(
            Arc::new(InMemoryFormDefinitionRepository::new()),
            VersionedCache::new(cache.clone()),
        ));
        let lead_service = Arc::new(StandardLeadService::new(
            leads.clone(),
            Arc::new(InMemoryLeadSourceRuleRepository::new(Vec::new())),
        ));
        let queue = Arc::new(queue);
        let service = FormSubmissionService::new(
            Arc::new(InMemorySiteRepository::new(vec![site.clone()])),
            Arc::new(configs),
            forms.clone(),
            lead_service,
            leads.clone(),
            SpamGuard::new(cache, TimeTokenSigner::new("test-secret")),
            queue.clone(),
        );
        Fixture {
            service,
            leads,
            queue,
            forms,
            site,
        }
    }

    fn request(data: serde_json::Value) -> SubmissionRequest {
        SubmissionRequest {
            host: "acme.test:8000".into(),
            client_ip: "203.0.113.9".into(),
            data: data.as_object().cloned().unwrap_or_default(),
            is_xhr: false,
            request_id: Some("req-1".into()),
        }
    }

    fn contact() -> serde_json::Value {
        json!({
            "name": "Jane",
            "email": "jane@example.com",
            "message": "Call me",
            "form_type": "contact",
            "phone": "07700 900123",
            "budget": "2k",
            "utm_source": "google",
            "utm_medium": "cpc",
            "_time_token": "",
            "csrfmiddlewaretoken": "abc",
            "company": ""
        })
    }

    #[tokio::test]
    async fn test_submit_creates_lead_and_queues_jobs() {
        let fx = fixture(RecordingQueue::default(), FormConfiguration::default());
        let accepted = fx.service.submit(request(contact())).await.unwrap();
        assert_eq!(accepted.message, SUCCESS_MESSAGE);

        let lead = fx.leads.find_by_id(accepted.lead_id).await.unwrap().unwrap();
        assert_eq!(lead.site_id, Some(fx.site.id));
        assert_eq!(lead.attribution.utm_source, "google");
        assert_eq!(lead.form_data.len(), 1);
        assert_eq!(lead.form_data["budget"], json!("2k"));

        let jobs = fx.queue.jobs.lock();
        let channels: Vec<_> = jobs.iter().map(|j| j.channel()).collect();
        assert_eq!(
            channels,
            vec![
                DeliveryChannel::Notification,
                DeliveryChannel::Webhook,
                DeliveryChannel::Zapier
            ]
        );
        assert!(jobs.iter().all(|j| j.request_id.as_deref() == Some("req-1")));
    }

    #[tokio::test]
    async fn test_queue_failure_keeps_lead_and_marks_channels() {
        let fx = fixture(
            RecordingQueue {
                closed: true,
                ..Default::default()
            },
            FormConfiguration::default(),
        );
        let accepted = fx.service.submit(request(contact())).await.unwrap();
        let lead = fx.leads.find_by_id(accepted.lead_id).await.unwrap().unwrap();
        for channel in [
            DeliveryChannel::Notification,
            DeliveryChannel::Webhook,
            DeliveryChannel::Zapier,
        ] {
            let state = lead.delivery(channel);
            assert_eq!(state.status, DeliveryStatus::Failed);
            assert_eq!(state.last_error, "Failed to queue task: delivery queue is closed");
        }
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let fx = fixture(RecordingQueue::default(), FormConfiguration::default());
        let err = fx
            .service
            .submit(request(json!({"email": "nope", "phone": "12345"})))
            .await
            .unwrap_err();
        let SubmissionError::Validation(errors) = err else {
            panic!("expected validation errors, got {err:?}");
        };
        assert_eq!(errors["name"], vec!["Name is required"]);
        assert_eq!(errors["message"], vec!["Message is required"]);
        assert_eq!(errors["email"], vec!["Please enter a valid email address"]);
        assert_eq!(errors["phone"], vec!["Please enter a valid UK phone number"]);
        assert_eq!(errors["form_type"], vec!["Form type is required"]);
        assert_eq!(fx.leads.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_default_form_type_applies() {
        let fx = fixture(
            RecordingQueue::default(),
            FormConfiguration {
                default_form_type: Some("quote".into()),
                ..Default::default()
            },
        );
        let mut data = contact();
        data["form_type"] = json!("");
        let accepted = fx.service.submit(request(data)).await.unwrap();
        let lead = fx.leads.find_by_id(accepted.lead_id).await.unwrap().unwrap();
        assert_eq!(lead.form_type, "quote");
    }

    #[tokio::test]
    async fn test_honeypot_and_rate_limit() {
        let fx = fixture(
            RecordingQueue::default(),
            FormConfiguration {
                rate_limit_per_ip_per_hour: 1,
                ..Default::default()
            },
        );
        let mut spam = contact();
        spam["company"] = json!("Bots Inc");
        let err = fx.service.submit(request(spam)).await.unwrap_err();
        assert!(matches!(err, SubmissionError::Spam { .. }));

        fx.service.submit(request(contact())).await.unwrap();
        let err = fx.service.submit(request(contact())).await.unwrap_err();
        assert!(matches!(err, SubmissionError::RateLimited));
        assert_eq!(fx.leads.count().await.unwrap(), 1);
    }

    #[test]
    fn test_spam_messages() {
        assert_eq!(
            SubmissionError::spam_message("Submitted too quickly (1s < 3s minimum)", true),
            "Please wait a moment and try again."
        );
        assert_eq!(
            SubmissionError::spam_message("Time token expired", true),
            "Please refresh the page and try again."
        );
        assert_eq!(
            SubmissionError::spam_message("Time token expired", false),
            "Invalid submission"
        );
    }

    #[tokio::test]
    async fn test_unknown_host_uses_default_site() {
        let fx = fixture(RecordingQueue::default(), FormConfiguration::default());
        let mut req = request(contact());
        req.host = "other.test".into();
        let accepted = fx.service.submit(req).await.unwrap();
        let lead = fx.leads.find_by_id(accepted.lead_id).await.unwrap().unwrap();
        assert_eq!(lead.site_id, Some(fx.site.id));
    }

    #[tokio::test]
    async fn test_dynamic_submission() {
        let fx = fixture(RecordingQueue::default(), FormConfiguration::default());
        let mut form = FormDefinition::new(fx.site.id, "Brochure", "brochure");
        form.fields = vec![
            FormField::new(FieldKind::Email, "work_email", "Email").required(),
            FormField::new(FieldKind::Select, "size", "Size").required(),
        ];
        form.fields[1].choices = vec!["small".into(), "large".into()];
        form.success_message = "Check your inbox".into();
        let form = fx.forms.save(form).await.unwrap();

        let err = fx
            .service
            .submit_dynamic("brochure", request(json!({"size": "huge"})))
            .await
            .unwrap_err();
        let SubmissionError::Validation(errors) = err else {
            panic!("expected validation errors");
        };
        assert_eq!(errors["work_email"], vec!["This field is required."]);
        assert_eq!(errors["size"], vec!["Select a valid choice."]);

        let accepted = fx
            .service
            .submit_dynamic(
                "brochure",
                request(json!({"work_email": "sam@example.com", "size": "large", "_time_token": ""})),
            )
            .await
            .unwrap();
        assert_eq!(accepted.message, "Check your inbox");

        let lead = fx.leads.find_by_id(accepted.lead_id).await.unwrap().unwrap();
        assert_eq!(lead.form_type, "brochure");
        assert_eq!(lead.email, "sam@example.com");
        assert_eq!(lead.name, "sam@example.com");
        assert_eq!(lead.message, "Brochure submission");
        assert_eq!(lead.form_data.len(), 2);

        let jobs = fx.queue.jobs.lock();
        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs[2].kind, JobKind::FormWebhook { form_id: form.id });
    }

    #[tokio::test]
    async fn test_dynamic_unknown_slug() {
        let fx = fixture(RecordingQueue::default(), FormConfiguration::default());
        let err = fx
            .service
            .submit_dynamic("missing", request(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::FormNotFound));
    }

    #[tokio::test]
    async fn test_dynamic_slug_lookups_are_rate_limited() {
        let fx = fixture(
            RecordingQueue::default(),
            FormConfiguration {
                rate_limit_per_ip_per_hour: 1,
                ..Default::default()
            },
        );
        let err = fx
            .service
            .submit_dynamic("missing", request(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::FormNotFound));

        let err = fx
            .service
            .submit_dynamic("also-missing", request(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::RateLimited));
    }
}
