// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Delivery Service
//!
//! Executes [`DeliveryJob`]s: staff notification, auto-reply and the three
//! webhook channels. Each run drives the channel's [`DeliveryState`] on the
//! lead through `pending → in_progress → sent | failed`, or straight to
//! `disabled` when the feature is switched off.
//!
//! # Architecture
//!
//! - **Layer:** Application
//! - **Purpose:** Per-channel state machine around the mail and webhook ports
//!
//! Runs are split into three phases. Claim and record hold a per-lead lock
//! and write only the job's own channel; the network call in between runs
//! without the lock so slow endpoints never block other channels.
//!
//! A job arriving for a channel that is already `in_progress` on its first
//! attempt is a duplicate and is skipped. Retries carry `retries > 0` and
//! resume the in-progress channel.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::application::notifications::{parse_recipients, EmailRenderer};
use crate::application::webhook::{
    build_form_webhook_payload, build_lead_webhook_payload, build_zapier_payload, signed_request,
    validate_webhook_url,
};
use crate::domain::config::PlatformConfigSpec;
use crate::domain::contact::is_valid_email;
use crate::domain::delivery::{
    DeliveryJob, EmailMessage, JobKind, Mailer, RetryPolicy, WebhookRequest, WebhookTransport,
};
use crate::domain::form::FormDefinitionId;
use crate::domain::lead::{DeliveryChannel, DeliveryState, DeliveryStatus, Lead, LeadId};
use crate::domain::repository::{
    FormConfigurationRepository, FormDefinitionRepository, LeadRepository, RepositoryError,
    SiteRepository,
};
use crate::domain::site::SiteId;

/// Result of running one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    /// Already sent, disabled, or claimed by another job.
    Skipped,
    Disabled,
    Failed,
    /// Attempt failed; the job should run again after the delay.
    Retry(Duration),
    LeadMissing,
}

impl DeliveryOutcome {
    fn label(&self) -> &'static str {
        match self {
            DeliveryOutcome::Sent => "sent",
            DeliveryOutcome::Skipped => "skipped",
            DeliveryOutcome::Disabled => "disabled",
            DeliveryOutcome::Failed => "failed",
            DeliveryOutcome::Retry(_) => "retry",
            DeliveryOutcome::LeadMissing => "lead_missing",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeliverySettings {
    pub default_from_email: String,
    pub lead_notification_email: Option<String>,
    pub lead_webhook_url: Option<String>,
    pub allow_private_webhook_hosts: bool,
    pub standard_policy: RetryPolicy,
    pub zapier_policy: RetryPolicy,
}

impl DeliverySettings {
    pub fn from_config(spec: &PlatformConfigSpec) -> Self {
        Self {
            default_from_email: spec.notifications.default_from_email.clone(),
            lead_notification_email: spec.notifications.lead_notification_email.clone(),
            lead_webhook_url: spec.notifications.lead_webhook_url.clone(),
            allow_private_webhook_hosts: spec.notifications.allow_private_webhook_hosts,
            standard_policy: spec.delivery.standard_policy(),
            zapier_policy: spec.delivery.zapier_policy(),
        }
    }

    fn policy_for(&self, channel: DeliveryChannel) -> RetryPolicy {
        match channel {
            DeliveryChannel::Zapier => self.zapier_policy,
            _ => self.standard_policy,
        }
    }
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self::from_config(&PlatformConfigSpec::default())
    }
}

/// What a claimed job will send.
enum Action {
    Webhook(WebhookRequest),
    Email(EmailMessage),
}

/// Claim-phase decision for a channel.
enum Plan {
    Skip,
    Disable,
    Fail(String),
    Act(Action),
}

struct AttemptResult {
    error: Option<String>,
    status_code: Option<u16>,
}

pub struct DeliveryService {
    leads: Arc<dyn LeadRepository>,
    sites: Arc<dyn SiteRepository>,
    forms: Arc<dyn FormDefinitionRepository>,
    form_configs: Arc<dyn FormConfigurationRepository>,
    transport: Arc<dyn WebhookTransport>,
    mailer: Arc<dyn Mailer>,
    renderer: EmailRenderer,
    settings: DeliverySettings,
    locks: DashMap<LeadId, Arc<Mutex<()>>>,
}

impl DeliveryService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        leads: Arc<dyn LeadRepository>,
        sites: Arc<dyn SiteRepository>,
        forms: Arc<dyn FormDefinitionRepository>,
        form_configs: Arc<dyn FormConfigurationRepository>,
        transport: Arc<dyn WebhookTransport>,
        mailer: Arc<dyn Mailer>,
        renderer: EmailRenderer,
        settings: DeliverySettings,
    ) -> Self {
        Self {
            leads,
            sites,
            forms,
            form_configs,
            transport,
            mailer,
            renderer,
            settings,
            locks: DashMap::new(),
        }
    }

    pub fn settings(&self) -> &DeliverySettings {
        &self.settings
    }

    pub async fn run(&self, job: &DeliveryJob) -> Result<DeliveryOutcome, RepositoryError> {
        let channel = job.channel();
        let outcome = self.run_phases(job).await;
        self.release_lock(job.lead_id);

        let outcome = outcome?;
        metrics::counter!(
            "sum_webhook_deliveries_total",
            "channel" => channel.as_str(),
            "outcome" => outcome.label()
        )
        .increment(1);
        Ok(outcome)
    }

    async fn run_phases(&self, job: &DeliveryJob) -> Result<DeliveryOutcome, RepositoryError> {
        let channel = job.channel();
        let lock = self.lock_for(job.lead_id);

        // Claim
        let action = {
            let _guard = lock.lock().await;
            let Some(lead) = self.leads.find_by_id(job.lead_id).await? else {
                warn!(lead_id = %job.lead_id, channel = channel.as_str(), "Lead not found for delivery job");
                return Ok(DeliveryOutcome::LeadMissing);
            };
            let mut state = lead.delivery(channel);

            match self.plan(job, &lead, &state).await? {
                Plan::Skip => {
                    debug!(lead_id = %lead.id, channel = channel.as_str(), status = state.status.as_str(), "Delivery skipped");
                    return Ok(DeliveryOutcome::Skipped);
                }
                Plan::Disable => {
                    state.mark_disabled();
                    self.leads.update_delivery(lead.id, channel, &state).await?;
                    info!(lead_id = %lead.id, channel = channel.as_str(), "Delivery disabled");
                    return Ok(DeliveryOutcome::Disabled);
                }
                Plan::Fail(reason) => {
                    state.mark_failed(&reason);
                    self.leads.update_delivery(lead.id, channel, &state).await?;
                    warn!(lead_id = %lead.id, channel = channel.as_str(), reason = %reason, "Delivery failed");
                    return Ok(DeliveryOutcome::Failed);
                }
                Plan::Act(action) => {
                    state.begin_attempt();
                    self.leads.update_delivery(lead.id, channel, &state).await?;
                    action
                }
            }
        };

        // Send
        let attempt = self.execute(&action).await;

        // Record
        let _guard = lock.lock().await;
        let Some(lead) = self.leads.find_by_id(job.lead_id).await? else {
            return Ok(DeliveryOutcome::LeadMissing);
        };
        let mut state = lead.delivery(channel);
        let policy = self.settings.policy_for(channel);

        let outcome = match attempt.error {
            None => {
                state.mark_sent(attempt.status_code, Utc::now());
                info!(
                    lead_id = %lead.id,
                    channel = channel.as_str(),
                    attempts = state.attempts,
                    request_id = ?job.request_id,
                    "Delivery sent"
                );
                DeliveryOutcome::Sent
            }
            Some(error) => {
                let will_retry = policy.can_retry(job.retries);
                state.record_failure(&error, attempt.status_code, will_retry);
                warn!(
                    lead_id = %lead.id,
                    channel = channel.as_str(),
                    attempts = state.attempts,
                    retries = job.retries,
                    will_retry,
                    error = %error,
                    "Delivery attempt failed"
                );
                if will_retry {
                    DeliveryOutcome::Retry(policy.delay_for(job.retries))
                } else {
                    DeliveryOutcome::Failed
                }
            }
        };
        self.leads.update_delivery(lead.id, channel, &state).await?;
        Ok(outcome)
    }

    async fn plan(
        &self,
        job: &DeliveryJob,
        lead: &Lead,
        state: &DeliveryState,
    ) -> Result<Plan, RepositoryError> {
        match state.status {
            DeliveryStatus::Sent | DeliveryStatus::Disabled => return Ok(Plan::Skip),
            DeliveryStatus::InProgress if job.retries == 0 => return Ok(Plan::Skip),
            _ => {}
        }

        match &job.kind {
            JobKind::LeadNotification { site_id } => self.plan_lead_notification(lead, *site_id).await,
            JobKind::LeadWebhook => {
                let url = self
                    .settings
                    .lead_webhook_url
                    .as_deref()
                    .map(str::trim)
                    .filter(|u| !u.is_empty());
                let Some(url) = url else {
                    return Ok(Plan::Disable);
                };
                let payload = build_lead_webhook_payload(lead);
                self.plan_webhook(url, &payload, "").await
            }
            JobKind::ZapierWebhook { site_id } => {
                let Some(site) = self.sites.find_by_id(*site_id).await? else {
                    return Ok(Plan::Fail(format!("Site {site_id} not found")));
                };
                let Some(url) = site.integrations.zapier_url() else {
                    return Ok(Plan::Disable);
                };
                let payload = build_zapier_payload(lead, &site);
                self.plan_webhook(url, &payload, "").await
            }
            JobKind::FormNotification { form_id } => self.plan_form_notification(lead, *form_id).await,
            JobKind::AutoReply { form_id } => self.plan_auto_reply(lead, *form_id).await,
            JobKind::FormWebhook { form_id } => {
                let Some(form) = self.forms.find_by_id(*form_id).await? else {
                    return Ok(Plan::Fail("Form definition missing".to_string()));
                };
                if !form.webhook_enabled {
                    return Ok(Plan::Disable);
                }
                let url = form.webhook_url.trim();
                if url.is_empty() {
                    return Ok(Plan::Fail("Webhook URL missing".to_string()));
                }
                let payload = build_form_webhook_payload(lead, &form, job.request_id.as_deref());
                self.plan_webhook(url, &payload, &form.webhook_signing_secret)
                    .await
            }
        }
    }

    async fn plan_webhook(
        &self,
        url: &str,
        payload: &serde_json::Value,
        secret: &str,
    ) -> Result<Plan, RepositoryError> {
        match validate_webhook_url(url, self.settings.allow_private_webhook_hosts).await {
            Ok(vetted) => {
                let mut request = signed_request(vetted.url.as_str(), payload, secret);
                request.resolved = vetted.addrs;
                Ok(Plan::Act(Action::Webhook(request)))
            }
            Err(reason) => Ok(Plan::Fail(reason)),
        }
    }

    async fn plan_lead_notification(
        &self,
        lead: &Lead,
        site_id: Option<SiteId>,
    ) -> Result<Plan, RepositoryError> {
        let (site, site_email) = match site_id {
            Some(id) => {
                let site = self.sites.find_by_id(id).await?;
                let config = self.form_configs.get_for_site(id).await?;
                (site, config.notification_email().map(str::to_string))
            }
            None => (None, None),
        };
        let to = site_email.or_else(|| {
            self.settings
                .lead_notification_email
                .as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string)
        });
        let Some(to) = to else {
            return Ok(Plan::Fail(
                "No notification email address configured".to_string(),
            ));
        };

        match self.renderer.lead_notification(
            lead,
            site.as_ref(),
            &self.settings.default_from_email,
            &to,
        ) {
            Ok(message) => Ok(Plan::Act(Action::Email(message))),
            Err(e) => Ok(Plan::Fail(format!("{e:#}"))),
        }
    }

    async fn plan_form_notification(
        &self,
        lead: &Lead,
        form_id: FormDefinitionId,
    ) -> Result<Plan, RepositoryError> {
        let Some(form) = self.forms.find_by_id(form_id).await? else {
            return Ok(Plan::Fail("Form definition missing".to_string()));
        };
        if !form.email_notification_enabled {
            return Ok(Plan::Disable);
        }
        let recipients = parse_recipients(&form.notification_emails);
        if recipients.is_empty() {
            return Ok(Plan::Fail(
                "No notification recipients configured".to_string(),
            ));
        }
        match self.renderer.form_notification(
            lead,
            &form,
            &self.settings.default_from_email,
            recipients,
        ) {
            Ok(message) => Ok(Plan::Act(Action::Email(message))),
            Err(e) => Ok(Plan::Fail(format!("{e:#}"))),
        }
    }

    async fn plan_auto_reply(
        &self,
        lead: &Lead,
        form_id: FormDefinitionId,
    ) -> Result<Plan, RepositoryError> {
        let Some(form) = self.forms.find_by_id(form_id).await? else {
            return Ok(Plan::Fail("Form definition missing".to_string()));
        };
        if !form.auto_reply_enabled {
            return Ok(Plan::Disable);
        }
        let email = lead.email.trim();
        if email.is_empty() {
            return Ok(Plan::Fail("Submitter email missing".to_string()));
        }
        if !is_valid_email(email) {
            return Ok(Plan::Fail("Submitter email invalid".to_string()));
        }
        Ok(Plan::Act(Action::Email(self.renderer.auto_reply(
            lead,
            &form,
            &self.settings.default_from_email,
        ))))
    }

    async fn execute(&self, action: &Action) -> AttemptResult {
        match action {
            Action::Webhook(request) => match self.transport.post(request).await {
                Ok(code) => AttemptResult {
                    error: None,
                    status_code: Some(code),
                },
                Err(e) => {
                    metrics::counter!("sum_webhook_errors_total", "kind" => e.kind()).increment(1);
                    AttemptResult {
                        status_code: e.status_code(),
                        error: Some(e.to_string()),
                    }
                }
            },
            Action::Email(message) => match self.mailer.send(message).await {
                Ok(()) => AttemptResult {
                    error: None,
                    status_code: None,
                },
                Err(e) => AttemptResult {
                    error: Some(e.to_string()),
                    status_code: None,
                },
            },
        }
    }

    fn lock_for(&self, lead_id: LeadId) -> Arc<Mutex<()>> {
        self.locks.entry(lead_id).or_default().clone()
    }

    fn release_lock(&self, lead_id: LeadId) {
        self.locks
            .remove_if(&lead_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
