// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Lead Domain
//!
//! A [`Lead`] is one inbound contact or quote submission. It is the aggregate
//! root of the lead-capture context: it owns the submitted contact details,
//! marketing attribution, and one [`DeliveryState`] per outbound channel.
//!
//! # Architecture
//!
//! - **Layer:** Domain
//! - **Purpose:** Lead aggregate and delivery tracking value objects
//!
//! ## Lifecycle
//!
//! A lead is persisted before any side effect runs. Delivery channels then
//! move independently through `pending → in_progress → sent | failed` (or
//! straight to `disabled`). Nothing on the delivery path removes a lead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::attribution::LeadSource;
use crate::domain::site::SiteId;

/// Upper bound, in characters, for stored delivery error messages.
pub const MAX_ERROR_LENGTH: usize = 500;

pub type FormData = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LeadId(pub Uuid);

impl LeadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for LeadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    #[default]
    New,
    Contacted,
    Quoted,
    Won,
    Lost,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Quoted => "quoted",
            LeadStatus::Won => "won",
            LeadStatus::Lost => "lost",
        }
    }
}

impl FromStr for LeadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(LeadStatus::New),
            "contacted" => Ok(LeadStatus::Contacted),
            "quoted" => Ok(LeadStatus::Quoted),
            "won" => Ok(LeadStatus::Won),
            "lost" => Ok(LeadStatus::Lost),
            other => Err(format!("unknown lead status: {other}")),
        }
    }
}

/// Marketing attribution captured with the submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    #[serde(default)]
    pub utm_source: String,
    #[serde(default)]
    pub utm_medium: String,
    #[serde(default)]
    pub utm_campaign: String,
    #[serde(default)]
    pub utm_term: String,
    #[serde(default)]
    pub utm_content: String,
    #[serde(default)]
    pub landing_page_url: String,
    #[serde(default)]
    pub page_url: String,
    #[serde(default)]
    pub referrer_url: String,
}

/// Outbound side effect tracked on a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryChannel {
    /// Staff notification email for contact/quote forms
    Notification,
    /// Global lead webhook
    Webhook,
    /// Per-site Zapier webhook
    Zapier,
    FormNotification,
    AutoReply,
    FormWebhook,
}

impl DeliveryChannel {
    pub const ALL: [DeliveryChannel; 6] = [
        DeliveryChannel::Notification,
        DeliveryChannel::Webhook,
        DeliveryChannel::Zapier,
        DeliveryChannel::FormNotification,
        DeliveryChannel::AutoReply,
        DeliveryChannel::FormWebhook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryChannel::Notification => "notification",
            DeliveryChannel::Webhook => "webhook",
            DeliveryChannel::Zapier => "zapier",
            DeliveryChannel::FormNotification => "form_notification",
            DeliveryChannel::AutoReply => "auto_reply",
            DeliveryChannel::FormWebhook => "form_webhook",
        }
    }
}

impl fmt::Display for DeliveryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    #[default]
    Pending,
    InProgress,
    Sent,
    Failed,
    Disabled,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::InProgress => "in_progress",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Disabled => "disabled",
        }
    }
}

/// Observable delivery progress for a single channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryState {
    #[serde(default)]
    pub status: DeliveryStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: String,
    #[serde(default)]
    pub last_status_code: Option<u16>,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
}

impl DeliveryState {
    /// Claim the channel for an attempt.
    pub fn begin_attempt(&mut self) {
        self.status = DeliveryStatus::InProgress;
        self.attempts += 1;
    }

    pub fn mark_sent(&mut self, status_code: Option<u16>, at: DateTime<Utc>) {
        self.status = DeliveryStatus::Sent;
        self.sent_at = Some(at);
        self.last_error.clear();
        if status_code.is_some() {
            self.last_status_code = status_code;
        }
    }

    /// Record a failed attempt. The channel stays `in_progress` while a retry
    /// is scheduled and becomes `failed` once retries are exhausted.
    pub fn record_failure(&mut self, error: &str, status_code: Option<u16>, will_retry: bool) {
        self.last_error = truncate_error(error);
        self.last_status_code = status_code;
        self.status = if will_retry {
            DeliveryStatus::InProgress
        } else {
            DeliveryStatus::Failed
        };
    }

    pub fn mark_failed(&mut self, error: &str) {
        self.last_error = truncate_error(error);
        self.status = DeliveryStatus::Failed;
    }

    pub fn mark_disabled(&mut self) {
        self.status = DeliveryStatus::Disabled;
        self.last_error.clear();
    }
}

pub fn truncate_error(error: &str) -> String {
    error.chars().take(MAX_ERROR_LENGTH).collect()
}

/// Lead aggregate root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub site_id: Option<SiteId>,
    pub name: String,
    pub email: String,
    /// Trimmed; empty when not supplied.
    pub phone: String,
    pub message: String,
    pub form_type: String,
    pub form_data: FormData,
    pub source_page: Option<String>,
    pub status: LeadStatus,
    pub is_archived: bool,
    pub submitted_at: DateTime<Utc>,
    pub attribution: Attribution,
    pub lead_source: LeadSource,
    pub lead_source_detail: String,
    delivery: BTreeMap<DeliveryChannel, DeliveryState>,
}

impl Lead {
    /// Build a fresh lead in status `new` with every channel `pending`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        site_id: Option<SiteId>,
        name: String,
        email: String,
        phone: String,
        message: String,
        form_type: String,
        form_data: FormData,
        source_page: Option<String>,
        attribution: Attribution,
    ) -> Self {
        Self {
            id: LeadId::new(),
            site_id,
            name,
            email,
            phone,
            message,
            form_type,
            form_data,
            source_page,
            status: LeadStatus::New,
            is_archived: false,
            submitted_at: Utc::now(),
            attribution,
            lead_source: LeadSource::Unknown,
            lead_source_detail: String::new(),
            delivery: DeliveryChannel::ALL
                .iter()
                .map(|c| (*c, DeliveryState::default()))
                .collect(),
        }
    }

    pub fn with_lead_source(mut self, source: LeadSource, detail: String) -> Self {
        self.lead_source = source;
        self.lead_source_detail = detail;
        self
    }

    pub fn delivery(&self, channel: DeliveryChannel) -> DeliveryState {
        self.delivery.get(&channel).cloned().unwrap_or_default()
    }

    pub fn delivery_mut(&mut self, channel: DeliveryChannel) -> &mut DeliveryState {
        self.delivery.entry(channel).or_default()
    }

    pub fn deliveries(&self) -> &BTreeMap<DeliveryChannel, DeliveryState> {
        &self.delivery
    }

    /// Replace delivery tracking wholesale (used when rehydrating from storage).
    pub fn set_deliveries(&mut self, delivery: BTreeMap<DeliveryChannel, DeliveryState>) {
        self.delivery = delivery;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead() -> Lead {
        Lead::new(
            None,
            "Jane".into(),
            "jane@example.com".into(),
            String::new(),
            "Hello".into(),
            "contact".into(),
            FormData::new(),
            None,
            Attribution::default(),
        )
    }

    #[test]
    fn test_new_lead_starts_pending() {
        let lead = lead();
        assert_eq!(lead.status, LeadStatus::New);
        assert!(!lead.is_archived);
        for channel in DeliveryChannel::ALL {
            assert_eq!(lead.delivery(channel).status, DeliveryStatus::Pending);
        }
    }

    #[test]
    fn test_failure_keeps_in_progress_while_retrying() {
        let mut lead = lead();
        let state = lead.delivery_mut(DeliveryChannel::Webhook);
        state.begin_attempt();
        state.record_failure("HTTP 502: bad gateway", Some(502), true);
        assert_eq!(state.status, DeliveryStatus::InProgress);
        assert_eq!(state.attempts, 1);
        assert_eq!(state.last_status_code, Some(502));

        state.begin_attempt();
        state.record_failure("HTTP 502: bad gateway", Some(502), false);
        assert_eq!(state.status, DeliveryStatus::Failed);
        assert_eq!(state.attempts, 2);
    }

    #[test]
    fn test_error_is_truncated() {
        let mut state = DeliveryState::default();
        state.mark_failed(&"x".repeat(2000));
        assert_eq!(state.last_error.chars().count(), MAX_ERROR_LENGTH);
    }

    #[test]
    fn test_sent_clears_error() {
        let mut state = DeliveryState::default();
        state.begin_attempt();
        state.record_failure("boom", None, true);
        state.mark_sent(Some(200), Utc::now());
        assert_eq!(state.status, DeliveryStatus::Sent);
        assert!(state.last_error.is_empty());
        assert!(state.sent_at.is_some());
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            LeadStatus::New,
            LeadStatus::Contacted,
            LeadStatus::Quoted,
            LeadStatus::Won,
            LeadStatus::Lost,
        ] {
            assert_eq!(status.as_str().parse::<LeadStatus>().unwrap(), status);
        }
    }
}
