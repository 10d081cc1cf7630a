// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Delivery Contracts
//!
//! Background side effects that run after a lead is persisted: the job
//! descriptions, their retry policy, and the outbound ports (HTTP webhook
//! transport, mailer, job queue) the application layer drives.
//!
//! # Architecture
//!
//! - **Layer:** Domain
//! - **Purpose:** Ports and value objects for post-persistence delivery

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::domain::form::FormDefinitionId;
use crate::domain::lead::{DeliveryChannel, LeadId};
use crate::domain::site::SiteId;

// ============================================================================
// Jobs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobKind {
    LeadNotification { site_id: Option<SiteId> },
    LeadWebhook,
    ZapierWebhook { site_id: SiteId },
    FormNotification { form_id: FormDefinitionId },
    AutoReply { form_id: FormDefinitionId },
    FormWebhook { form_id: FormDefinitionId },
}

impl JobKind {
    pub fn channel(&self) -> DeliveryChannel {
        match self {
            JobKind::LeadNotification { .. } => DeliveryChannel::Notification,
            JobKind::LeadWebhook => DeliveryChannel::Webhook,
            JobKind::ZapierWebhook { .. } => DeliveryChannel::Zapier,
            JobKind::FormNotification { .. } => DeliveryChannel::FormNotification,
            JobKind::AutoReply { .. } => DeliveryChannel::AutoReply,
            JobKind::FormWebhook { .. } => DeliveryChannel::FormWebhook,
        }
    }
}

/// One unit of background work against a persisted lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryJob {
    pub lead_id: LeadId,
    pub kind: JobKind,
    pub request_id: Option<String>,
    /// Retries already performed; zero on the first attempt.
    #[serde(default)]
    pub retries: u32,
}

impl DeliveryJob {
    pub fn new(lead_id: LeadId, kind: JobKind, request_id: Option<String>) -> Self {
        Self {
            lead_id,
            kind,
            request_id,
            retries: 0,
        }
    }

    pub fn channel(&self) -> DeliveryChannel {
        self.kind.channel()
    }

    pub fn next_retry(&self) -> Self {
        Self {
            retries: self.retries + 1,
            ..self.clone()
        }
    }
}

/// Exponential backoff: `base * 2^retry`, capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
}

impl RetryPolicy {
    pub const STANDARD: RetryPolicy = RetryPolicy {
        max_retries: 3,
        base_delay_secs: 60,
        max_delay_secs: 300,
    };

    pub const ZAPIER: RetryPolicy = RetryPolicy {
        max_retries: 5,
        base_delay_secs: 60,
        max_delay_secs: 600,
    };

    pub fn can_retry(&self, retries: u32) -> bool {
        retries < self.max_retries
    }

    pub fn delay_for(&self, retries: u32) -> Duration {
        let factor = 2u64.saturating_pow(retries);
        let secs = self.base_delay_secs.saturating_mul(factor).min(self.max_delay_secs);
        Duration::from_secs(secs)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::STANDARD
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("delivery queue is closed")]
    Closed,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: DeliveryJob) -> Result<(), QueueError>;

    /// Re-run a job after `delay`.
    async fn schedule_retry(&self, job: DeliveryJob, delay: Duration) -> Result<(), QueueError>;
}

// ============================================================================
// Webhook transport
// ============================================================================

/// Classified webhook delivery failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("{0}")]
    InvalidUrl(String),

    #[error("Request failed: {0}")]
    Request(String),
}

impl DeliveryError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            DeliveryError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Metric label for the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryError::Timeout(_) => "timeout",
            DeliveryError::Connection(_) => "connection",
            DeliveryError::HttpStatus { .. } => "http_status",
            DeliveryError::InvalidUrl(_) => "invalid_url",
            DeliveryError::Request(_) => "request",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookRequest {
    pub url: String,
    pub body: String,
    pub headers: Vec<(String, String)>,
    /// Addresses the URL's host was vetted against. When set the transport
    /// connects only to these instead of resolving the host again.
    pub resolved: Vec<SocketAddr>,
}

#[async_trait]
pub trait WebhookTransport: Send + Sync {
    /// POST the request. Non-2xx responses are returned as `HttpStatus`.
    async fn post(&self, request: &WebhookRequest) -> Result<u16, DeliveryError>;
}

// ============================================================================
// Mail
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub reply_to: Vec<String>,
    pub subject: String,
    pub text_body: String,
    pub html_body: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}
