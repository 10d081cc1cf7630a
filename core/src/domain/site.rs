// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Site Domain
//!
//! A site is one tenant of the platform, resolved from the request `Host`.
//! Each site carries its own integration settings (Zapier, notification
//! branding) and an optional [`FormConfiguration`] for spam protection.
//!
//! # Architecture
//!
//! - **Layer:** Domain
//! - **Purpose:** Tenant identity and per-tenant settings

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SiteId(pub Uuid);

impl SiteId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Stable identifier derived from the hostname, used when configuration
    /// does not pin an explicit id.
    pub fn from_hostname(hostname: &str) -> Self {
        Self(Uuid::new_v5(
            &Uuid::NAMESPACE_DNS,
            hostname.trim().to_ascii_lowercase().as_bytes(),
        ))
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for SiteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-site outbound integrations and notification branding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteIntegrations {
    #[serde(default)]
    pub zapier_enabled: bool,
    #[serde(default)]
    pub zapier_webhook_url: String,
    #[serde(default)]
    pub notification_from_name: String,
    #[serde(default)]
    pub notification_from_email: String,
    #[serde(default)]
    pub notification_reply_to_email: String,
    #[serde(default)]
    pub notification_subject_prefix: String,
}

impl SiteIntegrations {
    /// Zapier delivery needs both the toggle and a URL.
    pub fn zapier_url(&self) -> Option<&str> {
        let url = self.zapier_webhook_url.trim();
        (self.zapier_enabled && !url.is_empty()).then_some(url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub hostname: String,
    pub site_name: String,
    pub is_default: bool,
    pub integrations: SiteIntegrations,
}

impl Site {
    pub fn new(hostname: impl Into<String>, site_name: impl Into<String>) -> Self {
        let hostname = hostname.into().trim().to_ascii_lowercase();
        Self {
            id: SiteId::from_hostname(&hostname),
            hostname,
            site_name: site_name.into(),
            is_default: false,
            integrations: SiteIntegrations::default(),
        }
    }

    pub fn with_default(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }

    pub fn with_integrations(mut self, integrations: SiteIntegrations) -> Self {
        self.integrations = integrations;
        self
    }
}

pub const DEFAULT_HONEYPOT_FIELD: &str = "company";
pub const DEFAULT_RATE_LIMIT_PER_HOUR: u32 = 20;
pub const DEFAULT_MIN_SECONDS_TO_SUBMIT: u64 = 3;

/// Spam protection and routing settings for a site's built-in forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormConfiguration {
    #[serde(default = "default_honeypot_field_name")]
    pub honeypot_field_name: String,
    /// Zero disables the limit.
    #[serde(default = "default_rate_limit_per_ip_per_hour")]
    pub rate_limit_per_ip_per_hour: u32,
    #[serde(default = "default_min_seconds_to_submit")]
    pub min_seconds_to_submit: u64,
    #[serde(default)]
    pub lead_notification_email: Option<String>,
    #[serde(default)]
    pub default_form_type: Option<String>,
}

fn default_honeypot_field_name() -> String {
    DEFAULT_HONEYPOT_FIELD.to_string()
}

fn default_rate_limit_per_ip_per_hour() -> u32 {
    DEFAULT_RATE_LIMIT_PER_HOUR
}

fn default_min_seconds_to_submit() -> u64 {
    DEFAULT_MIN_SECONDS_TO_SUBMIT
}

impl Default for FormConfiguration {
    fn default() -> Self {
        Self {
            honeypot_field_name: default_honeypot_field_name(),
            rate_limit_per_ip_per_hour: default_rate_limit_per_ip_per_hour(),
            min_seconds_to_submit: default_min_seconds_to_submit(),
            lead_notification_email: None,
            default_form_type: None,
        }
    }
}

impl FormConfiguration {
    /// Configured default form type, ignoring blank values.
    pub fn default_form_type(&self) -> Option<&str> {
        self.default_form_type
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn notification_email(&self) -> Option<&str> {
        self.lead_notification_email
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}
