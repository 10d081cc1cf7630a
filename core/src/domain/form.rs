// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Form Definition Domain
//!
//! A [`FormDefinition`] describes a dynamically rendered form owned by one
//! site: its typed fields, notification recipients, auto-reply text and the
//! outbound webhook (URL, signing secret, field allow/deny lists).
//!
//! # Architecture
//!
//! - **Layer:** Domain
//! - **Purpose:** Form definition aggregate and its validation rules
//!
//! Slugs are unique per site. Every save or delete through
//! `FormDefinitionService` bumps the definition's cache version.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;
use uuid::Uuid;

use crate::domain::contact::is_valid_email;
use crate::domain::site::SiteId;

static SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-a-zA-Z0-9_]+$").expect("slug pattern is valid"));

pub const DEFAULT_SUCCESS_MESSAGE: &str = "Thank you for your submission!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FormDefinitionId(pub Uuid);

impl FormDefinitionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for FormDefinitionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FormDefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Email,
    Phone,
    Textarea,
    Select,
    Checkbox,
    CheckboxGroup,
    Radio,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub kind: FieldKind,
    pub field_name: String,
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

impl FormField {
    pub fn new(kind: FieldKind, field_name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            kind,
            field_name: field_name.into(),
            label: label.into(),
            required: false,
            choices: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormDefinition {
    pub id: FormDefinitionId,
    pub site_id: SiteId,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub fields: Vec<FormField>,
    #[serde(default = "default_success_message")]
    pub success_message: String,
    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(default = "default_true")]
    pub email_notification_enabled: bool,
    /// Comma-separated recipient list.
    #[serde(default)]
    pub notification_emails: String,
    #[serde(default)]
    pub auto_reply_enabled: bool,
    #[serde(default)]
    pub auto_reply_subject: String,
    #[serde(default)]
    pub auto_reply_body: String,

    #[serde(default)]
    pub webhook_enabled: bool,
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub webhook_signing_secret: String,
    /// Comma or whitespace separated field names.
    #[serde(default)]
    pub webhook_field_allowlist: String,
    #[serde(default)]
    pub webhook_field_denylist: String,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_success_message() -> String {
    DEFAULT_SUCCESS_MESSAGE.to_string()
}

fn default_true() -> bool {
    true
}

impl FormDefinition {
    pub fn new(site_id: SiteId, name: impl Into<String>, slug: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: FormDefinitionId::new(),
            site_id,
            name: name.into(),
            slug: slug.into(),
            fields: Vec::new(),
            success_message: default_success_message(),
            is_active: true,
            email_notification_enabled: true,
            notification_emails: String::new(),
            auto_reply_enabled: false,
            auto_reply_subject: String::new(),
            auto_reply_body: String::new(),
            webhook_enabled: false,
            webhook_url: String::new(),
            webhook_signing_secret: String::new(),
            webhook_field_allowlist: String::new(),
            webhook_field_denylist: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn webhook_allowlist(&self) -> BTreeSet<String> {
        parse_field_list(&self.webhook_field_allowlist)
    }

    pub fn webhook_denylist(&self) -> BTreeSet<String> {
        parse_field_list(&self.webhook_field_denylist)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FormField> {
        self.fields.iter().filter(|f| f.required)
    }

    /// Field-keyed validation errors; empty when the definition is valid.
    pub fn validate(&self) -> BTreeMap<String, Vec<String>> {
        let mut errors: BTreeMap<String, Vec<String>> = BTreeMap::new();

        if self.name.trim().is_empty() {
            errors
                .entry("name".into())
                .or_default()
                .push("Name is required.".into());
        }
        if !SLUG.is_match(&self.slug) {
            errors.entry("slug".into()).or_default().push(
                "Enter a valid slug consisting of letters, numbers, underscores or hyphens."
                    .into(),
            );
        }
        if self.webhook_enabled && self.webhook_url.trim().is_empty() {
            errors
                .entry("webhook_url".into())
                .or_default()
                .push("Webhook URL is required when webhooks are enabled.".into());
        }

        let recipient_errors = validate_recipient_list(&self.notification_emails);
        if !recipient_errors.is_empty() {
            errors
                .entry("notification_emails".into())
                .or_default()
                .extend(recipient_errors);
        }

        let mut seen = BTreeSet::new();
        for field in &self.fields {
            if !seen.insert(field.field_name.as_str()) {
                errors
                    .entry("fields".into())
                    .or_default()
                    .push(format!("Duplicate field name '{}'.", field.field_name));
            }
        }

        errors
    }
}

/// Split an allow/deny list on commas and whitespace.
pub fn parse_field_list(raw: &str) -> BTreeSet<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn validate_recipient_list(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    let mut errors = Vec::new();
    for entry in raw.split(',') {
        let email = entry.trim();
        if email.is_empty() {
            errors.push("Email addresses must not be empty when separated by commas.".into());
        } else if !is_valid_email(email) {
            errors.push(format!("'{email}' is not a valid email address."));
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition() -> FormDefinition {
        FormDefinition::new(SiteId::new(), "Quote", "quote-request")
    }

    #[test]
    fn test_valid_definition_has_no_errors() {
        let mut def = definition();
        def.notification_emails = "a@example.com, b@example.com".into();
        assert!(def.validate().is_empty());
    }

    #[test]
    fn test_webhook_url_required_when_enabled() {
        let mut def = definition();
        def.webhook_enabled = true;
        let errors = def.validate();
        assert!(errors.contains_key("webhook_url"));
    }

    #[test]
    fn test_invalid_slug_rejected() {
        let mut def = definition();
        def.slug = "quote request!".into();
        assert!(def.validate().contains_key("slug"));
    }

    #[test]
    fn test_recipient_list_errors() {
        let mut def = definition();
        def.notification_emails = "a@example.com,,nope".into();
        let errors = def.validate();
        let messages = &errors["notification_emails"];
        assert_eq!(messages.len(), 2);
        assert!(messages[1].contains("'nope'"));
    }

    #[test]
    fn test_field_list_parsing() {
        let parsed = parse_field_list("service, budget\nnotes  ,,");
        let expected: BTreeSet<String> =
            ["service", "budget", "notes"].iter().map(|s| s.to_string()).collect();
        assert_eq!(parsed, expected);
        assert!(parse_field_list("   ").is_empty());
    }
}
