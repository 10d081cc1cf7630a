// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Email Notifications
//!
//! Renders the three emails sent after a lead is stored, using Handlebars:
//!
//! - staff notification for contact/quote forms
//! - per-form notification to the form's recipient list
//! - auto-reply to the submitter
//!
//! # Architecture
//!
//! - **Layer:** Application
//! - **Purpose:** Turn a lead into an [`EmailMessage`]; sending is done by a
//!   [`crate::domain::delivery::Mailer`]
//!
//! Site branding supplies the from-name, reply-to and subject prefix.
//! Auto-reply text supports a `{{name}}` placeholder, filled with the
//! submitter's name after newlines and control characters are stripped.

use anyhow::{Context, Result};
use handlebars::Handlebars;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use tracing::warn;

use crate::domain::contact::is_valid_email;
use crate::domain::delivery::EmailMessage;
use crate::domain::form::FormDefinition;
use crate::domain::lead::Lead;
use crate::domain::site::Site;

static NAME_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*name\s*\}\}").expect("name token pattern is valid"));
static NAME_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\r\n]+").expect("newline pattern is valid"));
static NAME_CONTROL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x1F\x7F]").expect("control pattern is valid"));

pub const DEFAULT_AUTO_REPLY_SUBJECT: &str = "Thank you for contacting us";

const LEAD_SUBJECT: &str = "lead_notification_subject";
const LEAD_TEXT: &str = "lead_notification_text";
const LEAD_HTML: &str = "lead_notification_html";
const FORM_TEXT: &str = "form_notification_text";
const FORM_HTML: &str = "form_notification_html";

const LEAD_SUBJECT_TEMPLATE: &str = "New {{form_type}} enquiry from {{name}}";

const LEAD_TEXT_TEMPLATE: &str = "\
You have received a new enquiry{{#if site_name}} via {{site_name}}{{/if}}.

Name: {{name}}
Email: {{email}}
{{#if phone}}Phone: {{phone}}
{{/if}}Form: {{form_type}}
Submitted: {{submitted_at}}

Message:
{{message}}
{{#if extra_fields}}
Additional details:
{{#each extra_fields}}  {{@key}}: {{this}}
{{/each}}{{/if}}
Source: {{lead_source_display}}{{#if lead_source_detail}} ({{lead_source_detail}}){{/if}}
{{#if page_url}}Page: {{page_url}}
{{/if}}{{#if landing_page_url}}Landing page: {{landing_page_url}}
{{/if}}{{#if referrer_url}}Referrer: {{referrer_url}}
{{/if}}
Lead ID: {{lead_id}}
";

const LEAD_HTML_TEMPLATE: &str = "\
<h2>New enquiry{{#if site_name}} via {{site_name}}{{/if}}</h2>
<table>
<tr><th>Name</th><td>{{name}}</td></tr>
<tr><th>Email</th><td>{{email}}</td></tr>
{{#if phone}}<tr><th>Phone</th><td>{{phone}}</td></tr>{{/if}}
<tr><th>Form</th><td>{{form_type}}</td></tr>
<tr><th>Submitted</th><td>{{submitted_at}}</td></tr>
<tr><th>Source</th><td>{{lead_source_display}}</td></tr>
</table>
<p>{{message}}</p>
{{#if extra_fields}}<ul>{{#each extra_fields}}<li><strong>{{@key}}</strong>: {{this}}</li>{{/each}}</ul>{{/if}}
<p><small>Lead ID: {{lead_id}}</small></p>
";

const FORM_TEXT_TEMPLATE: &str = "\
New submission for {{form_name}}.

Name: {{name}}
Email: {{email}}
{{#if phone}}Phone: {{phone}}
{{/if}}{{#if message}}Message:
{{message}}
{{/if}}{{#each extra_fields}}{{@key}}: {{this}}
{{/each}}
Submitted: {{submitted_at}}
Lead ID: {{lead_id}}
";

const FORM_HTML_TEMPLATE: &str = "\
<h2>New submission for {{form_name}}</h2>
<table>
<tr><th>Name</th><td>{{name}}</td></tr>
<tr><th>Email</th><td>{{email}}</td></tr>
{{#if phone}}<tr><th>Phone</th><td>{{phone}}</td></tr>{{/if}}
{{#each extra_fields}}<tr><th>{{@key}}</th><td>{{this}}</td></tr>{{/each}}
</table>
{{#if message}}<p>{{message}}</p>{{/if}}
<p><small>Lead ID: {{lead_id}}</small></p>
";

#[derive(Debug, Serialize)]
struct LeadContext<'a> {
    lead_id: String,
    name: &'a str,
    email: &'a str,
    phone: &'a str,
    message: &'a str,
    form_type: &'a str,
    form_name: &'a str,
    submitted_at: String,
    page_url: &'a str,
    landing_page_url: &'a str,
    referrer_url: &'a str,
    lead_source: &'a str,
    lead_source_display: &'a str,
    lead_source_detail: &'a str,
    utm_source: &'a str,
    utm_medium: &'a str,
    utm_campaign: &'a str,
    utm_term: &'a str,
    utm_content: &'a str,
    site_name: &'a str,
    extra_fields: std::collections::BTreeMap<String, String>,
}

impl<'a> LeadContext<'a> {
    fn new(lead: &'a Lead, site_name: &'a str, form_name: &'a str) -> Self {
        let extra_fields = lead
            .form_data
            .iter()
            .map(|(k, v)| {
                let text = match v {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Array(items) => items
                        .iter()
                        .map(|i| i.as_str().map(str::to_string).unwrap_or_else(|| i.to_string()))
                        .collect::<Vec<_>>()
                        .join(", "),
                    other => other.to_string(),
                };
                (k.clone(), text)
            })
            .collect();
        Self {
            lead_id: lead.id.to_string(),
            name: &lead.name,
            email: &lead.email,
            phone: &lead.phone,
            message: &lead.message,
            form_type: &lead.form_type,
            form_name,
            submitted_at: lead.submitted_at.format("%Y-%m-%d %H:%M UTC").to_string(),
            page_url: &lead.attribution.page_url,
            landing_page_url: &lead.attribution.landing_page_url,
            referrer_url: &lead.attribution.referrer_url,
            lead_source: lead.lead_source.as_str(),
            lead_source_display: lead.lead_source.display_name(),
            lead_source_detail: &lead.lead_source_detail,
            utm_source: &lead.attribution.utm_source,
            utm_medium: &lead.attribution.utm_medium,
            utm_campaign: &lead.attribution.utm_campaign,
            utm_term: &lead.attribution.utm_term,
            utm_content: &lead.attribution.utm_content,
            site_name,
            extra_fields,
        }
    }
}

/// Sender details resolved from site settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branding {
    pub from: String,
    pub reply_to: Vec<String>,
    pub subject_prefix: String,
}

impl Branding {
    pub fn resolve(site: Option<&Site>, default_from: &str) -> Self {
        let mut branding = Self {
            from: default_from.to_string(),
            reply_to: Vec::new(),
            subject_prefix: String::new(),
        };
        let Some(settings) = site.map(|s| &s.integrations) else {
            return branding;
        };

        let from_email = settings.notification_from_email.trim();
        if !from_email.is_empty() {
            let from_name = settings.notification_from_name.trim();
            branding.from = if from_name.is_empty() {
                from_email.to_string()
            } else {
                format!("{from_name} <{from_email}>")
            };
        }
        let reply_to = settings.notification_reply_to_email.trim();
        if !reply_to.is_empty() {
            branding.reply_to.push(reply_to.to_string());
        }
        let prefix = settings.notification_subject_prefix.trim();
        if !prefix.is_empty() {
            branding.subject_prefix = format!("{prefix} ");
        }
        branding
    }
}

pub fn sanitize_name(name: &str) -> String {
    let single_line = NAME_NEWLINES.replace_all(name, " ");
    NAME_CONTROL
        .replace_all(single_line.trim(), "")
        .into_owned()
}

/// Collapse a rendered header value onto one line without control
/// characters.
pub fn header_line(value: &str) -> String {
    sanitize_name(value)
}

/// Replace `{{name}}` placeholders with the sanitised name.
pub fn interpolate_name(template: &str, name: &str) -> String {
    let safe = sanitize_name(name);
    NAME_TOKEN
        .replace_all(template, regex::NoExpand(&safe))
        .into_owned()
}

/// Split a comma-separated recipient list, dropping invalid addresses.
pub fn parse_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .filter(|email| {
            let valid = is_valid_email(email);
            if !valid {
                warn!(email = %email, "Invalid notification email");
            }
            valid
        })
        .map(str::to_string)
        .collect()
}

pub struct EmailRenderer {
    text: Handlebars<'static>,
    html: Handlebars<'static>,
}

impl EmailRenderer {
    pub fn new() -> Result<Self> {
        let mut text = Handlebars::new();
        text.set_strict_mode(false);
        text.register_escape_fn(handlebars::no_escape);
        text.register_template_string(LEAD_SUBJECT, LEAD_SUBJECT_TEMPLATE)
            .context("Invalid lead subject template")?;
        text.register_template_string(LEAD_TEXT, LEAD_TEXT_TEMPLATE)
            .context("Invalid lead text template")?;
        text.register_template_string(FORM_TEXT, FORM_TEXT_TEMPLATE)
            .context("Invalid form text template")?;

        let mut html = Handlebars::new();
        html.set_strict_mode(false);
        html.register_template_string(LEAD_HTML, LEAD_HTML_TEMPLATE)
            .context("Invalid lead html template")?;
        html.register_template_string(FORM_HTML, FORM_HTML_TEMPLATE)
            .context("Invalid form html template")?;

        Ok(Self { text, html })
    }

    /// Staff notification for a contact/quote lead.
    pub fn lead_notification(
        &self,
        lead: &Lead,
        site: Option<&Site>,
        default_from: &str,
        to: &str,
    ) -> Result<EmailMessage> {
        let branding = Branding::resolve(site, default_from);
        let site_name = site.map(|s| s.site_name.as_str()).unwrap_or("");
        let ctx = LeadContext::new(lead, site_name, "");

        let subject = self
            .text
            .render(LEAD_SUBJECT, &ctx)
            .context("Template render failed")?;
        let text_body = self
            .text
            .render(LEAD_TEXT, &ctx)
            .context("Template render failed")?;
        let html_body = match self.html.render(LEAD_HTML, &ctx) {
            Ok(html) => Some(html),
            Err(e) => {
                warn!(lead_id = %lead.id, error = %e, "Failed to render HTML lead email, sending text only");
                None
            }
        };

        Ok(EmailMessage {
            from: branding.from,
            to: vec![to.to_string()],
            reply_to: branding.reply_to,
            subject: header_line(&format!("{}{}", branding.subject_prefix, subject)),
            text_body,
            html_body,
        })
    }

    pub fn form_notification(
        &self,
        lead: &Lead,
        form: &FormDefinition,
        default_from: &str,
        recipients: Vec<String>,
    ) -> Result<EmailMessage> {
        let ctx = LeadContext::new(lead, "", &form.name);
        let text_body = self
            .text
            .render(FORM_TEXT, &ctx)
            .context("Template render failed")?;
        let html_body = self
            .html
            .render(FORM_HTML, &ctx)
            .context("Template render failed")?;

        Ok(EmailMessage {
            from: default_from.to_string(),
            to: recipients,
            reply_to: Vec::new(),
            subject: header_line(&format!("New {} Submission", form.name)),
            text_body,
            html_body: Some(html_body),
        })
    }

    pub fn auto_reply(&self, lead: &Lead, form: &FormDefinition, default_from: &str) -> EmailMessage {
        let subject = if form.auto_reply_subject.trim().is_empty() {
            DEFAULT_AUTO_REPLY_SUBJECT
        } else {
            form.auto_reply_subject.as_str()
        };
        let body = if form.auto_reply_body.trim().is_empty() {
            form.success_message.as_str()
        } else {
            form.auto_reply_body.as_str()
        };
        let name = if lead.name.is_empty() {
            lead.form_data
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("there")
        } else {
            lead.name.as_str()
        };

        EmailMessage {
            from: default_from.to_string(),
            to: vec![lead.email.trim().to_string()],
            reply_to: Vec::new(),
            subject: header_line(&interpolate_name(subject, name)),
            text_body: interpolate_name(body, name),
            html_body: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::lead::{Attribution, FormData};
    use crate::domain::site::{SiteId, SiteIntegrations};
    use serde_json::json;

    fn lead() -> Lead {
        let data: FormData = json!({"budget": "£2k", "rooms": ["kitchen", "bath"]})
            .as_object()
            .unwrap()
            .clone();
        Lead::new(
            None,
            "Jane <b>".into(),
            "jane@example.com".into(),
            "07700 900123".into(),
            "New boiler please".into(),
            "quote".into(),
            data,
            None,
            Attribution::default(),
        )
    }

    #[test]
    fn test_name_sanitisation() {
        assert_eq!(sanitize_name("Jane\r\nDoe"), "Jane Doe");
        assert_eq!(sanitize_name(" Bob\u{0007} "), "Bob");
        assert_eq!(
            interpolate_name("Hi {{ name }}, thanks {{name}}!", "Ann\nLee"),
            "Hi Ann Lee, thanks Ann Lee!"
        );
        assert_eq!(interpolate_name("Hi {{name}}", "$1 money"), "Hi $1 money");
    }

    #[test]
    fn test_parse_recipients_drops_invalid() {
        assert_eq!(
            parse_recipients("a@example.com, nope, ,b@example.com"),
            vec!["a@example.com".to_string(), "b@example.com".to_string()]
        );
        assert!(parse_recipients("").is_empty());
    }

    #[test]
    fn test_branding() {
        let site = Site::new("acme.test", "Acme").with_integrations(SiteIntegrations {
            notification_from_name: "Acme Leads".into(),
            notification_from_email: "leads@acme.test".into(),
            notification_reply_to_email: "sales@acme.test".into(),
            notification_subject_prefix: "[Acme]".into(),
            ..Default::default()
        });
        let branding = Branding::resolve(Some(&site), "noreply@example.com");
        assert_eq!(branding.from, "Acme Leads <leads@acme.test>");
        assert_eq!(branding.reply_to, vec!["sales@acme.test".to_string()]);
        assert_eq!(branding.subject_prefix, "[Acme] ");

        let plain = Branding::resolve(None, "noreply@example.com");
        assert_eq!(plain.from, "noreply@example.com");
        assert!(plain.subject_prefix.is_empty());
    }

    #[test]
    fn test_lead_notification_rendering() {
        let renderer = EmailRenderer::new().unwrap();
        let site = Site::new("acme.test", "Acme").with_integrations(SiteIntegrations {
            notification_subject_prefix: "[Acme]".into(),
            ..Default::default()
        });
        let email = renderer
            .lead_notification(&lead(), Some(&site), "noreply@example.com", "staff@acme.test")
            .unwrap();
        assert_eq!(email.subject, "[Acme] New quote enquiry from Jane <b>");
        assert_eq!(email.to, vec!["staff@acme.test".to_string()]);
        assert!(email.text_body.contains("Jane <b>"));
        assert!(email.text_body.contains("rooms: kitchen, bath"));
        let html = email.html_body.unwrap();
        assert!(html.contains("Jane &lt;b&gt;"));
    }

    #[test]
    fn test_subjects_stay_on_one_line() {
        let renderer = EmailRenderer::new().unwrap();
        let mut lead = lead();
        lead.name = "Jane\r\nBcc: victim@example.com".into();
        lead.form_type = "contact".into();
        let email = renderer
            .lead_notification(&lead, None, "noreply@example.com", "staff@acme.test")
            .unwrap();
        assert_eq!(email.subject, "New contact enquiry from Jane Bcc: victim@example.com");

        let mut form = FormDefinition::new(SiteId::new(), "Quote\rRequest", "quote");
        let email = renderer
            .form_notification(&lead, &form, "noreply@example.com", vec!["a@b.test".into()])
            .unwrap();
        assert_eq!(email.subject, "New Quote Request Submission");

        form.auto_reply_subject = "Thanks\n{{name}}".into();
        let reply = renderer.auto_reply(&lead, &form, "noreply@example.com");
        assert!(!reply.subject.contains('\n'));
        assert_eq!(reply.subject, "Thanks Jane Bcc: victim@example.com");
    }

    #[test]
    fn test_form_notification_subject() {
        let renderer = EmailRenderer::new().unwrap();
        let form = FormDefinition::new(SiteId::new(), "Quote Request", "quote");
        let email = renderer
            .form_notification(&lead(), &form, "noreply@example.com", vec!["a@b.test".into()])
            .unwrap();
        assert_eq!(email.subject, "New Quote Request Submission");
        assert!(email.text_body.contains("budget: £2k"));
    }

    #[test]
    fn test_auto_reply_defaults() {
        let renderer = EmailRenderer::new().unwrap();
        let mut form = FormDefinition::new(SiteId::new(), "Quote", "quote");
        let reply = renderer.auto_reply(&lead(), &form, "noreply@example.com");
        assert_eq!(reply.subject, DEFAULT_AUTO_REPLY_SUBJECT);
        assert_eq!(reply.text_body, form.success_message);

        form.auto_reply_subject = "Thanks {{name}}".into();
        form.auto_reply_body = "Hello {{name}}, we'll be in touch.".into();
        let reply = renderer.auto_reply(&lead(), &form, "noreply@example.com");
        assert_eq!(reply.subject, "Thanks Jane <b>");
        assert_eq!(reply.text_body, "Hello Jane <b>, we'll be in touch.");
    }
}
