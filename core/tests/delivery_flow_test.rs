// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! End-to-end delivery: submission through the queue worker to webhooks on a
//! local mock server and the in-memory mailer.

mod common;

use mockito::Matcher;
use serde_json::{json, Value};

use common::{Platform, HOST};
use sum_core::application::{DeliverySettings, SubmissionRequest};
use sum_core::domain::delivery::RetryPolicy;
use sum_core::domain::form::{FieldKind, FormDefinition, FormField};
use sum_core::domain::lead::{DeliveryChannel, DeliveryStatus};
use sum_core::domain::site::FormConfiguration;

fn request(data: Value) -> SubmissionRequest {
    SubmissionRequest {
        host: HOST.to_string(),
        client_ip: "198.51.100.20".to_string(),
        data: data.as_object().cloned().unwrap(),
        is_xhr: false,
        request_id: Some("flow-1".to_string()),
    }
}

fn local_settings() -> DeliverySettings {
    DeliverySettings {
        allow_private_webhook_hosts: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_dynamic_form_webhook_is_signed_and_filtered() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/hooks/survey")
        .match_header("content-type", "application/json")
        .match_header(
            "x-sum-webhook-signature",
            Matcher::Regex("^sha256=[0-9a-f]{64}$".to_string()),
        )
        .match_body(Matcher::PartialJson(json!({
            "event": "form.submitted",
            "form": {"slug": "survey"},
            "submission": {
                "contact": {"email": "pat@example.com"},
                "data": {"budget": "5000"}
            },
            "request_id": "flow-1"
        })))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let platform = Platform::new(FormConfiguration::default(), local_settings());
    let mut form = FormDefinition::new(platform.site.id, "Survey", "survey");
    form.fields = vec![
        FormField::new(FieldKind::Email, "email", "Email").required(),
        FormField::new(FieldKind::Text, "budget", "Budget"),
        FormField::new(FieldKind::Text, "notes", "Notes"),
    ];
    form.notification_emails = "sales@acme.test, ops@acme.test".into();
    form.webhook_enabled = true;
    form.webhook_url = format!("{}/hooks/survey", server.url());
    form.webhook_signing_secret = "whsec".into();
    form.webhook_field_denylist = "notes".into();
    platform.forms.save(form).await.unwrap();

    let accepted = platform
        .submissions
        .submit_dynamic(
            "survey",
            request(json!({
                "email": "pat@example.com",
                "budget": "5000",
                "notes": "internal",
                "utm_source": "newsletter"
            })),
        )
        .await
        .unwrap();

    let lead = platform
        .settled(accepted.lead_id, DeliveryChannel::FormWebhook)
        .await;
    let state = lead.delivery(DeliveryChannel::FormWebhook);
    assert_eq!(state.status, DeliveryStatus::Sent, "{}", state.last_error);
    assert_eq!(state.last_status_code, Some(200));
    assert_eq!(state.attempts, 1);
    mock.assert_async().await;

    let lead = platform
        .settled(accepted.lead_id, DeliveryChannel::FormNotification)
        .await;
    assert_eq!(
        lead.delivery(DeliveryChannel::FormNotification).status,
        DeliveryStatus::Sent
    );
    let lead = platform
        .settled(accepted.lead_id, DeliveryChannel::AutoReply)
        .await;
    assert_eq!(
        lead.delivery(DeliveryChannel::AutoReply).status,
        DeliveryStatus::Disabled
    );

    let sent = platform.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, vec!["sales@acme.test", "ops@acme.test"]);
    assert_eq!(sent[0].subject, "New Survey Submission");
}

#[tokio::test]
async fn test_contact_submission_reaches_lead_webhook() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/leads")
        .match_body(Matcher::PartialJson(json!({
            "name": "Jane Doe",
            "form_type": "contact",
            "utm_source": "google"
        })))
        .with_status(204)
        .create_async()
        .await;

    let platform = Platform::new(
        FormConfiguration::default(),
        DeliverySettings {
            lead_webhook_url: Some(format!("{}/leads", server.url())),
            lead_notification_email: Some("staff@acme.test".into()),
            ..local_settings()
        },
    );

    let accepted = platform
        .submissions
        .submit(request(json!({
            "name": "Jane Doe",
            "email": "jane@example.com",
            "message": "Hello",
            "form_type": "contact",
            "utm_source": "google"
        })))
        .await
        .unwrap();

    let lead = platform
        .settled(accepted.lead_id, DeliveryChannel::Webhook)
        .await;
    assert_eq!(lead.delivery(DeliveryChannel::Webhook).status, DeliveryStatus::Sent);
    assert_eq!(
        lead.delivery(DeliveryChannel::Webhook).last_status_code,
        Some(204)
    );
    mock.assert_async().await;

    // No Zapier URL on the site.
    let lead = platform
        .settled(accepted.lead_id, DeliveryChannel::Zapier)
        .await;
    assert_eq!(lead.delivery(DeliveryChannel::Zapier).status, DeliveryStatus::Disabled);

    let lead = platform
        .settled(accepted.lead_id, DeliveryChannel::Notification)
        .await;
    assert_eq!(
        lead.delivery(DeliveryChannel::Notification).status,
        DeliveryStatus::Sent
    );
    let sent = platform.mailer.sent();
    assert_eq!(sent[0].to, vec!["staff@acme.test"]);
    assert_eq!(sent[0].subject, "New contact enquiry from Jane Doe");
}

#[tokio::test]
async fn test_webhook_failure_is_recorded_when_retries_exhausted() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/leads")
        .with_status(503)
        .with_body("upstream down")
        .create_async()
        .await;

    let platform = Platform::new(
        FormConfiguration::default(),
        DeliverySettings {
            lead_webhook_url: Some(format!("{}/leads", server.url())),
            standard_policy: RetryPolicy {
                max_retries: 0,
                ..RetryPolicy::STANDARD
            },
            ..local_settings()
        },
    );

    let accepted = platform
        .submissions
        .submit(request(json!({
            "name": "Jane Doe",
            "email": "jane@example.com",
            "message": "Hello",
            "form_type": "contact"
        })))
        .await
        .unwrap();

    let lead = platform
        .settled(accepted.lead_id, DeliveryChannel::Webhook)
        .await;
    let state = lead.delivery(DeliveryChannel::Webhook);
    assert_eq!(state.status, DeliveryStatus::Failed);
    assert_eq!(state.last_status_code, Some(503));
    assert!(state.last_error.contains("503"));

    // Nothing configured for staff email in this setup.
    let lead = platform
        .settled(accepted.lead_id, DeliveryChannel::Notification)
        .await;
    let state = lead.delivery(DeliveryChannel::Notification);
    assert_eq!(state.status, DeliveryStatus::Failed);
    assert_eq!(state.last_error, "No notification email address configured");
}
