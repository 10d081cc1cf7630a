// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTTP Webhook Transport
//!
//! `reqwest` implementation of [`WebhookTransport`]. Failures are classified
//! into timeout, connection, HTTP status and generic request errors; the
//! response body of a non-2xx answer is kept (first 200 characters) for the
//! lead's delivery record.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Outbound POST of signed webhook bodies

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::domain::delivery::{DeliveryError, WebhookRequest, WebhookTransport};

const MAX_BODY_EXCERPT: usize = 200;

pub struct HttpWebhookTransport {
    client: Client,
    timeout: Duration,
}

fn client_builder(timeout: Duration) -> ClientBuilder {
    Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(concat!("sum-platform/", env!("CARGO_PKG_VERSION")))
}

impl HttpWebhookTransport {
    /// Redirects are not followed; the target URL was vetted before sending.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = client_builder(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, timeout })
    }

    /// Client for one request. Hosts that were vetted by address are pinned
    /// to those addresses so the connection cannot land elsewhere.
    fn client_for(&self, request: &WebhookRequest) -> Result<Client, DeliveryError> {
        if request.resolved.is_empty() {
            return Ok(self.client.clone());
        }
        let url = Url::parse(&request.url).map_err(|e| DeliveryError::InvalidUrl(e.to_string()))?;
        let Some(host) = url.host_str() else {
            return Ok(self.client.clone());
        };
        client_builder(self.timeout)
            .resolve_to_addrs(host, &request.resolved)
            .build()
            .map_err(|e| DeliveryError::Request(e.to_string()))
    }
}

fn classify(err: reqwest::Error) -> DeliveryError {
    if err.is_timeout() {
        DeliveryError::Timeout(err.to_string())
    } else if err.is_connect() {
        DeliveryError::Connection(err.to_string())
    } else if err.is_builder() {
        DeliveryError::InvalidUrl(err.to_string())
    } else {
        DeliveryError::Request(err.to_string())
    }
}

#[async_trait]
impl WebhookTransport for HttpWebhookTransport {
    async fn post(&self, request: &WebhookRequest) -> Result<u16, DeliveryError> {
        let client = self.client_for(request)?;
        let mut builder = client.post(&request.url).body(request.body.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status();
        debug!(url = %request.url, status = status.as_u16(), "Webhook response received");

        if status.is_success() {
            return Ok(status.as_u16());
        }

        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::HttpStatus {
            status: status.as_u16(),
            body: body.chars().take(MAX_BODY_EXCERPT).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: String) -> WebhookRequest {
        WebhookRequest {
            url,
            body: r#"{"a":1}"#.to_string(),
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("X-SUM-Webhook-Signature".to_string(), "sha256=abc".to_string()),
            ],
            resolved: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_success_returns_status() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_header("content-type", "application/json")
            .match_header("x-sum-webhook-signature", "sha256=abc")
            .match_body(r#"{"a":1}"#)
            .with_status(202)
            .create_async()
            .await;

        let transport = HttpWebhookTransport::new(Duration::from_secs(5)).unwrap();
        let status = transport
            .post(&request(format!("{}/hook", server.url())))
            .await
            .unwrap();
        assert_eq!(status, 202);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_keeps_truncated_body() {
        let mut server = mockito::Server::new_async().await;
        let long_body = "x".repeat(500);
        server
            .mock("POST", "/hook")
            .with_status(500)
            .with_body(&long_body)
            .create_async()
            .await;

        let transport = HttpWebhookTransport::new(Duration::from_secs(5)).unwrap();
        let err = transport
            .post(&request(format!("{}/hook", server.url())))
            .await
            .unwrap_err();
        match err {
            DeliveryError::HttpStatus { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body.len(), MAX_BODY_EXCERPT);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_pinned_addresses_bypass_dns() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_header("host", mockito::Matcher::Regex("^hooks\\.unresolvable\\.invalid".into()))
            .with_status(200)
            .create_async()
            .await;

        let addr = server.socket_address();
        let mut pinned = request(format!("http://hooks.unresolvable.invalid:{}/hook", addr.port()));
        pinned.resolved = vec![addr];

        let transport = HttpWebhookTransport::new(Duration::from_secs(5)).unwrap();
        assert_eq!(transport.post(&pinned).await.unwrap(), 200);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_connection_refused_is_classified() {
        let transport = HttpWebhookTransport::new(Duration::from_secs(2)).unwrap();
        let err = transport
            .post(&request("http://127.0.0.1:1/hook".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "connection");
    }
}
