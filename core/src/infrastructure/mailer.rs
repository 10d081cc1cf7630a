// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mailers
//!
//! [`Mailer`] implementations. `TracingMailer` writes each message to the
//! log instead of an SMTP relay; `InMemoryMailer` records messages for tests
//! and local inspection.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

use crate::domain::delivery::{EmailMessage, MailError, Mailer};

#[derive(Debug, Clone, Default)]
pub struct TracingMailer;

impl TracingMailer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Mailer for TracingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        if message.to.is_empty() {
            return Err(MailError::Transport("message has no recipients".to_string()));
        }
        info!(
            from = %message.from,
            to = ?message.to,
            reply_to = ?message.reply_to,
            subject = %message.subject,
            html = message.html_body.is_some(),
            "Email dispatched"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryMailer {
    outbox: Arc<Mutex<Vec<EmailMessage>>>,
}

impl InMemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.outbox.lock().clone()
    }
}

#[async_trait]
impl Mailer for InMemoryMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        self.outbox.lock().push(message.clone());
        Ok(())
    }
}
