// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod cache_store;
pub mod db;
pub mod delivery_queue;
pub mod mailer;
pub mod repositories;
pub mod webhook_client;

pub use cache_store::InMemoryCacheStore;
pub use delivery_queue::DeliveryQueue;
pub use mailer::{InMemoryMailer, TracingMailer};
pub use webhook_client::HttpWebhookTransport;
