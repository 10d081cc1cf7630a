// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Shared wiring for integration tests: in-memory repositories, the delivery
//! queue and the HTTP router over a single default site.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use sum_core::application::{
    DeliveryService, DeliverySettings, FormDefinitionService, FormSubmissionService, SpamGuard,
    StandardLeadService, TimeTokenSigner, VersionedCache,
};
use sum_core::application::notifications::EmailRenderer;
use sum_core::domain::lead::{DeliveryChannel, DeliveryStatus, Lead, LeadId};
use sum_core::domain::repository::LeadRepository;
use sum_core::domain::site::{FormConfiguration, Site};
use sum_core::infrastructure::repositories::{
    InMemoryFormConfigurationRepository, InMemoryFormDefinitionRepository, InMemoryLeadRepository,
    InMemoryLeadSourceRuleRepository, InMemorySiteRepository,
};
use sum_core::infrastructure::{DeliveryQueue, HttpWebhookTransport, InMemoryCacheStore, InMemoryMailer};
use sum_core::presentation::api::{app, AppState};
use sum_core::presentation::client_ip::TrustedProxies;

pub const SECRET: &str = "integration-secret";
pub const HOST: &str = "www.acme.test";

pub struct Platform {
    pub site: Site,
    pub leads: Arc<InMemoryLeadRepository>,
    pub forms: Arc<FormDefinitionService>,
    pub mailer: Arc<InMemoryMailer>,
    pub submissions: Arc<FormSubmissionService>,
    pub queue: DeliveryQueue,
}

impl Platform {
    pub fn new(config: FormConfiguration, settings: DeliverySettings) -> Self {
        let site = Site::new(HOST, "Acme").with_default(true);
        let sites = Arc::new(InMemorySiteRepository::new(vec![site.clone()]));
        let configs = Arc::new(InMemoryFormConfigurationRepository::new());
        configs.insert(site.id, config);
        let leads = Arc::new(InMemoryLeadRepository::new());
        let form_repo = Arc::new(InMemoryFormDefinitionRepository::new());
        let cache = Arc::new(InMemoryCacheStore::new());
        let forms = Arc::new(FormDefinitionService::new(
            form_repo.clone(),
            VersionedCache::new(cache.clone()),
        ));
        let mailer = Arc::new(InMemoryMailer::new());

        let delivery = Arc::new(DeliveryService::new(
            leads.clone(),
            sites.clone(),
            form_repo,
            configs.clone(),
            Arc::new(HttpWebhookTransport::new(Duration::from_secs(5)).unwrap()),
            mailer.clone(),
            EmailRenderer::new().unwrap(),
            settings,
        ));
        let (queue, _worker) = DeliveryQueue::start(delivery, 64);

        let lead_service = Arc::new(StandardLeadService::new(
            leads.clone(),
            Arc::new(InMemoryLeadSourceRuleRepository::new(Vec::new())),
        ));
        let submissions = Arc::new(FormSubmissionService::new(
            sites,
            configs,
            forms.clone(),
            lead_service,
            leads.clone(),
            SpamGuard::new(cache, TimeTokenSigner::new(SECRET)),
            Arc::new(queue.clone()),
        ));

        Self {
            site,
            leads,
            forms,
            mailer,
            submissions,
            queue,
        }
    }

    pub fn router(&self) -> axum::Router {
        app(AppState::new(
            self.submissions.clone(),
            TrustedProxies::default(),
        ))
    }

    /// Poll until `channel` leaves pending/in-progress for `id`.
    pub async fn settled(&self, id: LeadId, channel: DeliveryChannel) -> Lead {
        for _ in 0..100 {
            let lead = self.leads.find_by_id(id).await.unwrap().unwrap();
            let status = lead.delivery(channel).status;
            if !matches!(status, DeliveryStatus::Pending | DeliveryStatus::InProgress) {
                return lead;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("delivery for {channel} on lead {id} never settled");
    }
}
