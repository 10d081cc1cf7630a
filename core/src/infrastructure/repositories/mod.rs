// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository traits defined in
//! `crate::domain::repository`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve domain aggregates
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! ## PostgreSQL Repositories
//!
//! - **PostgresLeadRepository** - Leads with JSONB form data and delivery state
//! - **PostgresFormDefinitionRepository** - Site-scoped dynamic form definitions
//!
//! ## In-Memory Repositories
//!
//! Thread-safe `HashMap`-backed storage for development and tests, plus the
//! config-seeded site, form configuration and lead source rule stores used
//! in every deployment.

pub mod postgres_form_definition;
pub mod postgres_lead;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::attribution::{sort_rules, LeadSourceRule};
use crate::domain::form::{FormDefinition, FormDefinitionId};
use crate::domain::lead::{DeliveryChannel, DeliveryState, Lead, LeadId};
use crate::domain::repository::{
    FormConfigurationRepository, FormDefinitionRepository, LeadRepository,
    LeadSourceRuleRepository, RepositoryError, SiteRepository,
};
use crate::domain::site::{FormConfiguration, Site, SiteId};

// ============================================================================
// Leads
// ============================================================================

#[derive(Clone, Default)]
pub struct InMemoryLeadRepository {
    leads: Arc<RwLock<HashMap<LeadId, Lead>>>,
}

impl InMemoryLeadRepository {
    pub fn new() -> Self {
        Self {
            leads: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

fn newest_first(leads: &mut [Lead]) {
    leads.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
}

#[async_trait]
impl LeadRepository for InMemoryLeadRepository {
    async fn insert(&self, lead: &Lead) -> Result<(), RepositoryError> {
        let mut leads = self.leads.write();
        if leads.contains_key(&lead.id) {
            return Err(RepositoryError::Conflict(format!("Lead {} already exists", lead.id)));
        }
        leads.insert(lead.id, lead.clone());
        Ok(())
    }

    async fn save(&self, lead: &Lead) -> Result<(), RepositoryError> {
        let mut leads = self.leads.write();
        match leads.get_mut(&lead.id) {
            Some(existing) => {
                *existing = lead.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(format!("Lead {}", lead.id))),
        }
    }

    async fn update_delivery(
        &self,
        id: LeadId,
        channel: DeliveryChannel,
        state: &DeliveryState,
    ) -> Result<(), RepositoryError> {
        let mut leads = self.leads.write();
        let lead = leads
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Lead {id}")))?;
        *lead.delivery_mut(channel) = state.clone();
        Ok(())
    }

    async fn find_by_id(&self, id: LeadId) -> Result<Option<Lead>, RepositoryError> {
        Ok(self.leads.read().get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Vec<Lead>, RepositoryError> {
        let email = email.trim();
        let mut found: Vec<Lead> = self
            .leads
            .read()
            .values()
            .filter(|l| l.email.eq_ignore_ascii_case(email))
            .cloned()
            .collect();
        newest_first(&mut found);
        Ok(found)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Lead>, RepositoryError> {
        let mut all: Vec<Lead> = self.leads.read().values().cloned().collect();
        newest_first(&mut all);
        all.truncate(limit);
        Ok(all)
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        Ok(self.leads.read().len() as u64)
    }
}

// ============================================================================
// Form definitions
// ============================================================================

#[derive(Clone, Default)]
pub struct InMemoryFormDefinitionRepository {
    forms: Arc<RwLock<HashMap<FormDefinitionId, FormDefinition>>>,
}

impl InMemoryFormDefinitionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FormDefinitionRepository for InMemoryFormDefinitionRepository {
    async fn save(&self, definition: &FormDefinition) -> Result<(), RepositoryError> {
        let mut forms = self.forms.write();
        let taken = forms.values().any(|f| {
            f.id != definition.id && f.site_id == definition.site_id && f.slug == definition.slug
        });
        if taken {
            return Err(RepositoryError::Conflict(format!(
                "Form slug '{}' already exists for site {}",
                definition.slug, definition.site_id
            )));
        }
        forms.insert(definition.id, definition.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: FormDefinitionId,
    ) -> Result<Option<FormDefinition>, RepositoryError> {
        Ok(self.forms.read().get(&id).cloned())
    }

    async fn find_by_slug(
        &self,
        site_id: SiteId,
        slug: &str,
    ) -> Result<Option<FormDefinition>, RepositoryError> {
        Ok(self
            .forms
            .read()
            .values()
            .find(|f| f.site_id == site_id && f.slug == slug)
            .cloned())
    }

    async fn list_for_site(&self, site_id: SiteId) -> Result<Vec<FormDefinition>, RepositoryError> {
        let mut forms: Vec<FormDefinition> = self
            .forms
            .read()
            .values()
            .filter(|f| f.site_id == site_id)
            .cloned()
            .collect();
        forms.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(forms)
    }

    async fn delete(&self, id: FormDefinitionId) -> Result<(), RepositoryError> {
        match self.forms.write().remove(&id) {
            Some(_) => Ok(()),
            None => Err(RepositoryError::NotFound(format!("Form definition {id}"))),
        }
    }
}

// ============================================================================
// Config-seeded stores
// ============================================================================

/// Lowercase the host and drop any `:port` suffix.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().to_ascii_lowercase();
    if let Some(rest) = host.strip_prefix('[') {
        return match rest.split_once(']') {
            Some((inner, _)) => inner.to_string(),
            None => rest.to_string(),
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => {
            name.to_string()
        }
        _ => host,
    }
}

#[derive(Clone, Default)]
pub struct InMemorySiteRepository {
    sites: Arc<RwLock<Vec<Site>>>,
}

impl InMemorySiteRepository {
    pub fn new(sites: Vec<Site>) -> Self {
        Self {
            sites: Arc::new(RwLock::new(sites)),
        }
    }
}

#[async_trait]
impl SiteRepository for InMemorySiteRepository {
    async fn find_by_hostname(&self, hostname: &str) -> Result<Option<Site>, RepositoryError> {
        let host = normalize_host(hostname);
        Ok(self
            .sites
            .read()
            .iter()
            .find(|s| s.hostname.eq_ignore_ascii_case(&host))
            .cloned())
    }

    async fn find_by_id(&self, id: SiteId) -> Result<Option<Site>, RepositoryError> {
        Ok(self.sites.read().iter().find(|s| s.id == id).cloned())
    }

    async fn default_site(&self) -> Result<Option<Site>, RepositoryError> {
        let sites = self.sites.read();
        Ok(sites
            .iter()
            .find(|s| s.is_default)
            .or_else(|| sites.first())
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Site>, RepositoryError> {
        Ok(self.sites.read().clone())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryFormConfigurationRepository {
    configs: Arc<RwLock<HashMap<SiteId, FormConfiguration>>>,
}

impl InMemoryFormConfigurationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, site_id: SiteId, config: FormConfiguration) {
        self.configs.write().insert(site_id, config);
    }
}

#[async_trait]
impl FormConfigurationRepository for InMemoryFormConfigurationRepository {
    async fn get_for_site(&self, site_id: SiteId) -> Result<FormConfiguration, RepositoryError> {
        Ok(self
            .configs
            .read()
            .get(&site_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, site_id: SiteId, config: &FormConfiguration) -> Result<(), RepositoryError> {
        self.insert(site_id, config.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryLeadSourceRuleRepository {
    rules: Arc<Vec<LeadSourceRule>>,
}

impl InMemoryLeadSourceRuleRepository {
    pub fn new(mut rules: Vec<LeadSourceRule>) -> Self {
        sort_rules(&mut rules);
        Self {
            rules: Arc::new(rules),
        }
    }
}

#[async_trait]
impl LeadSourceRuleRepository for InMemoryLeadSourceRuleRepository {
    async fn list_active(&self) -> Result<Vec<LeadSourceRule>, RepositoryError> {
        Ok(self.rules.as_ref().clone())
    }
}
