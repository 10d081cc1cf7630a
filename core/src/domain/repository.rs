// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for each aggregate root: one repository per
//! aggregate, interface defined here, implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `LeadRepository` | `Lead` | `InMemoryLeadRepository`, `PostgresLeadRepository` |
//! | `FormDefinitionRepository` | `FormDefinition` | `InMemoryFormDefinitionRepository`, `PostgresFormDefinitionRepository` |
//! | `SiteRepository` | `Site` | `InMemorySiteRepository` |
//! | `FormConfigurationRepository` | `FormConfiguration` | `InMemoryFormConfigurationRepository` |
//! | `LeadSourceRuleRepository` | `LeadSourceRule` | `InMemoryLeadSourceRuleRepository` |
//!
//! ## Storage Backend Abstraction
//!
//! The backend is selected at startup from `spec.database` in the platform
//! config. Without a database URL every repository is in-memory. Sites, form
//! configurations and lead source rules are always loaded from config.

use async_trait::async_trait;

use crate::domain::attribution::LeadSourceRule;
use crate::domain::form::{FormDefinition, FormDefinitionId};
use crate::domain::lead::{DeliveryChannel, DeliveryState, Lead, LeadId};
use crate::domain::site::{FormConfiguration, Site, SiteId};

#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
}

/// Repository interface for Lead aggregates
#[async_trait]
pub trait LeadRepository: Send + Sync {
    /// Insert a new lead. Fails with `Conflict` when the id already exists.
    async fn insert(&self, lead: &Lead) -> Result<(), RepositoryError>;

    /// Update an existing lead (delivery tracking, status)
    async fn save(&self, lead: &Lead) -> Result<(), RepositoryError>;

    /// Overwrite the tracking state of one channel, leaving the others
    /// untouched. Fails with `NotFound` when the lead does not exist.
    async fn update_delivery(
        &self,
        id: LeadId,
        channel: DeliveryChannel,
        state: &DeliveryState,
    ) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: LeadId) -> Result<Option<Lead>, RepositoryError>;

    /// Leads with the given email, newest first
    async fn find_by_email(&self, email: &str) -> Result<Vec<Lead>, RepositoryError>;

    async fn list_recent(&self, limit: usize) -> Result<Vec<Lead>, RepositoryError>;

    async fn count(&self) -> Result<u64, RepositoryError>;
}

/// Repository interface for FormDefinition aggregates
#[async_trait]
pub trait FormDefinitionRepository: Send + Sync {
    /// Create or update. Fails with `Conflict` when another definition on the
    /// same site already uses the slug.
    async fn save(&self, definition: &FormDefinition) -> Result<(), RepositoryError>;

    async fn find_by_id(
        &self,
        id: FormDefinitionId,
    ) -> Result<Option<FormDefinition>, RepositoryError>;

    async fn find_by_slug(
        &self,
        site_id: SiteId,
        slug: &str,
    ) -> Result<Option<FormDefinition>, RepositoryError>;

    async fn list_for_site(&self, site_id: SiteId) -> Result<Vec<FormDefinition>, RepositoryError>;

    async fn delete(&self, id: FormDefinitionId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SiteRepository: Send + Sync {
    /// Case-insensitive; any `:port` suffix is ignored
    async fn find_by_hostname(&self, hostname: &str) -> Result<Option<Site>, RepositoryError>;

    async fn find_by_id(&self, id: SiteId) -> Result<Option<Site>, RepositoryError>;

    /// The site flagged default, else the first configured site
    async fn default_site(&self) -> Result<Option<Site>, RepositoryError>;

    async fn list(&self) -> Result<Vec<Site>, RepositoryError>;
}

#[async_trait]
pub trait FormConfigurationRepository: Send + Sync {
    /// Stored configuration for the site, or defaults
    async fn get_for_site(&self, site_id: SiteId) -> Result<FormConfiguration, RepositoryError>;

    async fn save(&self, site_id: SiteId, config: &FormConfiguration) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait LeadSourceRuleRepository: Send + Sync {
    /// Active rules ordered by `(priority, id)`
    async fn list_active(&self) -> Result<Vec<LeadSourceRule>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                RepositoryError::Conflict(db.message().to_string())
            }
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
