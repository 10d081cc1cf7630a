// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory
//!
//! Creates concrete repository implementations for the configured storage
//! backend. Sites, form configurations and lead source rules always come
//! from the platform config and are held in memory.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Select lead and form definition storage at startup

use sqlx::PgPool;
use std::sync::Arc;

use crate::domain::repository::{FormDefinitionRepository, LeadRepository, StorageBackend};
use crate::infrastructure::repositories::postgres_form_definition::PostgresFormDefinitionRepository;
use crate::infrastructure::repositories::postgres_lead::PostgresLeadRepository;
use crate::infrastructure::repositories::{InMemoryFormDefinitionRepository, InMemoryLeadRepository};

/// Creates a LeadRepository implementation based on the configured backend
pub fn create_lead_repository(backend: &StorageBackend, pool: Option<PgPool>) -> Arc<dyn LeadRepository> {
    match (backend, pool) {
        (StorageBackend::PostgreSQL(_), Some(pool)) => Arc::new(PostgresLeadRepository::new(pool)),
        _ => Arc::new(InMemoryLeadRepository::new()),
    }
}

/// Creates a FormDefinitionRepository implementation based on the configured backend
pub fn create_form_definition_repository(
    backend: &StorageBackend,
    pool: Option<PgPool>,
) -> Arc<dyn FormDefinitionRepository> {
    match (backend, pool) {
        (StorageBackend::PostgreSQL(_), Some(pool)) => {
            Arc::new(PostgresFormDefinitionRepository::new(pool))
        }
        _ => Arc::new(InMemoryFormDefinitionRepository::new()),
    }
}
