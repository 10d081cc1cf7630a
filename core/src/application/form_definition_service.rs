// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Form Definition Service
//!
//! Saves and deletes site-scoped form definitions and serves the active
//! definition for a slug through the versioned cache. Every write bumps the
//! cache version of the affected slug so readers never see a stale copy.

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::cache_versioning::VersionedCache;
use crate::domain::cache::CacheScope;
use crate::domain::form::{FormDefinition, FormDefinitionId};
use crate::domain::repository::{FormDefinitionRepository, RepositoryError};
use crate::domain::site::SiteId;

#[derive(Debug, thiserror::Error)]
pub enum FormDefinitionError {
    #[error("form definition is invalid: {0:?}")]
    Invalid(BTreeMap<String, Vec<String>>),

    #[error("form definition not found: {0}")]
    NotFound(FormDefinitionId),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct FormDefinitionService {
    forms: Arc<dyn FormDefinitionRepository>,
    cache: VersionedCache,
}

impl FormDefinitionService {
    pub fn new(forms: Arc<dyn FormDefinitionRepository>, cache: VersionedCache) -> Self {
        Self { forms, cache }
    }

    /// Validate, persist and invalidate cached copies.
    pub async fn save(
        &self,
        mut definition: FormDefinition,
    ) -> Result<FormDefinition, FormDefinitionError> {
        let errors = definition.validate();
        if !errors.is_empty() {
            return Err(FormDefinitionError::Invalid(errors));
        }

        let previous = self.forms.find_by_id(definition.id).await?;
        definition.updated_at = Utc::now();
        self.forms.save(&definition).await?;

        self.invalidate(definition.site_id, &definition.slug).await;
        if let Some(previous) = previous {
            if previous.slug != definition.slug || previous.site_id != definition.site_id {
                self.invalidate(previous.site_id, &previous.slug).await;
            }
        }

        info!(
            form_id = %definition.id,
            site_id = %definition.site_id,
            slug = %definition.slug,
            "Form definition saved"
        );
        Ok(definition)
    }

    pub async fn delete(&self, id: FormDefinitionId) -> Result<(), FormDefinitionError> {
        let Some(definition) = self.forms.find_by_id(id).await? else {
            return Err(FormDefinitionError::NotFound(id));
        };
        self.forms.delete(id).await?;
        self.invalidate(definition.site_id, &definition.slug).await;
        info!(form_id = %id, slug = %definition.slug, "Form definition deleted");
        Ok(())
    }

    /// Active definition for the slug, read through the cache.
    pub async fn get_active_by_slug(
        &self,
        site_id: SiteId,
        slug: &str,
    ) -> Result<Option<FormDefinition>, RepositoryError> {
        let forms = &self.forms;
        self.cache
            .get_or_build(
                CacheScope::FormDefinition,
                &site_id.to_string(),
                slug,
                || async move {
                    let found = forms.find_by_slug(site_id, slug).await?;
                    Ok(found.filter(|f| f.is_active))
                },
            )
            .await
    }

    pub async fn list_for_site(
        &self,
        site_id: SiteId,
    ) -> Result<Vec<FormDefinition>, RepositoryError> {
        self.forms.list_for_site(site_id).await
    }

    async fn invalidate(&self, site_id: SiteId, slug: &str) {
        if let Err(e) = self
            .cache
            .bump_version(CacheScope::FormDefinition, &site_id.to_string(), slug)
            .await
        {
            warn!(site_id = %site_id, slug = %slug, error = %e, "Failed to bump form definition cache version");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::cache_store::InMemoryCacheStore;
    use crate::infrastructure::repositories::InMemoryFormDefinitionRepository;

    fn service() -> (FormDefinitionService, VersionedCache) {
        let cache = VersionedCache::new(Arc::new(InMemoryCacheStore::new()));
        let service = FormDefinitionService::new(
            Arc::new(InMemoryFormDefinitionRepository::new()),
            cache.clone(),
        );
        (service, cache)
    }

    #[tokio::test]
    async fn test_save_rejects_invalid_definition() {
        let (service, _) = service();
        let mut form = FormDefinition::new(SiteId::new(), "Quote", "quote");
        form.webhook_enabled = true;
        let err = service.save(form).await.unwrap_err();
        let FormDefinitionError::Invalid(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.contains_key("webhook_url"));
    }

    #[tokio::test]
    async fn test_save_bumps_version_and_refreshes_reads() {
        let (service, cache) = service();
        let site = SiteId::new();
        let mut form = service
            .save(FormDefinition::new(site, "Quote", "quote"))
            .await
            .unwrap();
        let site_key = site.to_string();

        let cached = service.get_active_by_slug(site, "quote").await.unwrap().unwrap();
        assert_eq!(cached.name, "Quote");
        let before = cache
            .current_version(CacheScope::FormDefinition, &site_key, "quote")
            .await
            .unwrap()
            .unwrap();

        form.name = "Get a Quote".into();
        service.save(form).await.unwrap();
        let after = cache
            .current_version(CacheScope::FormDefinition, &site_key, "quote")
            .await
            .unwrap()
            .unwrap();
        assert!(after > before);

        let fresh = service.get_active_by_slug(site, "quote").await.unwrap().unwrap();
        assert_eq!(fresh.name, "Get a Quote");
    }

    #[tokio::test]
    async fn test_inactive_and_deleted_forms_are_hidden() {
        let (service, _) = service();
        let site = SiteId::new();
        let mut form = service
            .save(FormDefinition::new(site, "Quote", "quote"))
            .await
            .unwrap();
        form.is_active = false;
        let form = service.save(form).await.unwrap();
        assert!(service.get_active_by_slug(site, "quote").await.unwrap().is_none());

        service.delete(form.id).await.unwrap();
        assert!(service.list_for_site(site).await.unwrap().is_empty());
        assert!(matches!(
            service.delete(form.id).await,
            Err(FormDefinitionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_slug_rename_invalidates_old_slug() {
        let (service, _) = service();
        let site = SiteId::new();
        let mut form = service
            .save(FormDefinition::new(site, "Quote", "quote"))
            .await
            .unwrap();
        assert!(service.get_active_by_slug(site, "quote").await.unwrap().is_some());

        form.slug = "get-quote".into();
        service.save(form).await.unwrap();
        assert!(service.get_active_by_slug(site, "quote").await.unwrap().is_none());
        assert!(service.get_active_by_slug(site, "get-quote").await.unwrap().is_some());
    }
}
