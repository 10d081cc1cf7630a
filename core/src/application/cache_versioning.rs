// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Versioned Cache
//!
//! Derived views (form definitions, navigation trees, blog category lists)
//! are cached under keys that embed a per-entity version counter. Writers
//! bump the counter; readers always compute the key from the current
//! version, so stale entries are orphaned and left to expire.
//!
//! # Architecture
//!
//! - **Layer:** Application
//! - **Purpose:** Version counter management and read-through caching
//!
//! Cache failures never fail a read: the view is built directly and the
//! failure is logged.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::cache::{CacheError, CacheScope, CacheStore};

#[derive(Clone)]
pub struct VersionedCache {
    store: Arc<dyn CacheStore>,
}

impl VersionedCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub async fn current_version(
        &self,
        scope: CacheScope,
        site: &str,
        entity: &str,
    ) -> Result<Option<i64>, CacheError> {
        let value = self.store.get(&scope.version_key(site, entity)).await?;
        Ok(value.and_then(|v| v.as_i64()))
    }

    /// Current version, creating it at 1 when absent.
    pub async fn ensure_version(
        &self,
        scope: CacheScope,
        site: &str,
        entity: &str,
    ) -> Result<i64, CacheError> {
        let key = scope.version_key(site, entity);
        if self.store.add(&key, Value::from(1), None).await? {
            return Ok(1);
        }
        let version = self.store.get(&key).await?;
        Ok(version.and_then(|v| v.as_i64()).unwrap_or(1))
    }

    /// Invalidate every cached view of the entity and return the new version.
    pub async fn bump_version(
        &self,
        scope: CacheScope,
        site: &str,
        entity: &str,
    ) -> Result<i64, CacheError> {
        let key = scope.version_key(site, entity);
        if self.store.add(&key, Value::from(1), None).await? {
            return Ok(1);
        }
        match self.store.incr(&key, 1).await {
            Ok(version) => Ok(version),
            Err(CacheError::NotInteger(_)) | Err(CacheError::Missing(_)) => {
                warn!(key = %key, "Cache version counter unreadable, resetting to 1");
                self.store.set(&key, Value::from(1), None).await?;
                Ok(1)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn cache_key(
        &self,
        scope: CacheScope,
        site: &str,
        entity: &str,
    ) -> Result<String, CacheError> {
        let version = self.ensure_version(scope, site, entity).await?;
        Ok(scope.entry_key(site, entity, version))
    }

    /// Read-through lookup. `build` runs on a miss; only `Some` results are
    /// stored.
    pub async fn get_or_build<T, E, F, Fut>(
        &self,
        scope: CacheScope,
        site: &str,
        entity: &str,
        build: F,
    ) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let key = match self.cache_key(scope, site, entity).await {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, scope = scope.prefix(), "Cache unavailable, building view directly");
                return build().await;
            }
        };

        match self.store.get(&key).await {
            Ok(Some(value)) => match serde_json::from_value::<T>(value) {
                Ok(view) => {
                    debug!(key = %key, "Cache hit");
                    return Ok(Some(view));
                }
                Err(e) => warn!(key = %key, error = %e, "Discarding undecodable cache entry"),
            },
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "Cache read failed"),
        }

        let built = build().await?;
        if let Some(view) = &built {
            match serde_json::to_value(view) {
                Ok(value) => {
                    if let Err(e) = self.store.set(&key, value, Some(scope.ttl())).await {
                        warn!(key = %key, error = %e, "Cache write failed");
                    }
                }
                Err(e) => warn!(key = %key, error = %e, "Cannot serialise view for cache"),
            }
        }
        Ok(built)
    }
}

/// Site-level views supplied by the host application.
///
/// The lead service does not own navigation or blog data; callers provide a
/// builder and invalidate after editing the underlying content.
#[derive(Clone)]
pub struct ViewCache {
    cache: VersionedCache,
}

const BLOG_CATEGORIES_ENTITY: &str = "all";

impl ViewCache {
    pub fn new(cache: VersionedCache) -> Self {
        Self { cache }
    }

    pub async fn navigation<T, E, F, Fut>(&self, site: &str, menu: &str, build: F) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        self.cache
            .get_or_build(CacheScope::Navigation, site, menu, build)
            .await
    }

    pub async fn invalidate_navigation(&self, site: &str, menu: &str) -> Result<i64, CacheError> {
        self.cache
            .bump_version(CacheScope::Navigation, site, menu)
            .await
    }

    pub async fn blog_categories<T, E, F, Fut>(&self, site: &str, build: F) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        self.cache
            .get_or_build(CacheScope::BlogCategories, site, BLOG_CATEGORIES_ENTITY, build)
            .await
    }

    pub async fn invalidate_blog_categories(&self, site: &str) -> Result<i64, CacheError> {
        self.cache
            .bump_version(CacheScope::BlogCategories, site, BLOG_CATEGORIES_ENTITY)
            .await
    }
}
