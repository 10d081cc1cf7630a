// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Cache Contracts
//!
//! [`CacheStore`] is the key/value cache the platform relies on for rate-limit
//! counters and version-keyed derived views. Values are JSON so any
//! serialisable view can be stored.
//!
//! # Architecture
//!
//! - **Layer:** Domain
//! - **Purpose:** Cache port and the cache scopes that use versioned keys

use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache key not found: {0}")]
    Missing(String),

    #[error("Cache value at {0} is not an integer")]
    NotInteger(String),

    #[error("Cache backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError>;

    /// `ttl = None` stores without expiry
    async fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError>;

    /// Store only when the key is absent. Returns true if stored.
    async fn add(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError>;

    /// Atomically add `delta` to an integer value and return the result.
    /// Fails with `Missing` when absent and `NotInteger` when corrupt.
    async fn incr(&self, key: &str, delta: i64) -> Result<i64, CacheError>;

    /// Reset the expiry of an existing key. Returns false when absent.
    async fn touch(&self, key: &str, ttl: Duration) -> Result<bool, CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Derived views cached under version-embedding keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheScope {
    FormDefinition,
    Navigation,
    BlogCategories,
}

impl CacheScope {
    pub fn prefix(&self) -> &'static str {
        match self {
            CacheScope::FormDefinition => "form_definition",
            CacheScope::Navigation => "navigation",
            CacheScope::BlogCategories => "blog_categories",
        }
    }

    /// Lifetime of a cached view. Version counters never expire.
    pub fn ttl(&self) -> Duration {
        match self {
            CacheScope::FormDefinition => Duration::from_secs(30 * 60),
            CacheScope::Navigation => Duration::from_secs(5 * 60),
            CacheScope::BlogCategories => Duration::from_secs(60 * 60),
        }
    }

    /// `{prefix}_version:{site}:{entity}`
    pub fn version_key(&self, site: &str, entity: &str) -> String {
        format!("{}_version:{}:{}", self.prefix(), site, entity)
    }

    /// `{prefix}:{site}:{entity}:{version}`
    pub fn entry_key(&self, site: &str, entity: &str, version: i64) -> String {
        format!("{}:{}:{}:{}", self.prefix(), site, entity, version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let scope = CacheScope::FormDefinition;
        assert_eq!(scope.version_key("s1", "f1"), "form_definition_version:s1:f1");
        assert_eq!(scope.entry_key("s1", "f1", 3), "form_definition:s1:f1:3");
        assert_eq!(
            CacheScope::BlogCategories.version_key("s1", "all"),
            "blog_categories_version:s1:all"
        );
    }

    #[test]
    fn test_form_definition_ttl_is_thirty_minutes() {
        assert_eq!(CacheScope::FormDefinition.ttl(), Duration::from_secs(1800));
    }
}
