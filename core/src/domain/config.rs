// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Platform Configuration Types
//
// Defines the configuration schema for a SUM lead service instance:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - HTTP server and security settings (secret key, trusted proxies)
// - Optional PostgreSQL storage
// - Notification addresses and the global lead webhook
// - Sites with their integrations, form configuration and seeded forms
// - Lead source rules and delivery retry tuning

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::domain::attribution::LeadSourceRule;
use crate::domain::delivery::RetryPolicy;
use crate::domain::form::FormDefinition;
use crate::domain::site::{FormConfiguration, Site, SiteId, SiteIntegrations};

pub const API_VERSION: &str = "sum.platform/v1";
pub const KIND: &str = "PlatformConfig";

/// Top-level Kubernetes-style platform configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfigManifest {
    /// API version (must be "sum.platform/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "PlatformConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: PlatformConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformConfigSpec {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    /// Absent means in-memory repositories
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseConfig>,

    #[serde(default)]
    pub notifications: NotificationConfig,

    #[serde(default)]
    pub sites: Vec<SiteConfig>,

    #[serde(default)]
    pub lead_source_rules: Vec<LeadSourceRule>,

    #[serde(default)]
    pub delivery: DeliveryConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// HMAC key for time tokens. `env:NAME` reads the named variable.
    #[serde(default)]
    pub secret_key: String,

    /// Proxies whose `X-Forwarded-For` is trusted (IP or CIDR)
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Fallback staff address when a site has none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_notification_email: Option<String>,

    #[serde(default = "default_from_email")]
    pub default_from_email: String,

    /// Global lead webhook; absent disables the channel
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_webhook_url: Option<String>,

    /// Permit webhook targets on loopback/private networks (development only)
    #[serde(default)]
    pub allow_private_webhook_hosts: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            lead_notification_email: None,
            default_from_email: default_from_email(),
            lead_webhook_url: None,
            allow_private_webhook_hosts: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Explicit UUID; derived from the hostname when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub hostname: String,

    #[serde(default)]
    pub site_name: String,

    #[serde(default)]
    pub is_default: bool,

    #[serde(default)]
    pub integrations: SiteIntegrations,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_configuration: Option<FormConfiguration>,

    /// Form definitions seeded at startup when their slug is not yet stored
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forms: Vec<FormDefinitionSeed>,
}

impl SiteConfig {
    pub fn site_id(&self) -> anyhow::Result<SiteId> {
        match &self.id {
            Some(id) => SiteId::from_string(id)
                .map_err(|e| anyhow::anyhow!("Invalid site id '{}': {}", id, e)),
            None => Ok(SiteId::from_hostname(&self.hostname)),
        }
    }

    pub fn to_site(&self) -> anyhow::Result<Site> {
        let mut site = Site::new(&self.hostname, &self.site_name)
            .with_default(self.is_default)
            .with_integrations(self.integrations.clone());
        site.id = self.site_id()?;
        Ok(site)
    }
}

/// Form definition as written in config; bound to its site on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormDefinitionSeed {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub fields: Vec<crate::domain::form::FormField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_message: Option<String>,
    #[serde(default = "default_true")]
    pub email_notification_enabled: bool,
    #[serde(default)]
    pub notification_emails: String,
    #[serde(default)]
    pub auto_reply_enabled: bool,
    #[serde(default)]
    pub auto_reply_subject: String,
    #[serde(default)]
    pub auto_reply_body: String,
    #[serde(default)]
    pub webhook_enabled: bool,
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub webhook_signing_secret: String,
    #[serde(default)]
    pub webhook_field_allowlist: String,
    #[serde(default)]
    pub webhook_field_denylist: String,
}

impl FormDefinitionSeed {
    pub fn to_definition(&self, site_id: SiteId) -> FormDefinition {
        let mut def = FormDefinition::new(site_id, &self.name, &self.slug);
        def.fields = self.fields.clone();
        if let Some(message) = &self.success_message {
            def.success_message = message.clone();
        }
        def.email_notification_enabled = self.email_notification_enabled;
        def.notification_emails = self.notification_emails.clone();
        def.auto_reply_enabled = self.auto_reply_enabled;
        def.auto_reply_subject = self.auto_reply_subject.clone();
        def.auto_reply_body = self.auto_reply_body.clone();
        def.webhook_enabled = self.webhook_enabled;
        def.webhook_url = self.webhook_url.clone();
        def.webhook_signing_secret = self.webhook_signing_secret.clone();
        def.webhook_field_allowlist = self.webhook_field_allowlist.clone();
        def.webhook_field_denylist = self.webhook_field_denylist.clone();
        def
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff in seconds, doubled per retry
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: u64,

    #[serde(default = "default_backoff_max")]
    pub backoff_max_secs: u64,

    #[serde(default = "default_zapier_max_retries")]
    pub zapier_max_retries: u32,

    #[serde(default = "default_zapier_backoff_max")]
    pub zapier_backoff_max_secs: u64,

    #[serde(default = "default_webhook_timeout")]
    pub webhook_timeout_secs: u64,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base_secs: default_backoff_base(),
            backoff_max_secs: default_backoff_max(),
            zapier_max_retries: default_zapier_max_retries(),
            zapier_backoff_max_secs: default_zapier_backoff_max(),
            webhook_timeout_secs: default_webhook_timeout(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl DeliveryConfig {
    pub fn standard_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay_secs: self.backoff_base_secs,
            max_delay_secs: self.backoff_max_secs,
        }
    }

    pub fn zapier_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.zapier_max_retries,
            base_delay_secs: self.backoff_base_secs,
            max_delay_secs: self.zapier_backoff_max_secs,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Prometheus exporter port
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_connections() -> u32 {
    5
}

fn default_from_email() -> String {
    "noreply@example.com".to_string()
}

fn default_max_retries() -> u32 {
    RetryPolicy::STANDARD.max_retries
}

fn default_backoff_base() -> u64 {
    RetryPolicy::STANDARD.base_delay_secs
}

fn default_backoff_max() -> u64 {
    RetryPolicy::STANDARD.max_delay_secs
}

fn default_zapier_max_retries() -> u32 {
    RetryPolicy::ZAPIER.max_retries
}

fn default_zapier_backoff_max() -> u64 {
    RetryPolicy::ZAPIER.max_delay_secs
}

fn default_webhook_timeout() -> u64 {
    10
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_metrics_port() -> u16 {
    9091
}

impl Default for PlatformConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "sum-platform".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: PlatformConfigSpec {
                sites: vec![SiteConfig {
                    id: None,
                    hostname: "localhost".to_string(),
                    site_name: "Local Development".to_string(),
                    is_default: true,
                    integrations: SiteIntegrations::default(),
                    form_configuration: None,
                    forms: Vec::new(),
                }],
                ..Default::default()
            },
        }
    }
}

impl PlatformConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. SUM_CONFIG_PATH environment variable
    /// 2. ./sum-config.yaml (working directory)
    /// 3. ~/.sum/config.yaml (user home)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("SUM_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./sum-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".sum").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(val) = non_empty("SUM_SECRET_KEY") {
            tracing::info!("Environment override: SUM_SECRET_KEY");
            self.spec.security.secret_key = val;
        }

        if let Some(val) = non_empty("SUM_DATABASE_URL") {
            tracing::info!("Environment override: SUM_DATABASE_URL");
            match self.spec.database.as_mut() {
                Some(db) => db.url = val,
                None => {
                    self.spec.database = Some(DatabaseConfig {
                        url: val,
                        max_connections: default_max_connections(),
                    })
                }
            }
        }

        if let Some(val) = non_empty("SUM_LEAD_WEBHOOK_URL") {
            tracing::info!("Environment override: SUM_LEAD_WEBHOOK_URL={}", val);
            self.spec.notifications.lead_webhook_url = Some(val);
        }

        if let Some(val) = non_empty("SUM_LEAD_NOTIFICATION_EMAIL") {
            tracing::info!("Environment override: SUM_LEAD_NOTIFICATION_EMAIL={}", val);
            self.spec.notifications.lead_notification_email = Some(val);
        }
    }

    /// Secret key with `env:NAME` indirection resolved
    pub fn resolve_secret_key(&self) -> anyhow::Result<String> {
        let raw = self.spec.security.secret_key.trim();
        if let Some(var) = raw.strip_prefix("env:") {
            let value = std::env::var(var)
                .map_err(|_| anyhow::anyhow!("Secret key variable '{}' is not set", var))?;
            if value.trim().is_empty() {
                anyhow::bail!("Secret key variable '{}' is empty", var);
            }
            return Ok(value);
        }
        Ok(raw.to_string())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.security.secret_key.trim().is_empty() {
            anyhow::bail!("spec.security.secret_key cannot be empty");
        }

        let mut hostnames = HashSet::new();
        let mut defaults = 0;
        for site in &self.spec.sites {
            let hostname = site.hostname.trim().to_ascii_lowercase();
            if hostname.is_empty() {
                anyhow::bail!("Site hostname cannot be empty");
            }
            if !hostnames.insert(hostname.clone()) {
                anyhow::bail!("Duplicate site hostname: '{}'", hostname);
            }
            if site.is_default {
                defaults += 1;
            }
            site.site_id()?;

            let mut slugs = HashSet::new();
            for form in &site.forms {
                if !slugs.insert(form.slug.as_str()) {
                    anyhow::bail!("Duplicate form slug '{}' on site '{}'", form.slug, hostname);
                }
            }
        }
        if defaults > 1 {
            anyhow::bail!("At most one site may be marked is_default (found {})", defaults);
        }

        if let Some(db) = &self.spec.database {
            if db.url.trim().is_empty() {
                anyhow::bail!("spec.database.url cannot be empty");
            }
        }

        Ok(())
    }
}
