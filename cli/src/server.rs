// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Lead service HTTP server
//!
//! Wires repositories, services and the delivery worker from a
//! [`PlatformConfigManifest`] and serves the form API until SIGINT/SIGTERM.
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Composition root for the `sum serve` command

use anyhow::{Context, Result};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use sum_core::{
    application::{
        notifications::EmailRenderer,
        repository_factory::{create_form_definition_repository, create_lead_repository},
        DeliveryService, DeliverySettings, FormDefinitionService, FormSubmissionService,
        SpamGuard, StandardLeadService, TimeTokenSigner, VersionedCache,
    },
    domain::{
        config::PlatformConfigManifest,
        repository::{FormDefinitionRepository, PostgresConfig, StorageBackend},
        site::Site,
    },
    infrastructure::{
        db::Database,
        repositories::{
            InMemoryFormConfigurationRepository, InMemoryLeadSourceRuleRepository,
            InMemorySiteRepository,
        },
        DeliveryQueue, HttpWebhookTransport, InMemoryCacheStore, TracingMailer,
    },
    presentation::{
        api::{app, AppState},
        client_ip::TrustedProxies,
    },
};

const CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(300);
const WORKER_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Command-line overrides for the listen address.
#[derive(Debug, Clone, Default)]
pub struct ServeOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Fully wired service graph.
pub struct Platform {
    pub router: Router,
    pub queue: DeliveryQueue,
    pub worker: JoinHandle<()>,
    pub cache: Arc<InMemoryCacheStore>,
}

/// Build every repository and service described by `config`.
pub async fn build_platform(config: &PlatformConfigManifest) -> Result<Platform> {
    let spec = &config.spec;
    let secret_key = config.resolve_secret_key()?;
    if secret_key.is_empty() {
        anyhow::bail!("spec.security.secret_key cannot be empty");
    }

    let (backend, pool) = match &spec.database {
        Some(db) => {
            let database = Database::new(&db.url, db.max_connections)
                .await
                .context("Failed to connect to PostgreSQL")?;
            database
                .bootstrap_schema()
                .await
                .context("Failed to bootstrap database schema")?;
            info!("Using PostgreSQL storage");
            (
                StorageBackend::PostgreSQL(PostgresConfig {
                    connection_string: db.url.clone(),
                }),
                Some(database.get_pool().clone()),
            )
        }
        None => {
            warn!("No database configured; leads are kept in memory only");
            (StorageBackend::InMemory, None)
        }
    };
    let leads = create_lead_repository(&backend, pool.clone());
    let form_repo = create_form_definition_repository(&backend, pool);

    let mut sites: Vec<Site> = Vec::with_capacity(spec.sites.len());
    let form_configs = Arc::new(InMemoryFormConfigurationRepository::new());
    for site_config in &spec.sites {
        let site = site_config.to_site()?;
        if let Some(form_config) = &site_config.form_configuration {
            form_configs.insert(site.id, form_config.clone());
        }
        sites.push(site);
    }
    info!(count = sites.len(), "Sites loaded");
    let site_repo = Arc::new(InMemorySiteRepository::new(sites));

    let cache = Arc::new(InMemoryCacheStore::new());
    let forms = Arc::new(FormDefinitionService::new(
        form_repo.clone(),
        VersionedCache::new(cache.clone()),
    ));
    seed_forms(config, form_repo.as_ref(), &forms).await?;

    let transport = Arc::new(
        HttpWebhookTransport::new(Duration::from_secs(spec.delivery.webhook_timeout_secs))
            .context("Failed to create webhook transport")?,
    );
    let renderer = EmailRenderer::new().context("Failed to register email templates")?;
    let delivery = Arc::new(DeliveryService::new(
        leads.clone(),
        site_repo.clone(),
        form_repo,
        form_configs.clone(),
        transport,
        Arc::new(TracingMailer::new()),
        renderer,
        DeliverySettings::from_config(spec),
    ));
    let (queue, worker) = DeliveryQueue::start(delivery, spec.delivery.queue_capacity);

    let lead_service = Arc::new(StandardLeadService::new(
        leads.clone(),
        Arc::new(InMemoryLeadSourceRuleRepository::new(
            spec.lead_source_rules.clone(),
        )),
    ));
    let submissions = Arc::new(FormSubmissionService::new(
        site_repo,
        form_configs,
        forms,
        lead_service,
        leads,
        SpamGuard::new(cache.clone(), TimeTokenSigner::new(secret_key)),
        Arc::new(queue.clone()),
    ));

    let trusted_proxies = TrustedProxies::from_entries(&spec.security.trusted_proxies);
    let router = app(AppState::new(submissions, trusted_proxies));

    Ok(Platform {
        router,
        queue,
        worker,
        cache,
    })
}

/// Store configured form definitions whose slug is not yet taken.
async fn seed_forms(
    config: &PlatformConfigManifest,
    repo: &dyn FormDefinitionRepository,
    forms: &FormDefinitionService,
) -> Result<()> {
    for site_config in &config.spec.sites {
        let site_id = site_config.site_id()?;
        for seed in &site_config.forms {
            if repo.find_by_slug(site_id, &seed.slug).await?.is_some() {
                continue;
            }
            forms
                .save(seed.to_definition(site_id))
                .await
                .with_context(|| {
                    format!(
                        "Invalid form definition '{}' for site '{}'",
                        seed.slug, site_config.hostname
                    )
                })?;
            info!(site = %site_config.hostname, slug = %seed.slug, "Seeded form definition");
        }
    }
    Ok(())
}

fn install_metrics_exporter(config: &PlatformConfigManifest) -> Result<()> {
    let Some(metrics) = config
        .spec
        .observability
        .as_ref()
        .and_then(|o| o.metrics.as_ref())
        .filter(|m| m.enabled)
    else {
        return Ok(());
    };

    let addr: SocketAddr = format!("{}:{}", config.spec.server.bind_address, metrics.port)
        .parse()
        .context("Invalid metrics listen address")?;
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    info!("Prometheus metrics available on {}", addr);
    Ok(())
}

pub async fn start_server(config: PlatformConfigManifest, overrides: ServeOverrides) -> Result<()> {
    config
        .validate()
        .context("Configuration validation failed")?;
    info!(name = %config.metadata.name, "Configuration loaded");

    install_metrics_exporter(&config)?;

    let Platform {
        router,
        queue,
        worker,
        cache,
    } = build_platform(&config).await?;

    let purge = tokio::spawn(async move {
        let mut interval = tokio::time::interval(CACHE_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = cache.purge_expired();
            if purged > 0 {
                info!(purged, "Expired cache entries removed");
            }
        }
    });

    let host = overrides
        .host
        .unwrap_or_else(|| config.spec.server.bind_address.clone());
    let port = overrides.port.unwrap_or(config.spec.server.port);
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("SUM lead service listening on {}", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server failed")?;

    info!("Server stopped, draining delivery queue");
    purge.abort();
    drop(queue);
    match tokio::time::timeout(WORKER_DRAIN_TIMEOUT, worker).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Delivery worker failed"),
        Err(_) => warn!("Delivery worker did not finish in time; pending jobs dropped"),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
