// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Connection Pool
//!
//! Wraps `sqlx::postgres::PgPool` in a thin `Database` newtype that is
//! injected into the PostgreSQL repository implementations. Only used when
//! `spec.database` is set in the platform config.
//!
//! The schema is created on startup with `IF NOT EXISTS` statements, so
//! running the bootstrap against an existing database is a no-op.

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS leads (
        id UUID PRIMARY KEY,
        site_id UUID NULL,
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        phone TEXT NOT NULL DEFAULT '',
        message TEXT NOT NULL,
        form_type TEXT NOT NULL,
        form_data JSONB NOT NULL DEFAULT '{}'::jsonb,
        source_page TEXT NULL,
        status TEXT NOT NULL DEFAULT 'new',
        is_archived BOOLEAN NOT NULL DEFAULT FALSE,
        submitted_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        attribution JSONB NOT NULL DEFAULT '{}'::jsonb,
        lead_source TEXT NOT NULL DEFAULT 'unknown',
        lead_source_detail TEXT NOT NULL DEFAULT '',
        delivery JSONB NOT NULL DEFAULT '{}'::jsonb
    )
    "#,
    "CREATE INDEX IF NOT EXISTS leads_email_idx ON leads (lower(email))",
    "CREATE INDEX IF NOT EXISTS leads_submitted_at_idx ON leads (submitted_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS form_definitions (
        id UUID PRIMARY KEY,
        site_id UUID NOT NULL,
        slug TEXT NOT NULL,
        name TEXT NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        definition JSONB NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (site_id, slug)
    )
    "#,
];

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        Ok(Self { pool })
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes when missing.
    pub async fn bootstrap_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to apply schema statement")?;
        }
        info!(statements = SCHEMA.len(), "Database schema ready");
        Ok(())
    }
}
