// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::form::{FormDefinition, FormDefinitionId};
use crate::domain::repository::{FormDefinitionRepository, RepositoryError};
use crate::domain::site::SiteId;

/// Stores the whole definition as JSONB next to the columns used for lookup.
pub struct PostgresFormDefinitionRepository {
    pool: PgPool,
}

impl PostgresFormDefinitionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn decode(row: &sqlx::postgres::PgRow) -> Result<FormDefinition, RepositoryError> {
        let definition: serde_json::Value = row.try_get("definition")?;
        Ok(serde_json::from_value(definition)?)
    }
}

#[async_trait]
impl FormDefinitionRepository for PostgresFormDefinitionRepository {
    async fn save(&self, definition: &FormDefinition) -> Result<(), RepositoryError> {
        let definition_json = serde_json::to_value(definition)?;

        sqlx::query(
            r#"
            INSERT INTO form_definitions (id, site_id, slug, name, is_active, definition, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                site_id = EXCLUDED.site_id,
                slug = EXCLUDED.slug,
                name = EXCLUDED.name,
                is_active = EXCLUDED.is_active,
                definition = EXCLUDED.definition,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(definition.id.0)
        .bind(definition.site_id.0)
        .bind(&definition.slug)
        .bind(&definition.name)
        .bind(definition.is_active)
        .bind(&definition_json)
        .bind(definition.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(
        &self,
        id: FormDefinitionId,
    ) -> Result<Option<FormDefinition>, RepositoryError> {
        let row = sqlx::query("SELECT definition FROM form_definitions WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::decode).transpose()
    }

    async fn find_by_slug(
        &self,
        site_id: SiteId,
        slug: &str,
    ) -> Result<Option<FormDefinition>, RepositoryError> {
        let row = sqlx::query(
            "SELECT definition FROM form_definitions WHERE site_id = $1 AND slug = $2",
        )
        .bind(site_id.0)
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::decode).transpose()
    }

    async fn list_for_site(&self, site_id: SiteId) -> Result<Vec<FormDefinition>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT definition FROM form_definitions WHERE site_id = $1 ORDER BY name",
        )
        .bind(site_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::decode).collect()
    }

    async fn delete(&self, id: FormDefinitionId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM form_definitions WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Form definition {id}")));
        }
        Ok(())
    }
}
