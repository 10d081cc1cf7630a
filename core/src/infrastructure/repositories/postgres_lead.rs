// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::attribution::LeadSource;
use crate::domain::lead::{
    Attribution, DeliveryChannel, DeliveryState, FormData, Lead, LeadId, LeadStatus,
};
use crate::domain::repository::{LeadRepository, RepositoryError};
use crate::domain::site::SiteId;

const LEAD_COLUMNS: &str = "id, site_id, name, email, phone, message, form_type, form_data, \
     source_page, status, is_archived, submitted_at, attribution, lead_source, \
     lead_source_detail, delivery";

pub struct PostgresLeadRepository {
    pool: PgPool,
}

impl PostgresLeadRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn lead_from_row(row: &PgRow) -> Result<Lead, RepositoryError> {
        let form_data: FormData = serde_json::from_value(row.try_get("form_data")?)?;
        let attribution: Attribution = serde_json::from_value(row.try_get("attribution")?)?;
        let delivery: BTreeMap<DeliveryChannel, DeliveryState> =
            serde_json::from_value(row.try_get("delivery")?)?;

        let status: String = row.try_get("status")?;
        let status = status
            .parse::<LeadStatus>()
            .map_err(RepositoryError::Serialization)?;
        let lead_source: String = row.try_get("lead_source")?;

        let mut lead = Lead::new(
            row.try_get::<Option<Uuid>, _>("site_id")?.map(SiteId),
            row.try_get("name")?,
            row.try_get("email")?,
            row.try_get("phone")?,
            row.try_get("message")?,
            row.try_get("form_type")?,
            form_data,
            row.try_get("source_page")?,
            attribution,
        )
        .with_lead_source(
            LeadSource::parse(&lead_source).unwrap_or_default(),
            row.try_get("lead_source_detail")?,
        );
        lead.id = LeadId(row.try_get("id")?);
        lead.status = status;
        lead.is_archived = row.try_get("is_archived")?;
        lead.submitted_at = row.try_get::<DateTime<Utc>, _>("submitted_at")?;
        // Channels missing from older rows stay pending.
        let mut merged = lead.deliveries().clone();
        merged.extend(delivery);
        lead.set_deliveries(merged);
        Ok(lead)
    }
}

#[async_trait]
impl LeadRepository for PostgresLeadRepository {
    async fn insert(&self, lead: &Lead) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO leads (
                id, site_id, name, email, phone, message, form_type, form_data,
                source_page, status, is_archived, submitted_at, attribution,
                lead_source, lead_source_detail, delivery
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(lead.id.0)
        .bind(lead.site_id.map(|s| s.0))
        .bind(&lead.name)
        .bind(&lead.email)
        .bind(&lead.phone)
        .bind(&lead.message)
        .bind(&lead.form_type)
        .bind(serde_json::to_value(&lead.form_data)?)
        .bind(&lead.source_page)
        .bind(lead.status.as_str())
        .bind(lead.is_archived)
        .bind(lead.submitted_at)
        .bind(serde_json::to_value(&lead.attribution)?)
        .bind(lead.lead_source.as_str())
        .bind(&lead.lead_source_detail)
        .bind(serde_json::to_value(lead.deliveries())?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save(&self, lead: &Lead) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE leads SET
                status = $2,
                is_archived = $3,
                form_data = $4,
                lead_source = $5,
                lead_source_detail = $6,
                delivery = $7
            WHERE id = $1
            "#,
        )
        .bind(lead.id.0)
        .bind(lead.status.as_str())
        .bind(lead.is_archived)
        .bind(serde_json::to_value(&lead.form_data)?)
        .bind(lead.lead_source.as_str())
        .bind(&lead.lead_source_detail)
        .bind(serde_json::to_value(lead.deliveries())?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Lead {}", lead.id)));
        }
        Ok(())
    }

    async fn update_delivery(
        &self,
        id: LeadId,
        channel: DeliveryChannel,
        state: &DeliveryState,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE leads SET delivery = jsonb_set(delivery, ARRAY[$2::text], $3, true) WHERE id = $1",
        )
        .bind(id.0)
        .bind(channel.as_str())
        .bind(serde_json::to_value(state)?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Lead {id}")));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: LeadId) -> Result<Option<Lead>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::lead_from_row).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Vec<Lead>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {LEAD_COLUMNS} FROM leads WHERE lower(email) = lower($1) ORDER BY submitted_at DESC"
        ))
        .bind(email.trim())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::lead_from_row).collect()
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Lead>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {LEAD_COLUMNS} FROM leads ORDER BY submitted_at DESC LIMIT $1"
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::lead_from_row).collect()
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM leads")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}
