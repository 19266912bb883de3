// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Source Repository
//!
//! Production `SourceRepository` backed by the `sources` table. The workload
//! back-reference list is a `TEXT[]` column updated in place with
//! `array_append` / `array_remove`, so concurrent pushes do not overwrite
//! each other.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::repository::{RepositoryError, SourceRepository};
use crate::domain::source::{SourceId, SourceRecord};

pub struct PostgresSourceRepository {
    pool: PgPool,
}

impl PostgresSourceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &PgRow) -> Result<SourceRecord, RepositoryError> {
        Ok(SourceRecord {
            id: SourceId(row.try_get("id")?),
            url: row.try_get("url")?,
            name: row.try_get("name")?,
            namespace: row.try_get("namespace")?,
            registry_url: row.try_get("registry_url")?,
            workloads: row.try_get("workloads")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn expect_one(id: SourceId, rows_affected: u64) -> Result<(), RepositoryError> {
        if rows_affected == 0 {
            return Err(RepositoryError::NotFound(format!("source {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl SourceRepository for PostgresSourceRepository {
    async fn insert(&self, record: &SourceRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO sources (
                id, url, name, namespace, registry_url, workloads, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id.0)
        .bind(&record.url)
        .bind(&record.name)
        .bind(&record.namespace)
        .bind(&record.registry_url)
        .bind(&record.workloads)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to insert source: {}", e)))?;

        Ok(())
    }

    async fn find_by_id(&self, id: SourceId) -> Result<Option<SourceRecord>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, url, name, namespace, registry_url, workloads, created_at, updated_at
            FROM sources
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn find_by_namespace(&self, namespace: &str) -> Result<Vec<SourceRecord>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, url, name, namespace, registry_url, workloads, created_at, updated_at
            FROM sources
            WHERE namespace = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(namespace)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn push_workload(
        &self,
        id: SourceId,
        workload: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE sources SET workloads = array_append(workloads, $2), updated_at = $3 WHERE id = $1",
        )
        .bind(id.0)
        .bind(workload)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;

        Self::expect_one(id, result.rows_affected())
    }

    async fn pull_workload(
        &self,
        id: SourceId,
        workload: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE sources SET workloads = array_remove(workloads, $2), updated_at = $3 WHERE id = $1",
        )
        .bind(id.0)
        .bind(workload)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;

        Self::expect_one(id, result.rows_affected())
    }

    async fn replace_workloads(
        &self,
        id: SourceId,
        workloads: &[String],
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE sources SET workloads = $2, updated_at = $3 WHERE id = $1")
            .bind(id.0)
            .bind(workloads)
            .bind(updated_at)
            .execute(&self.pool)
            .await?;

        Self::expect_one(id, result.rows_affected())
    }
}
