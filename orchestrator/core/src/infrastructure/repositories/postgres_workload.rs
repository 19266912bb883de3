// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Workload Repository
//!
//! Production `WorkloadRepository` backed by the `workloads` table via
//! `sqlx`. Rows are returned oldest first (`created_at`, then `id`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::repository::{RepositoryError, WorkloadRepository};
use crate::domain::source::SourceId;
use crate::domain::workload::{WorkloadId, WorkloadRecord, WorkloadStatus};

const SELECT_COLUMNS: &str = "SELECT id, name, namespace, image, replicas, container_port, source_id, status, created_at, updated_at FROM workloads";

pub struct PostgresWorkloadRepository {
    pool: PgPool,
}

impl PostgresWorkloadRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &PgRow) -> Result<WorkloadRecord, RepositoryError> {
        let status_str: String = row.try_get("status")?;
        let status = WorkloadStatus::parse(&status_str)
            .ok_or_else(|| RepositoryError::Serialization(format!("Unknown workload status: {}", status_str)))?;

        Ok(WorkloadRecord {
            id: WorkloadId(row.try_get("id")?),
            name: row.try_get("name")?,
            namespace: row.try_get("namespace")?,
            image: row.try_get("image")?,
            replicas: row.try_get("replicas")?,
            container_port: row.try_get("container_port")?,
            source_id: SourceId(row.try_get("source_id")?),
            status,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl WorkloadRepository for PostgresWorkloadRepository {
    async fn insert(&self, record: &WorkloadRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO workloads (
                id, name, namespace, image, replicas, container_port,
                source_id, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(record.id.0)
        .bind(&record.name)
        .bind(&record.namespace)
        .bind(&record.image)
        .bind(record.replicas)
        .bind(record.container_port)
        .bind(record.source_id.0)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to insert workload: {}", e)))?;

        Ok(())
    }

    async fn find_by_name(&self, namespace: &str, name: &str) -> Result<Option<WorkloadRecord>, RepositoryError> {
        let row = sqlx::query(&format!(
            "{} WHERE namespace = $1 AND name = $2 ORDER BY created_at ASC, id ASC LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(namespace)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn find_by_namespace(&self, namespace: &str) -> Result<Vec<WorkloadRecord>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{} WHERE namespace = $1 ORDER BY created_at ASC, id ASC",
            SELECT_COLUMNS
        ))
        .bind(namespace)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn find_by_source(&self, source_id: SourceId) -> Result<Vec<WorkloadRecord>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{} WHERE source_id = $1 ORDER BY created_at ASC, id ASC",
            SELECT_COLUMNS
        ))
        .bind(source_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn update_spec(
        &self,
        id: WorkloadId,
        image: &str,
        replicas: i32,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE workloads
            SET image = $2, replicas = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(image)
        .bind(replicas)
        .bind(updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to update workload: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("workload {}", id)));
        }
        Ok(())
    }

    async fn delete(&self, id: WorkloadId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM workloads WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to delete workload: {}", e)))?;
        Ok(())
    }

    async fn count_by_namespace(&self, namespace: &str) -> Result<u64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM workloads WHERE namespace = $1")
            .bind(namespace)
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.try_get("count")?;
        Ok(count as u64)
    }
}
