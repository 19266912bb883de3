// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for the metadata store, one repository per
//! collection. Interfaces live in the domain layer and are implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Collection | Implementations |
//! |-------|------------|----------------|
//! | `WorkloadRepository` | workloads | `InMemoryWorkloadRepository`, `PostgresWorkloadRepository` |
//! | `SourceRepository` | sources | `InMemorySourceRepository`, `PostgresSourceRepository` |
//!
//! There are no transactions across collections, and none with the cluster.
//! The workloads collection carries no uniqueness constraint on
//! `(namespace, name)`: the cluster's own uniqueness check is the only guard
//! against duplicate creates.
//!
//! ## Storage Backend Abstraction
//!
//! Concrete implementations are selected at startup from the `storage`
//! section of the service configuration. In-memory implementations are used
//! for development and testing, PostgreSQL for production.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::source::{SourceId, SourceRecord};
use crate::domain::workload::{WorkloadId, WorkloadRecord};

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
    pub max_connections: u32,
}

/// Repository interface for workload records
#[async_trait]
pub trait WorkloadRepository: Send + Sync {
    async fn insert(&self, record: &WorkloadRecord) -> Result<(), RepositoryError>;

    /// Oldest record with this name in the namespace.
    async fn find_by_name(&self, namespace: &str, name: &str) -> Result<Option<WorkloadRecord>, RepositoryError>;

    /// All records in a namespace, oldest first.
    async fn find_by_namespace(&self, namespace: &str) -> Result<Vec<WorkloadRecord>, RepositoryError>;

    /// All records referencing a source, oldest first.
    async fn find_by_source(&self, source_id: SourceId) -> Result<Vec<WorkloadRecord>, RepositoryError>;

    /// `$set` of image, replicas and the update timestamp.
    async fn update_spec(
        &self,
        id: WorkloadId,
        image: &str,
        replicas: i32,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn delete(&self, id: WorkloadId) -> Result<(), RepositoryError>;

    async fn count_by_namespace(&self, namespace: &str) -> Result<u64, RepositoryError>;
}

/// Repository interface for source records
#[async_trait]
pub trait SourceRepository: Send + Sync {
    async fn insert(&self, record: &SourceRecord) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: SourceId) -> Result<Option<SourceRecord>, RepositoryError>;

    /// All sources of a tenant, oldest first.
    async fn find_by_namespace(&self, namespace: &str) -> Result<Vec<SourceRecord>, RepositoryError>;

    /// `$push` of a workload name plus `$set` of the update timestamp.
    async fn push_workload(
        &self,
        id: SourceId,
        workload: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// `$pull` of every occurrence of a workload name plus `$set` of the update timestamp.
    async fn pull_workload(
        &self,
        id: SourceId,
        workload: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Overwrites the workload list. Used by reconciliation.
    async fn replace_workloads(
        &self,
        id: SourceId,
        workloads: &[String],
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
