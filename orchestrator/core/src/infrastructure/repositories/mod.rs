// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository traits defined in
//! `crate::domain::repository`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve workload and source records
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! ## PostgreSQL Repositories
//!
//! - **PostgresWorkloadRepository** - `workloads` table
//! - **PostgresSourceRepository** - `sources` table, workload list as `TEXT[]`
//!
//! ## In-Memory Repositories
//!
//! Insertion-ordered, lock-protected vectors for development and tests.
//! "Oldest first" ordering is insertion order.

pub mod postgres_source;
pub mod postgres_workload;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

use crate::domain::repository::{RepositoryError, SourceRepository, WorkloadRepository};
use crate::domain::source::{SourceId, SourceRecord};
use crate::domain::workload::{WorkloadId, WorkloadRecord};

#[derive(Clone, Default)]
pub struct InMemoryWorkloadRepository {
    records: Arc<RwLock<Vec<WorkloadRecord>>>,
}

impl InMemoryWorkloadRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records across all namespaces.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl WorkloadRepository for InMemoryWorkloadRepository {
    async fn insert(&self, record: &WorkloadRecord) -> Result<(), RepositoryError> {
        self.records.write().push(record.clone());
        Ok(())
    }

    async fn find_by_name(&self, namespace: &str, name: &str) -> Result<Option<WorkloadRecord>, RepositoryError> {
        Ok(self
            .records
            .read()
            .iter()
            .find(|r| r.namespace == namespace && r.name == name)
            .cloned())
    }

    async fn find_by_namespace(&self, namespace: &str) -> Result<Vec<WorkloadRecord>, RepositoryError> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| r.namespace == namespace)
            .cloned()
            .collect())
    }

    async fn find_by_source(&self, source_id: SourceId) -> Result<Vec<WorkloadRecord>, RepositoryError> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| r.source_id == source_id)
            .cloned()
            .collect())
    }

    async fn update_spec(
        &self,
        id: WorkloadId,
        image: &str,
        replicas: i32,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut records = self.records.write();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| RepositoryError::NotFound(format!("workload {}", id)))?;
        record.image = image.to_string();
        record.replicas = replicas;
        record.updated_at = updated_at;
        Ok(())
    }

    async fn delete(&self, id: WorkloadId) -> Result<(), RepositoryError> {
        self.records.write().retain(|r| r.id != id);
        Ok(())
    }

    async fn count_by_namespace(&self, namespace: &str) -> Result<u64, RepositoryError> {
        Ok(self.records.read().iter().filter(|r| r.namespace == namespace).count() as u64)
    }
}

#[derive(Clone, Default)]
pub struct InMemorySourceRepository {
    records: Arc<RwLock<Vec<SourceRecord>>>,
}

impl InMemorySourceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn modify(
        &self,
        id: SourceId,
        updated_at: DateTime<Utc>,
        f: impl FnOnce(&mut Vec<String>),
    ) -> Result<(), RepositoryError> {
        let mut records = self.records.write();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| RepositoryError::NotFound(format!("source {}", id)))?;
        f(&mut record.workloads);
        record.updated_at = updated_at;
        Ok(())
    }
}

#[async_trait]
impl SourceRepository for InMemorySourceRepository {
    async fn insert(&self, record: &SourceRecord) -> Result<(), RepositoryError> {
        self.records.write().push(record.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: SourceId) -> Result<Option<SourceRecord>, RepositoryError> {
        Ok(self.records.read().iter().find(|r| r.id == id).cloned())
    }

    async fn find_by_namespace(&self, namespace: &str) -> Result<Vec<SourceRecord>, RepositoryError> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| r.namespace == namespace)
            .cloned()
            .collect())
    }

    async fn push_workload(
        &self,
        id: SourceId,
        workload: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.modify(id, updated_at, |list| list.push(workload.to_string()))
    }

    async fn pull_workload(
        &self,
        id: SourceId,
        workload: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.modify(id, updated_at, |list| list.retain(|w| w != workload))
    }

    async fn replace_workloads(
        &self,
        id: SourceId,
        workloads: &[String],
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.modify(id, updated_at, |list| *list = workloads.to_vec())
    }
}
