// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Creates concrete repository implementations based on storage backend
//! configuration, keeping the domain layer free of infrastructure wiring.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Select in-memory or PostgreSQL repositories at startup

use std::sync::Arc;
use sqlx::PgPool;

use crate::domain::repository::{SourceRepository, StorageBackend, WorkloadRepository};
use crate::infrastructure::repositories::postgres_source::PostgresSourceRepository;
use crate::infrastructure::repositories::postgres_workload::PostgresWorkloadRepository;
use crate::infrastructure::repositories::{InMemorySourceRepository, InMemoryWorkloadRepository};

/// Creates a WorkloadRepository implementation based on the configured backend
pub fn create_workload_repository(backend: &StorageBackend, pool: Option<PgPool>) -> Arc<dyn WorkloadRepository> {
    match (backend, pool) {
        (StorageBackend::PostgreSQL(_), Some(pool)) => Arc::new(PostgresWorkloadRepository::new(pool)),
        _ => Arc::new(InMemoryWorkloadRepository::new()),
    }
}

/// Creates a SourceRepository implementation based on the configured backend
pub fn create_source_repository(backend: &StorageBackend, pool: Option<PgPool>) -> Arc<dyn SourceRepository> {
    match (backend, pool) {
        (StorageBackend::PostgreSQL(_), Some(pool)) => Arc::new(PostgresSourceRepository::new(pool)),
        _ => Arc::new(InMemorySourceRepository::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::source::SourceId;

    #[tokio::test]
    async fn test_in_memory_backend_without_pool() {
        let workloads = create_workload_repository(&StorageBackend::InMemory, None);
        let sources = create_source_repository(&StorageBackend::InMemory, None);

        assert_eq!(workloads.count_by_namespace("tenant-a").await.unwrap(), 0);
        assert!(sources.find_by_id(SourceId::new()).await.unwrap().is_none());
    }
}
