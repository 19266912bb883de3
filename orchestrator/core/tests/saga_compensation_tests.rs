// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Partial-failure behavior of create, update and delete under both
//! consistency policies, and of the best-effort source list updates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use deployd_core::application::{
    ConsistencyPolicy, ErrorKind, RollbackOutcome, SagaStep, SourceRegistry, StandardSourceRegistry,
    StandardWorkloadOrchestrator, WorkloadError, WorkloadOrchestrator,
};
use deployd_core::domain::repository::{RepositoryError, SourceRepository, WorkloadRepository};
use deployd_core::domain::source::{SourceId, SourceRecord};
use deployd_core::domain::workload::{CreateWorkloadRequest, WorkloadId, WorkloadRecord, WorkloadUpdate};
use deployd_core::infrastructure::repositories::{InMemorySourceRepository, InMemoryWorkloadRepository};
use deployd_core::infrastructure::{ClusterOp, InMemoryCluster};

/// Workload store whose writes can be switched to fail.
#[derive(Default)]
struct FlakyWorkloadRepository {
    inner: InMemoryWorkloadRepository,
    fail_insert: AtomicBool,
    fail_update: AtomicBool,
    fail_delete: AtomicBool,
}

fn store_down() -> RepositoryError {
    RepositoryError::Database("connection refused".to_string())
}

#[async_trait]
impl WorkloadRepository for FlakyWorkloadRepository {
    async fn insert(&self, record: &WorkloadRecord) -> Result<(), RepositoryError> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(store_down());
        }
        self.inner.insert(record).await
    }

    async fn find_by_name(&self, namespace: &str, name: &str) -> Result<Option<WorkloadRecord>, RepositoryError> {
        self.inner.find_by_name(namespace, name).await
    }

    async fn find_by_namespace(&self, namespace: &str) -> Result<Vec<WorkloadRecord>, RepositoryError> {
        self.inner.find_by_namespace(namespace).await
    }

    async fn find_by_source(&self, source_id: SourceId) -> Result<Vec<WorkloadRecord>, RepositoryError> {
        self.inner.find_by_source(source_id).await
    }

    async fn update_spec(
        &self,
        id: WorkloadId,
        image: &str,
        replicas: i32,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(store_down());
        }
        self.inner.update_spec(id, image, replicas, updated_at).await
    }

    async fn delete(&self, id: WorkloadId) -> Result<(), RepositoryError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(store_down());
        }
        self.inner.delete(id).await
    }

    async fn count_by_namespace(&self, namespace: &str) -> Result<u64, RepositoryError> {
        self.inner.count_by_namespace(namespace).await
    }
}

/// Source store whose back-reference list updates can be switched to fail.
#[derive(Default)]
struct FlakySourceRepository {
    inner: InMemorySourceRepository,
    fail_push: AtomicBool,
    fail_pull: AtomicBool,
}

#[async_trait]
impl SourceRepository for FlakySourceRepository {
    async fn insert(&self, record: &SourceRecord) -> Result<(), RepositoryError> {
        self.inner.insert(record).await
    }

    async fn find_by_id(&self, id: SourceId) -> Result<Option<SourceRecord>, RepositoryError> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_namespace(&self, namespace: &str) -> Result<Vec<SourceRecord>, RepositoryError> {
        self.inner.find_by_namespace(namespace).await
    }

    async fn push_workload(&self, id: SourceId, workload: &str, updated_at: DateTime<Utc>) -> Result<(), RepositoryError> {
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(store_down());
        }
        self.inner.push_workload(id, workload, updated_at).await
    }

    async fn pull_workload(&self, id: SourceId, workload: &str, updated_at: DateTime<Utc>) -> Result<(), RepositoryError> {
        if self.fail_pull.load(Ordering::SeqCst) {
            return Err(store_down());
        }
        self.inner.pull_workload(id, workload, updated_at).await
    }

    async fn replace_workloads(
        &self,
        id: SourceId,
        workloads: &[String],
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.inner.replace_workloads(id, workloads, updated_at).await
    }
}

struct Harness {
    cluster: InMemoryCluster,
    workloads: Arc<FlakyWorkloadRepository>,
    sources: Arc<FlakySourceRepository>,
    registry: Arc<StandardSourceRegistry>,
    orchestrator: StandardWorkloadOrchestrator,
    source: SourceRecord,
}

async fn harness(policy: ConsistencyPolicy) -> Harness {
    let cluster = InMemoryCluster::new().with_namespace("tenant-a");
    let workloads = Arc::new(FlakyWorkloadRepository::default());
    let sources = Arc::new(FlakySourceRepository::default());
    let registry = Arc::new(StandardSourceRegistry::new(
        sources.clone(),
        workloads.clone(),
        Arc::new(cluster.clone()),
        None,
    ));
    let orchestrator = StandardWorkloadOrchestrator::new(
        Arc::new(cluster.clone()),
        workloads.clone(),
        registry.clone(),
        policy,
    );
    let source = registry
        .create_source("tenant-a", "https://github.com/acme/widgets", None)
        .await
        .unwrap();
    Harness {
        cluster,
        workloads,
        sources,
        registry,
        orchestrator,
        source,
    }
}

fn request(source_id: SourceId) -> CreateWorkloadRequest {
    CreateWorkloadRequest {
        name: "web".to_string(),
        namespace: "tenant-a".to_string(),
        image: "nginx:1.27".to_string(),
        replicas: 2,
        container_port: 8080,
        source_id,
    }
}

fn step_failed(err: &WorkloadError) -> (SagaStep, RollbackOutcome) {
    match err {
        WorkloadError::StepFailed { step, rollback, .. } => (*step, rollback.clone()),
        other => panic!("expected StepFailed, got {:?}", other),
    }
}

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn test_endpoint_failure_is_compensated() {
    let h = harness(ConsistencyPolicy::Compensate).await;
    h.cluster.fail_always(ClusterOp::CreateEndpoint);

    let err = h.orchestrator.create_workload(request(h.source.id)).await.unwrap_err();

    let (step, rollback) = step_failed(&err);
    assert_eq!(step, SagaStep::CreateClusterEndpoint);
    assert_eq!(
        rollback,
        RollbackOutcome::Completed {
            undone: vec![SagaStep::CreateClusterWorkload]
        }
    );
    assert!(err.retry_safe());
    assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
    assert!(!h.cluster.has_workload("tenant-a", "web"));
    assert!(h.workloads.inner.is_empty());
    assert!(h.registry.get_source(h.source.id).await.unwrap().workloads.is_empty());
}

#[tokio::test]
async fn test_endpoint_failure_left_in_place() {
    let h = harness(ConsistencyPolicy::LeaveAsIs).await;
    h.cluster.fail_always(ClusterOp::CreateEndpoint);

    let err = h.orchestrator.create_workload(request(h.source.id)).await.unwrap_err();

    let (step, rollback) = step_failed(&err);
    assert_eq!(step, SagaStep::CreateClusterEndpoint);
    assert_eq!(
        rollback,
        RollbackOutcome::Skipped {
            left_in_place: vec![SagaStep::CreateClusterWorkload]
        }
    );
    assert!(!err.retry_safe());
    assert!(h.cluster.has_workload("tenant-a", "web"));
    assert!(h.workloads.inner.is_empty());
}

#[tokio::test]
async fn test_record_insert_failure_removes_cluster_objects() {
    let h = harness(ConsistencyPolicy::Compensate).await;
    h.workloads.fail_insert.store(true, Ordering::SeqCst);

    let err = h.orchestrator.create_workload(request(h.source.id)).await.unwrap_err();

    let (step, rollback) = step_failed(&err);
    assert_eq!(step, SagaStep::InsertRecord);
    assert_eq!(
        rollback,
        RollbackOutcome::Completed {
            undone: vec![SagaStep::CreateClusterEndpoint, SagaStep::CreateClusterWorkload]
        }
    );
    assert!(!h.cluster.has_workload("tenant-a", "web"));
    assert!(!h.cluster.has_endpoint("tenant-a", "web-service"));
}

#[tokio::test]
async fn test_failed_compensation_is_reported_as_partial() {
    let h = harness(ConsistencyPolicy::Compensate).await;
    h.cluster.fail_always(ClusterOp::CreateEndpoint);
    h.cluster.fail_always(ClusterOp::DeleteWorkload);

    let err = h.orchestrator.create_workload(request(h.source.id)).await.unwrap_err();

    let (_, rollback) = step_failed(&err);
    match rollback {
        RollbackOutcome::Partial { undone, failed } => {
            assert!(undone.is_empty());
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].step, SagaStep::CreateClusterWorkload);
        }
        other => panic!("expected partial rollback, got {:?}", other),
    }
    assert!(!err.retry_safe());
    assert!(h.cluster.has_workload("tenant-a", "web"));
}

#[tokio::test]
async fn test_preexisting_endpoint_survives_rollback() {
    let h = harness(ConsistencyPolicy::Compensate).await;
    use deployd_core::domain::cluster::{ClusterResourceAdapter, EndpointSpec};
    h.cluster
        .create_endpoint(&EndpointSpec {
            namespace: "tenant-a".to_string(),
            name: "web-service".to_string(),
            target_workload: "web".to_string(),
            port: 80,
            target_port: 8080,
        })
        .await
        .unwrap();
    h.workloads.fail_insert.store(true, Ordering::SeqCst);

    h.orchestrator.create_workload(request(h.source.id)).await.unwrap_err();

    assert!(h.cluster.has_endpoint("tenant-a", "web-service"));
    assert!(!h.cluster.has_workload("tenant-a", "web"));
}

// ============================================================================
// Update
// ============================================================================

fn bump() -> WorkloadUpdate {
    WorkloadUpdate {
        image: "nginx:1.28".to_string(),
        replicas: 4,
    }
}

#[tokio::test]
async fn test_patch_failure_restores_cluster_spec() {
    let h = harness(ConsistencyPolicy::Compensate).await;
    h.orchestrator.create_workload(request(h.source.id)).await.unwrap();
    h.workloads.fail_update.store(true, Ordering::SeqCst);

    let err = h.orchestrator.update_workload("tenant-a", "web", bump()).await.unwrap_err();

    let (step, rollback) = step_failed(&err);
    assert_eq!(step, SagaStep::PatchRecord);
    assert!(rollback.is_clean());
    assert_eq!(
        h.cluster.workload_spec("tenant-a", "web"),
        Some(("nginx:1.27".to_string(), 2))
    );
    assert_eq!(h.cluster.calls(ClusterOp::UpdateWorkload), 2);
}

#[tokio::test]
async fn test_patch_failure_left_in_place_diverges() {
    let h = harness(ConsistencyPolicy::LeaveAsIs).await;
    h.orchestrator.create_workload(request(h.source.id)).await.unwrap();
    h.workloads.fail_update.store(true, Ordering::SeqCst);

    h.orchestrator.update_workload("tenant-a", "web", bump()).await.unwrap_err();

    assert_eq!(
        h.cluster.workload_spec("tenant-a", "web"),
        Some(("nginx:1.28".to_string(), 4))
    );
    let record = h.workloads.find_by_name("tenant-a", "web").await.unwrap().unwrap();
    assert_eq!(record.replicas, 2);

    // The next successful update closes the gap.
    h.workloads.fail_update.store(false, Ordering::SeqCst);
    let outcome = h.orchestrator.update_workload("tenant-a", "web", bump()).await.unwrap();
    assert!(outcome.applied);
    let record = h.workloads.find_by_name("tenant-a", "web").await.unwrap().unwrap();
    assert_eq!(record.replicas, 4);
}

#[tokio::test]
async fn test_cluster_update_failure_needs_no_rollback() {
    let h = harness(ConsistencyPolicy::Compensate).await;
    h.orchestrator.create_workload(request(h.source.id)).await.unwrap();
    h.cluster.fail_next(ClusterOp::UpdateWorkload, 1);

    let err = h.orchestrator.update_workload("tenant-a", "web", bump()).await.unwrap_err();

    let (step, rollback) = step_failed(&err);
    assert_eq!(step, SagaStep::UpdateClusterWorkload);
    assert_eq!(rollback, RollbackOutcome::NotNeeded);
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test]
async fn test_endpoint_delete_failure_recreates_workload() {
    let h = harness(ConsistencyPolicy::Compensate).await;
    h.orchestrator.create_workload(request(h.source.id)).await.unwrap();
    h.cluster.fail_always(ClusterOp::DeleteEndpoint);

    let err = h.orchestrator.delete_workload("tenant-a", "web").await.unwrap_err();

    let (step, rollback) = step_failed(&err);
    assert_eq!(step, SagaStep::DeleteClusterEndpoint);
    assert!(rollback.is_clean());
    assert!(h.cluster.has_workload("tenant-a", "web"));
    assert!(h.workloads.find_by_name("tenant-a", "web").await.unwrap().is_some());
    assert_eq!(
        h.registry.get_source(h.source.id).await.unwrap().workloads,
        vec!["web".to_string()]
    );
}

#[tokio::test]
async fn test_endpoint_delete_failure_left_in_place_keeps_record() {
    let h = harness(ConsistencyPolicy::LeaveAsIs).await;
    h.orchestrator.create_workload(request(h.source.id)).await.unwrap();
    h.cluster.fail_always(ClusterOp::DeleteEndpoint);

    let err = h.orchestrator.delete_workload("tenant-a", "web").await.unwrap_err();

    let (_, rollback) = step_failed(&err);
    assert_eq!(
        rollback,
        RollbackOutcome::Skipped {
            left_in_place: vec![SagaStep::DeleteClusterWorkload]
        }
    );
    assert!(!h.cluster.has_workload("tenant-a", "web"));
    assert!(h.workloads.find_by_name("tenant-a", "web").await.unwrap().is_some());

    // Retrying once the endpoint is deletable finishes the job.
    h.cluster.clear_failures();
    h.orchestrator.delete_workload("tenant-a", "web").await.unwrap();
    assert!(h.workloads.find_by_name("tenant-a", "web").await.unwrap().is_none());
}

#[tokio::test]
async fn test_record_delete_failure_restores_cluster_objects() {
    let h = harness(ConsistencyPolicy::Compensate).await;
    h.orchestrator.create_workload(request(h.source.id)).await.unwrap();
    h.workloads.fail_delete.store(true, Ordering::SeqCst);

    let err = h.orchestrator.delete_workload("tenant-a", "web").await.unwrap_err();

    let (step, rollback) = step_failed(&err);
    assert_eq!(step, SagaStep::DeleteRecord);
    assert_eq!(
        rollback,
        RollbackOutcome::Completed {
            undone: vec![SagaStep::DeleteClusterEndpoint, SagaStep::DeleteClusterWorkload]
        }
    );
    assert!(h.cluster.has_workload("tenant-a", "web"));
    assert!(h.cluster.has_endpoint("tenant-a", "web-service"));
}

// ============================================================================
// Source list
// ============================================================================

#[tokio::test]
async fn test_source_attach_failure_keeps_workload() {
    let h = harness(ConsistencyPolicy::Compensate).await;
    h.sources.fail_push.store(true, Ordering::SeqCst);

    let record = h.orchestrator.create_workload(request(h.source.id)).await.unwrap();

    assert_eq!(record.name, "web");
    assert!(h.cluster.has_workload("tenant-a", "web"));
    assert!(h.cluster.has_endpoint("tenant-a", "web-service"));
    assert!(h.workloads.find_by_name("tenant-a", "web").await.unwrap().is_some());
    assert!(h.registry.get_source(h.source.id).await.unwrap().workloads.is_empty());

    // Reconciliation repairs the missed append.
    let reconciled = h.registry.reconcile_source(h.source.id).await.unwrap();
    assert_eq!(reconciled.workloads, vec!["web".to_string()]);
}

#[tokio::test]
async fn test_source_detach_failure_still_deletes() {
    let h = harness(ConsistencyPolicy::Compensate).await;
    h.orchestrator.create_workload(request(h.source.id)).await.unwrap();
    h.sources.fail_pull.store(true, Ordering::SeqCst);

    h.orchestrator.delete_workload("tenant-a", "web").await.unwrap();

    assert!(!h.cluster.has_workload("tenant-a", "web"));
    assert!(!h.cluster.has_endpoint("tenant-a", "web-service"));
    assert!(h.workloads.inner.is_empty());
    assert_eq!(
        h.registry.get_source(h.source.id).await.unwrap().workloads,
        vec!["web".to_string()]
    );

    let reconciled = h.registry.reconcile_source(h.source.id).await.unwrap();
    assert!(reconciled.workloads.is_empty());
}
