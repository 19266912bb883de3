// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Workload Orchestrator Application Service
//!
//! Implements the workload lifecycle across two independently mutated stores:
//! - Cluster: workload and endpoint objects via `ClusterResourceAdapter`
//! - Metadata store: `WorkloadRecord` documents via `WorkloadRepository`
//! - Source registry: the best-effort back-reference list on `SourceRecord`
//!
//! Mutations run as sagas (see `application::saga`). Validation and the
//! source lookup happen before any cluster mutation. Source back-reference
//! updates run after the saga commits and are never compensated.

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::errors::WorkloadError;
use crate::application::saga::{Compensation, ConsistencyPolicy, Saga, SagaStep};
use crate::application::source_registry::SourceRegistry;
use crate::domain::cluster::{
    endpoint_name, ClusterError, ClusterResourceAdapter, EndpointSpec, Provisioned, Removed, WorkloadSpec,
    CPU_REQUEST, ENDPOINT_PORT, MEMORY_REQUEST,
};
use crate::domain::repository::WorkloadRepository;
use crate::domain::workload::{
    CreateWorkloadRequest, EndpointAddress, TenantSummary, UpdateOutcome, WorkloadDetails, WorkloadRecord,
    WorkloadUpdate,
};

// ============================================================================
// Service Trait
// ============================================================================

#[async_trait]
pub trait WorkloadOrchestrator: Send + Sync {
    /// Create the cluster workload, its endpoint, and the metadata record
    async fn create_workload(&self, request: CreateWorkloadRequest) -> Result<WorkloadRecord, WorkloadError>;

    /// Stored record joined with the live cluster view
    async fn get_workload(&self, namespace: &str, name: &str) -> Result<WorkloadDetails, WorkloadError>;

    async fn list_workloads(&self, namespace: &str) -> Result<Vec<WorkloadDetails>, WorkloadError>;

    /// Apply an image/replica change. Elided entirely when nothing changes.
    async fn update_workload(
        &self,
        namespace: &str,
        name: &str,
        update: WorkloadUpdate,
    ) -> Result<UpdateOutcome, WorkloadError>;

    async fn delete_workload(&self, namespace: &str, name: &str) -> Result<(), WorkloadError>;

    async fn create_namespace(&self, namespace: &str) -> Result<Provisioned, WorkloadError>;

    /// Ensure the namespace exists and summarize it
    async fn provision_tenant(&self, namespace: &str) -> Result<TenantSummary, WorkloadError>;

    async fn recent_events(&self, namespace: &str, top_k: usize) -> Result<Vec<String>, WorkloadError>;
}

// ============================================================================
// Standard Implementation
// ============================================================================

pub struct StandardWorkloadOrchestrator {
    cluster: Arc<dyn ClusterResourceAdapter>,
    workloads: Arc<dyn WorkloadRepository>,
    sources: Arc<dyn SourceRegistry>,
    policy: ConsistencyPolicy,
}

impl StandardWorkloadOrchestrator {
    pub fn new(
        cluster: Arc<dyn ClusterResourceAdapter>,
        workloads: Arc<dyn WorkloadRepository>,
        sources: Arc<dyn SourceRegistry>,
        policy: ConsistencyPolicy,
    ) -> Self {
        Self {
            cluster,
            workloads,
            sources,
            policy,
        }
    }

    async fn find_record(&self, namespace: &str, name: &str) -> Result<WorkloadRecord, WorkloadError> {
        self.workloads
            .find_by_name(namespace, name)
            .await?
            .ok_or_else(|| WorkloadError::NotFound(format!("workload '{}' not found in namespace '{}'", name, namespace)))
    }

    async fn endpoint_address(&self, namespace: &str, name: &str) -> EndpointAddress {
        match self.cluster.get_endpoint_address(namespace, &endpoint_name(name)).await {
            Ok(address) => EndpointAddress::Assigned(address),
            Err(ClusterError::NoAddressAvailable { .. }) => {
                debug!(namespace, workload = name, "Endpoint has no address yet");
                EndpointAddress::Undefined
            }
            Err(e) => {
                warn!(namespace, workload = name, "Endpoint address lookup failed: {}", e);
                EndpointAddress::Undefined
            }
        }
    }

    /// Joins a record with its live view. In lenient mode any live-read
    /// failure degrades to an absent view instead of failing.
    async fn compose(&self, record: WorkloadRecord, lenient: bool) -> Result<WorkloadDetails, WorkloadError> {
        let live = match self.cluster.get_workload(&record.namespace, &record.name).await {
            Ok(view) => Some(view),
            Err(ClusterError::NotFound { .. }) => {
                warn!(
                    namespace = %record.namespace,
                    workload = %record.name,
                    "Workload record has no matching cluster object"
                );
                None
            }
            Err(e) if lenient => {
                warn!(namespace = %record.namespace, workload = %record.name, "Live view unavailable: {}", e);
                None
            }
            Err(e) => return Err(e.into()),
        };
        let endpoint = self.endpoint_address(&record.namespace, &record.name).await;

        Ok(WorkloadDetails { record, live, endpoint })
    }

    fn workload_spec(record: &WorkloadRecord) -> WorkloadSpec {
        WorkloadSpec {
            namespace: record.namespace.clone(),
            name: record.name.clone(),
            image: record.image.clone(),
            replicas: record.replicas,
            container_port: record.container_port,
            cpu_request: CPU_REQUEST.to_string(),
            memory_request: MEMORY_REQUEST.to_string(),
        }
    }

    fn endpoint_spec(record: &WorkloadRecord) -> EndpointSpec {
        EndpointSpec {
            namespace: record.namespace.clone(),
            name: endpoint_name(&record.name),
            target_workload: record.name.clone(),
            port: ENDPOINT_PORT,
            target_port: record.container_port,
        }
    }

    // ------------------------------------------------------------------------
    // Compensations
    // ------------------------------------------------------------------------

    fn undo_create_workload(&self, namespace: &str, name: &str) -> Compensation {
        let cluster = self.cluster.clone();
        let (namespace, name) = (namespace.to_string(), name.to_string());
        Box::pin(async move {
            cluster.delete_workload(&namespace, &name).await?;
            Ok(())
        })
    }

    fn undo_create_endpoint(&self, namespace: &str, name: &str) -> Compensation {
        let cluster = self.cluster.clone();
        let (namespace, name) = (namespace.to_string(), name.to_string());
        Box::pin(async move {
            cluster.delete_endpoint(&namespace, &name).await?;
            Ok(())
        })
    }

    fn undo_update(&self, previous: &WorkloadRecord) -> Compensation {
        let cluster = self.cluster.clone();
        let previous = previous.clone();
        Box::pin(async move {
            cluster
                .update_replicas_and_image(&previous.namespace, &previous.name, previous.replicas, &previous.image)
                .await?;
            Ok(())
        })
    }

    fn undo_delete_workload(&self, record: &WorkloadRecord) -> Compensation {
        let cluster = self.cluster.clone();
        let spec = Self::workload_spec(record);
        Box::pin(async move {
            match cluster.create_workload(&spec).await {
                Ok(()) | Err(ClusterError::AlreadyExists { .. }) => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn undo_delete_endpoint(&self, record: &WorkloadRecord) -> Compensation {
        let cluster = self.cluster.clone();
        let spec = Self::endpoint_spec(record);
        Box::pin(async move {
            cluster.create_endpoint(&spec).await?;
            Ok(())
        })
    }
}

#[async_trait]
impl WorkloadOrchestrator for StandardWorkloadOrchestrator {
    async fn create_workload(&self, request: CreateWorkloadRequest) -> Result<WorkloadRecord, WorkloadError> {
        request.validate().map_err(WorkloadError::InvalidRequest)?;
        self.sources
            .get_tenant_source(&request.namespace, request.source_id)
            .await?;

        let record = WorkloadRecord::from_request(&request);
        let namespace = record.namespace.as_str();
        let name = record.name.as_str();
        info!(namespace, workload = name, image = %record.image, replicas = record.replicas, "Creating workload");

        let mut saga = Saga::begin("create-workload", self.policy);

        if let Err(e) = self.cluster.create_workload(&Self::workload_spec(&record)).await {
            return Err(saga.abort(SagaStep::CreateClusterWorkload, e.into()).await);
        }
        saga.record(SagaStep::CreateClusterWorkload, Some(self.undo_create_workload(namespace, name)));

        let endpoint = Self::endpoint_spec(&record);
        match self.cluster.create_endpoint(&endpoint).await {
            Ok(Provisioned::Created) => saga.record(
                SagaStep::CreateClusterEndpoint,
                Some(self.undo_create_endpoint(namespace, &endpoint.name)),
            ),
            Ok(Provisioned::Existing) => {
                debug!(namespace, endpoint = %endpoint.name, "Endpoint already present, reusing it");
                saga.record(SagaStep::CreateClusterEndpoint, None);
            }
            Err(e) => return Err(saga.abort(SagaStep::CreateClusterEndpoint, e.into()).await),
        }

        if let Err(e) = self.workloads.insert(&record).await {
            return Err(saga.abort(SagaStep::InsertRecord, e.into()).await);
        }
        saga.commit();

        if let Err(e) = self.sources.attach_workload(record.source_id, name).await {
            warn!(
                namespace,
                workload = name,
                source = %record.source_id,
                "Failed to attach workload to source: {}",
                e
            );
        }

        info!(namespace, workload = name, id = %record.id, "Workload created");
        Ok(record)
    }

    async fn get_workload(&self, namespace: &str, name: &str) -> Result<WorkloadDetails, WorkloadError> {
        let record = self.find_record(namespace, name).await?;
        self.compose(record, false).await
    }

    async fn list_workloads(&self, namespace: &str) -> Result<Vec<WorkloadDetails>, WorkloadError> {
        let records = self.workloads.find_by_namespace(namespace).await?;
        debug!(namespace, count = records.len(), "Listing workloads");

        join_all(records.into_iter().map(|r| self.compose(r, true)))
            .await
            .into_iter()
            .collect()
    }

    async fn update_workload(
        &self,
        namespace: &str,
        name: &str,
        update: WorkloadUpdate,
    ) -> Result<UpdateOutcome, WorkloadError> {
        let current = self.find_record(namespace, name).await?;
        let (image, replicas) = update.resolve(&current).map_err(WorkloadError::InvalidRequest)?;

        if image == current.image && replicas == current.replicas {
            debug!(namespace, workload = name, "Update is a no-op, skipping cluster and store");
            return Ok(UpdateOutcome {
                applied: false,
                image,
                replicas,
            });
        }

        let mut saga = Saga::begin("update-workload", self.policy);

        if let Err(e) = self
            .cluster
            .update_replicas_and_image(namespace, name, replicas, &image)
            .await
        {
            return Err(saga.abort(SagaStep::UpdateClusterWorkload, e.into()).await);
        }
        saga.record(SagaStep::UpdateClusterWorkload, Some(self.undo_update(&current)));

        if let Err(e) = self
            .workloads
            .update_spec(current.id, &image, replicas, Utc::now())
            .await
        {
            return Err(saga.abort(SagaStep::PatchRecord, e.into()).await);
        }
        saga.commit();

        info!(namespace, workload = name, image = %image, replicas, "Workload updated");
        Ok(UpdateOutcome {
            applied: true,
            image,
            replicas,
        })
    }

    async fn delete_workload(&self, namespace: &str, name: &str) -> Result<(), WorkloadError> {
        let record = self.find_record(namespace, name).await?;
        let mut saga = Saga::begin("delete-workload", self.policy);

        match self.cluster.delete_workload(namespace, name).await {
            Ok(Removed::Deleted) => {
                saga.record(SagaStep::DeleteClusterWorkload, Some(self.undo_delete_workload(&record)))
            }
            Ok(Removed::Absent) => {
                warn!(namespace, workload = name, "Cluster workload already absent");
                saga.record(SagaStep::DeleteClusterWorkload, None);
            }
            Err(e) => return Err(saga.abort(SagaStep::DeleteClusterWorkload, e.into()).await),
        }

        match self.cluster.delete_endpoint(namespace, &endpoint_name(name)).await {
            Ok(Removed::Deleted) => {
                saga.record(SagaStep::DeleteClusterEndpoint, Some(self.undo_delete_endpoint(&record)))
            }
            Ok(Removed::Absent) => saga.record(SagaStep::DeleteClusterEndpoint, None),
            Err(e) => return Err(saga.abort(SagaStep::DeleteClusterEndpoint, e.into()).await),
        }

        if let Err(e) = self.workloads.delete(record.id).await {
            return Err(saga.abort(SagaStep::DeleteRecord, e.into()).await);
        }
        saga.commit();

        if let Err(e) = self.sources.detach_workload(record.source_id, name).await {
            warn!(
                namespace,
                workload = name,
                source = %record.source_id,
                "Failed to detach workload from source: {}",
                e
            );
        }

        info!(namespace, workload = name, "Workload deleted");
        Ok(())
    }

    async fn create_namespace(&self, namespace: &str) -> Result<Provisioned, WorkloadError> {
        if namespace.is_empty() {
            return Err(WorkloadError::InvalidRequest("namespace cannot be empty".to_string()));
        }
        let outcome = self.cluster.create_namespace(namespace).await?;
        if outcome == Provisioned::Created {
            info!(namespace, "Namespace created");
        }
        Ok(outcome)
    }

    async fn provision_tenant(&self, namespace: &str) -> Result<TenantSummary, WorkloadError> {
        self.create_namespace(namespace).await?;

        let (cluster_version, pods, workloads, endpoints) = futures::try_join!(
            self.cluster.cluster_version(),
            self.cluster.list_pods(namespace),
            self.cluster.list_workloads(namespace),
            self.cluster.list_endpoints(namespace),
        )?;

        Ok(TenantSummary {
            namespace: namespace.to_string(),
            cluster_version,
            pods: pods.len(),
            workloads: workloads.len(),
            endpoints: endpoints.len(),
        })
    }

    async fn recent_events(&self, namespace: &str, top_k: usize) -> Result<Vec<String>, WorkloadError> {
        Ok(self.cluster.recent_events(namespace, top_k).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::source_registry::StandardSourceRegistry;
    use crate::domain::cluster::MockClusterResourceAdapter;
    use crate::domain::repository::SourceRepository;
    use crate::domain::source::{SourceId, SourceRecord};
    use crate::infrastructure::repositories::{InMemorySourceRepository, InMemoryWorkloadRepository};
    use mockall::predicate::eq;

    fn orchestrator(cluster: MockClusterResourceAdapter) -> (StandardWorkloadOrchestrator, Arc<InMemoryWorkloadRepository>) {
        orchestrator_with_sources(cluster, Arc::new(InMemorySourceRepository::new()))
    }

    fn orchestrator_with_sources(
        cluster: MockClusterResourceAdapter,
        sources: Arc<InMemorySourceRepository>,
    ) -> (StandardWorkloadOrchestrator, Arc<InMemoryWorkloadRepository>) {
        let cluster: Arc<dyn ClusterResourceAdapter> = Arc::new(cluster);
        let workloads = Arc::new(InMemoryWorkloadRepository::new());
        let registry = Arc::new(StandardSourceRegistry::new(
            sources,
            workloads.clone(),
            cluster.clone(),
            None,
        ));
        (
            StandardWorkloadOrchestrator::new(cluster, workloads.clone(), registry, ConsistencyPolicy::Compensate),
            workloads,
        )
    }

    #[tokio::test]
    async fn test_delete_unknown_workload_never_calls_cluster() {
        // Any cluster call on a bare mock panics.
        let (orchestrator, _) = orchestrator(MockClusterResourceAdapter::new());

        let err = orchestrator.delete_workload("tenant-a", "ghost").await.unwrap_err();
        assert!(matches!(err, WorkloadError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_with_unknown_source_never_calls_cluster() {
        let (orchestrator, _) = orchestrator(MockClusterResourceAdapter::new());

        let err = orchestrator
            .create_workload(CreateWorkloadRequest {
                name: "web".to_string(),
                namespace: "tenant-a".to_string(),
                image: "nginx:1.27".to_string(),
                replicas: 1,
                container_port: 8080,
                source_id: SourceId::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WorkloadError::ReferenceNotFound(_)));
    }

    #[tokio::test]
    async fn test_create_with_foreign_source_never_calls_cluster() {
        let sources = Arc::new(InMemorySourceRepository::new());
        let foreign = SourceRecord::new("https://github.com/acme/widgets", "tenant-b", None).unwrap();
        sources.insert(&foreign).await.unwrap();
        let (orchestrator, workloads) = orchestrator_with_sources(MockClusterResourceAdapter::new(), sources.clone());

        let err = orchestrator
            .create_workload(CreateWorkloadRequest {
                name: "web".to_string(),
                namespace: "tenant-a".to_string(),
                image: "nginx:1.27".to_string(),
                replicas: 1,
                container_port: 8080,
                source_id: foreign.id,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, WorkloadError::ReferenceNotFound(_)));
        assert!(workloads.is_empty());
        let stored = sources.find_by_id(foreign.id).await.unwrap().unwrap();
        assert!(stored.workloads.is_empty());
    }

    #[tokio::test]
    async fn test_noop_update_never_calls_cluster() {
        let (orchestrator, workloads) = orchestrator(MockClusterResourceAdapter::new());
        let record = WorkloadRecord::from_request(&CreateWorkloadRequest {
            name: "web".to_string(),
            namespace: "tenant-a".to_string(),
            image: "nginx:1.27".to_string(),
            replicas: 2,
            container_port: 8080,
            source_id: SourceId::new(),
        });
        workloads.insert(&record).await.unwrap();

        let outcome = orchestrator
            .update_workload(
                "tenant-a",
                "web",
                WorkloadUpdate {
                    image: "nginx:1.27".to_string(),
                    replicas: -1,
                },
            )
            .await
            .unwrap();
        assert!(!outcome.applied);
        assert_eq!(outcome.replicas, 2);
    }

    #[tokio::test]
    async fn test_get_degrades_endpoint_to_undefined() {
        let mut cluster = MockClusterResourceAdapter::new();
        cluster
            .expect_get_workload()
            .with(eq("tenant-a"), eq("web"))
            .times(1)
            .returning(|_, _| {
                Err(ClusterError::NotFound {
                    kind: "deployment",
                    namespace: "tenant-a".to_string(),
                    name: "web".to_string(),
                })
            });
        cluster
            .expect_get_endpoint_address()
            .with(eq("tenant-a"), eq("web-service"))
            .times(1)
            .returning(|_, _| Err(ClusterError::Unavailable("connection reset".to_string())));
        let (orchestrator, workloads) = orchestrator(cluster);
        let record = WorkloadRecord::from_request(&CreateWorkloadRequest {
            name: "web".to_string(),
            namespace: "tenant-a".to_string(),
            image: "nginx:1.27".to_string(),
            replicas: 2,
            container_port: 8080,
            source_id: SourceId::new(),
        });
        workloads.insert(&record).await.unwrap();

        let details = orchestrator.get_workload("tenant-a", "web").await.unwrap();
        assert!(details.live.is_none());
        assert_eq!(details.endpoint, EndpointAddress::Undefined);
        assert_eq!(details.record.image, "nginx:1.27");
    }

    #[tokio::test]
    async fn test_provision_tenant_summarizes_namespace() {
        let mut cluster = MockClusterResourceAdapter::new();
        cluster
            .expect_create_namespace()
            .with(eq("tenant-a"))
            .times(1)
            .returning(|_| Ok(Provisioned::Existing));
        cluster
            .expect_cluster_version()
            .returning(|| Ok("v1.32.1".to_string()));
        cluster
            .expect_list_pods()
            .returning(|_| Ok(vec!["web-1".to_string(), "web-2".to_string()]));
        cluster.expect_list_workloads().returning(|_| Ok(vec![]));
        cluster
            .expect_list_endpoints()
            .returning(|_| Ok(vec!["web-service".to_string()]));
        let (orchestrator, _) = orchestrator(cluster);

        let summary = orchestrator.provision_tenant("tenant-a").await.unwrap();
        assert_eq!(
            summary,
            TenantSummary {
                namespace: "tenant-a".to_string(),
                cluster_version: "v1.32.1".to_string(),
                pods: 2,
                workloads: 0,
                endpoints: 1,
            }
        );
    }
}
