// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Source registry: enrichment with live views and releases, and
//! reconciliation of the workload back-reference list.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use deployd_core::application::{
    ConsistencyPolicy, SourceRegistry, StandardSourceRegistry, StandardWorkloadOrchestrator, WorkloadError,
    WorkloadOrchestrator,
};
use deployd_core::domain::repository::SourceRepository;
use deployd_core::domain::source::{ReleaseCatalog, ReleaseInfo, ReleaseLookupError, SourceId};
use deployd_core::domain::workload::CreateWorkloadRequest;
use deployd_core::infrastructure::repositories::{InMemorySourceRepository, InMemoryWorkloadRepository};
use deployd_core::infrastructure::InMemoryCluster;

/// Knows one repository on github.com; every other lookup fails.
struct StaticCatalog;

#[async_trait]
impl ReleaseCatalog for StaticCatalog {
    async fn latest_release(&self, repository: &str) -> Result<Option<ReleaseInfo>, ReleaseLookupError> {
        match repository {
            "acme/widgets" => Ok(Some(ReleaseInfo {
                html_url: "https://github.com/acme/widgets/releases/tag/v2.0.0".to_string(),
                tag_name: "v2.0.0".to_string(),
                created_at: None,
                published_at: None,
            })),
            "acme/drafts" => Ok(None),
            other => Err(ReleaseLookupError::Status {
                repository: other.to_string(),
                status: 403,
            }),
        }
    }

    fn serves(&self, source_url: &str) -> bool {
        source_url.starts_with("https://github.com/")
    }
}

struct Harness {
    cluster: InMemoryCluster,
    sources: Arc<InMemorySourceRepository>,
    registry: Arc<StandardSourceRegistry>,
    orchestrator: StandardWorkloadOrchestrator,
}

fn harness() -> Harness {
    let cluster = InMemoryCluster::new().with_namespace("tenant-a");
    let sources = Arc::new(InMemorySourceRepository::new());
    let workloads = Arc::new(InMemoryWorkloadRepository::new());
    let catalog: Arc<dyn ReleaseCatalog> = Arc::new(StaticCatalog);
    let registry = Arc::new(StandardSourceRegistry::new(
        sources.clone(),
        workloads.clone(),
        Arc::new(cluster.clone()),
        Some(catalog),
    ));
    let orchestrator = StandardWorkloadOrchestrator::new(
        Arc::new(cluster.clone()),
        workloads,
        registry.clone(),
        ConsistencyPolicy::Compensate,
    );
    Harness {
        cluster,
        sources,
        registry,
        orchestrator,
    }
}

fn request(name: &str, source_id: SourceId) -> CreateWorkloadRequest {
    CreateWorkloadRequest {
        name: name.to_string(),
        namespace: "tenant-a".to_string(),
        image: "nginx:1.27".to_string(),
        replicas: 1,
        container_port: 8080,
        source_id,
    }
}

#[tokio::test]
async fn test_create_source_derives_name() {
    let h = harness();

    let source = h
        .registry
        .create_source(
            "tenant-a",
            "https://github.com/acme/widgets.git/",
            Some("ghcr.io/acme".to_string()),
        )
        .await
        .unwrap();

    assert_eq!(source.name, "acme/widgets");
    assert_eq!(source.registry_url.as_deref(), Some("ghcr.io/acme"));
    assert!(source.workloads.is_empty());
    assert_eq!(h.registry.list_sources("tenant-a").await.unwrap().len(), 1);
    assert!(h.registry.list_sources("tenant-b").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_create_source_rejects_bare_name() {
    let h = harness();

    let err = h.registry.create_source("tenant-a", "widgets", None).await.unwrap_err();
    assert!(matches!(err, WorkloadError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_describe_skips_failures_without_aborting() {
    let h = harness();
    let widgets = h
        .registry
        .create_source("tenant-a", "https://github.com/acme/widgets", None)
        .await
        .unwrap();
    h.registry
        .create_source("tenant-a", "https://github.com/acme/secret", None)
        .await
        .unwrap();
    h.orchestrator.create_workload(request("web", widgets.id)).await.unwrap();

    // A stale list entry with no cluster object behind it.
    h.sources
        .push_workload(widgets.id, "vanished", Utc::now())
        .await
        .unwrap();

    let overviews = h.registry.describe_sources("tenant-a", false).await.unwrap();
    assert_eq!(overviews.len(), 2);

    let widgets_view = &overviews[0];
    assert_eq!(widgets_view.release.as_ref().unwrap().tag_name, "v2.0.0");
    assert_eq!(widgets_view.workloads.len(), 1);
    assert_eq!(widgets_view.workloads[0].name, "web");
    assert_eq!(widgets_view.source.workloads, vec!["web".to_string(), "vanished".to_string()]);

    let secret_view = &overviews[1];
    assert!(secret_view.release.is_none());
    assert!(secret_view.workloads.is_empty());
}

#[tokio::test]
async fn test_describe_skips_release_lookup_for_other_hosts() {
    let h = harness();
    h.registry
        .create_source("tenant-a", "https://gitlab.com/acme/widgets", None)
        .await
        .unwrap();

    let overviews = h.registry.describe_sources("tenant-a", false).await.unwrap();

    assert_eq!(overviews.len(), 1);
    assert_eq!(overviews[0].source.name, "acme/widgets");
    assert!(overviews[0].release.is_none());
}

#[tokio::test]
async fn test_foreign_tenant_cannot_see_source() {
    let h = harness();
    let source = h
        .registry
        .create_source("tenant-b", "https://github.com/acme/widgets", None)
        .await
        .unwrap();

    let err = h.registry.get_tenant_source("tenant-a", source.id).await.unwrap_err();
    assert!(matches!(err, WorkloadError::ReferenceNotFound(_)));

    let err = h
        .orchestrator
        .create_workload(request("web", source.id))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkloadError::ReferenceNotFound(_)));
    assert!(!h.cluster.has_workload("tenant-a", "web"));
    assert!(h.registry.get_source(source.id).await.unwrap().workloads.is_empty());
}

#[tokio::test]
async fn test_reconcile_rebuilds_drifted_list() {
    let h = harness();
    let source = h
        .registry
        .create_source("tenant-a", "https://github.com/acme/widgets", None)
        .await
        .unwrap();
    h.orchestrator.create_workload(request("web", source.id)).await.unwrap();
    h.orchestrator.create_workload(request("worker", source.id)).await.unwrap();

    h.sources
        .replace_workloads(source.id, &["ghost".to_string(), "web".to_string()], Utc::now())
        .await
        .unwrap();

    let reconciled = h.registry.reconcile_source(source.id).await.unwrap();
    assert_eq!(reconciled.workloads, vec!["web".to_string(), "worker".to_string()]);

    let stored = h.registry.get_source(source.id).await.unwrap();
    assert_eq!(stored.workloads, reconciled.workloads);
    assert!(stored.updated_at >= source.updated_at);
}

#[tokio::test]
async fn test_describe_with_reconcile_uses_fresh_list() {
    let h = harness();
    let source = h
        .registry
        .create_source("tenant-a", "https://github.com/acme/widgets", None)
        .await
        .unwrap();
    h.orchestrator.create_workload(request("web", source.id)).await.unwrap();
    h.sources
        .replace_workloads(source.id, &[], Utc::now())
        .await
        .unwrap();

    let overviews = h.registry.describe_sources("tenant-a", true).await.unwrap();

    assert_eq!(overviews[0].source.workloads, vec!["web".to_string()]);
    assert_eq!(overviews[0].workloads.len(), 1);
    assert!(h.cluster.has_workload("tenant-a", "web"));
}

#[tokio::test]
async fn test_unknown_source_is_reference_not_found() {
    let h = harness();

    let err = h.registry.reconcile_source(SourceId::new()).await.unwrap_err();
    assert!(matches!(err, WorkloadError::ReferenceNotFound(_)));
}
