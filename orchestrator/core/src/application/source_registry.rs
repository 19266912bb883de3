// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Source Registry Application Service
//!
//! Manages source records and their workload back-reference list:
//! - Create/get/list source records per tenant
//! - Push/pull workload names on behalf of the workload orchestrator
//! - Enriched reads joining live workload views and the latest release
//! - Reconciliation of the back-reference list against workload records

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::errors::WorkloadError;
use crate::domain::cluster::{ClusterResourceAdapter, WorkloadView};
use crate::domain::repository::{SourceRepository, WorkloadRepository};
use crate::domain::source::{ReleaseCatalog, SourceId, SourceOverview, SourceRecord};

// ============================================================================
// Service Trait
// ============================================================================

#[async_trait]
pub trait SourceRegistry: Send + Sync {
    /// Register a repository for a tenant
    async fn create_source(
        &self,
        namespace: &str,
        url: &str,
        registry_url: Option<String>,
    ) -> Result<SourceRecord, WorkloadError>;

    /// Fails with `ReferenceNotFound` when the record does not exist
    async fn get_source(&self, id: SourceId) -> Result<SourceRecord, WorkloadError>;

    /// Like `get_source`, scoped to a tenant. A record owned by another
    /// namespace is reported as `ReferenceNotFound`.
    async fn get_tenant_source(&self, namespace: &str, id: SourceId) -> Result<SourceRecord, WorkloadError> {
        let source = self.get_source(id).await?;
        if source.namespace != namespace {
            debug!(source = %id, namespace, owner = %source.namespace, "Source belongs to another tenant");
            return Err(WorkloadError::ReferenceNotFound(id.to_string()));
        }
        Ok(source)
    }

    async fn list_sources(&self, namespace: &str) -> Result<Vec<SourceRecord>, WorkloadError>;

    async fn attach_workload(&self, id: SourceId, workload: &str) -> Result<(), WorkloadError>;

    async fn detach_workload(&self, id: SourceId, workload: &str) -> Result<(), WorkloadError>;

    /// Sources of a tenant with live workload views and latest release.
    /// Per-workload and per-release failures are skipped, not fatal.
    async fn describe_sources(&self, namespace: &str, reconcile: bool) -> Result<Vec<SourceOverview>, WorkloadError>;

    /// Rebuild the workload list from the records that reference the source
    async fn reconcile_source(&self, id: SourceId) -> Result<SourceRecord, WorkloadError>;
}

// ============================================================================
// Standard Implementation
// ============================================================================

pub struct StandardSourceRegistry {
    sources: Arc<dyn SourceRepository>,
    workloads: Arc<dyn WorkloadRepository>,
    cluster: Arc<dyn ClusterResourceAdapter>,
    releases: Option<Arc<dyn ReleaseCatalog>>,
}

impl StandardSourceRegistry {
    pub fn new(
        sources: Arc<dyn SourceRepository>,
        workloads: Arc<dyn WorkloadRepository>,
        cluster: Arc<dyn ClusterResourceAdapter>,
        releases: Option<Arc<dyn ReleaseCatalog>>,
    ) -> Self {
        Self {
            sources,
            workloads,
            cluster,
            releases,
        }
    }

    async fn describe(&self, source: SourceRecord) -> SourceOverview {
        let views = join_all(
            source
                .workloads
                .iter()
                .map(|name| self.cluster.get_workload(&source.namespace, name)),
        )
        .await;

        let workloads: Vec<WorkloadView> = views
            .into_iter()
            .zip(source.workloads.iter())
            .filter_map(|(view, name)| match view {
                Ok(view) => Some(view),
                Err(e) => {
                    debug!(source = %source.id, workload = %name, "Skipping workload view: {}", e);
                    None
                }
            })
            .collect();

        let release = match &self.releases {
            Some(catalog) if catalog.serves(&source.url) => match catalog.latest_release(&source.name).await {
                Ok(release) => release,
                Err(e) => {
                    warn!(source = %source.id, repository = %source.name, "Release lookup failed: {}", e);
                    None
                }
            },
            Some(_) => {
                debug!(source = %source.id, url = %source.url, "Source host not served by release catalog");
                None
            }
            None => None,
        };

        SourceOverview {
            source,
            release,
            workloads,
        }
    }
}

#[async_trait]
impl SourceRegistry for StandardSourceRegistry {
    async fn create_source(
        &self,
        namespace: &str,
        url: &str,
        registry_url: Option<String>,
    ) -> Result<SourceRecord, WorkloadError> {
        if namespace.is_empty() {
            return Err(WorkloadError::InvalidRequest("namespace cannot be empty".to_string()));
        }
        let record = SourceRecord::new(url, namespace, registry_url)
            .map_err(|e| WorkloadError::InvalidRequest(e.to_string()))?;

        self.sources.insert(&record).await?;
        info!(source = %record.id, namespace, repository = %record.name, "Registered source");
        Ok(record)
    }

    async fn get_source(&self, id: SourceId) -> Result<SourceRecord, WorkloadError> {
        self.sources
            .find_by_id(id)
            .await?
            .ok_or_else(|| WorkloadError::ReferenceNotFound(id.to_string()))
    }

    async fn list_sources(&self, namespace: &str) -> Result<Vec<SourceRecord>, WorkloadError> {
        Ok(self.sources.find_by_namespace(namespace).await?)
    }

    async fn attach_workload(&self, id: SourceId, workload: &str) -> Result<(), WorkloadError> {
        self.sources.push_workload(id, workload, Utc::now()).await?;
        debug!(source = %id, workload, "Attached workload to source");
        Ok(())
    }

    async fn detach_workload(&self, id: SourceId, workload: &str) -> Result<(), WorkloadError> {
        self.sources.pull_workload(id, workload, Utc::now()).await?;
        debug!(source = %id, workload, "Detached workload from source");
        Ok(())
    }

    async fn describe_sources(&self, namespace: &str, reconcile: bool) -> Result<Vec<SourceOverview>, WorkloadError> {
        let mut sources = self.sources.find_by_namespace(namespace).await?;

        if reconcile {
            for source in sources.iter_mut() {
                match self.reconcile_source(source.id).await {
                    Ok(fresh) => *source = fresh,
                    Err(e) => warn!(source = %source.id, "Reconciliation failed, using stored list: {}", e),
                }
            }
        }

        Ok(join_all(sources.into_iter().map(|s| self.describe(s))).await)
    }

    async fn reconcile_source(&self, id: SourceId) -> Result<SourceRecord, WorkloadError> {
        let mut source = self.get_source(id).await?;
        let actual: Vec<String> = self
            .workloads
            .find_by_source(id)
            .await?
            .into_iter()
            .map(|r| r.name)
            .collect();

        if actual == source.workloads {
            return Ok(source);
        }

        let now = Utc::now();
        self.sources.replace_workloads(id, &actual, now).await?;
        info!(
            source = %id,
            stored = ?source.workloads,
            actual = ?actual,
            "Reconciled source workload list"
        );
        source.workloads = actual;
        source.updated_at = now;
        Ok(source)
    }
}
