// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Cluster Resource Adapter
//!
//! Domain contract for the live cluster: translating workload and endpoint
//! intents into cluster resources, reading them back as typed views, and
//! deriving rollout status from replica counts.
//!
//! Nothing here is persisted. Every call reflects the cluster's current state,
//! and implementations never cache.
//!
//! | Implementation | Backend |
//! |----------------|---------|
//! | `KubernetesClusterAdapter` | Kubernetes API server via `kube` |
//! | `InMemoryCluster` | process-local simulation (development, tests) |
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Cluster-side port of the workload lifecycle

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg(test)]
use mockall::automock;

/// Label key used for both the pod template and the endpoint selector.
pub const APP_LABEL: &str = "app";

/// Memory-backed scratch volume attached to every workload.
pub const SCRATCH_VOLUME_NAME: &str = "tmpfs-storage";
pub const SCRATCH_MOUNT_PATH: &str = "/tmp";

/// Per-container limits. These do not depend on the requested resources.
pub const CPU_LIMIT: &str = "0.5";
pub const MEMORY_LIMIT: &str = "0.5Gi";

/// Request floor applied to every workload the orchestrator creates.
pub const CPU_REQUEST: &str = "50m";
pub const MEMORY_REQUEST: &str = "0.2Gi";

/// Rolling update parameters.
pub const MAX_SURGE: i32 = 1;
pub const MAX_UNAVAILABLE: i32 = 1;

/// Externally exposed port of every endpoint.
pub const ENDPOINT_PORT: i32 = 80;

const ENDPOINT_SUFFIX: &str = "-service";

/// Name of the endpoint that fronts `workload`.
pub fn endpoint_name(workload: &str) -> String {
    format!("{}{}", workload, ENDPOINT_SUFFIX)
}

/// Longest workload name whose endpoint name still fits a DNS-1123 label.
pub const MAX_WORKLOAD_NAME_LEN: usize = 63 - ENDPOINT_SUFFIX.len();

/// Desired state of a cluster workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSpec {
    pub namespace: String,
    pub name: String,
    pub image: String,
    pub replicas: i32,
    pub container_port: i32,
    pub cpu_request: String,
    pub memory_request: String,
}

/// Desired state of a load-balanced endpoint in front of a workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSpec {
    pub namespace: String,
    pub name: String,
    pub target_workload: String,
    pub port: i32,
    pub target_port: i32,
}

/// Rollout status derived from replica counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DerivedStatus {
    Unavailable,
    Progressing,
    Available,
}

impl fmt::Display for DerivedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DerivedStatus::Unavailable => write!(f, "Unavailable"),
            DerivedStatus::Progressing => write!(f, "Progressing"),
            DerivedStatus::Available => write!(f, "Available"),
        }
    }
}

pub fn derive_status(desired: i32, available: i32) -> DerivedStatus {
    if available <= 0 {
        DerivedStatus::Unavailable
    } else if available < desired {
        DerivedStatus::Progressing
    } else {
        DerivedStatus::Available
    }
}

/// Human-readable age of a cluster object.
///
/// Missing or future timestamps render as "just now".
pub fn format_age(created_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(created_at) = created_at else {
        return "just now".to_string();
    };
    let elapsed = now.signed_duration_since(created_at);
    if elapsed.num_seconds() < 60 {
        "just now".to_string()
    } else if elapsed.num_hours() < 24 {
        format!("{} minutes ago", elapsed.num_minutes())
    } else {
        format!("{} days ago", elapsed.num_days())
    }
}

/// Live view of a cluster workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadView {
    pub name: String,
    pub namespace: String,
    pub desired_replicas: i32,
    pub current_replicas: i32,
    pub available_replicas: i32,
    pub status: DerivedStatus,
    pub age: String,
    pub image: String,
    pub created_at: Option<DateTime<Utc>>,
    /// Raw workload spec as reported by the cluster.
    pub spec: serde_json::Value,
}

/// Outcome of an idempotent create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    Created,
    Existing,
}

/// Outcome of an idempotent delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removed {
    Deleted,
    Absent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterEvent {
    pub name: String,
    pub reason: String,
    pub message: String,
    pub last_timestamp: Option<DateTime<Utc>>,
}

impl fmt::Display for ClusterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let time = self
            .last_timestamp
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string());
        write!(
            f,
            "Event: {} | Reason: {} | Message: {} | Time: {}",
            self.name, self.reason, self.message, time
        )
    }
}

/// Newest `top_k` events, one descriptive line each.
///
/// The sort is stable, so events sharing a timestamp keep the order the
/// cluster listed them in. Untimed events sort after every timed one.
pub fn format_recent_events(mut events: Vec<ClusterEvent>, top_k: usize) -> Vec<String> {
    events.sort_by(|a, b| match (a.last_timestamp, b.last_timestamp) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    events.truncate(top_k);
    events.iter().map(ToString::to_string).collect()
}

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("{kind} '{name}' not found in namespace '{namespace}'")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("{kind} '{name}' already exists in namespace '{namespace}'")]
    AlreadyExists {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("endpoint '{name}' in namespace '{namespace}' has no address assigned yet")]
    NoAddressAvailable { namespace: String, name: String },

    #[error("cluster API unavailable: {0}")]
    Unavailable(String),

    #[error("cluster call '{operation}' timed out after {timeout_secs}s")]
    Timeout {
        operation: &'static str,
        timeout_secs: u64,
    },
}

/// Cluster-side port used by the orchestrator.
///
/// Creates of namespaces and endpoints are idempotent, as are both deletes.
/// Creating a workload that already exists fails with
/// [`ClusterError::AlreadyExists`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterResourceAdapter: Send + Sync {
    async fn create_namespace(&self, name: &str) -> Result<Provisioned, ClusterError>;

    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<(), ClusterError>;

    async fn create_endpoint(&self, spec: &EndpointSpec) -> Result<Provisioned, ClusterError>;

    async fn get_workload(&self, namespace: &str, name: &str) -> Result<WorkloadView, ClusterError>;

    /// `http://<ip-or-hostname>:<port>` of the endpoint's first ingress entry.
    async fn get_endpoint_address(&self, namespace: &str, name: &str) -> Result<String, ClusterError>;

    /// Overwrites desired replicas and the first container's image. Last writer wins.
    async fn update_replicas_and_image(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
        image: &str,
    ) -> Result<(), ClusterError>;

    async fn delete_workload(&self, namespace: &str, name: &str) -> Result<Removed, ClusterError>;

    async fn delete_endpoint(&self, namespace: &str, name: &str) -> Result<Removed, ClusterError>;

    async fn list_workloads(&self, namespace: &str) -> Result<Vec<WorkloadView>, ClusterError>;

    async fn list_endpoints(&self, namespace: &str) -> Result<Vec<String>, ClusterError>;

    async fn list_pods(&self, namespace: &str) -> Result<Vec<String>, ClusterError>;

    async fn list_namespaces(&self) -> Result<Vec<String>, ClusterError>;

    async fn list_nodes(&self) -> Result<Vec<String>, ClusterError>;

    async fn cluster_version(&self) -> Result<String, ClusterError>;

    async fn recent_events(&self, namespace: &str, top_k: usize) -> Result<Vec<String>, ClusterError>;
}
