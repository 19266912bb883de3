// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Workload Aggregate
//!
//! The metadata-store record of a workload and the read models composed from
//! it. A `WorkloadRecord` holds the intent (image, replicas, port). It mirrors
//! the live cluster object but does not control it.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Workload record, requests, and composed views

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::cluster::{WorkloadView, MAX_WORKLOAD_NAME_LEN};
use crate::domain::source::SourceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkloadId(pub Uuid);

impl WorkloadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkloadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkloadStatus {
    Active,
}

impl WorkloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadStatus::Active => "ACTIVE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(WorkloadStatus::Active),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadRecord {
    pub id: WorkloadId,
    pub name: String,
    pub namespace: String,
    pub image: String,
    pub replicas: i32,
    pub container_port: i32,
    pub source_id: SourceId,
    pub status: WorkloadStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkloadRecord {
    pub fn from_request(request: &CreateWorkloadRequest) -> Self {
        let now = Utc::now();
        Self {
            id: WorkloadId::new(),
            name: request.name.clone(),
            namespace: request.namespace.clone(),
            image: request.image.clone(),
            replicas: request.replicas,
            container_port: request.container_port,
            source_id: request.source_id,
            status: WorkloadStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateWorkloadRequest {
    pub name: String,
    pub namespace: String,
    pub image: String,
    pub replicas: i32,
    pub container_port: i32,
    pub source_id: SourceId,
}

impl CreateWorkloadRequest {
    /// Shape checks that run before any store or cluster call.
    pub fn validate(&self) -> Result<(), String> {
        if self.namespace.is_empty() {
            return Err("namespace cannot be empty".to_string());
        }
        if !is_dns_label(&self.namespace, 63) {
            return Err(format!("namespace '{}' is not a valid DNS-1123 label", self.namespace));
        }
        if self.name.is_empty() {
            return Err("workload name cannot be empty".to_string());
        }
        if !is_dns_label(&self.name, MAX_WORKLOAD_NAME_LEN) {
            return Err(format!(
                "workload name '{}' must be a DNS-1123 label of at most {} characters",
                self.name, MAX_WORKLOAD_NAME_LEN
            ));
        }
        if self.image.trim().is_empty() {
            return Err("image cannot be empty".to_string());
        }
        if self.replicas < 0 {
            return Err(format!("replicas must be non-negative, got {}", self.replicas));
        }
        if !(1..=65535).contains(&self.container_port) {
            return Err(format!("container_port {} is out of range", self.container_port));
        }
        Ok(())
    }
}

fn is_dns_label(value: &str, max_len: usize) -> bool {
    let bytes = value.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= max_len
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        && bytes[0] != b'-'
        && bytes[bytes.len() - 1] != b'-'
}

/// Replica value meaning "keep the current replica count".
pub const KEEP_REPLICAS: i32 = -1;

/// Requested change to a workload. An empty image and [`KEEP_REPLICAS`] are
/// sentinels for "keep current".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadUpdate {
    pub image: String,
    pub replicas: i32,
}

impl WorkloadUpdate {
    pub fn keep_all() -> Self {
        Self {
            image: String::new(),
            replicas: KEEP_REPLICAS,
        }
    }

    /// Resolves sentinels against the stored record into `(image, replicas)`.
    pub fn resolve(&self, current: &WorkloadRecord) -> Result<(String, i32), String> {
        let replicas = match self.replicas {
            KEEP_REPLICAS => current.replicas,
            r if r < 0 => return Err(format!("replicas must be non-negative or -1, got {}", r)),
            r => r,
        };
        let image = if self.image.is_empty() {
            current.image.clone()
        } else {
            self.image.clone()
        };
        Ok((image, replicas))
    }
}

/// Result of an update: whether the cluster and store were touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOutcome {
    pub applied: bool,
    pub image: String,
    pub replicas: i32,
}

/// Endpoint address, or the `UNDEFINED` sentinel when none could be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointAddress {
    Assigned(String),
    Undefined,
}

impl EndpointAddress {
    pub fn as_str(&self) -> &str {
        match self {
            EndpointAddress::Assigned(addr) => addr,
            EndpointAddress::Undefined => "UNDEFINED",
        }
    }
}

impl Serialize for EndpointAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EndpointAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "UNDEFINED" => EndpointAddress::Undefined,
            _ => EndpointAddress::Assigned(s),
        })
    }
}

/// Stored intent joined with live cluster state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadDetails {
    pub record: WorkloadRecord,
    /// Absent when the cluster object is missing or could not be read.
    pub live: Option<WorkloadView>,
    pub endpoint: EndpointAddress,
}

/// Aggregated view of a tenant namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSummary {
    pub namespace: String,
    pub cluster_version: String,
    pub pods: usize,
    pub workloads: usize,
    pub endpoints: usize,
}
