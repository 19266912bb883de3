// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Source Records
//!
//! A source record registers an upstream code repository for a tenant.
//! Workloads must reference an existing source when they are created, and the
//! source keeps an ordered list of the workload names created from it.
//!
//! That list is a derived index. It is maintained best-effort by the
//! orchestrator and can drift from the workload records; reconciliation
//! rebuilds it from the records that actually reference the source.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Source aggregate and release lookup port

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::cluster::WorkloadView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(pub Uuid);

impl SourceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SourceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(SourceId)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: SourceId,
    pub url: String,
    /// `owner/repo`, derived from `url`.
    pub name: String,
    pub namespace: String,
    /// Where images built from this source are published.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_url: Option<String>,
    /// Names of workloads created from this source, oldest first.
    pub workloads: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SourceRecord {
    pub fn new(
        url: impl Into<String>,
        namespace: impl Into<String>,
        registry_url: Option<String>,
    ) -> Result<Self, InvalidSourceUrl> {
        let url = url.into();
        let name = derive_short_name(&url)?;
        let now = Utc::now();
        Ok(Self {
            id: SourceId::new(),
            url,
            name,
            namespace: namespace.into(),
            registry_url,
            workloads: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot derive a repository name from '{0}': expected at least owner/repo")]
pub struct InvalidSourceUrl(pub String);

/// `owner/repo` from a repository URL.
///
/// A trailing slash and a trailing `.git` are ignored.
pub fn derive_short_name(url: &str) -> Result<String, InvalidSourceUrl> {
    let trimmed = url.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    let parts: Vec<&str> = trimmed.split('/').filter(|p| !p.is_empty()).collect();
    match parts.as_slice() {
        [.., owner, repo] if !owner.ends_with(':') => Ok(format!("{}/{}", owner, repo)),
        _ => Err(InvalidSourceUrl(url.to_string())),
    }
}

/// Latest published release of a source repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub html_url: String,
    pub tag_name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReleaseLookupError {
    #[error("release API request failed: {0}")]
    Transport(String),

    #[error("release API returned status {status} for '{repository}'")]
    Status { repository: String, status: u16 },

    #[error("failed to decode release API response: {0}")]
    Decode(String),
}

/// Outbound lookup of the latest release of a repository (`owner/repo`).
#[async_trait]
pub trait ReleaseCatalog: Send + Sync {
    async fn latest_release(&self, repository: &str) -> Result<Option<ReleaseInfo>, ReleaseLookupError>;

    /// Whether repositories behind `source_url` are known to this catalog.
    /// Sources hosted elsewhere are never looked up.
    fn serves(&self, source_url: &str) -> bool {
        let _ = source_url;
        true
    }
}

/// A source record enriched with live workload views and its latest release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceOverview {
    pub source: SourceRecord,
    pub release: Option<ReleaseInfo>,
    pub workloads: Vec<WorkloadView>,
}
