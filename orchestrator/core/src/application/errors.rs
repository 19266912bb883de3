// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Workload Errors
//!
//! Error taxonomy surfaced by the orchestrator and the source registry.
//! Adapter and repository errors are folded into it at the application
//! boundary. A failure inside a multi-step mutation is wrapped in
//! [`WorkloadError::StepFailed`], which keeps the root cause and reports the
//! rollback outcome.

use serde::Serialize;

use crate::application::saga::{RollbackOutcome, SagaStep};
use crate::domain::cluster::ClusterError;
use crate::domain::repository::RepositoryError;

/// Root classification of a [`WorkloadError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    ReferenceNotFound,
    NotFound,
    Conflict,
    NoAddressAvailable,
    UpstreamUnavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkloadError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("source record '{0}' not found")]
    ReferenceNotFound(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NoAddressAvailable(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("{operation} failed at step '{step}' ({rollback}): {source}")]
    StepFailed {
        operation: &'static str,
        step: SagaStep,
        rollback: RollbackOutcome,
        source: Box<WorkloadError>,
    },
}

impl WorkloadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkloadError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            WorkloadError::ReferenceNotFound(_) => ErrorKind::ReferenceNotFound,
            WorkloadError::NotFound(_) => ErrorKind::NotFound,
            WorkloadError::Conflict(_) => ErrorKind::Conflict,
            WorkloadError::NoAddressAvailable(_) => ErrorKind::NoAddressAvailable,
            WorkloadError::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            WorkloadError::StepFailed { source, .. } => source.kind(),
        }
    }

    /// False when the failed call left side effects behind, so a blind retry
    /// may hit `Conflict` on the cluster or duplicate state in the store.
    pub fn retry_safe(&self) -> bool {
        match self {
            WorkloadError::StepFailed { rollback, .. } => rollback.is_clean(),
            _ => true,
        }
    }

    pub fn failed_step(&self) -> Option<SagaStep> {
        match self {
            WorkloadError::StepFailed { step, .. } => Some(*step),
            _ => None,
        }
    }

    pub fn rollback(&self) -> Option<&RollbackOutcome> {
        match self {
            WorkloadError::StepFailed { rollback, .. } => Some(rollback),
            _ => None,
        }
    }
}

impl From<ClusterError> for WorkloadError {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::NotFound { .. } => WorkloadError::NotFound(err.to_string()),
            ClusterError::AlreadyExists { .. } => WorkloadError::Conflict(err.to_string()),
            ClusterError::NoAddressAvailable { .. } => WorkloadError::NoAddressAvailable(err.to_string()),
            ClusterError::Unavailable(_) | ClusterError::Timeout { .. } => {
                WorkloadError::UpstreamUnavailable(err.to_string())
            }
        }
    }
}

impl From<RepositoryError> for WorkloadError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(msg) => WorkloadError::NotFound(msg),
            other => WorkloadError::UpstreamUnavailable(other.to_string()),
        }
    }
}
