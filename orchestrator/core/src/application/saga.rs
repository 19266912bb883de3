// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Mutation Saga
//!
//! No transaction spans the cluster and the metadata store, so every mutating
//! workload operation runs as a saga: an ordered list of forward steps, each
//! optionally paired with a compensating action.
//!
//! When a step fails, [`Saga::abort`] either runs the recorded compensations
//! in reverse order ([`ConsistencyPolicy::Compensate`]) or leaves completed
//! steps in place ([`ConsistencyPolicy::LeaveAsIs`]). Either way the caller
//! receives a [`WorkloadError::StepFailed`] naming the failed step and what
//! happened to the completed ones.
//!
//! Compensations are lazy futures. Building one has no side effects.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Cross-store consistency for workload mutations

use futures::future::BoxFuture;
use serde::Serialize;
use std::fmt;
use tracing::{error, info, warn};

use crate::application::errors::WorkloadError;
pub use crate::domain::service_config::ConsistencyPolicy;

/// Deferred compensating action.
pub type Compensation = BoxFuture<'static, Result<(), WorkloadError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SagaStep {
    CreateClusterWorkload,
    CreateClusterEndpoint,
    InsertRecord,
    UpdateClusterWorkload,
    PatchRecord,
    DeleteClusterWorkload,
    DeleteClusterEndpoint,
    DeleteRecord,
}

impl fmt::Display for SagaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SagaStep::CreateClusterWorkload => "create-cluster-workload",
            SagaStep::CreateClusterEndpoint => "create-cluster-endpoint",
            SagaStep::InsertRecord => "insert-record",
            SagaStep::UpdateClusterWorkload => "update-cluster-workload",
            SagaStep::PatchRecord => "patch-record",
            SagaStep::DeleteClusterWorkload => "delete-cluster-workload",
            SagaStep::DeleteClusterEndpoint => "delete-cluster-endpoint",
            SagaStep::DeleteRecord => "delete-record",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedCompensation {
    pub step: SagaStep,
    pub error: String,
}

/// What happened to the steps that completed before a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RollbackOutcome {
    /// The failed step was the first side effect.
    NotNeeded,
    /// Policy is leave-as-is. Completed steps remain.
    Skipped { left_in_place: Vec<SagaStep> },
    /// Every compensation succeeded.
    Completed { undone: Vec<SagaStep> },
    /// At least one compensation failed.
    Partial {
        undone: Vec<SagaStep>,
        failed: Vec<FailedCompensation>,
    },
}

impl RollbackOutcome {
    /// True when no side effect of the failed call remains.
    pub fn is_clean(&self) -> bool {
        matches!(self, RollbackOutcome::NotNeeded | RollbackOutcome::Completed { .. })
    }
}

fn join_steps(steps: &[SagaStep]) -> String {
    steps.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for RollbackOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackOutcome::NotNeeded => write!(f, "nothing to roll back"),
            RollbackOutcome::Skipped { left_in_place } => {
                write!(f, "left in place: {}", join_steps(left_in_place))
            }
            RollbackOutcome::Completed { undone } => {
                write!(f, "rolled back: {}", join_steps(undone))
            }
            RollbackOutcome::Partial { undone, failed } => {
                let failed: Vec<SagaStep> = failed.iter().map(|f| f.step).collect();
                write!(
                    f,
                    "partially rolled back: undone [{}], failed [{}]",
                    join_steps(undone),
                    join_steps(&failed)
                )
            }
        }
    }
}

struct CompletedStep {
    step: SagaStep,
    compensation: Option<Compensation>,
}

pub struct Saga {
    operation: &'static str,
    policy: ConsistencyPolicy,
    completed: Vec<CompletedStep>,
}

impl Saga {
    pub fn begin(operation: &'static str, policy: ConsistencyPolicy) -> Self {
        Self {
            operation,
            policy,
            completed: Vec::new(),
        }
    }

    /// Marks `step` as done. `None` means the step left nothing to undo.
    pub fn record(&mut self, step: SagaStep, compensation: Option<Compensation>) {
        self.completed.push(CompletedStep { step, compensation });
    }

    pub fn completed_steps(&self) -> Vec<SagaStep> {
        self.completed.iter().map(|c| c.step).collect()
    }

    /// Ends the saga after `step` failed with `cause`.
    pub async fn abort(self, step: SagaStep, cause: WorkloadError) -> WorkloadError {
        let operation = self.operation;
        let rollback = self.rollback().await;

        error!(
            operation,
            step = %step,
            rollback = %rollback,
            "Saga aborted: {}",
            cause
        );

        WorkloadError::StepFailed {
            operation,
            step,
            rollback,
            source: Box::new(cause),
        }
    }

    /// Ends the saga successfully, discarding compensations.
    pub fn commit(self) -> Vec<SagaStep> {
        self.completed_steps()
    }

    async fn rollback(self) -> RollbackOutcome {
        if self.completed.is_empty() {
            return RollbackOutcome::NotNeeded;
        }

        if self.policy == ConsistencyPolicy::LeaveAsIs {
            return RollbackOutcome::Skipped {
                left_in_place: self.completed_steps(),
            };
        }

        let mut undone = Vec::new();
        let mut failed = Vec::new();
        for completed in self.completed.into_iter().rev() {
            let Some(compensation) = completed.compensation else {
                continue;
            };
            match compensation.await {
                Ok(()) => {
                    info!(operation = self.operation, step = %completed.step, "Compensated saga step");
                    undone.push(completed.step);
                }
                Err(e) => {
                    warn!(
                        operation = self.operation,
                        step = %completed.step,
                        "Compensation failed: {}",
                        e
                    );
                    failed.push(FailedCompensation {
                        step: completed.step,
                        error: e.to_string(),
                    });
                }
            }
        }

        if failed.is_empty() {
            RollbackOutcome::Completed { undone }
        } else {
            RollbackOutcome::Partial { undone, failed }
        }
    }
}
