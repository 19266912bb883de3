// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod errors;
pub mod saga;
pub mod source_registry;
pub mod workload_orchestrator;
pub mod repository_factory;

// Re-export services for convenience
pub use errors::{ErrorKind, WorkloadError};
pub use saga::{ConsistencyPolicy, RollbackOutcome, SagaStep};
pub use source_registry::{SourceRegistry, StandardSourceRegistry};
pub use workload_orchestrator::{StandardWorkloadOrchestrator, WorkloadOrchestrator};
