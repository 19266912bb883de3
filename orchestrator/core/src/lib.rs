// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! deployd core
//!
//! Provisions, updates and tears down tenant workloads on a shared cluster
//! while keeping a metadata record of each workload in step with the live
//! cluster objects.
//!
//! # Architecture
//!
//! - **domain:** cluster contract, records, repository traits, configuration
//! - **application:** orchestrator, source registry, saga runner
//! - **infrastructure:** Kubernetes and in-memory clusters, PostgreSQL and in-memory stores, release lookup
//! - **presentation:** HTTP API

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
