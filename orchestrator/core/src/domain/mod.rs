// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Aggregates, ports, and configuration types for workload orchestration.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types and traits with no infrastructure wiring

pub mod cluster;
pub mod repository;
pub mod service_config;
pub mod source;
pub mod workload;
