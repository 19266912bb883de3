// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod db;
pub mod in_memory_cluster;
pub mod kubernetes;
pub mod release_catalog;
pub mod repositories;

pub use in_memory_cluster::{ClusterOp, InMemoryCluster};
pub use kubernetes::KubernetesClusterAdapter;
pub use release_catalog::GitHubReleaseCatalog;
