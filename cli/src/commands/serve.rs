// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `deployd serve`: wires configuration into services and runs the HTTP API
//! until Ctrl+C or SIGTERM.

use anyhow::{Context, Result};
use axum::Router;
use clap::Args;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use deployd_core::application::repository_factory::{create_source_repository, create_workload_repository};
use deployd_core::application::{SourceRegistry, StandardSourceRegistry, StandardWorkloadOrchestrator, WorkloadOrchestrator};
use deployd_core::domain::cluster::ClusterResourceAdapter;
use deployd_core::domain::repository::StorageBackend;
use deployd_core::domain::service_config::{ClusterBackend, ServiceConfigManifest};
use deployd_core::domain::source::ReleaseCatalog;
use deployd_core::infrastructure::db::Database;
use deployd_core::infrastructure::{GitHubReleaseCatalog, InMemoryCluster, KubernetesClusterAdapter};
use deployd_core::presentation::api;

#[derive(Args, Default)]
pub struct ServeArgs {
    /// HTTP API port (overrides spec.server.port)
    #[arg(long)]
    pub port: Option<u16>,

    /// HTTP API bind address (overrides spec.server.bind_address)
    #[arg(long)]
    pub host: Option<String>,
}

pub struct Services {
    pub orchestrator: Arc<dyn WorkloadOrchestrator>,
    pub registry: Arc<dyn SourceRegistry>,
}

async fn build_cluster(config: &ServiceConfigManifest) -> Result<Arc<dyn ClusterResourceAdapter>> {
    let cluster = &config.spec.cluster;
    match cluster.backend {
        ClusterBackend::Kubernetes => {
            let adapter = KubernetesClusterAdapter::connect(cluster.context.as_deref(), cluster.request_timeout)
                .await
                .context("Failed to connect to Kubernetes")?;
            Ok(Arc::new(adapter))
        }
        ClusterBackend::InMemory => {
            warn!("Using in-memory cluster backend; nothing is scheduled on a real cluster");
            Ok(Arc::new(InMemoryCluster::new()))
        }
    }
}

fn build_release_catalog(config: &ServiceConfigManifest) -> Result<Option<Arc<dyn ReleaseCatalog>>> {
    let releases = &config.spec.releases;
    if !releases.enabled {
        info!("Release lookups disabled");
        return Ok(None);
    }
    let token = releases.resolved_token().context("Failed to resolve release API token")?;
    let catalog: Arc<dyn ReleaseCatalog> = Arc::new(
        GitHubReleaseCatalog::new(&releases.api_base, token, releases.timeout)
            .context("Failed to build release API client")?,
    );
    Ok(Some(catalog))
}

/// Builds every service from configuration. PostgreSQL storage is migrated
/// before use.
pub async fn build_services(config: &ServiceConfigManifest) -> Result<Services> {
    let cluster = build_cluster(config).await?;

    let backend = config.spec.storage.backend().context("Invalid storage configuration")?;
    let pool = match &backend {
        StorageBackend::PostgreSQL(pg) => {
            let db = Database::new(pg).await?;
            db.migrate().await?;
            info!("PostgreSQL storage ready");
            Some(db.get_pool().clone())
        }
        StorageBackend::InMemory => {
            warn!("Using in-memory storage; records are lost on restart");
            None
        }
    };
    let workloads = create_workload_repository(&backend, pool.clone());
    let sources = create_source_repository(&backend, pool);

    let registry: Arc<dyn SourceRegistry> = Arc::new(StandardSourceRegistry::new(
        sources,
        workloads.clone(),
        cluster.clone(),
        build_release_catalog(config)?,
    ));
    let orchestrator: Arc<dyn WorkloadOrchestrator> = Arc::new(StandardWorkloadOrchestrator::new(
        cluster,
        workloads,
        registry.clone(),
        config.spec.consistency.policy,
    ));
    info!(policy = ?config.spec.consistency.policy, "Services initialized");

    Ok(Services { orchestrator, registry })
}

pub async fn build_router(config: &ServiceConfigManifest) -> Result<Router> {
    let services = build_services(config).await?;
    Ok(api::app(services.orchestrator, services.registry))
}

pub async fn execute(args: ServeArgs, config: ServiceConfigManifest) -> Result<()> {
    config.validate().context("Configuration validation failed")?;

    let app = build_router(&config).await?;

    let host = args.host.unwrap_or_else(|| config.spec.server.bind_address.clone());
    let port = args.port.unwrap_or(config.spec.server.port);
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("deployd listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("deployd shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
