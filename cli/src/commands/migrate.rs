// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Database Migrate Command
//!
//! `deployd migrate` applies the embedded PostgreSQL migrations so the schema
//! matches the binary. `--dry-run` lists pending migrations without applying
//! them.
//!
//! Requires `spec.storage.backend: postgres` (or `DEPLOYD_DATABASE_URL`).

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use deployd_core::domain::repository::{PostgresConfig, StorageBackend};
use deployd_core::domain::service_config::ServiceConfigManifest;
use deployd_core::infrastructure::db::{Database, MIGRATOR};

#[derive(Args)]
pub struct MigrateCommand {
    /// List pending migrations without applying them
    #[arg(long)]
    dry_run: bool,
}

pub async fn execute(cmd: MigrateCommand, config: &ServiceConfigManifest) -> Result<()> {
    println!("{}", "deployd migrate".bold().green());

    let pg = match config.spec.storage.backend().context("Invalid storage configuration")? {
        StorageBackend::PostgreSQL(pg) => pg,
        StorageBackend::InMemory => {
            bail!("Storage backend is in-memory; set spec.storage.backend to postgres or DEPLOYD_DATABASE_URL")
        }
    };

    println!("Connecting to database...");
    let db = Database::new(&PostgresConfig {
        max_connections: 1,
        ..pg
    })
    .await?;

    let applied = db.applied_migrations().await?;
    let pending: Vec<_> = MIGRATOR
        .iter()
        .filter(|m| !applied.contains(&m.version))
        .collect();

    println!(
        "Migration status: {} applied, {} total available.",
        applied.len(),
        MIGRATOR.iter().count()
    );

    if pending.is_empty() {
        println!("{}", "✓ Database is up to date.".green());
        return Ok(());
    }

    if cmd.dry_run {
        println!("Pending migrations (dry run):");
        for migration in &pending {
            println!(" - {} {}", migration.version, migration.description);
        }
        println!("Skipping application due to --dry-run");
        return Ok(());
    }

    println!("Applying {} pending migration(s)...", pending.len());
    db.migrate().await?;
    println!("{}", "✓ Database updated successfully.".green());
    Ok(())
}
