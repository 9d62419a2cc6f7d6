// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of PlexLock.
//
// PlexLock is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// PlexLock is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with PlexLock. If not, see <https://www.gnu.org/licenses/>.

//! PlexLock server binary.

use anyhow::{Context, Result};
use clap::Parser;
use plexlock_common::SystemClock;
use plexlock_expiration::{LockReaper, TtlRegistry};
use plexlock_proto::LockServiceServer;
use plexlock_server::config::{DatabaseDriver, ServerConfig};
use plexlock_server::tls::server_tls_config;
use plexlock_server::tracing_setup::init_tracing;
use plexlock_server::{LockHandler, LockServiceImpl};
use plexlock_store::sql::{PostgresLockStore, SqliteLockStore};
use plexlock_store::LockStore;
use std::sync::Arc;
use tonic::transport::Server;
use tracing::info;

#[derive(Parser)]
#[command(name = "plexlock")]
#[command(about = "PlexLock - distributed lock service with TTL expiration", long_about = None)]
struct Cli {
    /// Path to the YAML config file
    #[arg(short, long)]
    config: String,
}

async fn build_store(config: &ServerConfig) -> Result<Arc<dyn LockStore>> {
    let store: Arc<dyn LockStore> = match config.database_driver {
        DatabaseDriver::Sqlite => Arc::new(
            SqliteLockStore::new(
                &config.database_connection_string,
                config.max_open_database_connections,
            )
            .await
            .context("connecting SQLite store")?,
        ),
        DatabaseDriver::Postgres => Arc::new(
            PostgresLockStore::new(
                &config.database_connection_string,
                config.max_open_database_connections,
            )
            .await
            .context("connecting PostgreSQL store")?,
        ),
    };
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ServerConfig::load(&cli.config)
        .await
        .with_context(|| format!("loading config from {}", cli.config))?;

    init_tracing(&config.log_level);
    info!(listen_address = %config.listen_address, "starting plexlock server");

    let store = build_store(&config).await?;
    let clock = Arc::new(SystemClock::new());
    let reaper = LockReaper::new(store.clone(), clock);

    // Rows persisted by a previous process still need collecting. Their
    // elapsed time restarts: each gets a full TTL from boot.
    let existing = store.fetch_all(None).await?;
    for record in &existing {
        reaper.register_ttl(record);
    }
    if !existing.is_empty() {
        info!(count = existing.len(), "re-registered timers for persisted locks");
    }

    let registry: Arc<dyn TtlRegistry> = Arc::new(reaper.clone());
    let handler = Arc::new(LockHandler::new(store, registry));
    let service = LockServiceImpl::new(handler);

    let addr = config
        .listen_address
        .parse()
        .with_context(|| format!("invalid listen address {}", config.listen_address))?;

    let mut builder = Server::builder();
    if config.tls_enabled() {
        let tls = server_tls_config(&config).await?;
        builder = builder.tls_config(tls).context("configuring TLS")?;
        info!("mutual TLS enabled");
    }

    builder
        .add_service(LockServiceServer::new(service))
        .serve_with_shutdown(addr, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("serving gRPC")?;

    reaper.shutdown();
    info!("plexlock server stopped");
    Ok(())
}
