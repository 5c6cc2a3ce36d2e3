// src/server/mod.rs

use crate::config::Config;
use crate::core::driver::DataSourceDriver;
use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;

mod connection_loop;
mod context;
mod initialization;
mod metrics_server;
mod spawner;

pub use context::ServerContext;

/// Initializes the gateway: bootstraps the session and binds the listener.
///
/// The returned context is ready to be passed to [`serve`].
pub async fn bind(config: Config, driver: Arc<dyn DataSourceDriver>) -> Result<ServerContext> {
    initialization::setup(config, driver).await
}

/// Spawns the background tasks and serves clients until `shutdown` resolves,
/// then tears the session down.
pub async fn serve<F>(mut ctx: ServerContext, shutdown: F)
where
    F: Future<Output = ()>,
{
    spawner::spawn_all(&mut ctx);
    connection_loop::run(ctx, shutdown).await;
}

/// The main gateway startup function, running until SIGINT or SIGTERM.
pub async fn run(config: Config, driver: Arc<dyn DataSourceDriver>) -> Result<()> {
    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;

    let ctx = bind(config, driver).await?;
    serve(ctx, async move {
        tokio::select! {
            _ = sigint.recv() => info!("SIGINT received, initiating graceful shutdown."),
            _ = sigterm.recv() => info!("SIGTERM received, initiating graceful shutdown."),
        }
    })
    .await;
    Ok(())
}
