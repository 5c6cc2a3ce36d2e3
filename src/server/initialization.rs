// src/server/initialization.rs

//! Handles gateway initialization: session bootstrap against the data
//! source, startup point registration, and listener setup.

use super::context::ServerContext;
use crate::config::Config;
use crate::core::driver::DataSourceDriver;
use crate::core::session::Session;
use crate::core::state::GatewayState;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Initializes all gateway components before starting the main loop.
pub async fn setup(config: Config, driver: Arc<dyn DataSourceDriver>) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let state = GatewayState::new(config, driver);
    info!("Gateway state initialized.");

    let bootstrap_state = state.clone();
    tokio::task::spawn_blocking(move || {
        bootstrap_session(&bootstrap_state.session, &bootstrap_state.config)
    })
    .await
    .context("Session bootstrap task failed")??;

    let listener = TcpListener::bind((state.config.host.as_str(), state.config.port))
        .await
        .with_context(|| {
            format!(
                "Failed to bind {}:{}",
                state.config.host, state.config.port
            )
        })?;
    info!("opcgate listening on {}", listener.local_addr()?);

    let connection_permits = Arc::new(Semaphore::new(state.config.pool_size));

    Ok(ServerContext {
        state,
        listener,
        shutdown_tx,
        background_tasks: JoinSet::new(),
        connection_permits,
    })
}

/// Connects the session and prepares it to serve clients.
///
/// A source that cannot be connected is fatal. Points that fail to
/// register are logged and skipped; clients simply see them as unknown.
fn bootstrap_session(session: &Session, config: &Config) -> Result<()> {
    session
        .connect(&config.source.name)
        .with_context(|| format!("Failed to connect to data source '{}'", config.source.name))?;
    info!("Connected to data source '{}'.", config.source.name);

    if let Err(e) = session.start_notifications() {
        warn!("Change notifications are unavailable: {}", e);
    }

    let mut registered = 0;
    for point in &config.points {
        match session.add_point(&point.id, point.data_type) {
            Ok(p) => {
                registered += 1;
                info!(
                    "Registered point '{}' as {} (handle {}).",
                    p.id, p.data_type, p.handle
                );
            }
            Err(e) => warn!("Skipping point '{}': {}", point.id, e),
        }
    }
    info!(
        "{} of {} configured points registered.",
        registered,
        config.points.len()
    );

    if config.source.activate_on_start {
        session
            .set_group_state(true)
            .context("Failed to activate the subscription group")?;
        info!("Subscription group activated.");
    }
    Ok(())
}

/// Logs key configuration parameters at startup.
fn log_startup_info(config: &Config) {
    info!(
        "Gateway configured with a pool of {} workers and a {} byte request limit.",
        config.pool_size, config.max_request_length
    );
    info!(
        "Data source '{}' with an update rate of {} ms.",
        config.source.name, config.source.update_rate_ms
    );
    if config.source.verify_writes {
        info!("Write verification is enabled; every write is read back.");
    }
}
