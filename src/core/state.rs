// src/core/state.rs

//! Defines `GatewayState`, the state shared by every connection task.

use crate::config::Config;
use crate::core::driver::DataSourceDriver;
use crate::core::notifications::PendingChanges;
use crate::core::session::Session;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared gateway state, wrapped in an `Arc` and handed to every connection.
pub struct GatewayState {
    /// The single session against the data source.
    pub session: Arc<Session>,
    /// Changes emitted by the notification pipeline, waiting for `GETCHANGED`.
    pub pending: Arc<PendingChanges>,
    /// Serializes client reads against the data source.
    pub read_lock: Mutex<()>,
    /// Serializes client writes against the data source.
    pub write_lock: Mutex<()>,
    pub config: Config,
}

impl GatewayState {
    /// Builds the shared state and routes emitted changes into the pending buffer.
    pub fn new(config: Config, driver: Arc<dyn DataSourceDriver>) -> Arc<Self> {
        let session = Arc::new(Session::new(driver, config.source.session_config()));
        let pending = Arc::new(PendingChanges::new());

        let sink = pending.clone();
        session
            .pipeline()
            .set_handler(move |changes| sink.push_all(changes));

        Arc::new(Self {
            session,
            pending,
            read_lock: Mutex::new(()),
            write_lock: Mutex::new(()),
            config,
        })
    }
}
