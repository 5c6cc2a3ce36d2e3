// src/server/context.rs

use crate::core::state::GatewayState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;

/// Holds all the initialized state required to run the gateway's main loop.
pub struct ServerContext {
    pub state: Arc<GatewayState>,
    pub listener: TcpListener,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
    /// The admission gate: one permit per concurrently served client.
    pub connection_permits: Arc<Semaphore>,
}

impl ServerContext {
    /// The address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}
