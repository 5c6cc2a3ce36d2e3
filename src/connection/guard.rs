// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for a client's admission slot.

use crate::core::metrics;
use std::net::SocketAddr;
use tokio::sync::OwnedSemaphorePermit;
use tracing::debug;

/// Holds a client's slot in the admission pool for as long as the
/// connection is served. Dropping the guard frees the slot, however the
/// connection task ends.
pub struct ConnectionGuard {
    pub(crate) session_id: u64,
    pub(crate) addr: SocketAddr,
    _permit: OwnedSemaphorePermit,
}

impl ConnectionGuard {
    pub fn new(session_id: u64, addr: SocketAddr, permit: OwnedSemaphorePermit) -> Self {
        metrics::CONNECTED_CLIENTS.inc();
        Self {
            session_id,
            addr,
            _permit: permit,
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        metrics::CONNECTED_CLIENTS.dec();
        debug!(
            "ConnectionGuard dropping, releasing slot of client {} ({})",
            self.session_id, self.addr
        );
    }
}
