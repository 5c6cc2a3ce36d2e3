// src/connection/handler.rs

//! Defines the `ConnectionHandler` which manages the full lifecycle of a client connection.

use super::guard::ConnectionGuard;
use crate::core::GatewayError;
use crate::core::handler::command_router::Router;
use crate::core::protocol::{GatewayCodec, Response};
use crate::core::state::GatewayState;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tokio_util::codec::Framed;
use tracing::{debug, info};

/// Serves one client: reads request lines, routes them, and writes exactly
/// one response line per request, until the peer closes or the gateway
/// shuts down.
pub struct ConnectionHandler<S> {
    framed: Framed<S, GatewayCodec>,
    router: Router,
    addr: SocketAddr,
    session_id: u64,
    shutdown_rx: broadcast::Receiver<()>,
    guard: ConnectionGuard,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        socket: S,
        state: Arc<GatewayState>,
        guard: ConnectionGuard,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let codec = GatewayCodec::new(state.config.max_request_length);
        let addr = guard.addr;
        let session_id = guard.session_id;
        Self {
            framed: Framed::new(socket, codec),
            router: Router::new(state, session_id, addr),
            addr,
            session_id,
            shutdown_rx,
            guard,
        }
    }

    /// The main event loop for the connection.
    ///
    /// Returns `Ok` when the peer closes the connection or the gateway shuts
    /// down, and `Err` when the transport fails.
    pub async fn run(mut self) -> Result<(), GatewayError> {
        loop {
            tokio::select! {
                // Prioritize shutdown over pending requests.
                biased;
                _ = self.shutdown_rx.recv() => {
                    info!("Connection handler for {} received shutdown signal.", self.addr);
                    break;
                }
                result = self.framed.next() => {
                    match result {
                        Some(Ok(Ok(request))) => {
                            debug!("Session {}: Received request: {:?}", self.session_id, request);
                            let response = self.router.route(request).await;
                            self.send(response).await?;
                        }
                        Some(Ok(Err(e))) => {
                            let response = self.router.reject(&e);
                            self.send(response).await?;
                        }
                        Some(Err(e)) => {
                            if is_normal_disconnect(&e) {
                                debug!("Connection from {} closed by peer: {}", self.addr, e);
                                break;
                            }
                            return Err(e);
                        }
                        None => {
                            debug!("Connection from {} closed by peer.", self.addr);
                            break;
                        }
                    }
                }
            }
        }
        drop(self.guard);
        Ok(())
    }

    async fn send(&mut self, response: Response) -> Result<(), GatewayError> {
        debug!(
            "Session {}: Sending response: {:?}",
            self.session_id, response
        );
        self.framed.send(response).await
    }
}

/// Helper function to check for non-critical disconnection errors.
fn is_normal_disconnect(e: &GatewayError) -> bool {
    matches!(e, GatewayError::Transport(arc_err) if matches!(
        arc_err.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionAborted
    ))
}
