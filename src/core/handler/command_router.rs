// src/core/handler/command_router.rs

//! Routes decoded requests to the session and turns every outcome into a
//! protocol response.
//!
//! Reads and writes are each funneled through their own exclusive section
//! (`read_lock`, `write_lock`), because the data source expects at most one
//! outstanding synchronous call of each kind per group. The blocking driver
//! call itself runs on tokio's blocking pool while the section is held.

use crate::core::metrics;
use crate::core::protocol::{Request, Response};
use crate::core::state::GatewayState;
use crate::core::value::Value;
use crate::core::GatewayError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, debug, info_span, warn};

/// Dispatches requests of one connection.
pub struct Router {
    state: Arc<GatewayState>,
    session_id: u64,
    addr: SocketAddr,
}

impl Router {
    pub fn new(state: Arc<GatewayState>, session_id: u64, addr: SocketAddr) -> Self {
        Self {
            state,
            session_id,
            addr,
        }
    }

    /// Executes a request. Never fails: errors become response tokens.
    pub async fn route(&self, request: Request) -> Response {
        let verb = request.verb();
        let span = info_span!(
            "request",
            verb = %verb,
            client.addr = %self.addr,
            client.id = %self.session_id,
        );

        async move {
            let start_time = Instant::now();
            let label: &'static str = verb.into();
            metrics::REQUESTS_PROCESSED_TOTAL
                .with_label_values(&[label])
                .inc();

            let response = match request {
                Request::Read { id } => self.read(id).await,
                Request::Write { id, value } => self.write(id, value).await,
                Request::GetChanged => self.get_changed(),
            };

            metrics::REQUEST_LATENCY_SECONDS.observe(start_time.elapsed().as_secs_f64());
            response
        }
        .instrument(span)
        .await
    }

    /// Answers a request that could not be parsed.
    pub fn reject(&self, error: &GatewayError) -> Response {
        debug!("Session {}: rejecting request: {}", self.session_id, error);
        metrics::REQUESTS_PROCESSED_TOTAL
            .with_label_values(&["INVALID"])
            .inc();
        Response::Invalid
    }

    async fn read(&self, id: String) -> Response {
        let _section = self.state.read_lock.lock().await;
        let session = self.state.session.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let point = session
                .get_item_info(&id)
                .ok_or_else(|| GatewayError::NotFound(id.clone()))?;
            session.read(&point)
        })
        .await
        .map_err(GatewayError::from)
        .and_then(|result| result);

        match outcome {
            Ok((value, quality)) => {
                if !quality.is_good() {
                    debug!("Read returned a value of {} quality.", quality);
                }
                Response::Value(value.to_string())
            }
            Err(GatewayError::NotFound(id)) => {
                debug!("Read of unknown point '{}'.", id);
                Response::NotFound
            }
            Err(e) => {
                warn!("Read failed: {}", e);
                Response::ReadFail
            }
        }
    }

    async fn write(&self, id: String, literal: String) -> Response {
        let _section = self.state.write_lock.lock().await;
        let session = self.state.session.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let point = session
                .get_item_info(&id)
                .ok_or_else(|| GatewayError::NotFound(id.clone()))?;
            let value = Value::decode(&literal, point.data_type)?;
            session.write(&point, value)
        })
        .await
        .map_err(GatewayError::from)
        .and_then(|result| result);

        match outcome {
            Ok(()) => Response::WriteOk,
            Err(e) => {
                warn!("Write failed: {}", e);
                Response::WriteFail
            }
        }
    }

    /// Drains the pending changes and renders them as `id=value` pairs.
    /// Changes of points removed since they were emitted are dropped.
    fn get_changed(&self) -> Response {
        let changes = self
            .state
            .pending
            .drain()
            .into_iter()
            .filter_map(|change| {
                let point = self.state.session.point_by_handle(change.handle)?;
                Some((point.id, change.value.to_string()))
            })
            .collect();
        Response::Changed(changes)
    }
}
