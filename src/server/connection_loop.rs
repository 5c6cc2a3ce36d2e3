// src/server/connection_loop.rs

//! Contains the main accept loop with admission control, and the graceful
//! shutdown sequence.

use super::context::ServerContext;
use crate::connection::{ConnectionGuard, ConnectionHandler};
use crate::core::metrics;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, TryAcquireError};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// How long connected clients get to finish their current request on shutdown.
const CLIENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// What the loop does next after waiting on its event sources.
enum Step<T> {
    Proceed(T),
    Reaped,
    Stop,
}

/// The main loop that admits and accepts connections until `shutdown` resolves.
pub async fn run<F>(mut ctx: ServerContext, shutdown: F)
where
    F: Future<Output = ()>,
{
    let mut session_id_counter: u64 = 0;
    let mut client_tasks = JoinSet::new();
    tokio::pin!(shutdown);

    'accept: loop {
        // A slot is taken before the connection is accepted, so a client
        // beyond the pool size stays pending in the listen backlog.
        let permit = match ctx.connection_permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::Closed) => break,
            Err(TryAcquireError::NoPermits) => {
                warn!("Maximum connections reached; waiting for a client to disconnect.");
                metrics::ADMISSION_WAITS_TOTAL.inc();
                loop {
                    let waited = tokio::select! {
                        biased;
                        _ = &mut shutdown => Step::Stop,
                        Some(res) = ctx.background_tasks.join_next() => {
                            if background_task_failed(res) { Step::Stop } else { Step::Reaped }
                        }
                        Some(res) = client_tasks.join_next() => {
                            log_client_exit(res);
                            Step::Reaped
                        }
                        res = ctx.connection_permits.clone().acquire_owned() => match res {
                            Ok(permit) => Step::Proceed(permit),
                            Err(_) => Step::Stop,
                        },
                    };
                    match waited {
                        Step::Proceed(permit) => break permit,
                        Step::Reaped => continue,
                        Step::Stop => break 'accept,
                    }
                }
            }
        };

        let step = tokio::select! {
            biased;
            _ = &mut shutdown => Step::Stop,
            Some(res) = ctx.background_tasks.join_next() => {
                if background_task_failed(res) { Step::Stop } else { Step::Reaped }
            }
            Some(res) = client_tasks.join_next() => {
                log_client_exit(res);
                Step::Reaped
            }
            res = ctx.listener.accept() => match res {
                Ok(accepted) => Step::Proceed(accepted),
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    Step::Reaped
                }
            },
        };

        match step {
            Step::Proceed((socket, addr)) => {
                info!("Accepted new connection from: {}", addr);
                metrics::CONNECTIONS_RECEIVED_TOTAL.inc();
                session_id_counter = session_id_counter.wrapping_add(1);
                spawn_client(&ctx, &mut client_tasks, socket, addr, session_id_counter, permit);
            }
            // The permit is dropped here and taken again on the next turn.
            Step::Reaped => continue,
            Step::Stop => break,
        }
    }

    shutdown_gracefully(ctx, client_tasks).await;
}

fn spawn_client(
    ctx: &ServerContext,
    client_tasks: &mut JoinSet<()>,
    socket: tokio::net::TcpStream,
    addr: std::net::SocketAddr,
    session_id: u64,
    permit: OwnedSemaphorePermit,
) {
    let guard = ConnectionGuard::new(session_id, addr, permit);
    let handler = ConnectionHandler::new(
        socket,
        ctx.state.clone(),
        guard,
        ctx.shutdown_tx.subscribe(),
    );
    client_tasks.spawn(async move {
        if let Err(e) = handler.run().await {
            warn!("Connection from {} terminated unexpectedly: {}", addr, e);
        }
    });
}

/// Returns true when a finished background task must stop the gateway.
fn background_task_failed(res: Result<anyhow::Result<()>, tokio::task::JoinError>) -> bool {
    match res {
        Ok(Ok(())) => {
            warn!("A background task finished unexpectedly without an error.");
            false
        }
        Ok(Err(e)) => {
            error!("CRITICAL: Background task failed: {}. Shutting down.", e);
            true
        }
        Err(e) => {
            error!("CRITICAL: Background task panicked: {e:?}. Shutting down.");
            true
        }
    }
}

fn log_client_exit(res: Result<(), tokio::task::JoinError>) {
    if let Err(e) = res
        && e.is_panic()
    {
        error!("A client handler panicked: {e:?}");
    }
}

async fn shutdown_gracefully(mut ctx: ServerContext, mut client_tasks: JoinSet<()>) {
    info!("Shutting down. Sending signal to all tasks.");
    // Stop admitting clients that were still waiting for a slot.
    ctx.connection_permits.close();
    if ctx.shutdown_tx.send(()).is_err() {
        info!("No task was listening for the shutdown signal.");
    }

    if tokio::time::timeout(CLIENT_DRAIN_TIMEOUT, async {
        while client_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for clients to finish; aborting the rest.");
        client_tasks.shutdown().await;
    }
    info!("All client connections closed.");

    let session = ctx.state.session.clone();
    match tokio::task::spawn_blocking(move || session.disconnect()).await {
        Ok(Ok(())) => info!("Disconnected from the data source."),
        Ok(Err(e)) => error!("Data source teardown was incomplete: {}", e),
        Err(e) => error!("Data source teardown task failed: {e:?}"),
    }

    info!("Waiting for background tasks to finish...");
    if tokio::time::timeout(Duration::from_secs(10), async {
        while ctx.background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
    };
    info!("Gateway shutdown complete.");
}
