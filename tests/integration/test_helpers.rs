// tests/integration/test_helpers.rs

//! Test helpers and utilities for integration tests

#![allow(dead_code)]

use opcgate::config::{Config, PointConfig};
use opcgate::core::driver::SimulatedDriver;
use opcgate::core::handler::command_router::Router;
use opcgate::core::protocol::{Request, Response};
use opcgate::core::session::Point;
use opcgate::core::state::GatewayState;
use opcgate::core::value::DataType;
use opcgate::server;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// The source name every test session connects to.
pub const TEST_SOURCE: &str = "Test.Simulation.1";

/// How long a test waits for a response it expects to arrive.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Sets up minimal tracing for tests (ignores repeated initialization).
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("warn"))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// A configuration suited for tests: loopback, ephemeral port, no metrics.
pub fn test_config(points: &[&str]) -> Config {
    let mut config = Config::default();
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config.pool_size = 4;
    config.source.name = TEST_SOURCE.to_string();
    config.points = points
        .iter()
        .map(|id| PointConfig {
            id: id.to_string(),
            data_type: DataType::Empty,
        })
        .collect();
    config
}

/// TestContext provides a connected session over a simulated data source,
/// without any network listener.
pub struct TestContext {
    pub driver: Arc<SimulatedDriver>,
    pub state: Arc<GatewayState>,
    router: Router,
}

impl TestContext {
    /// Creates a connected, subscribed session with no points.
    pub fn new() -> Self {
        Self::with_config(test_config(&[]))
    }

    pub fn with_config(config: Config) -> Self {
        init_tracing();
        let driver = Arc::new(SimulatedDriver::new().with_journal());
        let source = config.source.name.clone();
        let state = GatewayState::new(config, driver.clone());
        state
            .session
            .connect(&source)
            .expect("Failed to connect the test session");
        state
            .session
            .start_notifications()
            .expect("Failed to start notifications");
        let router = Router::new(state.clone(), 1, "127.0.0.1:40000".parse().unwrap());
        Self {
            driver,
            state,
            router,
        }
    }

    /// Registers a point with the type chosen by the data source.
    pub fn add_point(&self, id: &str) -> Point {
        self.state
            .session
            .add_point(id, DataType::Empty)
            .expect("Failed to add point")
    }

    pub fn activate(&self) {
        self.state
            .session
            .set_group_state(true)
            .expect("Failed to activate group");
    }

    /// Parses and routes one request line, the way a connection does.
    pub async fn request(&self, line: &str) -> Response {
        match Request::parse(line) {
            Ok(request) => self.router.route(request).await,
            Err(e) => self.router.reject(&e),
        }
    }

    /// Routes a request and returns its wire text.
    pub async fn request_text(&self, line: &str) -> String {
        self.request(line).await.to_string()
    }
}

/// A gateway listening on an ephemeral loopback port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub driver: Arc<SimulatedDriver>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(config: Config) -> Self {
        Self::start_with_driver(config, Arc::new(SimulatedDriver::new().with_journal())).await
    }

    /// Starts a gateway over a driver the test has already prepared.
    pub async fn start_with_driver(config: Config, driver: Arc<SimulatedDriver>) -> Self {
        init_tracing();
        let ctx = server::bind(config, driver.clone())
            .await
            .expect("Failed to start the gateway");
        let addr = ctx.local_addr().expect("Listener has no address");
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server::serve(ctx, async move {
            let _ = rx.await;
        }));
        Self {
            addr,
            driver,
            shutdown: Some(tx),
            handle,
        }
    }

    pub async fn connect(&self) -> TestClient {
        TestClient::connect(self.addr).await
    }

    /// Triggers a graceful shutdown and waits for it to complete.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        tokio::time::timeout(Duration::from_secs(15), &mut self.handle)
            .await
            .expect("Gateway did not shut down in time")
            .expect("Gateway task panicked");
    }
}

/// A line-oriented protocol client.
pub struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr)
            .await
            .expect("Failed to connect to the gateway");
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    /// Sends raw bytes without adding a terminator.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer
            .write_all(bytes)
            .await
            .expect("Failed to send to the gateway");
    }

    pub async fn send(&mut self, line: &str) {
        self.send_raw(format!("{line}\n").as_bytes()).await;
    }

    /// Half-closes the connection: the gateway sees end of input.
    pub async fn shutdown_write(&mut self) {
        self.writer
            .shutdown()
            .await
            .expect("Failed to half-close the connection");
    }

    /// Waits for the next response line. `None` means the gateway closed
    /// the connection.
    pub async fn next_response(&mut self) -> Option<String> {
        tokio::time::timeout(RESPONSE_TIMEOUT, self.lines.next_line())
            .await
            .expect("Timed out waiting for a response")
            .expect("Failed to read from the gateway")
    }

    /// Waits up to `wait` for a response, returning `None` if none arrived.
    pub async fn try_response(&mut self, wait: Duration) -> Option<String> {
        match tokio::time::timeout(wait, self.lines.next_line()).await {
            Ok(line) => line.expect("Failed to read from the gateway"),
            Err(_) => None,
        }
    }

    /// Sends a request and waits for its response.
    pub async fn request(&mut self, line: &str) -> String {
        self.send(line).await;
        self.next_response()
            .await
            .expect("Gateway closed the connection")
    }
}

/// Splits a `GETCHANGED` response into its `id=value` entries.
pub fn changed_entries(response: &str) -> Vec<String> {
    if response.is_empty() {
        return Vec::new();
    }
    response.split(';').map(str::to_string).collect()
}
