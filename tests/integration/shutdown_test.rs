// tests/integration/shutdown_test.rs

//! Integration tests for gateway bootstrap and graceful shutdown

use super::test_helpers::{TestServer, init_tracing, test_config};
use opcgate::core::driver::{Operation, SimulatedDriver};
use opcgate::server;
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bootstrap_registers_configured_points() {
    let server = TestServer::start(test_config(&["TAG0", "TAG1", "TAG2"])).await;

    assert_eq!(server.driver.connection_count(), 1);
    assert_eq!(server.driver.group_count(), 1);
    assert_eq!(server.driver.point_count(), 3);
    assert_eq!(server.driver.subscription_count(), 1);
    assert_eq!(server.driver.call_count(Operation::SetGroupActive), 1);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bootstrap_skips_points_that_fail_to_register() {
    let driver = Arc::new(SimulatedDriver::new().with_journal());
    driver.inject_fault(Operation::RegisterPoint);
    let server = TestServer::start_with_driver(test_config(&["TAG0"]), driver).await;
    let mut client = server.connect().await;

    assert_eq!(server.driver.point_count(), 0);
    assert_eq!(client.request("READ|TAG0").await, "NOT_FOUND");

    server.stop().await;
}

#[tokio::test]
async fn test_bootstrap_fails_when_source_is_unavailable() {
    init_tracing();
    let driver = Arc::new(SimulatedDriver::with_sources(["Some.Other.Server"]).with_journal());
    let result = server::bind(test_config(&["TAG0"]), driver.clone()).await;

    assert!(result.is_err());
    assert_eq!(driver.connection_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_closes_clients_and_tears_down_session() {
    let server = TestServer::start(test_config(&["TAG0", "TAG1"])).await;
    let mut client = server.connect().await;
    assert_eq!(client.request("READ|TAG0").await, "0");

    let driver = server.driver.clone();
    driver.clear_journal();
    server.stop().await;

    assert_eq!(client.next_response().await, None);
    assert_eq!(driver.connection_count(), 0);
    assert_eq!(driver.group_count(), 0);
    assert_eq!(driver.point_count(), 0);
    assert_eq!(driver.subscription_count(), 0);
    assert_eq!(driver.operations().last(), Some(&Operation::Disconnect));
}
