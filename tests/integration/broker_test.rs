// tests/integration/broker_test.rs

//! Integration tests for the request broker
//! Tests: READ, WRITE, GETCHANGED over TCP, framing, admission control

use super::test_helpers::{TestClient, TestServer, changed_entries, test_config};
use opcgate::core::value::{DataType, Quality, Value};
use std::time::Duration;

// ===== Request / Response Tests =====

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_write_read_and_poll_changes() {
    let mut config = test_config(&["TAG0", "TAG1"]);
    config.points[0].data_type = DataType::I4;
    let server = TestServer::start(config).await;
    let mut client = server.connect().await;

    assert_eq!(client.request("WRITE|TAG0|42").await, "WRITE_OK");
    assert_eq!(client.request("READ|TAG0").await, "42");
    assert_eq!(server.driver.value_of("TAG0").unwrap().0, Value::I4(42));

    // The device reports the same value a second time.
    server.driver.set_value("TAG0", Value::I4(42), Quality::GOOD);

    let changed = changed_entries(&client.request("GETCHANGED").await);
    assert_eq!(
        changed.iter().filter(|e| *e == "TAG0=42").count(),
        1,
        "unexpected changes: {changed:?}"
    );

    // Everything was drained by the previous poll.
    assert_eq!(client.request("GETCHANGED").await, "");

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_read_unknown_point() {
    let server = TestServer::start(test_config(&["TAG0"])).await;
    let mut client = server.connect().await;

    assert_eq!(client.request("READ|NOPE").await, "NOT_FOUND");
    assert_eq!(client.request("WRITE|NOPE|1").await, "WRITE_FAIL");

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_invalid_requests_keep_connection_open() {
    let server = TestServer::start(test_config(&["TAG0"])).await;
    let mut client = server.connect().await;

    assert_eq!(client.request("HELLO").await, "INVALID");
    assert_eq!(client.request("READ").await, "INVALID");
    assert_eq!(client.request("WRITE|TAG0").await, "INVALID");
    assert_eq!(client.request("read|TAG0").await, "INVALID");

    // The connection is still usable afterwards.
    assert_eq!(client.request("READ|TAG0").await, "0");

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_framing_blank_lines_and_crlf() {
    let server = TestServer::start(test_config(&["TAG0"])).await;
    let mut client = server.connect().await;

    client.send_raw(b"\n\r\nWRITE|TAG0|7\r\nREAD|TAG0\r\n").await;
    assert_eq!(client.next_response().await.as_deref(), Some("WRITE_OK"));
    assert_eq!(client.next_response().await.as_deref(), Some("7"));

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlong_request_is_rejected_once() {
    let mut config = test_config(&["TAG0"]);
    config.max_request_length = 32;
    let server = TestServer::start(config).await;
    let mut client = server.connect().await;

    let overlong = format!("READ|{}", "X".repeat(200));
    client.send(&overlong).await;
    client.send("READ|TAG0").await;

    assert_eq!(client.next_response().await.as_deref(), Some("INVALID"));
    assert_eq!(client.next_response().await.as_deref(), Some("0"));

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unterminated_last_request_is_served() {
    let server = TestServer::start(test_config(&["TAG0"])).await;
    let mut client = server.connect().await;

    client.send_raw(b"READ|TAG0").await;
    client.shutdown_write().await;
    assert_eq!(client.next_response().await.as_deref(), Some("0"));
    assert_eq!(client.next_response().await, None);

    server.stop().await;
}

// ===== Concurrency Tests =====

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_clients_writes_are_all_applied() {
    let points = ["P0", "P1", "P2", "P3"];
    let server = TestServer::start(test_config(&points)).await;

    let mut tasks = Vec::new();
    for (i, id) in points.iter().enumerate() {
        let addr = server.addr;
        let id = id.to_string();
        tasks.push(tokio::spawn(async move {
            let mut client = TestClient::connect(addr).await;
            for n in 0..20 {
                let value = i * 100 + n;
                assert_eq!(client.request(&format!("WRITE|{id}|{value}")).await, "WRITE_OK");
                assert_eq!(client.request(&format!("READ|{id}")).await, value.to_string());
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    for (i, id) in points.iter().enumerate() {
        let (value, _) = server.driver.value_of(id).unwrap();
        assert_eq!(value.to_string(), (i * 100 + 19).to_string());
    }

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_admission_holds_client_beyond_pool_size() {
    let mut config = test_config(&["TAG0"]);
    config.pool_size = 2;
    let server = TestServer::start(config).await;

    let mut first = server.connect().await;
    let mut second = server.connect().await;
    assert_eq!(first.request("READ|TAG0").await, "0");
    assert_eq!(second.request("READ|TAG0").await, "0");

    // The third client connects at the TCP level but is not served yet.
    let mut third = server.connect().await;
    third.send("READ|TAG0").await;
    assert_eq!(third.try_response(Duration::from_millis(300)).await, None);

    // Freeing a slot admits the pending client, which then gets its answer.
    drop(first);
    assert_eq!(third.next_response().await.as_deref(), Some("0"));

    // The remaining client was never disturbed.
    assert_eq!(second.request("READ|TAG0").await, "0");

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slots_are_reused_after_many_disconnects() {
    let mut config = test_config(&["TAG0"]);
    config.pool_size = 1;
    let server = TestServer::start(config).await;

    for _ in 0..10 {
        let mut client = server.connect().await;
        assert_eq!(client.request("READ|TAG0").await, "0");
    }

    server.stop().await;
}
