// tests/integration/notification_flow_test.rs

//! Integration tests for change notifications as seen by clients
//! Tests: device-side changes, duplicate suppression, inactive groups

use super::test_helpers::{TestServer, changed_entries, test_config};
use opcgate::core::value::{Quality, Value};
use ordered_float::OrderedFloat;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_activation_reports_every_point_once() {
    let server = TestServer::start(test_config(&["TAG0", "TAG1"])).await;
    let mut client = server.connect().await;

    let mut changed = changed_entries(&client.request("GETCHANGED").await);
    changed.sort();
    assert_eq!(changed, vec!["TAG0=0".to_string(), "TAG1=0".to_string()]);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_device_side_change_is_reported() {
    let server = TestServer::start(test_config(&["TAG0"])).await;
    let mut client = server.connect().await;
    client.request("GETCHANGED").await;

    server
        .driver
        .set_value("TAG0", Value::R8(OrderedFloat(3.5)), Quality::GOOD);

    assert_eq!(client.request("GETCHANGED").await, "TAG0=3.5");
    assert_eq!(client.request("READ|TAG0").await, "3.5");

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_repeated_value_is_reported_once() {
    let server = TestServer::start(test_config(&["TAG0"])).await;
    let mut client = server.connect().await;
    client.request("GETCHANGED").await;

    assert_eq!(client.request("WRITE|TAG0|5").await, "WRITE_OK");
    assert_eq!(client.request("WRITE|TAG0|5").await, "WRITE_OK");
    // Same value pushed again by the device, with a different quality.
    server
        .driver
        .set_value("TAG0", Value::R8(OrderedFloat(5.0)), Quality::UNCERTAIN);

    assert_eq!(client.request("GETCHANGED").await, "TAG0=5");

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_changes_are_reported_in_emission_order() {
    let server = TestServer::start(test_config(&["A", "B"])).await;
    let mut client = server.connect().await;
    client.request("GETCHANGED").await;

    client.request("WRITE|B|1").await;
    client.request("WRITE|A|2").await;
    client.request("WRITE|B|3").await;

    // B changed twice before the poll: it is listed once, first, with its
    // latest value.
    assert_eq!(client.request("GETCHANGED").await, "B=3;A=2");

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_inactive_group_reports_nothing() {
    let mut config = test_config(&["TAG0"]);
    config.source.activate_on_start = false;
    let server = TestServer::start(config).await;
    let mut client = server.connect().await;

    assert_eq!(client.request("WRITE|TAG0|9").await, "WRITE_OK");
    assert_eq!(client.request("READ|TAG0").await, "9");
    assert_eq!(client.request("GETCHANGED").await, "");

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pending_changes_are_shared_between_clients() {
    let server = TestServer::start(test_config(&["TAG0"])).await;
    let mut writer = server.connect().await;
    let mut poller = server.connect().await;
    writer.request("GETCHANGED").await;

    assert_eq!(writer.request("WRITE|TAG0|11").await, "WRITE_OK");
    assert_eq!(poller.request("GETCHANGED").await, "TAG0=11");
    assert_eq!(writer.request("GETCHANGED").await, "");

    server.stop().await;
}
