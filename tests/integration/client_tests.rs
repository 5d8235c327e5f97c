//! Integration tests for the single-shot relay client.

use std::time::Duration;

use details_relay::ipc::client::RelayClient;
use details_relay::AppError;

use super::test_helpers::{recv, temp_endpoint, TestRelay, CONNECT_TIMEOUT};

#[tokio::test]
async fn send_without_relay_is_relay_unavailable() {
    let (_dir, endpoint) = temp_endpoint();
    let client = RelayClient::new(endpoint, CONNECT_TIMEOUT);

    let err = client.send("A", "p").await.expect_err("nothing is listening");

    assert!(matches!(err, AppError::RelayUnavailable(_)), "got {err:?}");
}

#[tokio::test]
async fn send_to_stale_socket_file_is_relay_unavailable() {
    let (_dir, endpoint) = temp_endpoint();
    if let details_relay::models::endpoint::RelayEndpoint::Path(path) = &endpoint {
        drop(std::os::unix::net::UnixListener::bind(path).expect("stale socket"));
    }
    let client = RelayClient::new(endpoint, Duration::from_millis(200));

    assert!(matches!(
        client.send("A", "p").await,
        Err(AppError::RelayUnavailable(_))
    ));
}

#[tokio::test]
async fn each_send_uses_its_own_connection() {
    let relay = TestRelay::start().await;
    let mut rx = relay.session("A").await;
    let client = relay.client();

    for payload in ["one", "two", "three"] {
        client.send("A", payload).await.expect("send");
        assert_eq!(recv(&mut rx).await.payload, payload);
    }

    relay.server.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn send_for_unknown_app_succeeds_and_is_dropped() {
    let relay = TestRelay::start().await;
    let mut rx = relay.session("A").await;
    let client = relay.client();

    client.send("nobody", "lost").await.expect("send succeeds");
    client.send("A", "kept").await.expect("send");

    assert_eq!(recv(&mut rx).await.payload, "kept");
    relay.server.shutdown().await.expect("shutdown");
}
