//! Integration tests for the HTTP gateway: liveness probe and WebSocket
//! sessions fed by the relay server.
//!
//! Uses an ephemeral port so the tests never collide with a running gateway.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use details_relay::fanout::registry::FanoutRegistry;
use details_relay::http::{self, GatewayState};
use details_relay::models::message::RelayMessage;

use super::test_helpers::{within, TestRelay, WAIT};

type WsClient =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

fn gateway_state(registry: Arc<FanoutRegistry>, ct: CancellationToken) -> GatewayState {
    GatewayState {
        registry,
        role: Arc::from("WebSocket"),
        keepalive: Duration::from_secs(15),
        session_buffer: 16,
        ct,
    }
}

/// Serve the gateway on an ephemeral port; cancel `state.ct` to stop it.
async fn spawn_gateway(state: GatewayState) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = http::bind(0).await.expect("bind ephemeral");
    let addr = listener.local_addr().expect("local addr");
    let handle = tokio::spawn(async move {
        http::serve(listener, state).await.expect("gateway serve");
    });
    (addr, handle)
}

async fn connect_ws(addr: SocketAddr, app: &str) -> WsClient {
    let url = format!("ws://{addr}/ws?app={app}");
    let (socket, _) = within(tokio_tungstenite::connect_async(url))
        .await
        .expect("ws handshake");
    socket
}

/// Wait until the registry holds `expected` sessions.
async fn await_sessions(registry: &FanoutRegistry, expected: usize) {
    within(async {
        while registry.session_count().await != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
}

/// Next text frame, skipping keep-alives.
async fn next_text(socket: &mut WsClient) -> String {
    loop {
        let frame = tokio::time::timeout(WAIT, socket.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket ended")
            .expect("frame error");
        if let Message::Text(text) = frame {
            if text.as_str() != http::ws::KEEPALIVE_FRAME {
                return text.as_str().to_owned();
            }
        }
    }
}

#[tokio::test]
async fn health_reports_role() {
    let ct = CancellationToken::new();
    let (addr, handle) = spawn_gateway(gateway_state(Arc::new(FanoutRegistry::new()), ct.clone())).await;

    let resp = reqwest::get(format!("http://{addr}/"))
        .await
        .expect("GET /");
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.expect("json body");
    assert_eq!(body["status"], "WebSocket server is up!");

    ct.cancel();
    within(handle).await.expect("gateway task");
}

#[tokio::test]
async fn ws_without_app_is_bad_request() {
    let ct = CancellationToken::new();
    let (addr, handle) = spawn_gateway(gateway_state(Arc::new(FanoutRegistry::new()), ct.clone())).await;

    let resp = reqwest::get(format!("http://{addr}/ws")).await.expect("GET /ws");
    assert_eq!(resp.status(), 400);

    ct.cancel();
    within(handle).await.expect("gateway task");
}

#[tokio::test]
async fn relayed_notification_reaches_websocket_session() {
    let relay = TestRelay::start().await;
    let ct = CancellationToken::new();
    let (addr, handle) = spawn_gateway(gateway_state(Arc::clone(&relay.registry), ct.clone())).await;

    let mut socket = connect_ws(addr, "workspace-123").await;
    await_sessions(&relay.registry, 1).await;

    relay
        .client()
        .send("workspace-123", "build finished")
        .await
        .expect("relay send");

    assert_eq!(next_text(&mut socket).await, "build finished");

    ct.cancel();
    within(handle).await.expect("gateway task");
    relay.server.shutdown().await.expect("relay shutdown");
}

#[tokio::test]
async fn closing_socket_unregisters_session() {
    let registry = Arc::new(FanoutRegistry::new());
    let ct = CancellationToken::new();
    let (addr, handle) = spawn_gateway(gateway_state(Arc::clone(&registry), ct.clone())).await;

    let mut socket = connect_ws(addr, "A").await;
    await_sessions(&registry, 1).await;

    socket.close(None).await.expect("close");
    await_sessions(&registry, 0).await;

    let report = registry.dispatch(&RelayMessage::new("A", "late")).await;
    assert_eq!(report.delivered, 0);

    ct.cancel();
    within(handle).await.expect("gateway task");
}

#[tokio::test]
async fn client_frame_with_target_app_is_relayed() {
    let registry = Arc::new(FanoutRegistry::new());
    let ct = CancellationToken::new();
    let (addr, handle) = spawn_gateway(gateway_state(Arc::clone(&registry), ct.clone())).await;

    let mut viewer = connect_ws(addr, "viewer").await;
    let mut editor = connect_ws(addr, "editor").await;
    await_sessions(&registry, 2).await;

    let frame = r#"{"target_app":"viewer","action":"refresh"}"#;
    editor
        .send(Message::Text(frame.into()))
        .await
        .expect("send frame");

    assert_eq!(next_text(&mut viewer).await, frame);

    ct.cancel();
    within(handle).await.expect("gateway task");
}

#[tokio::test]
async fn keepalive_frames_are_sent_on_idle_session() {
    let registry = Arc::new(FanoutRegistry::new());
    let ct = CancellationToken::new();
    let mut state = gateway_state(Arc::clone(&registry), ct.clone());
    state.keepalive = Duration::from_millis(50);
    let (addr, handle) = spawn_gateway(state).await;

    let mut socket = connect_ws(addr, "A").await;
    let frame = tokio::time::timeout(WAIT, socket.next())
        .await
        .expect("keep-alive within wait")
        .expect("socket open")
        .expect("frame");

    assert_eq!(frame, Message::Text(http::ws::KEEPALIVE_FRAME.into()));

    ct.cancel();
    within(handle).await.expect("gateway task");
}

#[tokio::test]
async fn notify_frames_are_broadcast_to_every_app() {
    let registry = Arc::new(FanoutRegistry::new());
    let ct = CancellationToken::new();
    let (addr, handle) = spawn_gateway(gateway_state(Arc::clone(&registry), ct.clone())).await;

    let mut first = connect_ws(addr, "viewer").await;
    let mut second = connect_ws(addr, "editor").await;
    await_sessions(&registry, 2).await;

    let (mut notifier, _) = within(tokio_tungstenite::connect_async(format!("ws://{addr}/notify")))
        .await
        .expect("notify handshake");
    notifier
        .send(Message::Text("maintenance at noon".into()))
        .await
        .expect("send notification");

    assert_eq!(next_text(&mut first).await, "maintenance at noon");
    assert_eq!(next_text(&mut second).await, "maintenance at noon");
    assert_eq!(registry.session_count().await, 2, "notifier is not a session");

    ct.cancel();
    within(handle).await.expect("gateway task");
}
