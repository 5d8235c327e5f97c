//! WebSocket sessions attached to the fan-out registry.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::GatewayState;
use crate::fanout::registry::{ChannelSink, FanoutRegistry};
use crate::models::message::RelayMessage;

/// Text frame sent on every keep-alive tick.
pub const KEEPALIVE_FRAME: &str = "ping";

/// `appId` stamped on messages broadcast from `/notify`.
pub const BROADCAST_APP_ID: &str = "*";

/// Query parameters of `/ws`.
#[derive(Debug, Deserialize)]
pub struct WsParams {
    /// Application identity the session listens on.
    pub app: Option<String>,
}

/// Handler for `GET /ws?app=<appId>`.
pub async fn ws_upgrade(
    State(state): State<GatewayState>,
    Query(params): Query<WsParams>,
    ws: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Some(app_id) = params.app.filter(|app| !app.trim().is_empty()) else {
        return (StatusCode::BAD_REQUEST, "missing 'app' query parameter").into_response();
    };
    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| run_session(socket, state, app_id)),
        Err(rejection) => rejection.into_response(),
    }
}

/// Handler for `GET /notify`.
///
/// The connection is a pure producer: it is never registered, and each text
/// frame it sends is delivered to every live session.
pub async fn notify_upgrade(
    State(state): State<GatewayState>,
    ws: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| run_notifier(socket, state)),
        Err(rejection) => rejection.into_response(),
    }
}

async fn run_notifier(mut socket: WebSocket, state: GatewayState) {
    let span = info_span!("ws_notify", notifier = %Uuid::new_v4());
    async move {
        loop {
            tokio::select! {
                () = state.ct.cancelled() => break,

                inbound = socket.recv() => match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let report = state
                            .registry
                            .broadcast(&RelayMessage::new(BROADCAST_APP_ID, text.as_str()))
                            .await;
                        debug!(delivered = report.delivered, failed = report.failed, "notification broadcast");
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("notifier disconnected");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(%err, "notifier read error");
                        break;
                    }
                },
            }
        }
        let _ = socket.close().await;
    }
    .instrument(span)
    .await;
}

/// Serve one client until it disconnects, a write fails, the registry
/// drops its sink, or the process shuts down.
async fn run_session(socket: WebSocket, state: GatewayState, app_id: String) {
    let session_id = Uuid::new_v4();
    let span = info_span!("ws_session", app_id = %app_id, %session_id);
    async move {
        let (sink, mut delivered) = ChannelSink::channel(state.session_buffer);
        let handle = state.registry.register(app_id.clone(), Arc::new(sink)).await;
        let (mut sender, mut receiver) = socket.split();
        let mut keepalive = keepalive_timer(state.keepalive);

        loop {
            tokio::select! {
                () = state.ct.cancelled() => {
                    debug!("session closing for shutdown");
                    break;
                }

                message = delivered.recv() => {
                    let Some(message) = message else {
                        debug!("session sink dropped by registry");
                        break;
                    };
                    if let Err(err) = sender.send(Message::Text(message.payload.into())).await {
                        warn!(%err, "failed to forward message to session");
                        break;
                    }
                }

                _ = keepalive.tick() => {
                    if let Err(err) = sender.send(Message::Text(KEEPALIVE_FRAME.into())).await {
                        warn!(%err, "keep-alive failed");
                        break;
                    }
                }

                inbound = receiver.next() => {
                    match inbound {
                        Some(Ok(Message::Text(text))) => {
                            relay_inbound(&state.registry, &app_id, text.as_str()).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("session closed by client");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            warn!(%err, "session read error");
                            break;
                        }
                    }
                }
            }
        }

        state.registry.unregister(&handle).await;
        let _ = sender.close().await;
    }
    .instrument(span)
    .await;
}

fn keepalive_timer(period: Duration) -> tokio::time::Interval {
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    timer
}

/// Forward a client frame naming a `target_app` to that app's sessions.
///
/// The frame text is delivered verbatim as the payload. Frames without a
/// target are ignored.
async fn relay_inbound(registry: &FanoutRegistry, from_app: &str, text: &str) {
    let target = serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|value| {
            value
                .get("target_app")
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned)
        });

    match target {
        Some(target) => {
            let report = registry.dispatch(&RelayMessage::new(target.clone(), text)).await;
            debug!(from_app, target_app = %target, delivered = report.delivered, "client frame relayed");
        }
        None => {
            debug!(from_app, "ignoring client frame without target_app");
        }
    }
}
