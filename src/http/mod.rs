//! HTTP gateway of the notification process.
//!
//! Serves the liveness probe on `/`, attaches real-time clients on
//! `/ws?app=<appId>` and accepts broadcast producers on `/notify`.

pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::RelayConfig;
use crate::fanout::registry::FanoutRegistry;
use crate::{AppError, Result};

/// State shared by every gateway route.
#[derive(Debug, Clone)]
pub struct GatewayState {
    /// Session registry the relay server dispatches into.
    pub registry: Arc<FanoutRegistry>,
    /// Label reported by the health endpoint.
    pub role: Arc<str>,
    /// Interval between keep-alive frames.
    pub keepalive: Duration,
    /// Per-session delivery buffer.
    pub session_buffer: usize,
    /// Cancelled when the process shuts down; ends every session.
    pub ct: CancellationToken,
}

impl GatewayState {
    /// Gateway state from `config`, sharing `registry`.
    #[must_use]
    pub fn from_config(
        config: &RelayConfig,
        registry: Arc<FanoutRegistry>,
        ct: CancellationToken,
    ) -> Self {
        Self {
            registry,
            role: Arc::from(config.http.role.as_str()),
            keepalive: config.keepalive(),
            session_buffer: config.http.session_buffer,
            ct,
        }
    }
}

/// Handler for `GET /`.
async fn health(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": format!("{} server is up!", state.role) }))
}

/// Build the gateway router.
#[must_use]
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/ws", get(ws::ws_upgrade))
        .route("/notify", get(ws::notify_upgrade))
        .with_state(state)
}

/// Bind the gateway on `127.0.0.1:port`.
///
/// # Errors
///
/// Returns `AppError::Http` if the port cannot be bound.
pub async fn bind(port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::Http(format!("failed to bind http on {addr}: {err}")))
}

/// Serve the gateway on `listener` until the state's token is cancelled.
///
/// # Errors
///
/// Returns `AppError::Http` if the server fails.
pub async fn serve(listener: TcpListener, state: GatewayState) -> Result<()> {
    let ct = state.ct.clone();
    let addr = listener
        .local_addr()
        .map_err(|err| AppError::Http(format!("http listener has no address: {err}")))?;

    info!(%addr, "http gateway listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            ct.cancelled().await;
        })
        .await
        .map_err(|err| AppError::Http(format!("http server error: {err}")))?;

    info!("http gateway shut down");
    Ok(())
}
