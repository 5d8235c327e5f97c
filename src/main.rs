#![forbid(unsafe_code)]

//! `details-relay` — real-time notification process.
//!
//! Elects ownership of the relay endpoint, runs the relay server when it
//! wins, and serves WebSocket sessions plus the liveness probe.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use details_relay::config::RelayConfig;
use details_relay::fanout::registry::FanoutRegistry;
use details_relay::http::{self, GatewayState};
use details_relay::node::RelayNode;
use details_relay::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "details-relay", about = "Real-time notification relay", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("details-relay bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config = RelayConfig::load_or_default(args.config.as_deref())?;
    info!(endpoint = %config.endpoint(), http_port = config.http.port, "configuration loaded");

    // ── Elect relay ownership ───────────────────────────
    let ct = CancellationToken::new();
    let registry = Arc::new(FanoutRegistry::new());
    let node = RelayNode::start(&config, Arc::clone(&registry), &ct)
        .await
        .map_err(|err| {
            error!(%err, "relay startup failed");
            err
        })?;

    // ── Start HTTP gateway ──────────────────────────────
    let listener = match http::bind(config.http.port).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(%err, "http gateway startup failed");
            ct.cancel();
            node.shutdown().await?;
            return Err(err);
        }
    };
    let state = GatewayState::from_config(&config, registry, ct.clone());
    let http_handle = tokio::spawn(async move {
        if let Err(err) = http::serve(listener, state).await {
            error!(%err, "http gateway failed");
        }
    });

    info!(role = ?node.role(), "details-relay ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    if let Err(err) = node.shutdown().await {
        error!(%err, "relay shutdown failed");
    }
    if let Err(err) = http_handle.await {
        error!(%err, "http gateway task failed");
    }
    info!("details-relay shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
