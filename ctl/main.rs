#![forbid(unsafe_code)]

//! `details-relay-ctl` — producer-side companion for `details-relay`.
//!
//! Sends one notification through the relay, or reports whether a relay
//! owns the endpoint. Retrying is opt-in and lives here, not in the
//! library client.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};

use details_relay::config::RelayConfig;
use details_relay::ipc::client::RelayClient;
use details_relay::ipc::rendezvous::Rendezvous;
use details_relay::models::message::{is_reserved_field, RelayMessage};
use details_relay::{AppError, Result};

#[derive(Debug, Parser)]
#[command(
    name = "details-relay-ctl",
    about = "Local CLI for the details notification relay",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file (must match the relay's).
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send one notification to every session of an app.
    Send {
        /// Target application identity.
        app_id: String,
        /// Text delivered to each session.
        payload: String,
        /// Extra pass-through field as `key=value`; repeatable.
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
        /// Additional attempts when the relay is unavailable.
        #[arg(long, default_value_t = 0)]
        retries: u32,
        /// Delay between attempts.
        #[arg(long, default_value_t = 1000)]
        retry_delay_ms: u64,
    },

    /// Report whether a relay is listening on the endpoint.
    Status,
}

fn parse_field(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    if is_reserved_field(key) {
        return Err(format!("'{key}' is set by the positional arguments"));
    }
    Ok((key.to_owned(), value.to_owned()))
}

fn main() -> ExitCode {
    let args = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args)) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> Result<ExitCode> {
    let config = RelayConfig::load_or_default(args.config.as_deref())?;

    match args.command {
        Command::Send {
            app_id,
            payload,
            fields,
            retries,
            retry_delay_ms,
        } => {
            let message = fields
                .into_iter()
                .fold(RelayMessage::new(app_id, payload), |message, (key, value)| {
                    message.with_field(key, serde_json::Value::String(value))
                });
            let client = RelayClient::from_config(&config);
            send_with_retry(&client, &message, retries, Duration::from_millis(retry_delay_ms))
                .await?;
            println!("OK");
            Ok(ExitCode::SUCCESS)
        }
        Command::Status => {
            let rendezvous = Rendezvous::new(config.endpoint(), config.connect_timeout());
            if rendezvous.is_running().await {
                println!("running at {}", config.endpoint());
                Ok(ExitCode::SUCCESS)
            } else {
                println!("not running at {}", config.endpoint());
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

/// Send `message`, retrying only while the relay is unavailable.
async fn send_with_retry(
    client: &RelayClient,
    message: &RelayMessage,
    retries: u32,
    delay: Duration,
) -> Result<()> {
    let mut attempt = 0;
    loop {
        match client.send_message(message).await {
            Err(AppError::RelayUnavailable(reason)) if attempt < retries => {
                attempt += 1;
                eprintln!("Relay unavailable ({reason}); retry {attempt}/{retries}");
                tokio::time::sleep(delay).await;
            }
            result => return result,
        }
    }
}
