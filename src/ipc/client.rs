//! Single-shot relay sender.
//!
//! Each send opens a fresh connection, writes one line and closes. There is
//! no pooling and no retry; a caller that cares about delivery decides
//! whether to try again.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::config::RelayConfig;
use crate::ipc::codec::encode_line;
use crate::ipc::transport;
use crate::models::endpoint::RelayEndpoint;
use crate::models::message::RelayMessage;
use crate::{AppError, Result};

/// Sender usable from owner and borrower processes alike.
#[derive(Debug, Clone)]
pub struct RelayClient {
    endpoint: RelayEndpoint,
    connect_timeout: Duration,
}

impl RelayClient {
    /// Client for `endpoint` with the given connect bound.
    #[must_use]
    pub fn new(endpoint: RelayEndpoint, connect_timeout: Duration) -> Self {
        Self {
            endpoint,
            connect_timeout,
        }
    }

    /// Client for the endpoint named by `config`.
    #[must_use]
    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.endpoint(), config.connect_timeout())
    }

    /// Endpoint this client sends to.
    #[must_use]
    pub fn endpoint(&self) -> &RelayEndpoint {
        &self.endpoint
    }

    /// Send `payload` to every session of `app_id`.
    ///
    /// # Errors
    ///
    /// See [`RelayClient::send_message`].
    pub async fn send(&self, app_id: &str, payload: &str) -> Result<()> {
        self.send_message(&RelayMessage::new(app_id, payload)).await
    }

    /// Send a prepared message, extra fields included.
    ///
    /// # Errors
    ///
    /// Returns `AppError::RelayUnavailable` when nothing accepts the
    /// connection, and `AppError::Io` when the write fails afterwards.
    pub async fn send_message(&self, message: &RelayMessage) -> Result<()> {
        let line = encode_line(message)?;

        let mut stream = transport::connect(&self.endpoint, self.connect_timeout)
            .await
            .map_err(|err| AppError::RelayUnavailable(format!("{}: {err}", self.endpoint)))?;

        stream
            .writer
            .write_all(line.as_bytes())
            .await
            .map_err(|err| AppError::Io(format!("relay write failed: {err}")))?;
        stream
            .writer
            .flush()
            .await
            .map_err(|err| AppError::Io(format!("relay flush failed: {err}")))?;
        stream
            .writer
            .shutdown()
            .await
            .map_err(|err| AppError::Io(format!("relay close failed: {err}")))?;

        debug!(app_id = %message.app_id, endpoint = %self.endpoint, "relay message sent");
        Ok(())
    }
}
