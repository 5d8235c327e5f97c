//! Relay server run by the endpoint owner.
//!
//! Accepts peer connections on the bound endpoint and reads
//! newline-delimited JSON messages from each one. Every decoded message is
//! handed to the [`FanoutRegistry`] before the next line is read, so order
//! is kept per connection. Connections run concurrently with each other.
//!
//! ## Protocol
//!
//! One JSON object per line, no response:
//! ```json
//! {"appId": "workspace-123", "payload": "job finished"}
//! {"appId": "workspace-123", "payload": "progress", "step": 3}
//! ```
//!
//! A line that fails to parse is logged and skipped; the connection stays
//! open.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::fanout::registry::FanoutRegistry;
use crate::ipc::codec::{decode_line, RelayLineCodec};
use crate::ipc::transport::{self, PeerStream, RelayListener};
use crate::models::endpoint::RelayEndpoint;
use crate::{AppError, Result};

/// Handle to a running relay server.
///
/// Dropping the handle does not stop the server; call
/// [`RelayServer::shutdown`] so the endpoint artifact is cleaned up.
#[derive(Debug)]
pub struct RelayServer {
    endpoint: RelayEndpoint,
    ct: CancellationToken,
    tracker: TaskTracker,
    acceptor: JoinHandle<RelayListener>,
}

impl RelayServer {
    /// Start accepting on `listener`.
    ///
    /// The server stops when `ct` (or the server's own shutdown) is
    /// cancelled, but only [`RelayServer::shutdown`] removes the artifact.
    #[must_use]
    pub fn spawn(
        listener: RelayListener,
        registry: Arc<FanoutRegistry>,
        ct: &CancellationToken,
    ) -> Self {
        let endpoint = listener.endpoint();
        let ct = ct.child_token();
        let tracker = TaskTracker::new();

        info!(endpoint = %endpoint, "relay server listening");

        let acceptor = tokio::spawn(accept_loop(
            listener,
            registry,
            ct.clone(),
            tracker.clone(),
        ));

        Self {
            endpoint,
            ct,
            tracker,
            acceptor,
        }
    }

    /// Endpoint the server is bound to.
    #[must_use]
    pub fn endpoint(&self) -> &RelayEndpoint {
        &self.endpoint
    }

    /// Stop the server and release the endpoint.
    ///
    /// Stops accepting, cancels every connection handler, waits for them to
    /// finish, closes the acceptor and removes the socket artifact. Running
    /// it after the artifact is already gone is not an error.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the acceptor task panicked or the socket
    /// file cannot be removed.
    pub async fn shutdown(self) -> Result<()> {
        let span = info_span!("relay_shutdown", endpoint = %self.endpoint);
        async move {
            self.ct.cancel();
            self.tracker.close();
            let listener = self
                .acceptor
                .await
                .map_err(|err| AppError::Io(format!("relay acceptor task failed: {err}")))?;
            self.tracker.wait().await;
            drop(listener);

            transport::remove_artifact(&self.endpoint).map_err(|err| {
                AppError::Io(format!("failed to remove {}: {err}", self.endpoint))
            })?;

            info!("relay server shut down");
            Ok(())
        }
        .instrument(span)
        .await
    }
}

async fn accept_loop(
    listener: RelayListener,
    registry: Arc<FanoutRegistry>,
    ct: CancellationToken,
    tracker: TaskTracker,
) -> RelayListener {
    let span = info_span!("relay_server", endpoint = %listener.endpoint());
    async {
        let mut next_conn: u64 = 0;
        loop {
            tokio::select! {
                () = ct.cancelled() => {
                    info!("relay server no longer accepting");
                    break;
                }
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok(stream) => {
                            next_conn += 1;
                            tracker.spawn(handle_connection(
                                stream,
                                Arc::clone(&registry),
                                ct.child_token(),
                                next_conn,
                            ));
                        }
                        Err(err) => {
                            warn!(%err, "relay accept failed");
                        }
                    }
                }
            }
        }
    }
    .instrument(span)
    .await;

    listener
}

/// Read, decode and dispatch lines from one peer until EOF, error or
/// cancellation.
async fn handle_connection(
    stream: PeerStream,
    registry: Arc<FanoutRegistry>,
    ct: CancellationToken,
    conn: u64,
) {
    let span = info_span!("relay_conn", conn);
    async move {
        let PeerStream {
            reader,
            writer: _writer,
        } = stream;
        let mut lines = FramedRead::new(reader, RelayLineCodec::new());
        let mut relayed: u64 = 0;

        loop {
            tokio::select! {
                biased;

                () = ct.cancelled() => {
                    debug!("relay connection cancelled");
                    break;
                }

                item = lines.next() => {
                    match item {
                        None => break,
                        Some(Ok(line)) => match decode_line(&line) {
                            Ok(Some(message)) => {
                                registry.dispatch(&message).await;
                                relayed += 1;
                            }
                            Ok(None) => {}
                            Err(err) => {
                                warn!(%err, "dropping malformed relay line");
                            }
                        },
                        Some(Err(err)) => {
                            warn!(%err, "relay read error");
                            break;
                        }
                    }
                }
            }
        }

        debug!(relayed, "relay connection closed");
    }
    .instrument(span)
    .await;
}
