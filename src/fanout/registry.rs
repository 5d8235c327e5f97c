//! Live session registry keyed by application identity.
//!
//! The registry is the only state shared between relay connections and
//! WebSocket sessions. Dispatch and broadcast take the read lock, so
//! lookups from many connections run side by side; register and unregister
//! take the write lock. Deliveries happen while the read lock is held,
//! which is what guarantees a sink sees nothing once `unregister` returns.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::models::message::RelayMessage;
use crate::{AppError, Result};

/// Delivery target for one client session.
///
/// Implementations must not block: `deliver` runs under the registry's
/// read lock.
pub trait DeliverySink: Send + Sync {
    /// Hand `message` to the session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SinkDelivery` when the session can no longer
    /// accept messages. The registry unregisters the sink in response.
    fn deliver(&self, message: &RelayMessage) -> Result<()>;
}

/// Sink backed by a bounded tokio channel.
///
/// A closed receiver or a full buffer both count as delivery failures.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<RelayMessage>,
}

impl ChannelSink {
    /// Create a sink and the receiver its session drains.
    #[must_use]
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<RelayMessage>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }
}

impl DeliverySink for ChannelSink {
    fn deliver(&self, message: &RelayMessage) -> Result<()> {
        self.tx.try_send(message.clone()).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => AppError::SinkDelivery(format!(
                "session buffer full ({} messages queued); raise http.session_buffer for bursty producers",
                self.tx.max_capacity()
            )),
            mpsc::error::TrySendError::Closed(_) => {
                AppError::SinkDelivery("session closed".into())
            }
        })
    }
}

/// Identity of one registered session.
///
/// Returned by [`FanoutRegistry::register`]; pass it back to
/// [`FanoutRegistry::unregister`] to detach.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    id: u64,
    app_id: String,
}

impl SessionHandle {
    /// Registry-unique session number.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Application identity the session listens on.
    #[must_use]
    pub fn app_id(&self) -> &str {
        &self.app_id
    }
}

/// Outcome of one dispatch or broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Sinks that accepted the message.
    pub delivered: usize,
    /// Sinks that failed and were unregistered.
    pub failed: usize,
}

type SessionMap = HashMap<String, Vec<(u64, Arc<dyn DeliverySink>)>>;

/// Thread-safe map of live sessions.
///
/// Built once per process and shared by `Arc` with the relay server and the
/// HTTP gateway.
#[derive(Default)]
pub struct FanoutRegistry {
    sessions: RwLock<SessionMap>,
    next_id: AtomicU64,
}

impl FanoutRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `sink` under `app_id`.
    pub async fn register(
        &self,
        app_id: impl Into<String>,
        sink: Arc<dyn DeliverySink>,
    ) -> SessionHandle {
        let app_id = app_id.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut sessions = self.sessions.write().await;
        let entry = sessions.entry(app_id.clone()).or_default();
        entry.push((id, sink));
        info!(
            app_id = %app_id,
            session = id,
            sessions_for_app = entry.len(),
            "session registered"
        );
        SessionHandle { id, app_id }
    }

    /// Detach the session behind `handle`.
    ///
    /// Returns `false` when it was already gone, for example after a failed
    /// delivery removed it.
    pub async fn unregister(&self, handle: &SessionHandle) -> bool {
        let mut sessions = self.sessions.write().await;
        let removed = remove_session(&mut sessions, &handle.app_id, handle.id);
        if removed {
            info!(app_id = %handle.app_id, session = handle.id, "session unregistered");
        } else {
            debug!(app_id = %handle.app_id, session = handle.id, "session already unregistered");
        }
        removed
    }

    /// Deliver `message` to every session registered under its `app_id`.
    ///
    /// A failing sink is unregistered; delivery to the others continues.
    /// With no matching session the message is dropped.
    pub async fn dispatch(&self, message: &RelayMessage) -> DispatchReport {
        let (delivered, failed) = {
            let sessions = self.sessions.read().await;
            let Some(targets) = sessions.get(&message.app_id) else {
                debug!(app_id = %message.app_id, "no session for app; message dropped");
                return DispatchReport::default();
            };
            deliver_all(
                message,
                targets.iter().map(|target| (message.app_id.as_str(), target)),
            )
        };

        let failed_count = failed.len();
        self.evict(failed).await;

        debug!(
            app_id = %message.app_id,
            delivered,
            failed = failed_count,
            "message dispatched"
        );
        DispatchReport {
            delivered,
            failed: failed_count,
        }
    }

    /// Deliver `message` to every registered session regardless of app.
    pub async fn broadcast(&self, message: &RelayMessage) -> DispatchReport {
        let (delivered, failed) = {
            let sessions = self.sessions.read().await;
            deliver_all(
                message,
                sessions
                    .iter()
                    .flat_map(|(app_id, targets)| targets.iter().map(move |t| (app_id.as_str(), t))),
            )
        };

        let failed_count = failed.len();
        self.evict(failed).await;

        DispatchReport {
            delivered,
            failed: failed_count,
        }
    }

    /// Number of live sessions across all apps.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.values().map(Vec::len).sum()
    }

    /// Application identities with at least one live session.
    pub async fn app_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn evict(&self, failed: Vec<(String, u64)>) {
        if failed.is_empty() {
            return;
        }
        let mut sessions = self.sessions.write().await;
        for (app_id, id) in failed {
            if remove_session(&mut sessions, &app_id, id) {
                warn!(app_id = %app_id, session = id, "session unregistered after failed delivery");
            }
        }
    }
}

impl std::fmt::Debug for FanoutRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutRegistry")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Deliver to each target, returning the success count and the failures.
fn deliver_all<'a>(
    message: &RelayMessage,
    targets: impl Iterator<Item = (&'a str, &'a (u64, Arc<dyn DeliverySink>))>,
) -> (usize, Vec<(String, u64)>) {
    let mut delivered = 0;
    let mut failed = Vec::new();
    for (app_id, (id, sink)) in targets {
        match sink.deliver(message) {
            Ok(()) => delivered += 1,
            Err(err) => {
                warn!(app_id, session = *id, %err, "delivery failed");
                failed.push((app_id.to_owned(), *id));
            }
        }
    }
    (delivered, failed)
}

fn remove_session(sessions: &mut SessionMap, app_id: &str, id: u64) -> bool {
    let Some(entry) = sessions.get_mut(app_id) else {
        return false;
    };
    let before = entry.len();
    entry.retain(|(existing, _)| *existing != id);
    let removed = entry.len() != before;
    if entry.is_empty() {
        sessions.remove(app_id);
    }
    removed
}
