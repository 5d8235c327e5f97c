//! Ownership election for the shared relay endpoint.
//!
//! Every process that wants to receive relayed messages calls
//! [`Rendezvous::elect`] once at startup. The first process to bind the
//! endpoint becomes the owner and runs the relay server; every later
//! process finds it live and becomes a borrower that only sends.
//!
//! The probe and the bind are separate steps. The OS bind is exclusive, so
//! when two processes both see an unowned endpoint only one bind succeeds.
//! The loser re-probes and, on finding the winner live, becomes a borrower
//! instead of failing.

use std::io;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::RelayConfig;
use crate::ipc::transport::{self, RelayListener};
use crate::models::endpoint::RelayEndpoint;
use crate::{AppError, Result};

/// Which side of the endpoint this process is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayRole {
    /// Bound the endpoint; runs the server and owns teardown.
    Owner,
    /// Found the endpoint owned; sends only.
    Borrower,
}

impl RelayRole {
    /// Whether this process is responsible for unbinding the endpoint.
    #[must_use]
    pub fn is_owner(self) -> bool {
        matches!(self, Self::Owner)
    }
}

/// Outcome of [`Rendezvous::elect`].
#[derive(Debug)]
pub enum Election {
    /// This process won; the bound listener is handed to the relay server.
    Owner(RelayListener),
    /// Another process owns the endpoint.
    Borrower,
}

impl Election {
    /// Role implied by this outcome.
    #[must_use]
    pub fn role(&self) -> RelayRole {
        match self {
            Self::Owner(_) => RelayRole::Owner,
            Self::Borrower => RelayRole::Borrower,
        }
    }
}

/// Result of a single probe connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe {
    /// Something accepted the connection.
    Live,
    /// The socket file does not exist.
    Absent,
    /// The endpoint exists but nothing answered.
    Refused,
}

/// Probe-then-bind election over one endpoint.
#[derive(Debug, Clone)]
pub struct Rendezvous {
    endpoint: RelayEndpoint,
    connect_timeout: Duration,
    probe_attempts: u32,
    probe_interval: Duration,
}

impl Rendezvous {
    /// Election over `endpoint` with a single probe attempt.
    #[must_use]
    pub fn new(endpoint: RelayEndpoint, connect_timeout: Duration) -> Self {
        Self {
            endpoint,
            connect_timeout,
            probe_attempts: 1,
            probe_interval: Duration::ZERO,
        }
    }

    /// Election using the endpoint and probe policy from `config`.
    #[must_use]
    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.endpoint(), config.connect_timeout())
            .with_probe_policy(config.relay.probe_attempts, config.probe_interval())
    }

    /// Retry a refused probe `attempts` times, `interval` apart, before
    /// concluding nobody is listening.
    #[must_use]
    pub fn with_probe_policy(mut self, attempts: u32, interval: Duration) -> Self {
        self.probe_attempts = attempts.max(1);
        self.probe_interval = interval;
        self
    }

    /// Endpoint being contended.
    #[must_use]
    pub fn endpoint(&self) -> &RelayEndpoint {
        &self.endpoint
    }

    /// Whether a relay is currently listening on the endpoint.
    pub async fn is_running(&self) -> bool {
        self.probe_once().await == Probe::Live
    }

    /// Decide this process's role, binding the endpoint if it is unowned.
    ///
    /// A stale socket file left by a crashed owner is removed before binding.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BindFailure` when the endpoint cannot be bound and
    /// no live owner explains why.
    pub async fn elect(&self) -> Result<Election> {
        match self.probe_once().await {
            Probe::Live => {
                info!(endpoint = %self.endpoint, "relay endpoint already owned; running as borrower");
                return Ok(Election::Borrower);
            }
            Probe::Refused if self.endpoint.is_filesystem() => {
                if self.confirm_live().await {
                    info!(endpoint = %self.endpoint, "relay endpoint came up; running as borrower");
                    return Ok(Election::Borrower);
                }
                warn!(endpoint = %self.endpoint, "removing stale relay socket");
                transport::remove_artifact(&self.endpoint).map_err(|err| {
                    AppError::BindFailure(format!(
                        "cannot remove stale socket {}: {err}",
                        self.endpoint
                    ))
                })?;
            }
            Probe::Refused | Probe::Absent => {}
        }

        match transport::listen(&self.endpoint).await {
            Ok(listener) => {
                info!(endpoint = %listener.endpoint(), "relay endpoint bound; running as owner");
                Ok(Election::Owner(listener))
            }
            Err(err) if err.kind() == io::ErrorKind::AddrInUse => {
                if self.confirm_live().await {
                    info!(endpoint = %self.endpoint, "lost bind race; running as borrower");
                    Ok(Election::Borrower)
                } else {
                    Err(AppError::BindFailure(format!(
                        "{} is in use but no relay answers",
                        self.endpoint
                    )))
                }
            }
            Err(err) => Err(AppError::BindFailure(format!(
                "cannot bind {}: {err}",
                self.endpoint
            ))),
        }
    }

    async fn probe_once(&self) -> Probe {
        match transport::connect(&self.endpoint, self.connect_timeout).await {
            Ok(_stream) => Probe::Live,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Probe::Absent,
            Err(_) => Probe::Refused,
        }
    }

    /// Probe up to `probe_attempts` times, stopping at the first live answer.
    async fn confirm_live(&self) -> bool {
        for attempt in 0..self.probe_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.probe_interval).await;
            }
            if self.probe_once().await == Probe::Live {
                return true;
            }
        }
        false
    }
}
