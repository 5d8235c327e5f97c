//! Per-process relay lifecycle.
//!
//! A [`RelayNode`] bundles the election result with the registry and, for
//! the owner, the running relay server. It is built once at startup and
//! torn down once at exit.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::RelayConfig;
use crate::fanout::registry::FanoutRegistry;
use crate::ipc::client::RelayClient;
use crate::ipc::rendezvous::{Election, Rendezvous, RelayRole};
use crate::ipc::server::RelayServer;
use crate::Result;

/// The relay as seen from one process.
#[derive(Debug)]
pub struct RelayNode {
    role: RelayRole,
    registry: Arc<FanoutRegistry>,
    client: RelayClient,
    server: Option<RelayServer>,
}

impl RelayNode {
    /// Elect ownership of the configured endpoint and start the relay
    /// server if this process wins.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BindFailure` when the endpoint cannot be bound and
    /// is not owned by a live relay.
    pub async fn start(
        config: &RelayConfig,
        registry: Arc<FanoutRegistry>,
        ct: &CancellationToken,
    ) -> Result<Self> {
        let rendezvous = Rendezvous::from_config(config);
        let server = match rendezvous.elect().await? {
            Election::Owner(listener) => Some(RelayServer::spawn(listener, Arc::clone(&registry), ct)),
            Election::Borrower => None,
        };
        let role = if server.is_some() {
            RelayRole::Owner
        } else {
            RelayRole::Borrower
        };

        info!(?role, endpoint = %rendezvous.endpoint(), "relay node started");

        Ok(Self {
            role,
            registry,
            client: RelayClient::from_config(config),
            server,
        })
    }

    /// Role won at startup.
    #[must_use]
    pub fn role(&self) -> RelayRole {
        self.role
    }

    /// Registry the relay server dispatches into.
    #[must_use]
    pub fn registry(&self) -> &Arc<FanoutRegistry> {
        &self.registry
    }

    /// Sender bound to the same endpoint.
    #[must_use]
    pub fn client(&self) -> &RelayClient {
        &self.client
    }

    /// Stop the relay server if this process owns it.
    ///
    /// Borrowers have nothing to release.
    ///
    /// # Errors
    ///
    /// Propagates [`RelayServer::shutdown`] failures.
    pub async fn shutdown(self) -> Result<()> {
        match self.server {
            Some(server) => server.shutdown().await,
            None => {
                info!("borrower relay node stopped");
                Ok(())
            }
        }
    }
}
