//! Rendezvous endpoint identity.

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Loopback TCP port used where filesystem-domain sockets are unavailable.
pub const DEFAULT_LOOPBACK_PORT: u16 = 8765;

/// Filesystem socket path used on platforms with domain sockets.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/details_ws_ipc.sock";

/// Address of the shared relay channel.
///
/// Fixed for the lifetime of a process; clients and the server derive it
/// the same way so they always agree on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RelayEndpoint {
    /// TCP port on `127.0.0.1`.
    Loopback(u16),
    /// Filesystem-domain socket path.
    Path(PathBuf),
}

impl RelayEndpoint {
    /// Endpoint selected from platform capability.
    ///
    /// Unix-like systems use [`DEFAULT_SOCKET_PATH`]; everything else falls
    /// back to loopback TCP on [`DEFAULT_LOOPBACK_PORT`].
    #[must_use]
    pub fn platform_default() -> Self {
        if cfg!(unix) {
            Self::Path(PathBuf::from(DEFAULT_SOCKET_PATH))
        } else {
            Self::Loopback(DEFAULT_LOOPBACK_PORT)
        }
    }

    /// Whether the endpoint leaves an artifact on disk while bound.
    #[must_use]
    pub fn is_filesystem(&self) -> bool {
        matches!(self, Self::Path(_))
    }
}

impl Display for RelayEndpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loopback(port) => write!(f, "tcp://127.0.0.1:{port}"),
            Self::Path(path) => write!(f, "unix://{}", path.display()),
        }
    }
}
