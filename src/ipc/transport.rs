//! Symmetric listen/connect over the relay endpoint.
//!
//! Filesystem endpoints use the `interprocess` local socket types, which
//! map to Unix domain sockets. Loopback endpoints use plain tokio TCP.
//! Both backends hand out an owned read half and write half so the server
//! and client never branch on the backend past this module.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use interprocess::local_socket::tokio::prelude::*;
use interprocess::local_socket::{GenericFilePath, ListenerOptions, ToFsName};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};

use crate::models::endpoint::RelayEndpoint;

/// Inbound half of a relay connection.
pub type PeerReader = Box<dyn AsyncRead + Send + Unpin>;

/// Outbound half of a relay connection.
pub type PeerWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A connected relay socket, split into owned halves.
pub struct PeerStream {
    /// Bytes from the peer.
    pub reader: PeerReader,
    /// Bytes to the peer.
    pub writer: PeerWriter,
}

impl PeerStream {
    fn from_local(stream: interprocess::local_socket::tokio::Stream) -> Self {
        let (reader, writer) = stream.split();
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    fn from_tcp(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }
}

/// A bound acceptor for one of the two backends.
pub enum RelayListener {
    /// Filesystem-domain socket bound at `path`.
    Local {
        /// Underlying `interprocess` listener.
        listener: interprocess::local_socket::tokio::Listener,
        /// Path of the socket artifact.
        path: PathBuf,
    },
    /// Loopback TCP acceptor.
    Tcp {
        /// Underlying tokio listener.
        listener: TcpListener,
        /// Port read back from the socket at bind time.
        port: u16,
    },
}

impl RelayListener {
    /// Wait for the next peer connection.
    ///
    /// # Errors
    ///
    /// Returns the underlying accept error; the listener stays usable.
    pub async fn accept(&self) -> io::Result<PeerStream> {
        match self {
            Self::Local { listener, .. } => listener.accept().await.map(PeerStream::from_local),
            Self::Tcp { listener, .. } => {
                let (stream, _) = listener.accept().await?;
                Ok(PeerStream::from_tcp(stream))
            }
        }
    }

    /// The endpoint this listener is bound to.
    ///
    /// For TCP this is the port the socket reported when it was bound, so
    /// binding `Loopback(0)` reports the port the OS picked.
    #[must_use]
    pub fn endpoint(&self) -> RelayEndpoint {
        match self {
            Self::Local { path, .. } => RelayEndpoint::Path(path.clone()),
            Self::Tcp { port, .. } => RelayEndpoint::Loopback(*port),
        }
    }
}

impl std::fmt::Debug for RelayListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RelayListener")
            .field(&self.endpoint().to_string())
            .finish()
    }
}

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

/// Bind `endpoint` and start listening.
///
/// A filesystem path that already exists fails with
/// [`io::ErrorKind::AddrInUse`], as does a TCP port that is taken.
///
/// # Errors
///
/// Returns the OS bind error unchanged so callers can inspect its kind.
pub async fn listen(endpoint: &RelayEndpoint) -> io::Result<RelayListener> {
    match endpoint {
        RelayEndpoint::Path(path) => {
            let name = path.as_path().to_fs_name::<GenericFilePath>()?;
            let listener = ListenerOptions::new().name(name).create_tokio()?;
            Ok(RelayListener::Local {
                listener,
                path: path.clone(),
            })
        }
        RelayEndpoint::Loopback(port) => {
            let listener = TcpListener::bind(loopback(*port)).await?;
            let port = listener.local_addr()?.port();
            Ok(RelayListener::Tcp { listener, port })
        }
    }
}

/// Connect to `endpoint`, giving up after `timeout`.
///
/// # Errors
///
/// Returns [`io::ErrorKind::TimedOut`] when the deadline passes, otherwise
/// the connect error (`NotFound` for a missing socket file,
/// `ConnectionRefused` for nobody listening).
pub async fn connect(endpoint: &RelayEndpoint, timeout: Duration) -> io::Result<PeerStream> {
    let attempt = async {
        match endpoint {
            RelayEndpoint::Path(path) => {
                let name = path.as_path().to_fs_name::<GenericFilePath>()?;
                interprocess::local_socket::tokio::Stream::connect(name)
                    .await
                    .map(PeerStream::from_local)
            }
            RelayEndpoint::Loopback(port) => TcpStream::connect(loopback(*port))
                .await
                .map(PeerStream::from_tcp),
        }
    };

    tokio::time::timeout(timeout, attempt).await.map_err(|_| {
        io::Error::new(
            io::ErrorKind::TimedOut,
            format!("connect to {endpoint} timed out after {timeout:?}"),
        )
    })?
}

/// Remove the on-disk artifact of a filesystem endpoint.
///
/// Loopback endpoints have nothing to remove. A file that is already gone
/// counts as success, so teardown can run more than once.
///
/// # Errors
///
/// Returns any removal error other than `NotFound`.
pub fn remove_artifact(endpoint: &RelayEndpoint) -> io::Result<()> {
    match endpoint {
        RelayEndpoint::Path(path) => remove_socket_file(path),
        RelayEndpoint::Loopback(_) => Ok(()),
    }
}

fn remove_socket_file(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}
