//! Error types shared across the relay.

use std::fmt::{Display, Formatter};

/// Shared relay result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Relay error enumeration covering all domain failure modes.
///
/// An endpoint that is already owned by a live process is not an error; it
/// surfaces as [`crate::ipc::rendezvous::Election::Borrower`].
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// The endpoint could not be bound and no live owner explains why.
    BindFailure(String),
    /// A wire line was not a valid relay message.
    MalformedMessage(String),
    /// The relay endpoint could not be reached by a client.
    RelayUnavailable(String),
    /// A session sink rejected a delivery.
    SinkDelivery(String),
    /// HTTP gateway failure.
    Http(String),
    /// File-system or socket I/O failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::BindFailure(msg) => write!(f, "bind failure: {msg}"),
            Self::MalformedMessage(msg) => write!(f, "malformed message: {msg}"),
            Self::RelayUnavailable(msg) => write!(f, "relay unavailable: {msg}"),
            Self::SinkDelivery(msg) => write!(f, "sink delivery: {msg}"),
            Self::Http(msg) => write!(f, "http: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedMessage(err.to_string())
    }
}
