//! Relay configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::models::endpoint::RelayEndpoint;
use crate::{AppError, Result};

/// Rendezvous channel settings.
///
/// Leaving both `socket_path` and `port` unset selects
/// [`RelayEndpoint::platform_default`].
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RelaySection {
    /// Filesystem socket path override.
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
    /// Loopback TCP port override.
    #[serde(default)]
    pub port: Option<u16>,
    /// Upper bound on a single connect attempt, including the startup probe.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// How many refused probes it takes to declare a socket file stale.
    #[serde(default = "default_probe_attempts")]
    pub probe_attempts: u32,
    /// Delay between refused probes.
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            socket_path: None,
            port: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            probe_attempts: default_probe_attempts(),
            probe_interval_ms: default_probe_interval_ms(),
        }
    }
}

/// HTTP gateway settings for the notification process.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HttpSection {
    /// Port for the health and WebSocket routes on `127.0.0.1`.
    #[serde(default = "default_http_port")]
    pub port: u16,
    /// Role label reported by the health endpoint.
    #[serde(default = "default_role")]
    pub role: String,
    /// Interval between keep-alive frames sent to each session.
    #[serde(default = "default_keepalive_seconds")]
    pub keepalive_seconds: u64,
    /// Messages buffered per session before deliveries start failing.
    #[serde(default = "default_session_buffer")]
    pub session_buffer: usize,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            port: default_http_port(),
            role: default_role(),
            keepalive_seconds: default_keepalive_seconds(),
            session_buffer: default_session_buffer(),
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    1000
}

fn default_probe_attempts() -> u32 {
    3
}

fn default_probe_interval_ms() -> u64 {
    50
}

fn default_http_port() -> u16 {
    8081
}

fn default_role() -> String {
    "WebSocket".into()
}

fn default_keepalive_seconds() -> u64 {
    15
}

fn default_session_buffer() -> usize {
    256
}

/// Top-level configuration parsed from `relay.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RelayConfig {
    /// Rendezvous channel settings.
    #[serde(default)]
    pub relay: RelaySection,
    /// HTTP gateway settings.
    #[serde(default)]
    pub http: HttpSection,
}

impl RelayConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Load from `path` when given, otherwise use defaults.
    ///
    /// # Errors
    ///
    /// Same as [`RelayConfig::load_from_path`].
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Ok(Self::default()),
        }
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// The endpoint every process using this config agrees on.
    #[must_use]
    pub fn endpoint(&self) -> RelayEndpoint {
        match (&self.relay.socket_path, self.relay.port) {
            (Some(path), _) => RelayEndpoint::Path(path.clone()),
            (None, Some(port)) => RelayEndpoint::Loopback(port),
            (None, None) => RelayEndpoint::platform_default(),
        }
    }

    /// Connect timeout as a [`Duration`].
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.relay.connect_timeout_ms)
    }

    /// Delay between refused probes as a [`Duration`].
    #[must_use]
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.relay.probe_interval_ms)
    }

    /// Keep-alive interval as a [`Duration`].
    #[must_use]
    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.http.keepalive_seconds)
    }

    fn validate(&self) -> Result<()> {
        if self.relay.socket_path.is_some() && self.relay.port.is_some() {
            return Err(AppError::Config(
                "relay.socket_path and relay.port are mutually exclusive".into(),
            ));
        }

        if self.relay.port == Some(0) {
            return Err(AppError::Config("relay.port must not be zero".into()));
        }

        if self.relay.connect_timeout_ms == 0 {
            return Err(AppError::Config(
                "relay.connect_timeout_ms must be greater than zero".into(),
            ));
        }

        if self.relay.probe_attempts == 0 {
            return Err(AppError::Config(
                "relay.probe_attempts must be greater than zero".into(),
            ));
        }

        if self.http.keepalive_seconds == 0 {
            return Err(AppError::Config(
                "http.keepalive_seconds must be greater than zero".into(),
            ));
        }

        if self.http.session_buffer == 0 {
            return Err(AppError::Config(
                "http.session_buffer must be greater than zero".into(),
            ));
        }

        if self.http.role.trim().is_empty() {
            return Err(AppError::Config("http.role must not be empty".into()));
        }

        Ok(())
    }
}
