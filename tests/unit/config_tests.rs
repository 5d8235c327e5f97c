use std::path::PathBuf;
use std::time::Duration;

use details_relay::models::endpoint::RelayEndpoint;
use details_relay::{AppError, RelayConfig};

fn sample_toml() -> &'static str {
    r#"
[relay]
socket_path = "/tmp/test-relay.sock"
connect_timeout_ms = 250
probe_attempts = 5
probe_interval_ms = 20

[http]
port = 9000
role = "Notification"
keepalive_seconds = 30
session_buffer = 16
"#
}

#[test]
fn parses_valid_config() {
    let config = RelayConfig::from_toml_str(sample_toml()).expect("config parses");

    assert_eq!(
        config.endpoint(),
        RelayEndpoint::Path(PathBuf::from("/tmp/test-relay.sock"))
    );
    assert_eq!(config.connect_timeout(), Duration::from_millis(250));
    assert_eq!(config.relay.probe_attempts, 5);
    assert_eq!(config.probe_interval(), Duration::from_millis(20));
    assert_eq!(config.http.port, 9000);
    assert_eq!(config.http.role, "Notification");
    assert_eq!(config.keepalive(), Duration::from_secs(30));
    assert_eq!(config.http.session_buffer, 16);
}

#[test]
fn empty_config_uses_defaults() {
    let config = RelayConfig::from_toml_str("").expect("empty config parses");

    assert_eq!(config, RelayConfig::default());
    assert_eq!(config.endpoint(), RelayEndpoint::platform_default());
    assert_eq!(config.http.port, 8081);
    assert_eq!(config.http.role, "WebSocket");
    assert_eq!(config.keepalive(), Duration::from_secs(15));
    assert_eq!(config.connect_timeout(), Duration::from_millis(1000));
    assert_eq!(config.http.session_buffer, 256);
}

#[test]
fn port_override_selects_loopback() {
    let config = RelayConfig::from_toml_str("[relay]\nport = 9911\n").expect("config parses");
    assert_eq!(config.endpoint(), RelayEndpoint::Loopback(9911));
}

#[test]
fn rejects_path_and_port_together() {
    let result = RelayConfig::from_toml_str(
        "[relay]\nsocket_path = \"/tmp/x.sock\"\nport = 9911\n",
    );
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn rejects_zero_port() {
    let result = RelayConfig::from_toml_str("[relay]\nport = 0\n");
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn rejects_zero_connect_timeout() {
    let result = RelayConfig::from_toml_str("[relay]\nconnect_timeout_ms = 0\n");
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn rejects_zero_session_buffer() {
    let result = RelayConfig::from_toml_str("[http]\nsession_buffer = 0\n");
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn rejects_blank_role() {
    let result = RelayConfig::from_toml_str("[http]\nrole = \"  \"\n");
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn invalid_toml_is_config_error() {
    let err = RelayConfig::from_toml_str("[relay\nport = ").expect_err("invalid toml");
    assert!(err.to_string().starts_with("config: invalid config"));
}

#[test]
fn load_from_path_reads_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("relay.toml");
    std::fs::write(&path, sample_toml()).expect("write config");

    let config = RelayConfig::load_or_default(Some(&path)).expect("load");
    assert_eq!(config.http.port, 9000);
}

#[test]
fn load_from_missing_path_is_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let result = RelayConfig::load_from_path(dir.path().join("absent.toml"));
    assert!(matches!(result, Err(AppError::Config(_))));
}
