//! Relay message envelope.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Wire name of the routing field.
pub const APP_ID_FIELD: &str = "appId";

/// Wire name of the delivered text.
pub const PAYLOAD_FIELD: &str = "payload";

/// Older producers wrote `app_id` / `message`. They are read only when the
/// current name is absent; otherwise they are ordinary extra fields.
const LEGACY_APP_ID_FIELD: &str = "app_id";
const LEGACY_PAYLOAD_FIELD: &str = "message";

/// One notification carried on a single wire line.
///
/// Only `app_id` and `payload` are interpreted by the relay. Every other
/// field on the wire is kept in `extra` and written back out unchanged.
/// `extra` must not hold [`APP_ID_FIELD`] or [`PAYLOAD_FIELD`];
/// [`RelayMessage::with_field`] enforces that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayMessage {
    /// Application identity used to route the message to sessions.
    #[serde(rename = "appId")]
    pub app_id: String,
    /// Opaque text delivered to each matching session.
    pub payload: String,
    /// Pass-through fields the relay does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RelayMessage {
    /// Build a message with no extra fields.
    #[must_use]
    pub fn new(app_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            payload: payload.into(),
            extra: Map::new(),
        }
    }

    /// Attach a pass-through field.
    ///
    /// `appId` and `payload` are the envelope itself and are ignored here;
    /// set [`RelayMessage::app_id`] or [`RelayMessage::payload`] instead.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if !is_reserved_field(&key) {
            self.extra.insert(key, value);
        }
        self
    }
}

/// Whether `key` names an envelope field rather than a pass-through one.
#[must_use]
pub fn is_reserved_field(key: &str) -> bool {
    key == APP_ID_FIELD || key == PAYLOAD_FIELD
}

impl<'de> Deserialize<'de> for RelayMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut extra = Map::deserialize(deserializer)?;
        let app_id = take_string(&mut extra, APP_ID_FIELD, LEGACY_APP_ID_FIELD)
            .map_err(D::Error::custom)?;
        let payload = take_string(&mut extra, PAYLOAD_FIELD, LEGACY_PAYLOAD_FIELD)
            .map_err(D::Error::custom)?;
        Ok(Self {
            app_id,
            payload,
            extra,
        })
    }
}

fn take_string(
    fields: &mut Map<String, Value>,
    name: &str,
    legacy: &str,
) -> Result<String, String> {
    let (found, value) = match fields.remove(name) {
        Some(value) => (name, value),
        None => match fields.remove(legacy) {
            Some(value) => (legacy, value),
            None => return Err(format!("missing field `{name}`")),
        },
    };
    match value {
        Value::String(text) => Ok(text),
        other => Err(format!("field `{found}` must be a string, got {other}")),
    }
}
