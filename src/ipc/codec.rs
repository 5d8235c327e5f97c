//! Newline-delimited JSON codec for the relay wire protocol.
//!
//! Framing and parsing are separate steps. [`RelayLineCodec`] only splits
//! the byte stream into lines, so a bad line never poisons the framed
//! stream; [`decode_line`] then turns each line into a [`RelayMessage`].
//!
//! ```text
//! {"appId":"workspace-123","payload":"job finished"}\n
//! ```

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::debug;

use crate::models::message::RelayMessage;
use crate::{AppError, Result};

/// Line framer for inbound relay connections.
///
/// Splits on `\n` over raw bytes without a length cap and without looking
/// at the encoding, so invalid UTF-8 is reported per line by
/// [`decode_line`] instead of ending the stream. Bytes left without a
/// terminating `\n` when the stream ends are discarded.
#[derive(Debug, Default)]
pub struct RelayLineCodec {
    // Bytes already scanned for a newline in the current buffer.
    next_index: usize,
}

impl RelayLineCodec {
    /// Create a new codec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for RelayLineCodec {
    type Item = BytesMut;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let scan_from = self.next_index.min(src.len());
        match src[scan_from..].iter().position(|byte| *byte == b'\n') {
            Some(offset) => {
                let newline = scan_from + offset;
                self.next_index = 0;
                let mut line = src.split_to(newline + 1);
                line.truncate(newline);
                Ok(Some(line))
            }
            None => {
                self.next_index = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if !src.is_empty() {
            debug!(bytes = src.len(), "discarding unterminated line at eof");
            src.clear();
        }
        self.next_index = 0;
        Ok(None)
    }
}

/// Serialize `message` as one wire line, including the trailing `\n`.
///
/// # Errors
///
/// Returns `AppError::MalformedMessage` if serialization fails.
pub fn encode_line(message: &RelayMessage) -> Result<String> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Parse one framed line into a [`RelayMessage`].
///
/// Returns `Ok(None)` for blank lines. A trailing `\r` is tolerated.
///
/// # Errors
///
/// Returns `AppError::MalformedMessage` when the line is not UTF-8, not
/// JSON, or lacks `appId`/`payload` strings.
pub fn decode_line(line: impl AsRef<[u8]>) -> Result<Option<RelayMessage>> {
    let text = std::str::from_utf8(line.as_ref())
        .map_err(|err| AppError::MalformedMessage(format!("relay line is not utf-8: {err}")))?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|err| AppError::MalformedMessage(format!("invalid relay line: {err}")))
}
