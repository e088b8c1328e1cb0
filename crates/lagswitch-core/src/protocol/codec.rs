//! Newline-delimited JSON codec for the helper channel.
//!
//! Wire format: one JSON object per line, UTF-8, terminated by `\n`.  Lines
//! longer than [`MAX_LINE_LEN`] are rejected before parsing.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::messages::MAX_LINE_LEN;

/// Errors that can occur while encoding, decoding, or interpreting messages.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The line exceeds [`MAX_LINE_LEN`] bytes.
    #[error("line too long: {len} bytes")]
    LineTooLong { len: usize },

    /// The line is not a valid message.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(String),

    /// The helper speaks a different protocol version.
    #[error("unsupported protocol version: expected {expected}, got {got}")]
    UnsupportedVersion { expected: u32, got: u32 },

    /// An acknowledgement arrived for a different request.
    #[error("reply for request {got} while waiting for {expected}")]
    IdMismatch { expected: Uuid, got: Uuid },

    /// The helper reported that the request failed.
    #[error("helper rejected request: {0}")]
    Rejected(String),

    /// A message arrived that makes no sense at this point in the exchange.
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes `msg` as a single newline-terminated JSON line.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails and
/// [`ProtocolError::LineTooLong`] if the result exceeds the line limit.
pub fn encode_line<T: Serialize>(msg: &T) -> Result<String, ProtocolError> {
    let mut line = serde_json::to_string(msg).map_err(|e| ProtocolError::Encode(e.to_string()))?;
    if line.len() > MAX_LINE_LEN {
        return Err(ProtocolError::LineTooLong { len: line.len() });
    }
    line.push('\n');
    Ok(line)
}

/// Decodes one line produced by [`encode_line`].
///
/// A trailing `\n` or `\r\n` is ignored.
///
/// # Errors
///
/// Returns [`ProtocolError::LineTooLong`] or [`ProtocolError::Malformed`].
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T, ProtocolError> {
    let line = line.trim_end_matches(['\n', '\r']);
    if line.len() > MAX_LINE_LEN {
        return Err(ProtocolError::LineTooLong { len: line.len() });
    }
    let msg = serde_json::from_str(line).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    tracing::trace!(len = line.len(), "decoded helper line");
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::lag_state::LagState;
    use crate::protocol::messages::{HelperCommand, HelperReply, HelperRequest};

    #[test]
    fn test_encode_request_shape() {
        let id = Uuid::nil();
        let line = encode_line(&HelperRequest {
            id,
            command: HelperCommand::Toggle,
        })
        .unwrap();
        assert_eq!(
            line,
            "{\"id\":\"00000000-0000-0000-0000-000000000000\",\"command\":\"toggle\"}\n"
        );
    }

    #[test]
    fn test_encode_ack_uses_type_tag() {
        let line = encode_line(&HelperReply::Ack {
            id: Uuid::nil(),
            state: LagState::Active,
        })
        .unwrap();
        assert!(line.starts_with("{\"type\":\"ack\""));
        assert!(line.contains("\"state\":\"active\""));
        assert!(line.ends_with('\n'));
    }

    #[test]
    fn test_decode_failed_with_null_id() {
        let reply: HelperReply =
            decode_line("{\"type\":\"failed\",\"id\":null,\"reason\":\"bad line\"}\r\n").unwrap();
        assert_eq!(
            reply,
            HelperReply::Failed {
                id: None,
                reason: "bad line".to_string()
            }
        );
    }

    #[test]
    fn test_decode_rejects_unknown_command() {
        let result: Result<HelperRequest, _> = decode_line(
            "{\"id\":\"00000000-0000-0000-0000-000000000000\",\"command\":\"reboot\"}",
        );
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_oversized_line() {
        let line = "x".repeat(MAX_LINE_LEN + 1);
        let result: Result<HelperRequest, _> = decode_line(&line);
        assert_eq!(
            result,
            Err(ProtocolError::LineTooLong {
                len: MAX_LINE_LEN + 1
            })
        );
    }

    #[test]
    fn test_encode_rejects_oversized_reason() {
        let result = encode_line(&HelperReply::Failed {
            id: None,
            reason: "r".repeat(MAX_LINE_LEN),
        });
        assert!(matches!(result, Err(ProtocolError::LineTooLong { .. })));
    }
}
