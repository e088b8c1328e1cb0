//! Messages exchanged between the listener and the privileged helper.
//!
//! The helper is started by the listener with piped stdin/stdout.  Only the
//! parent holds the other ends of those pipes, so nothing else on the machine
//! can send toggle requests.
//!
//! ```text
//! Listener (unprivileged)                  Helper (root)
//! ───────────────────────                  ─────────────
//!                                  ◄────   {"type":"ready","protocol":1,"pid":812}
//! {"id":"…","command":"toggle"}    ────►
//!                                  ◄────   {"type":"ack","id":"…","state":"active"}
//! {"id":"…","command":"status"}    ────►
//!                                  ◄────   {"type":"ack","id":"…","state":"active"}
//! <stdin closed>                   ────►   deactivate if active, exit 0
//! ```
//!
//! Requests are handled strictly in order, one at a time.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::codec::ProtocolError;
use crate::domain::lag_state::LagState;

/// Version announced in [`HelperReply::Ready`]; bump on breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum length of one encoded message, excluding the newline.
pub const MAX_LINE_LEN: usize = 4096;

/// Operation requested from the helper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HelperCommand {
    /// Flip the current state.
    Toggle,
    /// Force the inactive state; a no-op when already inactive.
    Deactivate,
    /// Report the current state without changing it.
    Status,
}

/// One request line sent to the helper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelperRequest {
    /// Echoed in the reply so the client can pair acknowledgements.
    pub id: Uuid,
    pub command: HelperCommand,
}

impl HelperRequest {
    /// Creates a request with a fresh random id.
    pub fn new(command: HelperCommand) -> Self {
        Self {
            id: Uuid::new_v4(),
            command,
        }
    }
}

/// One reply line sent by the helper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HelperReply {
    /// First line written after the helper starts.
    Ready { protocol: u32, pid: u32 },
    /// The request completed; `state` is the state after it ran.
    Ack { id: Uuid, state: LagState },
    /// The request failed.  `id` is `None` when the request line itself could
    /// not be decoded.
    Failed { id: Option<Uuid>, reason: String },
}

impl HelperReply {
    /// Validates the handshake line and returns the helper's PID.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::UnsupportedVersion`] for a different protocol version,
    /// [`ProtocolError::UnexpectedReply`] for anything other than `ready`.
    pub fn into_ready(self) -> Result<u32, ProtocolError> {
        match self {
            HelperReply::Ready { protocol, pid } if protocol == PROTOCOL_VERSION => Ok(pid),
            HelperReply::Ready { protocol, .. } => Err(ProtocolError::UnsupportedVersion {
                expected: PROTOCOL_VERSION,
                got: protocol,
            }),
            other => Err(ProtocolError::UnexpectedReply(format!("{other:?}"))),
        }
    }

    /// Interprets this line as the reply to request `id`.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::IdMismatch`] if the acknowledgement is for another request.
    /// - [`ProtocolError::Rejected`] if the helper reported a failure.
    /// - [`ProtocolError::UnexpectedReply`] for a second `ready` line.
    pub fn into_state_for(self, id: Uuid) -> Result<LagState, ProtocolError> {
        match self {
            HelperReply::Ack { id: got, state } if got == id => Ok(state),
            HelperReply::Ack { id: got, .. } => Err(ProtocolError::IdMismatch { expected: id, got }),
            HelperReply::Failed { reason, .. } => Err(ProtocolError::Rejected(reason)),
            other @ HelperReply::Ready { .. } => {
                Err(ProtocolError::UnexpectedReply(format!("{other:?}")))
            }
        }
    }
}
