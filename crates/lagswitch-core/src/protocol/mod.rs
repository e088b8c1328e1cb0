//! Protocol module containing helper message types and the line codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_line, encode_line, ProtocolError};
pub use messages::*;
