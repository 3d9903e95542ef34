//! Transport-level protocol message.

use crate::identifiers::{MemberId, SessionId};
use serde::{Deserialize, Serialize};

/// One round message of a threshold protocol, as carried by the network.
///
/// The payload is opaque to every layer between the two party machines that
/// produce and consume it. A message is either addressed to one recipient or
/// broadcast to the whole group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolMessage {
    /// Party that produced the message.
    pub sender: MemberId,
    /// Addressee for point-to-point messages; `None` for broadcasts.
    pub recipient: Option<MemberId>,
    /// Session the message belongs to.
    pub session: SessionId,
    /// Opaque round payload.
    pub payload: Vec<u8>,
}

impl ProtocolMessage {
    /// Whether this message is addressed to the whole group.
    pub fn is_broadcast(&self) -> bool {
        self.recipient.is_none()
    }
}
