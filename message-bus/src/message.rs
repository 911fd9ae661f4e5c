//! Message envelope for dialogue-based protocols

use crate::protocol::Protocol;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reference pair identifying a dialogue
///
/// The nonce is chosen by the initiator; the responder reference stays empty
/// until the responder has replied once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DialogueReference {
    /// Initiator nonce
    pub nonce: String,

    /// Responder reference
    pub responder: String,
}

impl DialogueReference {
    /// Reference for a freshly opened dialogue
    pub fn new(nonce: impl Into<String>) -> Self {
        Self {
            nonce: nonce.into(),
            responder: String::new(),
        }
    }

    /// Fully assigned reference
    pub fn complete(nonce: impl Into<String>, responder: impl Into<String>) -> Self {
        Self {
            nonce: nonce.into(),
            responder: responder.into(),
        }
    }

    /// Whether the responder has assigned its half
    pub fn is_complete(&self) -> bool {
        !self.responder.is_empty()
    }

    /// Random reference token
    pub fn generate_token() -> String {
        Uuid::new_v4().simple().to_string()
    }
}

/// Message envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Message<P: Protocol> {
    /// Position in the dialogue, starting at 1
    pub message_id: i32,

    /// Id of the message this one replies to (0 for the opening message)
    pub target: i32,

    /// Dialogue reference
    pub dialogue_reference: DialogueReference,

    /// Sender address
    pub sender: String,

    /// Recipient address
    pub to: String,

    /// Protocol content
    pub body: P::Body,
}

impl<P: Protocol> Message<P> {
    /// Performative of this message
    pub fn performative(&self) -> P::Performative {
        P::performative(&self.body)
    }

    /// Whether this message opens a dialogue
    pub fn is_opening(&self) -> bool {
        self.message_id == 1 && self.target == 0
    }

    /// Nonce of the dialogue this message belongs to
    pub fn nonce(&self) -> &str {
        &self.dialogue_reference.nonce
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
