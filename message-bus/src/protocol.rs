//! Protocol descriptors
//!
//! A protocol names itself, declares its performatives and the shape of the
//! dialogues built from them. Dialogues, the pending-request table and the
//! response handler are all generic over a [`Protocol`].

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;

/// Static description of a request/response protocol
pub trait Protocol: Debug + Clone + PartialEq + Send + Sync + 'static {
    /// Semantic verb carried by each message
    type Performative: Copy + Eq + Hash + Debug + Send + Sync + Serialize + DeserializeOwned;

    /// Message content; the performative is derived from it
    type Body: Clone + PartialEq + Debug + Send + Sync + Serialize + DeserializeOwned;

    /// Outcome recorded when a dialogue of this protocol finishes
    type EndState: Copy + Eq + Hash + Debug + Send + Sync;

    /// Protocol name, used in logs and metric labels
    const NAME: &'static str;

    /// Performative of a message body
    fn performative(body: &Self::Body) -> Self::Performative;

    /// Performatives allowed to open a dialogue
    fn initial_performatives() -> &'static [Self::Performative];

    /// Performatives that may answer a message with `performative`
    fn valid_replies(performative: Self::Performative) -> &'static [Self::Performative];
}

/// A protocol whose responses are routed through the generic
/// [`ResponseHandler`](crate::handler::ResponseHandler)
pub trait ResponseProtocol: Protocol {
    /// Performatives the handler accepts as responses
    fn allowed_responses() -> &'static [Self::Performative];

    /// End state of a dialogue closed by a response with `performative`
    fn response_end_state(performative: Self::Performative) -> Self::EndState;
}

/// Opaque body for protocols whose content schema lives with the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload<K> {
    /// Message verb
    pub performative: K,

    /// Encoded content, passed through untouched
    #[serde(default)]
    pub content: serde_json::Value,
}

impl<K> Payload<K> {
    /// Payload with empty content
    pub fn new(performative: K) -> Self {
        Self {
            performative,
            content: serde_json::Value::Null,
        }
    }

    /// Payload with the given content
    pub fn with_content(performative: K, content: serde_json::Value) -> Self {
        Self {
            performative,
            content,
        }
    }
}

/// End states shared by the plain request/response protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseEndState {
    /// The request was answered with a result
    Successful,
    /// The request was answered with an error
    Failed,
}
