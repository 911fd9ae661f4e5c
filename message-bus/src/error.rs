//! Error types for message bus

use thiserror::Error;

/// Message bus error
#[derive(Debug, Error)]
pub enum Error {
    /// A dialogue matched a response but no continuation was registered for it.
    ///
    /// This is a contract violation of the request-issuing code and is fatal.
    #[error("No callback defined for request with nonce: {nonce}")]
    MissingCallback {
        /// Nonce of the dialogue the response belongs to
        nonce: String,
    },

    /// A continuation is already pending for this nonce
    #[error("Callback already registered for request with nonce: {nonce}")]
    DuplicateCallback {
        /// Offending nonce
        nonce: String,
    },

    /// Message could not be attached to a dialogue
    #[error("Dialogue error: {0}")]
    Dialogue(String),

    /// Outbox is closed or rejected the message
    #[error("Outbox error: {0}")]
    Outbox(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Protobuf decode error
    #[error("Decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
