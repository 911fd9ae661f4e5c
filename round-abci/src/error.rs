//! Error types for the round ABCI application

use thiserror::Error;

/// Result type for round ABCI operations
pub type Result<T> = std::result::Result<T, Error>;

/// Round ABCI errors
#[derive(Error, Debug)]
pub enum Error {
    /// The round state could not append the block; chain state is inconsistent
    #[error("AddBlockError: {0}")]
    AddBlock(String),

    /// The round state rejected a forwarded call
    #[error("Round state error: {0}")]
    Round(String),

    /// Malformed ABCI request
    #[error("ABCI error: {0}")]
    Abci(String),

    /// Message bus error, including a response with no registered callback
    #[error("Message bus error: {0}")]
    Bus(#[from] message_bus::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

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

/// Reasons a transaction is refused at the ABCI boundary
///
/// The display form is the info message returned to the consensus engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxError {
    /// Signature does not match the sender
    #[error("SignatureNotValidError: {0}")]
    SignatureNotValid(String),

    /// Bytes do not decode to a transaction, or the round refuses it
    #[error("TransactionNotValidError: {0}")]
    TransactionNotValid(String),

    /// Payload type is unknown
    #[error("TransactionTypeNotRecognizedError: {0}")]
    TransactionTypeNotRecognized(String),

    /// The round already closed
    #[error("LateArrivingTransaction: {0}")]
    LateArriving(String),
}

impl TxError {
    /// Whether this is a late arrival rather than a validation failure
    pub fn is_late_arrival(&self) -> bool {
        matches!(self, TxError::LateArriving(_))
    }
}
