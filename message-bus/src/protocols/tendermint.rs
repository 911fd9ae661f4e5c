//! Tendermint address handshake protocol
//!
//! Participants ask each other for the network endpoint of their consensus
//! node before genesis. A request is answered either with the endpoint or
//! with an error; an invalid response is itself answered with an error.

use crate::protocol::Protocol;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tendermint protocol marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tendermint;

/// Handshake performatives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TendermintPerformative {
    /// Ask for the peer's endpoint
    Request,
    /// Endpoint answer
    Response,
    /// The previous message was rejected
    Error,
}

/// Handshake error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TendermintErrorCode {
    /// The request or response could not be accepted
    InvalidRequest,
}

/// Handshake message body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "performative", rename_all = "snake_case")]
pub enum TendermintBody {
    /// Ask for the endpoint
    Request {
        /// Optional query qualifier
        #[serde(default)]
        query: Option<String>,
    },
    /// Endpoint of the responder
    Response {
        /// Endpoint URL
        info: String,
    },
    /// Rejection of the targeted message
    Error {
        /// Error code
        error_code: TendermintErrorCode,
        /// Human readable reason
        error_msg: String,
        /// Supporting data
        error_data: BTreeMap<String, Vec<u8>>,
    },
}

/// Handshake outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TendermintEndState {
    /// The peer endpoint was received and stored
    ConfigShared,
    /// The peer rejected the request
    ConfigNotShared,
}

impl Protocol for Tendermint {
    type Performative = TendermintPerformative;
    type Body = TendermintBody;
    type EndState = TendermintEndState;

    const NAME: &'static str = "tendermint";

    fn performative(body: &TendermintBody) -> TendermintPerformative {
        match body {
            TendermintBody::Request { .. } => TendermintPerformative::Request,
            TendermintBody::Response { .. } => TendermintPerformative::Response,
            TendermintBody::Error { .. } => TendermintPerformative::Error,
        }
    }

    fn initial_performatives() -> &'static [TendermintPerformative] {
        &[TendermintPerformative::Request]
    }

    fn valid_replies(performative: TendermintPerformative) -> &'static [TendermintPerformative] {
        match performative {
            TendermintPerformative::Request => &[
                TendermintPerformative::Response,
                TendermintPerformative::Error,
            ],
            TendermintPerformative::Response => &[TendermintPerformative::Error],
            TendermintPerformative::Error => &[],
        }
    }
}
