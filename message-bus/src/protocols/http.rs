//! HTTP request/response protocol

use crate::protocol::{Payload, Protocol, ResponseEndState, ResponseProtocol};
use serde::{Deserialize, Serialize};

/// HTTP protocol marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Http;

/// HTTP performatives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpPerformative {
    /// Outgoing HTTP request
    Request,
    /// HTTP response
    Response,
}

/// HTTP message body
pub type HttpBody = Payload<HttpPerformative>;

impl Protocol for Http {
    type Performative = HttpPerformative;
    type Body = HttpBody;
    type EndState = ResponseEndState;

    const NAME: &'static str = "http";

    fn performative(body: &HttpBody) -> HttpPerformative {
        body.performative
    }

    fn initial_performatives() -> &'static [HttpPerformative] {
        &[HttpPerformative::Request]
    }

    fn valid_replies(performative: HttpPerformative) -> &'static [HttpPerformative] {
        match performative {
            HttpPerformative::Request => &[HttpPerformative::Response],
            HttpPerformative::Response => &[],
        }
    }
}

impl ResponseProtocol for Http {
    fn allowed_responses() -> &'static [HttpPerformative] {
        &[HttpPerformative::Response]
    }

    fn response_end_state(_performative: HttpPerformative) -> ResponseEndState {
        // Error statuses still arrive as a response
        ResponseEndState::Successful
    }
}
