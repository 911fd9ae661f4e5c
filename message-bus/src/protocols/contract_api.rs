//! Contract API protocol

use crate::protocol::{Payload, Protocol, ResponseEndState, ResponseProtocol};
use serde::{Deserialize, Serialize};

/// Contract API protocol marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractApi;

/// Contract API performatives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractApiPerformative {
    /// Ask for a deployment transaction
    GetDeployTransaction,
    /// Ask for a contract call transaction
    GetRawTransaction,
    /// Ask for a message to sign
    GetRawMessage,
    /// Ask for contract state
    GetState,
    /// State answer
    State,
    /// Transaction answer
    RawTransaction,
    /// Message answer
    RawMessage,
    /// Request failed
    Error,
}

/// Contract API message body
pub type ContractApiBody = Payload<ContractApiPerformative>;

impl Protocol for ContractApi {
    type Performative = ContractApiPerformative;
    type Body = ContractApiBody;
    type EndState = ResponseEndState;

    const NAME: &'static str = "contract_api";

    fn performative(body: &ContractApiBody) -> ContractApiPerformative {
        body.performative
    }

    fn initial_performatives() -> &'static [ContractApiPerformative] {
        use ContractApiPerformative::*;
        &[GetDeployTransaction, GetRawTransaction, GetRawMessage, GetState]
    }

    fn valid_replies(performative: ContractApiPerformative) -> &'static [ContractApiPerformative] {
        use ContractApiPerformative::*;
        match performative {
            GetDeployTransaction | GetRawTransaction => &[RawTransaction, Error],
            GetRawMessage => &[RawMessage, Error],
            GetState => &[State, Error],
            State | RawTransaction | RawMessage | Error => &[],
        }
    }
}

impl ResponseProtocol for ContractApi {
    fn allowed_responses() -> &'static [ContractApiPerformative] {
        use ContractApiPerformative::*;
        &[RawTransaction, RawMessage, Error, State]
    }

    fn response_end_state(performative: ContractApiPerformative) -> ResponseEndState {
        match performative {
            ContractApiPerformative::Error => ResponseEndState::Failed,
            _ => ResponseEndState::Successful,
        }
    }
}
