//! Ledger API protocol
//!
//! Requests to a ledger node: balances, raw transactions, submission,
//! receipts and contract state.

use crate::protocol::{Payload, Protocol, ResponseEndState, ResponseProtocol};
use serde::{Deserialize, Serialize};

/// Ledger API protocol marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerApi;

/// Ledger API performatives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerApiPerformative {
    /// Ask for an account balance
    GetBalance,
    /// Ask for an unsigned transaction
    GetRawTransaction,
    /// Submit a signed transaction
    SendSignedTransaction,
    /// Ask for a transaction receipt
    GetTransactionReceipt,
    /// Ask for ledger state
    GetState,
    /// Balance answer
    Balance,
    /// Unsigned transaction answer
    RawTransaction,
    /// Digest of a submitted transaction
    TransactionDigest,
    /// Receipt answer
    TransactionReceipt,
    /// State answer
    State,
    /// Request failed
    Error,
}

/// Ledger API message body
pub type LedgerApiBody = Payload<LedgerApiPerformative>;

impl Protocol for LedgerApi {
    type Performative = LedgerApiPerformative;
    type Body = LedgerApiBody;
    type EndState = ResponseEndState;

    const NAME: &'static str = "ledger_api";

    fn performative(body: &LedgerApiBody) -> LedgerApiPerformative {
        body.performative
    }

    fn initial_performatives() -> &'static [LedgerApiPerformative] {
        use LedgerApiPerformative::*;
        &[
            GetBalance,
            GetState,
            GetRawTransaction,
            SendSignedTransaction,
            GetTransactionReceipt,
        ]
    }

    fn valid_replies(performative: LedgerApiPerformative) -> &'static [LedgerApiPerformative] {
        use LedgerApiPerformative::*;
        match performative {
            GetBalance => &[Balance, Error],
            GetRawTransaction => &[RawTransaction, Error],
            SendSignedTransaction => &[TransactionDigest, Error],
            GetTransactionReceipt => &[TransactionReceipt, Error],
            GetState => &[State, Error],
            RawTransaction => &[SendSignedTransaction],
            TransactionDigest => &[GetTransactionReceipt],
            Balance | TransactionReceipt | State | Error => &[],
        }
    }
}

impl ResponseProtocol for LedgerApi {
    fn allowed_responses() -> &'static [LedgerApiPerformative] {
        use LedgerApiPerformative::*;
        &[
            Balance,
            RawTransaction,
            TransactionDigest,
            TransactionReceipt,
            Error,
            State,
        ]
    }

    fn response_end_state(performative: LedgerApiPerformative) -> ResponseEndState {
        match performative {
            LedgerApiPerformative::Error => ResponseEndState::Failed,
            _ => ResponseEndState::Successful,
        }
    }
}
