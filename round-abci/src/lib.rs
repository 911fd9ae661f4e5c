//! Round ABCI application
//!
//! Connects a round-based agent to a CometBFT consensus engine.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Consensus Engine                    │
//! └────────────────────┬────────────────────────────────┘
//!                      │ ABCI socket
//!                      ↓
//! ┌─────────────────────────────────────────────────────┐
//! │   AbciServer → RoundApp                             │
//! │   decode → verify → check_is_finished → deliver_tx  │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//!                      ↓
//! ┌─────────────────────────────────────────────────────┐
//! │   RoundState (Period)                               │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! Before genesis, participants exchange the endpoints of their consensus
//! nodes through the [`handshake`] protocol.
//!
//! # ABCI Methods
//!
//! - **Info**: Round height
//! - **BeginBlock / EndBlock**: Forwarded to the round state
//! - **CheckTx**: Decode, verify, reject late arrivals
//! - **DeliverTx**: As CheckTx, then apply to the round state
//! - **Commit**: Append the block; failures abort

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod abci;
pub mod config;
pub mod error;
pub mod handshake;
pub mod metrics;
pub mod period;
pub mod server;
pub mod transaction;

// Re-exports
pub use abci::{RoundApp, ERROR_CODE, OK_CODE};
pub use config::Config;
pub use error::{Error, Result, TxError};
pub use handshake::{Endpoint, EndpointError, Handled, RegisteredAddresses, TendermintHandler};
pub use period::{Period, RoundState};
pub use server::AbciServer;
pub use transaction::{SignedTransactionCodec, Transaction, TransactionCodec, TxPayload};
