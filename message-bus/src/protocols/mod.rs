//! Protocol definitions
//!
//! `http`, `signing`, `ledger_api` and `contract_api` are request/response
//! protocols answered through the generic response handler. `tendermint` is
//! the peer address handshake.

pub mod contract_api;
pub mod http;
pub mod ledger_api;
pub mod signing;
pub mod tendermint;
