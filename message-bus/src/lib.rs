//! Dialogue-based message bus
//!
//! Provides request/response correlation for agent protocols:
//! - Protocol descriptors with per-protocol performatives
//! - Dialogue registry tracking conversations by nonce
//! - Pending-request table mapping nonces to continuations
//! - Generic response handler parametrized by allowed performatives
//! - Outbox abstraction for replies

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]

pub mod dialogue;
pub mod error;
pub mod handler;
pub mod message;
pub mod metrics;
pub mod outbox;
pub mod protocol;
pub mod protocols;
pub mod requests;

pub use dialogue::{Dialogue, DialogueLabel, DialogueStats, Dialogues, SharedDialogues};
pub use error::{Error, Result};
pub use handler::{DiscardReason, Dispatch, ResponseHandler};
pub use message::{DialogueReference, Message};
pub use outbox::{ChannelOutbox, Outbox};
pub use protocol::{Payload, Protocol, ResponseEndState, ResponseProtocol};
pub use requests::{Callback, Requests, SharedRequests};
