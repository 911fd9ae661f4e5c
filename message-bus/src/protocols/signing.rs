//! Signing protocol
//!
//! Asks a signer to sign a transaction or a message. The payload wire format
//! is `aea.open_aea.signing.v1_0_0.SigningMessage`, see [`wire`].

use crate::protocol::{Protocol, ResponseEndState, ResponseProtocol};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Signing protocol marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signing;

/// Signing performatives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningPerformative {
    /// Ask for a transaction signature
    SignTransaction,
    /// Ask for a message signature
    SignMessage,
    /// Signed transaction answer
    SignedTransaction,
    /// Signed message answer
    SignedMessage,
    /// Signing failed
    Error,
}

/// Signing failure reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SigningErrorCode {
    /// The message could not be signed
    UnsuccessfulMessageSigning,
    /// The transaction could not be signed
    UnsuccessfulTransactionSigning,
}

/// Signing message body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "performative", rename_all = "snake_case")]
pub enum SigningBody {
    /// Sign `raw_transaction` under `terms`
    SignTransaction {
        /// Encoded terms
        terms: Vec<u8>,
        /// Unsigned transaction
        raw_transaction: Vec<u8>,
    },
    /// Sign `raw_message` under `terms`
    SignMessage {
        /// Encoded terms
        terms: Vec<u8>,
        /// Message to sign
        raw_message: Vec<u8>,
    },
    /// Signed transaction
    SignedTransaction {
        /// Encoded signed transaction
        signed_transaction: Vec<u8>,
    },
    /// Signed message
    SignedMessage {
        /// Encoded signature
        signed_message: Vec<u8>,
    },
    /// Signing failed
    Error {
        /// Failure reason
        error_code: SigningErrorCode,
    },
}

impl Protocol for Signing {
    type Performative = SigningPerformative;
    type Body = SigningBody;
    type EndState = ResponseEndState;

    const NAME: &'static str = "signing";

    fn performative(body: &SigningBody) -> SigningPerformative {
        match body {
            SigningBody::SignTransaction { .. } => SigningPerformative::SignTransaction,
            SigningBody::SignMessage { .. } => SigningPerformative::SignMessage,
            SigningBody::SignedTransaction { .. } => SigningPerformative::SignedTransaction,
            SigningBody::SignedMessage { .. } => SigningPerformative::SignedMessage,
            SigningBody::Error { .. } => SigningPerformative::Error,
        }
    }

    fn initial_performatives() -> &'static [SigningPerformative] {
        &[
            SigningPerformative::SignTransaction,
            SigningPerformative::SignMessage,
        ]
    }

    fn valid_replies(performative: SigningPerformative) -> &'static [SigningPerformative] {
        match performative {
            SigningPerformative::SignTransaction => &[
                SigningPerformative::SignedTransaction,
                SigningPerformative::Error,
            ],
            SigningPerformative::SignMessage => &[
                SigningPerformative::SignedMessage,
                SigningPerformative::Error,
            ],
            SigningPerformative::SignedTransaction
            | SigningPerformative::SignedMessage
            | SigningPerformative::Error => &[],
        }
    }
}

impl ResponseProtocol for Signing {
    fn allowed_responses() -> &'static [SigningPerformative] {
        &[
            SigningPerformative::SignedMessage,
            SigningPerformative::SignedTransaction,
            SigningPerformative::Error,
        ]
    }

    fn response_end_state(performative: SigningPerformative) -> ResponseEndState {
        match performative {
            SigningPerformative::Error => ResponseEndState::Failed,
            _ => ResponseEndState::Successful,
        }
    }
}

/// Encode a body into its protobuf payload
pub fn encode(body: &SigningBody) -> Vec<u8> {
    prost::Message::encode_to_vec(&wire::SigningMessage::from(body))
}

/// Decode a protobuf payload into a body
pub fn decode(bytes: &[u8]) -> Result<SigningBody> {
    let message: wire::SigningMessage = prost::Message::decode(bytes)?;
    SigningBody::try_from(message)
}

impl From<&SigningBody> for wire::SigningMessage {
    fn from(body: &SigningBody) -> Self {
        use wire::Performative;

        let performative = match body {
            SigningBody::SignTransaction {
                terms,
                raw_transaction,
            } => Performative::SignTransaction(wire::SignTransactionPerformative {
                terms: Some(wire::Terms {
                    terms: terms.clone(),
                }),
                raw_transaction: Some(wire::RawTransaction {
                    raw_transaction: raw_transaction.clone(),
                }),
            }),
            SigningBody::SignMessage { terms, raw_message } => {
                Performative::SignMessage(wire::SignMessagePerformative {
                    terms: Some(wire::Terms {
                        terms: terms.clone(),
                    }),
                    raw_message: Some(wire::RawMessage {
                        raw_message: raw_message.clone(),
                    }),
                })
            }
            SigningBody::SignedTransaction { signed_transaction } => {
                Performative::SignedTransaction(wire::SignedTransactionPerformative {
                    signed_transaction: Some(wire::SignedTransaction {
                        signed_transaction: signed_transaction.clone(),
                    }),
                })
            }
            SigningBody::SignedMessage { signed_message } => {
                Performative::SignedMessage(wire::SignedMessagePerformative {
                    signed_message: Some(wire::SignedMessage {
                        signed_message: signed_message.clone(),
                    }),
                })
            }
            SigningBody::Error { error_code } => {
                let code = match error_code {
                    SigningErrorCode::UnsuccessfulMessageSigning => {
                        wire::ErrorCodeEnum::UnsuccessfulMessageSigning
                    }
                    SigningErrorCode::UnsuccessfulTransactionSigning => {
                        wire::ErrorCodeEnum::UnsuccessfulTransactionSigning
                    }
                };
                Performative::Error(wire::ErrorPerformative {
                    error_code: Some(wire::ErrorCode {
                        error_code: code as i32,
                    }),
                })
            }
        };

        wire::SigningMessage {
            performative: Some(performative),
        }
    }
}

impl TryFrom<wire::SigningMessage> for SigningBody {
    type Error = Error;

    fn try_from(message: wire::SigningMessage) -> Result<Self> {
        use wire::Performative;

        let performative = message
            .performative
            .ok_or_else(|| Error::Other("signing message without performative".to_string()))?;

        let body = match performative {
            Performative::SignTransaction(p) => SigningBody::SignTransaction {
                terms: p.terms.unwrap_or_default().terms,
                raw_transaction: p.raw_transaction.unwrap_or_default().raw_transaction,
            },
            Performative::SignMessage(p) => SigningBody::SignMessage {
                terms: p.terms.unwrap_or_default().terms,
                raw_message: p.raw_message.unwrap_or_default().raw_message,
            },
            Performative::SignedTransaction(p) => SigningBody::SignedTransaction {
                signed_transaction: p.signed_transaction.unwrap_or_default().signed_transaction,
            },
            Performative::SignedMessage(p) => SigningBody::SignedMessage {
                signed_message: p.signed_message.unwrap_or_default().signed_message,
            },
            Performative::Error(p) => {
                let raw = p.error_code.unwrap_or_default().error_code;
                let error_code = match wire::ErrorCodeEnum::try_from(raw) {
                    Ok(wire::ErrorCodeEnum::UnsuccessfulMessageSigning) => {
                        SigningErrorCode::UnsuccessfulMessageSigning
                    }
                    Ok(wire::ErrorCodeEnum::UnsuccessfulTransactionSigning) => {
                        SigningErrorCode::UnsuccessfulTransactionSigning
                    }
                    Err(_) => return Err(Error::Other(format!("unknown signing error code {}", raw))),
                };
                SigningBody::Error { error_code }
            }
        };
        Ok(body)
    }
}

/// Protobuf schema of the signing payload
pub mod wire {
    #![allow(missing_docs)]

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SigningMessage {
        #[prost(oneof = "Performative", tags = "5, 6, 7, 8, 9")]
        pub performative: ::core::option::Option<Performative>,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Performative {
        #[prost(message, tag = "5")]
        Error(ErrorPerformative),
        #[prost(message, tag = "6")]
        SignMessage(SignMessagePerformative),
        #[prost(message, tag = "7")]
        SignTransaction(SignTransactionPerformative),
        #[prost(message, tag = "8")]
        SignedMessage(SignedMessagePerformative),
        #[prost(message, tag = "9")]
        SignedTransaction(SignedTransactionPerformative),
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum ErrorCodeEnum {
        UnsuccessfulMessageSigning = 0,
        UnsuccessfulTransactionSigning = 1,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ErrorCode {
        #[prost(enumeration = "ErrorCodeEnum", tag = "1")]
        pub error_code: i32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct RawMessage {
        #[prost(bytes = "vec", tag = "1")]
        pub raw_message: ::prost::alloc::vec::Vec<u8>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct RawTransaction {
        #[prost(bytes = "vec", tag = "1")]
        pub raw_transaction: ::prost::alloc::vec::Vec<u8>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SignedMessage {
        #[prost(bytes = "vec", tag = "1")]
        pub signed_message: ::prost::alloc::vec::Vec<u8>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SignedTransaction {
        #[prost(bytes = "vec", tag = "1")]
        pub signed_transaction: ::prost::alloc::vec::Vec<u8>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Terms {
        #[prost(bytes = "vec", tag = "1")]
        pub terms: ::prost::alloc::vec::Vec<u8>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SignTransactionPerformative {
        #[prost(message, optional, tag = "1")]
        pub terms: ::core::option::Option<Terms>,
        #[prost(message, optional, tag = "2")]
        pub raw_transaction: ::core::option::Option<RawTransaction>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SignMessagePerformative {
        #[prost(message, optional, tag = "1")]
        pub terms: ::core::option::Option<Terms>,
        #[prost(message, optional, tag = "2")]
        pub raw_message: ::core::option::Option<RawMessage>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SignedTransactionPerformative {
        #[prost(message, optional, tag = "1")]
        pub signed_transaction: ::core::option::Option<SignedTransaction>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SignedMessagePerformative {
        #[prost(message, optional, tag = "1")]
        pub signed_message: ::core::option::Option<SignedMessage>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ErrorPerformative {
        #[prost(message, optional, tag = "1")]
        pub error_code: ::core::option::Option<ErrorCode>,
    }
}
