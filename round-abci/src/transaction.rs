//! Transaction decoding and signature verification
//!
//! The dispatcher treats transactions as opaque: it only needs to turn the raw
//! bytes handed over by the consensus engine into a transaction and to check
//! its signature against a ledger. [`SignedTransactionCodec`] is the codec the
//! node ships with.

use crate::error::TxError;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Debug;

/// Ledger identifier accepted by [`SignedTransactionCodec`]
pub const ED25519_LEDGER_ID: &str = "ed25519";

/// Decode step applied to every `check_tx` / `deliver_tx` payload
pub trait TransactionCodec {
    /// Structured transaction handed to the round state
    type Transaction: Debug;

    /// Decode raw transaction bytes
    ///
    /// Fails with [`TxError::TransactionNotValid`] on malformed input and
    /// [`TxError::TransactionTypeNotRecognized`] on an unknown payload type.
    fn decode(&self, bytes: &[u8]) -> Result<Self::Transaction, TxError>;

    /// Verify the transaction signature for `ledger_id`
    fn verify(&self, transaction: &Self::Transaction, ledger_id: &str) -> Result<(), TxError>;
}

/// Signed content of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxPayload {
    /// Payload type, checked against the codec's known types
    pub tx_type: String,

    /// Application data
    pub data: Vec<u8>,
}

/// Signed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Ed25519 public key of the sender
    pub sender: [u8; 32],

    /// Signed payload
    pub payload: TxPayload,

    /// Signature over the encoded payload
    pub signature: Vec<u8>,
}

impl Transaction {
    /// Sign `payload` with `signing_key`
    pub fn sign(payload: TxPayload, signing_key: &SigningKey) -> Result<Self, TxError> {
        let message = payload_bytes(&payload)?;
        let signature = signing_key.sign(&message);

        Ok(Self {
            sender: signing_key.verifying_key().to_bytes(),
            payload,
            signature: signature.to_bytes().to_vec(),
        })
    }

    /// Encode for submission to the consensus engine
    pub fn encode(&self) -> Result<Vec<u8>, TxError> {
        bincode::serialize(self).map_err(|e| TxError::TransactionNotValid(e.to_string()))
    }
}

fn payload_bytes(payload: &TxPayload) -> Result<Vec<u8>, TxError> {
    bincode::serialize(payload).map_err(|e| TxError::TransactionNotValid(e.to_string()))
}

/// Bincode transaction codec with ed25519 signatures
#[derive(Debug, Clone, Default)]
pub struct SignedTransactionCodec {
    known_types: BTreeSet<String>,
}

impl SignedTransactionCodec {
    /// Codec recognising the given payload types
    pub fn new<I, T>(known_types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            known_types: known_types.into_iter().map(Into::into).collect(),
        }
    }

    /// Recognised payload types
    pub fn known_types(&self) -> impl Iterator<Item = &str> {
        self.known_types.iter().map(String::as_str)
    }
}

impl TransactionCodec for SignedTransactionCodec {
    type Transaction = Transaction;

    fn decode(&self, bytes: &[u8]) -> Result<Transaction, TxError> {
        let transaction: Transaction = bincode::deserialize(bytes)
            .map_err(|e| TxError::TransactionNotValid(format!("cannot decode transaction: {}", e)))?;

        if !self.known_types.contains(&transaction.payload.tx_type) {
            return Err(TxError::TransactionTypeNotRecognized(format!(
                "unknown transaction type '{}'",
                transaction.payload.tx_type
            )));
        }

        Ok(transaction)
    }

    fn verify(&self, transaction: &Transaction, ledger_id: &str) -> Result<(), TxError> {
        if ledger_id != ED25519_LEDGER_ID {
            return Err(TxError::SignatureNotValid(format!(
                "ledger '{}' is not supported",
                ledger_id
            )));
        }

        let verifying_key = VerifyingKey::from_bytes(&transaction.sender)
            .map_err(|e| TxError::SignatureNotValid(format!("invalid sender key: {}", e)))?;

        let signature: [u8; 64] = transaction.signature.as_slice().try_into().map_err(|_| {
            TxError::SignatureNotValid(format!(
                "signature must be 64 bytes, got {}",
                transaction.signature.len()
            ))
        })?;

        let message = payload_bytes(&transaction.payload)?;
        verifying_key
            .verify(&message, &Signature::from_bytes(&signature))
            .map_err(|e| TxError::SignatureNotValid(format!("verification failed: {}", e)))
    }
}
