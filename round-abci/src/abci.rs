//! ABCI request dispatcher
//!
//! Answers each consensus-engine call while funneling state changes through a
//! [`RoundState`]. Every `check_tx` / `deliver_tx` gets a response:
//!
//! - decode, signature and transaction-type failures answer [`ERROR_CODE`]
//!   without touching the round state
//! - a transaction arriving after the round closed answers [`ERROR_CODE`] too
//! - anything else answers [`OK_CODE`]
//!
//! Commit failures are not masked: they are logged and returned to the caller.

use crate::{
    error::TxError,
    metrics::TX_TOTAL,
    period::RoundState,
    transaction::TransactionCodec,
    Error, Result,
};
use tendermint_proto::v0_37::abci::{
    RequestBeginBlock, RequestCheckTx, RequestDeliverTx, RequestEndBlock, RequestInfo,
    ResponseBeginBlock, ResponseCheckTx, ResponseCommit, ResponseDeliverTx, ResponseEndBlock,
    ResponseInfo,
};
use tracing::{debug, error, info};

/// Response code of an accepted transaction
pub const OK_CODE: u32 = 0;

/// Response code of a rejected transaction
pub const ERROR_CODE: u32 = 1;

/// Dispatcher over round state `R` and transaction codec `C`
#[derive(Debug)]
pub struct RoundApp<R, C> {
    round: R,
    codec: C,
    ledger_id: String,
}

impl<R, C> RoundApp<R, C>
where
    R: RoundState,
    C: TransactionCodec<Transaction = R::Transaction>,
{
    /// Create a dispatcher verifying signatures against `ledger_id`
    pub fn new(round: R, codec: C, ledger_id: impl Into<String>) -> Self {
        Self {
            round,
            codec,
            ledger_id: ledger_id.into(),
        }
    }

    /// Round state
    pub fn round(&self) -> &R {
        &self.round
    }

    /// Mutable round state, for the code driving rounds
    pub fn round_mut(&mut self) -> &mut R {
        &mut self.round
    }

    /// Ledger signatures are verified against
    pub fn ledger_id(&self) -> &str {
        &self.ledger_id
    }

    /// Report the round height; never mutates state
    pub fn info(&self, request: RequestInfo) -> ResponseInfo {
        debug!(version = %request.version, "info request");
        ResponseInfo {
            last_block_height: self.round.height(),
            ..Default::default()
        }
    }

    /// Forward the block header to the round state
    pub fn begin_block(&mut self, request: RequestBeginBlock) -> Result<ResponseBeginBlock> {
        let header = request
            .header
            .ok_or_else(|| Error::Abci("begin_block request without header".to_string()))?;
        self.round.begin_block(header)?;
        Ok(ResponseBeginBlock::default())
    }

    /// Validate a transaction for the mempool
    pub fn check_tx(&mut self, request: RequestCheckTx) -> ResponseCheckTx {
        match self.validate(&request.tx) {
            Ok(_) => {
                record("check_tx", "ok");
                ResponseCheckTx {
                    code: OK_CODE,
                    info: "check_tx succeeded".to_string(),
                    ..Default::default()
                }
            }
            Err(e) => {
                reject("check_tx", &e);
                ResponseCheckTx {
                    code: ERROR_CODE,
                    info: e.to_string(),
                    ..Default::default()
                }
            }
        }
    }

    /// Validate a transaction and apply it to the round state
    pub fn deliver_tx(&mut self, request: RequestDeliverTx) -> ResponseDeliverTx {
        let outcome = self
            .validate(&request.tx)
            .and_then(|transaction| self.round.deliver_tx(transaction));

        match outcome {
            Ok(()) => {
                record("deliver_tx", "ok");
                ResponseDeliverTx {
                    code: OK_CODE,
                    info: "deliver_tx succeeded".to_string(),
                    ..Default::default()
                }
            }
            Err(e) => {
                reject("deliver_tx", &e);
                ResponseDeliverTx {
                    code: ERROR_CODE,
                    info: e.to_string(),
                    ..Default::default()
                }
            }
        }
    }

    /// Close the block in progress
    pub fn end_block(&mut self, request: RequestEndBlock) -> Result<ResponseEndBlock> {
        debug!(height = request.height, "end block");
        self.round.end_block()?;
        Ok(ResponseEndBlock::default())
    }

    /// Commit the block; a round-state failure is fatal
    pub fn commit(&mut self) -> Result<ResponseCommit> {
        if let Err(e) = self.round.commit() {
            error!(error = %e, "commit failed");
            return Err(e);
        }
        info!(height = self.round.height(), "commit");
        Ok(ResponseCommit::default())
    }

    fn validate(&self, bytes: &[u8]) -> std::result::Result<R::Transaction, TxError> {
        let transaction = self.codec.decode(bytes)?;
        self.codec.verify(&transaction, &self.ledger_id)?;
        self.round.check_is_finished()?;
        Ok(transaction)
    }
}

fn record(method: &str, outcome: &str) {
    TX_TOTAL.with_label_values(&[method, outcome]).inc();
}

fn reject(method: &str, err: &TxError) {
    if err.is_late_arrival() {
        debug!(method, error = %err, "late arriving transaction");
        record(method, "late");
    } else {
        error!(method, error = %err, "transaction rejected");
        record(method, "rejected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::Period;
    use crate::transaction::{
        SignedTransactionCodec, Transaction, TxPayload, ED25519_LEDGER_ID,
    };
    use ed25519_dalek::SigningKey;
    use tendermint_proto::v0_37::types::Header;

    type App = RoundApp<Period<Transaction>, SignedTransactionCodec>;

    fn app() -> App {
        RoundApp::new(
            Period::new(),
            SignedTransactionCodec::new(["registration"]),
            ED25519_LEDGER_ID,
        )
    }

    fn signed_tx(tx_type: &str) -> Vec<u8> {
        let key = SigningKey::from_bytes(&[9u8; 32]);
        let payload = TxPayload {
            tx_type: tx_type.to_string(),
            data: vec![1, 2, 3],
        };
        Transaction::sign(payload, &key).unwrap().encode().unwrap()
    }

    fn begin(app: &mut App, height: i64) {
        app.begin_block(RequestBeginBlock {
            header: Some(Header {
                height,
                ..Default::default()
            }),
            ..Default::default()
        })
        .unwrap();
    }

    #[test]
    fn test_info_reports_height() {
        let mut app = app();
        assert_eq!(app.info(RequestInfo::default()).last_block_height, 0);

        begin(&mut app, 1);
        app.commit().unwrap();

        let response = app.info(RequestInfo::default());
        assert_eq!(response.last_block_height, 1);
        assert!(response.data.is_empty());
        assert_eq!(response.app_version, 0);
    }

    #[test]
    fn test_check_tx_accepts_valid_transaction() {
        let mut app = app();
        let response = app.check_tx(RequestCheckTx {
            tx: signed_tx("registration").into(),
            ..Default::default()
        });

        assert_eq!(response.code, OK_CODE);
        assert_eq!(response.info, "check_tx succeeded");
        assert!(response.data.is_empty());
        assert_eq!(response.gas_wanted, 0);
        assert_eq!(response.gas_used, 0);
    }

    #[test]
    fn test_check_tx_does_not_deliver() {
        let mut app = app();
        begin(&mut app, 1);
        app.check_tx(RequestCheckTx {
            tx: signed_tx("registration").into(),
            ..Default::default()
        });
        assert!(app.round().pending_transactions().is_empty());
    }

    #[test]
    fn test_check_tx_rejects_unknown_type() {
        let mut app = app();
        let response = app.check_tx(RequestCheckTx {
            tx: signed_tx("vote").into(),
            ..Default::default()
        });

        assert_eq!(response.code, ERROR_CODE);
        assert!(response
            .info
            .starts_with("TransactionTypeNotRecognizedError: "));
    }

    #[test]
    fn test_deliver_tx_applies_transaction() {
        let mut app = app();
        begin(&mut app, 1);

        let response = app.deliver_tx(RequestDeliverTx {
            tx: signed_tx("registration").into(),
        });
        assert_eq!(response.code, OK_CODE);
        assert_eq!(response.info, "deliver_tx succeeded");
        assert_eq!(app.round().pending_transactions().len(), 1);
    }

    #[test]
    fn test_late_arriving_transaction() {
        let mut app = app();
        begin(&mut app, 1);
        app.round_mut().finish_round();

        let response = app.deliver_tx(RequestDeliverTx {
            tx: signed_tx("registration").into(),
        });
        assert_eq!(response.code, ERROR_CODE);
        assert!(response.info.starts_with("LateArrivingTransaction: "));
        assert!(app.round().pending_transactions().is_empty());
    }

    #[test]
    fn test_begin_block_without_header() {
        let mut app = app();
        let err = app.begin_block(RequestBeginBlock::default()).unwrap_err();
        assert!(matches!(err, Error::Abci(_)));
    }

    #[test]
    fn test_commit_failure_propagates() {
        let mut app = app();
        begin(&mut app, 5);
        app.end_block(RequestEndBlock { height: 5 }).unwrap();

        let err = app.commit().unwrap_err();
        assert!(matches!(err, Error::AddBlock(_)));
    }
}
