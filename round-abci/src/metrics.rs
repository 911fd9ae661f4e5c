//! Prometheus metrics for the ABCI dispatcher

use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, IntCounterVec};

lazy_static! {
    /// `check_tx` / `deliver_tx` outcomes
    pub static ref TX_TOTAL: IntCounterVec = register_int_counter_vec!(
        "round_abci_tx_total",
        "Transactions by ABCI method and outcome",
        &["method", "outcome"]
    )
    .expect("round_abci_tx_total registers once");
}
