//! Prometheus metrics for message bus

use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, IntCounterVec};

lazy_static! {
    /// Response handler outcomes
    pub static ref DISPATCH_TOTAL: IntCounterVec = register_int_counter_vec!(
        "message_bus_dispatch_total",
        "Inbound responses by protocol and handling outcome",
        &["protocol", "outcome"]
    )
    .expect("message_bus_dispatch_total registers once");

    /// Finished dialogues
    pub static ref DIALOGUE_END_STATE_TOTAL: IntCounterVec = register_int_counter_vec!(
        "message_bus_dialogue_end_state_total",
        "Finished dialogues by protocol and end state",
        &["protocol", "end_state"]
    )
    .expect("message_bus_dialogue_end_state_total registers once");
}
