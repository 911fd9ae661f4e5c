//! Generic response handler
//!
//! Routes an inbound response back to the continuation registered when the
//! request was sent. One engine serves every protocol; a protocol instance
//! differs only by the set of performatives it accepts as responses.
//!
//! For each message:
//! 1. Without a dialogue registry the message is logged and dropped.
//! 2. A message that matches no dialogue is logged and dropped.
//! 3. A performative outside the allowed set is logged and dropped.
//! 4. The continuation for the dialogue nonce is popped; a missing one is a
//!    fatal [`Error::MissingCallback`].
//! 5. The continuation runs with the message and the application state.
//! 6. When the response ends the dialogue, the end state mapped from its
//!    performative is recorded. Handlers built with [`ResponseHandler::new`]
//!    record nothing.

use crate::{
    dialogue::SharedDialogues,
    message::Message,
    metrics::DISPATCH_TOTAL,
    protocol::{Protocol, ResponseProtocol},
    requests::SharedRequests,
    Error, Result,
};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};

/// Outcome of handling one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The registered continuation ran
    Delivered {
        /// Nonce of the answered request
        nonce: String,
    },

    /// The message was logged and dropped
    Discarded(DiscardReason),
}

/// Why a message was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// No dialogue registry is wired for the protocol
    MissingDialogues,
    /// The message matched no dialogue
    UnidentifiedDialogue,
    /// The performative is not an accepted response
    UnallowedPerformative,
}

impl DiscardReason {
    fn as_label(self) -> &'static str {
        match self {
            DiscardReason::MissingDialogues => "missing_dialogues",
            DiscardReason::UnidentifiedDialogue => "unidentified_dialogue",
            DiscardReason::UnallowedPerformative => "unallowed_performative",
        }
    }
}

/// Response handler for protocol `P`, delivering into application state `S`
pub struct ResponseHandler<P: Protocol, S> {
    allowed_response_performatives: HashSet<P::Performative>,
    dialogues: Option<SharedDialogues<P>>,
    requests: SharedRequests<P, S>,
    end_state: Option<fn(P::Performative) -> P::EndState>,
}

impl<P: Protocol, S> ResponseHandler<P, S> {
    /// Create a handler accepting `allowed` as response performatives
    pub fn new(
        allowed: impl IntoIterator<Item = P::Performative>,
        dialogues: Option<SharedDialogues<P>>,
        requests: SharedRequests<P, S>,
    ) -> Self {
        Self {
            allowed_response_performatives: allowed.into_iter().collect(),
            dialogues,
            requests,
            end_state: None,
        }
    }

    /// Accepted response performatives
    pub fn allowed_response_performatives(&self) -> &HashSet<P::Performative> {
        &self.allowed_response_performatives
    }

    /// Handle one inbound message
    pub fn handle(&self, message: &Message<P>, state: &mut S) -> Result<Dispatch> {
        let dialogues = match &self.dialogues {
            Some(dialogues) => dialogues,
            None => {
                info!(
                    protocol = P::NAME,
                    "cannot find dialogues for protocol, dropping message"
                );
                return Ok(self.discard(DiscardReason::MissingDialogues));
            }
        };

        let label = match dialogues.lock().update(message) {
            Some(dialogue) => dialogue.label().clone(),
            None => {
                info!(
                    protocol = P::NAME,
                    ?message,
                    "received invalid message: unidentified dialogue"
                );
                return Ok(self.discard(DiscardReason::UnidentifiedDialogue));
            }
        };

        if !self
            .allowed_response_performatives
            .contains(&message.performative())
        {
            warn!(
                protocol = P::NAME,
                ?message,
                "received invalid message: unallowed performative"
            );
            return Ok(self.discard(DiscardReason::UnallowedPerformative));
        }

        // Pop before invoking so the continuation may register follow-ups
        let nonce = label.nonce.clone();
        let callback = self.requests.lock().take(&nonce);
        let callback = match callback {
            Some(callback) => callback,
            None => {
                DISPATCH_TOTAL
                    .with_label_values(&[P::NAME, "missing_callback"])
                    .inc();
                return Err(Error::MissingCallback { nonce });
            }
        };

        debug!(protocol = P::NAME, ?message, "calling registered callback");
        callback(message, state);

        let performative = message.performative();
        if let Some(end_state) = self.end_state {
            if P::valid_replies(performative).is_empty() {
                dialogues
                    .lock()
                    .record_end_state(&label, end_state(performative));
            }
        }

        DISPATCH_TOTAL.with_label_values(&[P::NAME, "delivered"]).inc();
        Ok(Dispatch::Delivered { nonce })
    }

    fn discard(&self, reason: DiscardReason) -> Dispatch {
        DISPATCH_TOTAL
            .with_label_values(&[P::NAME, reason.as_label()])
            .inc();
        Dispatch::Discarded(reason)
    }
}

impl<P: ResponseProtocol, S> ResponseHandler<P, S> {
    /// Handler accepting the protocol's declared response performatives
    ///
    /// Responses that end their dialogue record
    /// [`ResponseProtocol::response_end_state`].
    pub fn for_protocol(dialogues: SharedDialogues<P>, requests: SharedRequests<P, S>) -> Self {
        Self {
            end_state: Some(P::response_end_state),
            ..Self::new(
                P::allowed_responses().iter().copied(),
                Some(dialogues),
                requests,
            )
        }
    }
}

impl<P: Protocol, S> fmt::Debug for ResponseHandler<P, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseHandler")
            .field("protocol", &P::NAME)
            .field(
                "allowed_response_performatives",
                &self.allowed_response_performatives,
            )
            .field("has_dialogues", &self.dialogues.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::{DialogueLabel, Dialogues};
    use crate::message::DialogueReference;
    use crate::protocol::{Payload, ResponseEndState};
    use crate::protocols::http::{Http, HttpPerformative};
    use crate::protocols::ledger_api::{LedgerApi, LedgerApiPerformative};
    use crate::requests::Requests;
    use serde_json::json;

    #[derive(Debug, Default)]
    struct AppState {
        responses: Vec<serde_json::Value>,
    }

    struct Fixture {
        dialogues: SharedDialogues<Http>,
        requests: SharedRequests<Http, AppState>,
        handler: ResponseHandler<Http, AppState>,
    }

    fn fixture() -> Fixture {
        let dialogues = Dialogues::<Http>::new("agent").shared();
        let requests = Requests::new().shared();
        let handler = ResponseHandler::for_protocol(dialogues.clone(), requests.clone());
        Fixture {
            dialogues,
            requests,
            handler,
        }
    }

    fn send_request(fixture: &Fixture) -> Message<Http> {
        let request = fixture
            .dialogues
            .lock()
            .create("http-client", Payload::new(HttpPerformative::Request))
            .unwrap();
        fixture
            .requests
            .lock()
            .register(request.nonce(), |response: &Message<Http>, state: &mut AppState| {
                state.responses.push(response.body.content.clone());
            })
            .unwrap();
        request
    }

    fn response_to(request: &Message<Http>, performative: HttpPerformative) -> Message<Http> {
        Message {
            message_id: 2,
            target: 1,
            dialogue_reference: DialogueReference::complete(request.nonce(), "client-ref"),
            sender: "http-client".to_string(),
            to: "agent".to_string(),
            body: Payload::with_content(performative, json!({"status_code": 200})),
        }
    }

    #[test]
    fn test_response_delivered_to_callback() {
        let fixture = fixture();
        let request = send_request(&fixture);
        let mut state = AppState::default();

        let outcome = fixture
            .handler
            .handle(&response_to(&request, HttpPerformative::Response), &mut state)
            .unwrap();

        assert_eq!(
            outcome,
            Dispatch::Delivered {
                nonce: request.nonce().to_string()
            }
        );
        assert_eq!(state.responses, vec![json!({"status_code": 200})]);
        assert!(fixture.requests.lock().is_empty());
    }

    #[test]
    fn test_final_response_records_end_state() {
        let fixture = fixture();
        let request = send_request(&fixture);

        fixture
            .handler
            .handle(
                &response_to(&request, HttpPerformative::Response),
                &mut AppState::default(),
            )
            .unwrap();

        let dialogues = fixture.dialogues.lock();
        let stats = dialogues.dialogue_stats().self_initiated();
        assert_eq!(stats.get(&ResponseEndState::Successful), Some(&1));
        assert_eq!(stats.get(&ResponseEndState::Failed), None);
    }

    #[test]
    fn test_error_response_records_failed() {
        let dialogues = Dialogues::<LedgerApi>::new("agent").shared();
        let requests = Requests::<LedgerApi, u32>::new().shared();
        let handler = ResponseHandler::for_protocol(dialogues.clone(), requests.clone());

        let mut sent = Vec::new();
        for performative in [
            LedgerApiPerformative::GetBalance,
            LedgerApiPerformative::GetRawTransaction,
        ] {
            let request = dialogues
                .lock()
                .create("ledger", Payload::new(performative))
                .unwrap();
            requests
                .lock()
                .register(request.nonce(), |_, answered: &mut u32| *answered += 1)
                .unwrap();
            sent.push(request);
        }

        let reply = |request: &Message<LedgerApi>,
                     performative: LedgerApiPerformative|
         -> Message<LedgerApi> {
            Message {
                message_id: 2,
                target: 1,
                dialogue_reference: DialogueReference::complete(request.nonce(), "ledger-ref"),
                sender: "ledger".to_string(),
                to: "agent".to_string(),
                body: Payload::new(performative),
            }
        };

        let mut answered = 0;
        handler
            .handle(&reply(&sent[0], LedgerApiPerformative::Error), &mut answered)
            .unwrap();
        // A raw transaction is answered by sending it signed, so the dialogue stays open
        handler
            .handle(
                &reply(&sent[1], LedgerApiPerformative::RawTransaction),
                &mut answered,
            )
            .unwrap();
        assert_eq!(answered, 2);

        let dialogues = dialogues.lock();
        let stats = dialogues.dialogue_stats().self_initiated();
        assert_eq!(stats.get(&ResponseEndState::Failed), Some(&1));
        assert_eq!(stats.get(&ResponseEndState::Successful), None);

        let open = dialogues
            .get(&DialogueLabel {
                nonce: sent[1].nonce().to_string(),
                opponent: "ledger".to_string(),
                starter: "agent".to_string(),
            })
            .unwrap();
        assert!(!open.is_terminal());
    }

    #[test]
    fn test_plain_handler_records_nothing() {
        let fixture = fixture();
        let request = send_request(&fixture);
        let handler = ResponseHandler::new(
            [HttpPerformative::Response],
            Some(fixture.dialogues.clone()),
            fixture.requests.clone(),
        );

        handler
            .handle(
                &response_to(&request, HttpPerformative::Response),
                &mut AppState::default(),
            )
            .unwrap();

        assert!(fixture
            .dialogues
            .lock()
            .dialogue_stats()
            .self_initiated()
            .is_empty());
    }

    #[test]
    fn test_missing_dialogues_discards() {
        let requests = Requests::<Http, AppState>::new().shared();
        let handler = ResponseHandler::new([HttpPerformative::Response], None, requests);
        let message = Message {
            message_id: 2,
            target: 1,
            dialogue_reference: DialogueReference::complete("n", "r"),
            sender: "http-client".to_string(),
            to: "agent".to_string(),
            body: Payload::new(HttpPerformative::Response),
        };

        let outcome = handler.handle(&message, &mut AppState::default()).unwrap();
        assert_eq!(outcome, Dispatch::Discarded(DiscardReason::MissingDialogues));
    }

    #[test]
    fn test_unidentified_dialogue_discards() {
        let fixture = fixture();
        let mut state = AppState::default();
        let stray = Message {
            message_id: 2,
            target: 1,
            dialogue_reference: DialogueReference::complete("unknown", "r"),
            sender: "http-client".to_string(),
            to: "agent".to_string(),
            body: Payload::new(HttpPerformative::Response),
        };

        let outcome = fixture.handler.handle(&stray, &mut state).unwrap();
        assert_eq!(outcome, Dispatch::Discarded(DiscardReason::UnidentifiedDialogue));
        assert!(state.responses.is_empty());
    }

    #[test]
    fn test_unallowed_performative_skips_callback() {
        let fixture = fixture();
        let request = send_request(&fixture);
        let mut state = AppState::default();

        // A handler that only expects requests never treats a response as one
        let handler = ResponseHandler::new(
            [HttpPerformative::Request],
            Some(fixture.dialogues.clone()),
            fixture.requests.clone(),
        );
        let outcome = handler
            .handle(&response_to(&request, HttpPerformative::Response), &mut state)
            .unwrap();

        assert_eq!(outcome, Dispatch::Discarded(DiscardReason::UnallowedPerformative));
        assert!(state.responses.is_empty());
        assert!(fixture.requests.lock().contains(request.nonce()));
    }

    #[test]
    fn test_missing_callback_is_fatal() {
        let fixture = fixture();
        let request = fixture
            .dialogues
            .lock()
            .create("http-client", Payload::new(HttpPerformative::Request))
            .unwrap();

        let err = fixture
            .handler
            .handle(
                &response_to(&request, HttpPerformative::Response),
                &mut AppState::default(),
            )
            .unwrap_err();

        assert!(matches!(err, Error::MissingCallback { nonce } if nonce == request.nonce()));
    }

    #[test]
    fn test_callback_may_register_follow_up() {
        let fixture = fixture();
        let request = fixture
            .dialogues
            .lock()
            .create("http-client", Payload::new(HttpPerformative::Request))
            .unwrap();

        let requests = fixture.requests.clone();
        fixture
            .requests
            .lock()
            .register(request.nonce(), move |_, _: &mut AppState| {
                requests.lock().register("follow-up", |_, _| {}).unwrap();
            })
            .unwrap();

        fixture
            .handler
            .handle(
                &response_to(&request, HttpPerformative::Response),
                &mut AppState::default(),
            )
            .unwrap();

        assert!(fixture.requests.lock().contains("follow-up"));
    }
}
