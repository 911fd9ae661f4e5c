//! Property tests for response correlation
//!
//! - Every continuation fires at most once per nonce
//! - A duplicate response for an answered nonce is never delivered twice
//! - Responses with a performative outside the allowed set never fire

use message_bus::{
    protocols::ledger_api::{LedgerApi, LedgerApiPerformative},
    DialogueReference, Dialogues, DiscardReason, Dispatch, Error, Message, Payload, Requests,
    ResponseHandler,
};
use proptest::prelude::*;
use std::collections::HashMap;

/// Application state: how often each nonce's continuation ran
type Fired = HashMap<String, u32>;

fn response_performative() -> impl Strategy<Value = LedgerApiPerformative> {
    prop_oneof![
        Just(LedgerApiPerformative::Balance),
        Just(LedgerApiPerformative::Error),
    ]
}

fn response(request: &Message<LedgerApi>, performative: LedgerApiPerformative) -> Message<LedgerApi> {
    Message {
        message_id: 2,
        target: 1,
        dialogue_reference: DialogueReference::complete(request.nonce(), "ledger-ref"),
        sender: "ledger".to_string(),
        to: "agent".to_string(),
        body: Payload::new(performative),
    }
}

proptest! {
    #[test]
    fn callbacks_fire_exactly_once(
        performatives in prop::collection::vec(response_performative(), 1..16),
        replay_mask in prop::collection::vec(any::<bool>(), 16),
    ) {
        let dialogues = Dialogues::<LedgerApi>::new("agent").shared();
        let requests = Requests::<LedgerApi, Fired>::new().shared();
        let handler = ResponseHandler::for_protocol(dialogues.clone(), requests.clone());
        let mut fired = Fired::new();

        let mut sent = Vec::new();
        for _ in &performatives {
            let request = dialogues
                .lock()
                .create("ledger", Payload::new(LedgerApiPerformative::GetBalance))
                .unwrap();
            let nonce = request.nonce().to_string();
            requests
                .lock()
                .register(nonce.clone(), move |_, fired: &mut Fired| {
                    *fired.entry(nonce).or_insert(0) += 1;
                })
                .unwrap();
            sent.push(request);
        }

        for (request, performative) in sent.iter().zip(&performatives) {
            let reply = response(request, *performative);
            let outcome = handler.handle(&reply, &mut fired).unwrap();
            prop_assert_eq!(outcome, Dispatch::Delivered { nonce: request.nonce().to_string() });
        }

        for (request, replay) in sent.iter().zip(&replay_mask) {
            if !*replay {
                continue;
            }
            // Message id 2 is already recorded, so the replay cannot attach
            let replayed = response(request, LedgerApiPerformative::Balance);
            let outcome = handler.handle(&replayed, &mut fired).unwrap();
            prop_assert_eq!(outcome, Dispatch::Discarded(DiscardReason::UnidentifiedDialogue));
        }

        prop_assert_eq!(fired.len(), sent.len());
        prop_assert!(fired.values().all(|count| *count == 1));
        prop_assert!(requests.lock().is_empty());
    }

    #[test]
    fn request_performatives_never_fire(count in 1usize..8) {
        let dialogues = Dialogues::<LedgerApi>::new("agent").shared();
        let requests = Requests::<LedgerApi, Fired>::new().shared();
        let handler = ResponseHandler::for_protocol(dialogues.clone(), requests.clone());
        let mut fired = Fired::new();

        for _ in 0..count {
            let request = dialogues
                .lock()
                .create("ledger", Payload::new(LedgerApiPerformative::GetRawTransaction))
                .unwrap();
            requests
                .lock()
                .register(request.nonce(), |_, fired: &mut Fired| {
                    fired.insert("raw_transaction".to_string(), 1);
                })
                .unwrap();

            let raw = response(&request, LedgerApiPerformative::RawTransaction);
            handler.handle(&raw, &mut fired).unwrap();

            // A valid follow-up in the dialogue, but a request-class performative
            let resend = Message {
                message_id: 3,
                target: 2,
                dialogue_reference: raw.dialogue_reference.clone(),
                sender: "ledger".to_string(),
                to: "agent".to_string(),
                body: Payload::new(LedgerApiPerformative::SendSignedTransaction),
            };
            let outcome = handler.handle(&resend, &mut fired).unwrap();
            prop_assert_eq!(outcome, Dispatch::Discarded(DiscardReason::UnallowedPerformative));
        }

        prop_assert_eq!(fired.get("raw_transaction"), Some(&1));
        prop_assert_eq!(fired.len(), 1);
    }
}

#[test]
fn second_response_on_open_dialogue_is_missing_callback() {
    let dialogues = Dialogues::<LedgerApi>::new("agent").shared();
    let requests = Requests::<LedgerApi, Fired>::new().shared();
    let handler = ResponseHandler::for_protocol(dialogues.clone(), requests.clone());
    let mut fired = Fired::new();

    let request = dialogues
        .lock()
        .create("ledger", Payload::new(LedgerApiPerformative::SendSignedTransaction))
        .unwrap();
    requests
        .lock()
        .register(request.nonce(), |_, fired: &mut Fired| {
            *fired.entry("digest".to_string()).or_insert(0) += 1;
        })
        .unwrap();

    let digest = response(&request, LedgerApiPerformative::TransactionDigest);
    handler.handle(&digest, &mut fired).unwrap();

    // Same nonce, next step of the dialogue: the agent asks for the receipt
    // without registering a new continuation
    let receipt_request = dialogues
        .lock()
        .get_mut(&message_bus::DialogueLabel {
            nonce: request.nonce().to_string(),
            opponent: "ledger".to_string(),
            starter: "agent".to_string(),
        })
        .unwrap()
        .reply(2, Payload::new(LedgerApiPerformative::GetTransactionReceipt))
        .unwrap();

    let receipt = Message {
        message_id: 4,
        target: receipt_request.message_id,
        dialogue_reference: digest.dialogue_reference.clone(),
        sender: "ledger".to_string(),
        to: "agent".to_string(),
        body: Payload::new(LedgerApiPerformative::TransactionReceipt),
    };
    let err = handler.handle(&receipt, &mut fired).unwrap_err();

    assert!(matches!(err, Error::MissingCallback { .. }));
    assert_eq!(fired.get("digest"), Some(&1));
}
