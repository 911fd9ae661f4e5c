//! Dialogue registry
//!
//! Tracks request/response conversations per protocol. A dialogue is keyed by
//! the initiator nonce, the opponent and the starter; the responder reference
//! is filled in when the responder first answers.
//!
//! Every inbound message is validated before it is attached:
//! - opening messages must use an initial performative and a fresh nonce
//! - replies must continue the message id sequence
//! - the target must be a message of the same dialogue
//! - the performative must be a valid reply to the target
//! - dialogues with a recorded end state accept nothing further

use crate::{
    message::{DialogueReference, Message},
    metrics::DIALOGUE_END_STATE_TOTAL,
    protocol::Protocol,
    Error, Result,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Registry shared between request-issuing code and handlers
pub type SharedDialogues<P> = Arc<Mutex<Dialogues<P>>>;

/// Dialogue key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DialogueLabel {
    /// Initiator nonce
    pub nonce: String,

    /// Address of the other party
    pub opponent: String,

    /// Address of the party that opened the dialogue
    pub starter: String,
}

/// A single conversation
#[derive(Debug, Clone)]
pub struct Dialogue<P: Protocol> {
    label: DialogueLabel,
    reference: DialogueReference,
    self_address: String,
    messages: Vec<Message<P>>,
    end_state: Option<P::EndState>,
}

impl<P: Protocol> Dialogue<P> {
    fn new(label: DialogueLabel, reference: DialogueReference, self_address: String) -> Self {
        Self {
            label,
            reference,
            self_address,
            messages: Vec::new(),
            end_state: None,
        }
    }

    /// Dialogue key
    pub fn label(&self) -> &DialogueLabel {
        &self.label
    }

    /// Current reference pair
    pub fn reference(&self) -> &DialogueReference {
        &self.reference
    }

    /// Correlation nonce
    pub fn nonce(&self) -> &str {
        &self.label.nonce
    }

    /// The other party
    pub fn opponent(&self) -> &str {
        &self.label.opponent
    }

    /// Whether this participant opened the dialogue
    pub fn is_self_initiated(&self) -> bool {
        self.label.starter == self.self_address
    }

    /// Messages exchanged so far, in order
    pub fn messages(&self) -> &[Message<P>] {
        &self.messages
    }

    /// Most recent message
    pub fn last_message(&self) -> Option<&Message<P>> {
        self.messages.last()
    }

    /// Message with the given id
    pub fn get_message_by_id(&self, message_id: i32) -> Option<&Message<P>> {
        self.messages.iter().find(|m| m.message_id == message_id)
    }

    /// Recorded end state
    pub fn end_state(&self) -> Option<P::EndState> {
        self.end_state
    }

    /// Whether an end state has been recorded
    pub fn is_terminal(&self) -> bool {
        self.end_state.is_some()
    }

    fn next_message_id(&self) -> i32 {
        self.last_message().map_or(1, |m| m.message_id + 1)
    }

    /// Build the next message of this dialogue as a reply to `target`
    ///
    /// The message is recorded in the dialogue; the caller is responsible for
    /// handing it to an outbox.
    pub fn reply(&mut self, target: i32, body: P::Body) -> Result<Message<P>> {
        let message = Message {
            message_id: self.next_message_id(),
            target,
            dialogue_reference: self.reference.clone(),
            sender: self.self_address.clone(),
            to: self.label.opponent.clone(),
            body,
        };
        self.check_continuation(&message).map_err(Error::Dialogue)?;
        self.messages.push(message.clone());
        Ok(message)
    }

    fn check_continuation(&self, message: &Message<P>) -> std::result::Result<(), String> {
        if self.is_terminal() {
            return Err(format!("dialogue {} already terminated", self.label.nonce));
        }

        let expected = self.next_message_id();
        if message.message_id != expected {
            return Err(format!(
                "message id {} out of sequence, expected {}",
                message.message_id, expected
            ));
        }

        let target = self
            .get_message_by_id(message.target)
            .ok_or_else(|| format!("unknown target message {}", message.target))?;

        let performative = message.performative();
        if !P::valid_replies(target.performative()).contains(&performative) {
            return Err(format!(
                "{:?} is not a valid reply to {:?}",
                performative,
                target.performative()
            ));
        }

        Ok(())
    }
}

/// End state counters, split by who opened the dialogue
#[derive(Debug, Clone)]
pub struct DialogueStats<E> {
    self_initiated: HashMap<E, u64>,
    other_initiated: HashMap<E, u64>,
}

impl<E: Copy + Eq + std::hash::Hash> DialogueStats<E> {
    fn new() -> Self {
        Self {
            self_initiated: HashMap::new(),
            other_initiated: HashMap::new(),
        }
    }

    /// Count one finished dialogue
    pub fn add_dialogue_endstate(&mut self, end_state: E, is_self_initiated: bool) {
        let counters = if is_self_initiated {
            &mut self.self_initiated
        } else {
            &mut self.other_initiated
        };
        *counters.entry(end_state).or_insert(0) += 1;
    }

    /// End states of dialogues opened by this participant
    pub fn self_initiated(&self) -> &HashMap<E, u64> {
        &self.self_initiated
    }

    /// End states of dialogues opened by peers
    pub fn other_initiated(&self) -> &HashMap<E, u64> {
        &self.other_initiated
    }
}

/// Dialogue registry for one protocol
#[derive(Debug)]
pub struct Dialogues<P: Protocol> {
    self_address: String,
    dialogues: HashMap<DialogueLabel, Dialogue<P>>,
    stats: DialogueStats<P::EndState>,
}

impl<P: Protocol> Dialogues<P> {
    /// Create an empty registry for the participant at `self_address`
    pub fn new(self_address: impl Into<String>) -> Self {
        Self {
            self_address: self_address.into(),
            dialogues: HashMap::new(),
            stats: DialogueStats::new(),
        }
    }

    /// Wrap into a shared handle
    pub fn shared(self) -> SharedDialogues<P> {
        Arc::new(Mutex::new(self))
    }

    /// Address of this participant
    pub fn self_address(&self) -> &str {
        &self.self_address
    }

    /// Number of dialogues, terminal ones included
    pub fn len(&self) -> usize {
        self.dialogues.len()
    }

    /// Whether no dialogue has been seen
    pub fn is_empty(&self) -> bool {
        self.dialogues.is_empty()
    }

    /// Look up a dialogue
    pub fn get(&self, label: &DialogueLabel) -> Option<&Dialogue<P>> {
        self.dialogues.get(label)
    }

    /// Look up a dialogue mutably
    pub fn get_mut(&mut self, label: &DialogueLabel) -> Option<&mut Dialogue<P>> {
        self.dialogues.get_mut(label)
    }

    /// End state statistics
    pub fn dialogue_stats(&self) -> &DialogueStats<P::EndState> {
        &self.stats
    }

    /// Open a dialogue with `to` and return its opening message
    pub fn create(&mut self, to: impl Into<String>, body: P::Body) -> Result<Message<P>> {
        let performative = P::performative(&body);
        if !P::initial_performatives().contains(&performative) {
            return Err(Error::Dialogue(format!(
                "{:?} cannot open a {} dialogue",
                performative,
                P::NAME
            )));
        }

        let nonce = DialogueReference::generate_token();
        let label = DialogueLabel {
            nonce: nonce.clone(),
            opponent: to.into(),
            starter: self.self_address.clone(),
        };
        let message = Message {
            message_id: 1,
            target: 0,
            dialogue_reference: DialogueReference::new(nonce),
            sender: self.self_address.clone(),
            to: label.opponent.clone(),
            body,
        };

        let mut dialogue = Dialogue::new(
            label.clone(),
            message.dialogue_reference.clone(),
            self.self_address.clone(),
        );
        dialogue.messages.push(message.clone());
        self.dialogues.insert(label, dialogue);

        Ok(message)
    }

    /// Attach an inbound message to its dialogue
    ///
    /// Returns `None` when the message does not belong to a known dialogue or
    /// is not a valid continuation of it.
    pub fn update(&mut self, message: &Message<P>) -> Option<&mut Dialogue<P>> {
        if message.to != self.self_address {
            debug!(
                protocol = P::NAME,
                to = %message.to,
                "message not addressed to this participant"
            );
            return None;
        }

        if message.is_opening() {
            self.open_from_peer(message)
        } else {
            self.continue_dialogue(message)
        }
    }

    fn open_from_peer(&mut self, message: &Message<P>) -> Option<&mut Dialogue<P>> {
        let label = DialogueLabel {
            nonce: message.dialogue_reference.nonce.clone(),
            opponent: message.sender.clone(),
            starter: message.sender.clone(),
        };

        if label.nonce.is_empty() || message.dialogue_reference.is_complete() {
            debug!(protocol = P::NAME, "opening message with malformed reference");
            return None;
        }
        if self.dialogues.contains_key(&label) {
            debug!(protocol = P::NAME, nonce = %label.nonce, "nonce already in use");
            return None;
        }
        if !P::initial_performatives().contains(&message.performative()) {
            debug!(
                protocol = P::NAME,
                performative = ?message.performative(),
                "performative cannot open a dialogue"
            );
            return None;
        }

        let reference =
            DialogueReference::complete(label.nonce.clone(), DialogueReference::generate_token());
        let mut dialogue = Dialogue::new(label.clone(), reference, self.self_address.clone());
        dialogue.messages.push(message.clone());

        Some(self.dialogues.entry(label).or_insert(dialogue))
    }

    fn continue_dialogue(&mut self, message: &Message<P>) -> Option<&mut Dialogue<P>> {
        let reference = &message.dialogue_reference;
        let self_started = DialogueLabel {
            nonce: reference.nonce.clone(),
            opponent: message.sender.clone(),
            starter: self.self_address.clone(),
        };
        let peer_started = DialogueLabel {
            starter: message.sender.clone(),
            ..self_started.clone()
        };

        let label = if self.dialogues.contains_key(&self_started) {
            self_started
        } else {
            peer_started
        };
        let dialogue = match self.dialogues.get_mut(&label) {
            Some(dialogue) => dialogue,
            None => {
                debug!(protocol = P::NAME, nonce = %reference.nonce, "no dialogue for nonce");
                return None;
            }
        };

        if !reference.is_complete()
            || (dialogue.reference.is_complete() && dialogue.reference != *reference)
        {
            debug!(protocol = P::NAME, nonce = %reference.nonce, "dialogue reference mismatch");
            return None;
        }

        if let Err(reason) = dialogue.check_continuation(message) {
            debug!(protocol = P::NAME, nonce = %reference.nonce, %reason, "invalid message");
            return None;
        }

        if !dialogue.reference.is_complete() {
            dialogue.reference = reference.clone();
        }
        dialogue.messages.push(message.clone());
        Some(dialogue)
    }

    /// Record the outcome of a dialogue; it accepts no further messages
    pub fn record_end_state(&mut self, label: &DialogueLabel, end_state: P::EndState) -> bool {
        let dialogue = match self.dialogues.get_mut(label) {
            Some(dialogue) => dialogue,
            None => return false,
        };
        dialogue.end_state = Some(end_state);
        let is_self_initiated = dialogue.is_self_initiated();

        self.stats.add_dialogue_endstate(end_state, is_self_initiated);
        let end_state = format!("{:?}", end_state);
        DIALOGUE_END_STATE_TOTAL
            .with_label_values(&[P::NAME, end_state.as_str()])
            .inc();
        true
    }
}
