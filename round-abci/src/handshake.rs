//! Tendermint address handshake
//!
//! Before genesis every participant asks the others for the endpoint of their
//! consensus node. The handler plays both sides of the exchange:
//!
//! - a peer's REQUEST is answered with this participant's endpoint, or with an
//!   error when the address table is empty or the peer is not registered
//! - a peer's RESPONSE is validated and stored in the address table, or
//!   answered with an error
//! - a peer's ERROR closes our request as not shared
//!
//! After any of these, the continuation registered for a dialogue this
//! participant opened is popped and invoked, exactly like the generic
//! response handler does. Dialogues opened by a peer never had a continuation
//! registered, so no callback is looked up for them.
//!
//! The handler does not own a transport. Whoever embeds it drains the outbox
//! into the agent's network and feeds inbound messages to
//! [`TendermintHandler::handle`].

use crate::{Config, Error, Result};
use message_bus::{
    protocols::tendermint::{
        Tendermint, TendermintBody, TendermintEndState, TendermintErrorCode,
    },
    DialogueLabel, Dialogues, Message, Outbox, Requests, SharedDialogues, SharedRequests,
};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::time::Instant;
use thiserror::Error as ThisError;
use tracing::{debug, info, warn};
use url::Url;

/// Endpoint string rejected by [`Endpoint::parse`]
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    /// Not a URL
    #[error("{0}")]
    Url(#[from] url::ParseError),

    /// URL without a host component
    #[error("'{0}' has no host")]
    MissingHost(String),

    /// Host is a name rather than an address
    #[error("'{0}' does not appear to be an IPv4 or IPv6 address")]
    NotAnIp(String),
}

/// Consensus node endpoint whose host is a literal IP address
///
/// Only the syntax is checked; no resolution or reachability test is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint(String);

impl Endpoint {
    /// Validate `raw`, keeping it exactly as given
    ///
    /// The host is checked as written. The URL parser rewrites forms such as
    /// `1.2.3`, `2130706433` or `0x7f.1` into dotted quads for http(s), so its
    /// normalised host is not used.
    pub fn parse(raw: &str) -> std::result::Result<Self, EndpointError> {
        let url = Url::parse(raw)?;
        if url.host().is_none() {
            return Err(EndpointError::MissingHost(raw.to_string()));
        }

        let host =
            authority_host(raw).ok_or_else(|| EndpointError::MissingHost(raw.to_string()))?;
        let literal = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        literal
            .parse::<IpAddr>()
            .map_err(|_| EndpointError::NotAnIp(host.to_string()))?;

        Ok(Self(raw.to_string()))
    }

    /// Endpoint as received
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Host part of the authority of `scheme://[userinfo@]host[:port]...`
fn authority_host(raw: &str) -> Option<&str> {
    let (_, rest) = raw.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit('@').next()?;
    let host = if host_port.starts_with('[') {
        let end = host_port.find(']')?;
        &host_port[..=end]
    } else {
        host_port.split(':').next()?
    };
    (!host.is_empty()).then_some(host)
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registered participants and the endpoints collected for them
///
/// Participants are set once from on-chain registration data; afterwards the
/// only mutation is recording a validated endpoint for a known participant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisteredAddresses {
    addresses: BTreeMap<String, String>,
}

impl RegisteredAddresses {
    /// Table from `(participant, endpoint)` pairs; endpoints may be empty
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            addresses: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Whether no participant is known yet
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Number of participants
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// Whether `participant` is registered
    pub fn contains(&self, participant: &str) -> bool {
        self.addresses.contains_key(participant)
    }

    /// Endpoint stored for `participant`
    pub fn get(&self, participant: &str) -> Option<&str> {
        self.addresses.get(participant).map(String::as_str)
    }

    /// Registered participants
    pub fn participants(&self) -> impl Iterator<Item = &str> {
        self.addresses.keys().map(String::as_str)
    }

    /// `(participant, endpoint)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.addresses
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Store `endpoint` for a registered participant
    ///
    /// Returns `false` and leaves the table untouched for an unknown one.
    pub fn record(&mut self, participant: &str, endpoint: Endpoint) -> bool {
        match self.addresses.get_mut(participant) {
            Some(slot) => {
                *slot = endpoint.0;
                true
            }
            None => false,
        }
    }
}

/// Result of handling one handshake message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// The continuation of a request we opened ran
    Delivered {
        /// Nonce of the answered request
        nonce: String,
    },

    /// A dialogue opened by the peer was processed
    Processed,

    /// The message matched no dialogue and was dropped
    Unidentified,
}

/// Handshake handler over application state `S`, replying through `O`
pub struct TendermintHandler<S, O> {
    dialogues: SharedDialogues<Tendermint>,
    requests: SharedRequests<Tendermint, S>,
    registered_addresses: RegisteredAddresses,
    outbox: O,
}

impl<S, O: fmt::Debug> fmt::Debug for TendermintHandler<S, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TendermintHandler")
            .field("registered_addresses", &self.registered_addresses)
            .field("pending_requests", &self.requests.lock().len())
            .field("outbox", &self.outbox)
            .finish()
    }
}

impl<S, O: Outbox<Tendermint>> TendermintHandler<S, O> {
    /// Handler with an empty address table
    pub fn new(
        dialogues: SharedDialogues<Tendermint>,
        requests: SharedRequests<Tendermint, S>,
        outbox: O,
    ) -> Self {
        Self {
            dialogues,
            requests,
            registered_addresses: RegisteredAddresses::default(),
            outbox,
        }
    }

    /// Handler for `config.agent_address`, bootstrapped with the configured
    /// address table
    ///
    /// Pending requests expire after `config.requests.ttl()` when set; sweep
    /// them with [`TendermintHandler::evict_expired`].
    pub fn from_config(config: &Config, outbox: O) -> Self {
        let dialogues = Dialogues::<Tendermint>::new(config.agent_address.clone()).shared();
        let requests = match config.requests.ttl() {
            Some(ttl) => Requests::<Tendermint, S>::with_ttl(ttl),
            None => Requests::new(),
        }
        .shared();

        let mut handler = Self::new(dialogues, requests, outbox);
        handler.bootstrap_addresses(RegisteredAddresses::from_entries(
            config.registered_addresses(),
        ));
        handler
    }

    /// Dialogue registry
    pub fn dialogues(&self) -> &SharedDialogues<Tendermint> {
        &self.dialogues
    }

    /// Pending-callback table
    pub fn requests(&self) -> &SharedRequests<Tendermint, S> {
        &self.requests
    }

    /// Drop requests left unanswered past the TTL, returning their nonces
    pub fn evict_expired(&self, now: Instant) -> Vec<String> {
        let evicted = self.requests.lock().evict_expired(now);
        if !evicted.is_empty() {
            warn!(count = evicted.len(), "evicted unanswered Tendermint requests");
        }
        evicted
    }

    /// Address table
    pub fn registered_addresses(&self) -> &RegisteredAddresses {
        &self.registered_addresses
    }

    /// Install the participants retrieved from on-chain registration
    pub fn bootstrap_addresses(&mut self, addresses: RegisteredAddresses) {
        info!(participants = addresses.len(), "registered addresses retrieved");
        self.registered_addresses = addresses;
    }

    /// Outbound sink
    pub fn outbox(&self) -> &O {
        &self.outbox
    }

    /// Mutable outbound sink
    pub fn outbox_mut(&mut self) -> &mut O {
        &mut self.outbox
    }

    fn self_address(&self) -> String {
        self.dialogues.lock().self_address().to_string()
    }

    /// Ask every other registered participant for its endpoint
    ///
    /// `on_response` is registered as the continuation of each request.
    /// Returns the nonces of the opened dialogues.
    pub fn request_addresses<F>(&mut self, on_response: F) -> Result<Vec<String>>
    where
        F: Fn(&Message<Tendermint>, &mut S) + Clone + Send + 'static,
    {
        let self_address = self.self_address();
        let peers: Vec<String> = self
            .registered_addresses
            .participants()
            .filter(|p| *p != self_address)
            .map(str::to_string)
            .collect();

        let mut nonces = Vec::with_capacity(peers.len());
        for peer in peers {
            let request = self
                .dialogues
                .lock()
                .create(peer.as_str(), TendermintBody::Request { query: None })?;
            let nonce = request.nonce().to_string();

            self.requests.lock().register(nonce.as_str(), on_response.clone())?;
            self.send(request);
            debug!(%peer, %nonce, "requested Tendermint address");
            nonces.push(nonce);
        }
        Ok(nonces)
    }

    /// Handle one inbound handshake message
    ///
    /// Fails only when a dialogue we opened has no continuation registered.
    pub fn handle(&mut self, message: &Message<Tendermint>, state: &mut S) -> Result<Handled> {
        let (label, is_self_initiated) = match self.dialogues.lock().update(message) {
            Some(dialogue) => (dialogue.label().clone(), dialogue.is_self_initiated()),
            None => {
                info!(?message, "unidentified Tendermint dialogue");
                return Ok(Handled::Unidentified);
            }
        };

        match &message.body {
            TendermintBody::Request { .. } => self.handle_request(message, &label)?,
            TendermintBody::Response { info } => self.handle_response(message, info, &label)?,
            TendermintBody::Error { .. } => self.handle_error(message, &label),
        }

        if !is_self_initiated {
            return Ok(Handled::Processed);
        }

        let nonce = label.nonce;
        let callback = self.requests.lock().take(&nonce);
        let callback = callback.ok_or_else(|| {
            Error::Bus(message_bus::Error::MissingCallback {
                nonce: nonce.clone(),
            })
        })?;

        debug!(%nonce, "calling registered callback");
        callback(message, state);
        Ok(Handled::Delivered { nonce })
    }

    fn handle_request(&mut self, message: &Message<Tendermint>, label: &DialogueLabel) -> Result<()> {
        if self.registered_addresses.is_empty() {
            return self.reply_with_error(message, label, "No registered addresses retrieved yet");
        }
        if !self.registered_addresses.contains(&message.sender) {
            return self.reply_with_error(
                message,
                label,
                "Sender not registered for on-chain service",
            );
        }

        let self_address = self.self_address();
        let info = match self.registered_addresses.get(&self_address) {
            Some(info) => info.to_string(),
            None => {
                return self.reply_with_error(
                    message,
                    label,
                    "Agent not registered for on-chain service",
                )
            }
        };

        let response = self.reply(label, message.message_id, TendermintBody::Response { info })?;
        info!(?response, "sending Tendermint request response");
        self.send(response);
        Ok(())
    }

    fn handle_response(
        &mut self,
        message: &Message<Tendermint>,
        info: &str,
        label: &DialogueLabel,
    ) -> Result<()> {
        if !self.registered_addresses.contains(&message.sender) {
            return self.reply_with_error(
                message,
                label,
                "Request from agent not registered on-chain",
            );
        }

        let endpoint = match Endpoint::parse(info) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                let error_msg = format!("Failed to parse Tendermint address: {}", e);
                return self.reply_with_error(message, label, &error_msg);
            }
        };

        self.registered_addresses.record(&message.sender, endpoint);
        info!(sender = %message.sender, %info, "collected Tendermint address");
        self.dialogues
            .lock()
            .record_end_state(label, TendermintEndState::ConfigShared);
        Ok(())
    }

    fn handle_error(&mut self, message: &Message<Tendermint>, label: &DialogueLabel) {
        let mut dialogues = self.dialogues.lock();
        let target = dialogues
            .get(label)
            .and_then(|dialogue| dialogue.get_message_by_id(message.target))
            .cloned();

        match target {
            Some(target) => {
                info!(sent = ?target, received = ?message, "error response received");
                dialogues.record_end_state(label, TendermintEndState::ConfigNotShared);
            }
            None => {
                info!("received error message but could not retrieve target message");
            }
        }
    }

    fn reply(
        &self,
        label: &DialogueLabel,
        target: i32,
        body: TendermintBody,
    ) -> Result<Message<Tendermint>> {
        let mut dialogues = self.dialogues.lock();
        let dialogue = dialogues.get_mut(label).ok_or_else(|| {
            message_bus::Error::Dialogue(format!("dialogue {} disappeared", label.nonce))
        })?;
        Ok(dialogue.reply(target, body)?)
    }

    fn reply_with_error(
        &mut self,
        message: &Message<Tendermint>,
        label: &DialogueLabel,
        error_msg: &str,
    ) -> Result<()> {
        info!(%error_msg, ?message, "invalid Tendermint message");

        let mut error_data = BTreeMap::new();
        error_data.insert("message".to_string(), message.to_bytes()?);

        let response = self.reply(
            label,
            message.message_id,
            TendermintBody::Error {
                error_code: TendermintErrorCode::InvalidRequest,
                error_msg: error_msg.to_string(),
                error_data,
            },
        )?;
        info!(received = ?message, sent = ?response, "error response sent");
        self.send(response);
        Ok(())
    }

    fn send(&mut self, message: Message<Tendermint>) {
        if let Err(e) = self.outbox.put_message(message) {
            warn!(error = %e, "failed to queue Tendermint message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_accepts_ip_hosts() {
        for raw in [
            "http://203.0.113.5:26656",
            "tcp://10.0.0.1:26656",
            "http://[2001:db8::1]:26656",
            "tcp://[::1]:26656",
        ] {
            let endpoint = Endpoint::parse(raw).unwrap();
            assert_eq!(endpoint.as_str(), raw);
        }
    }

    #[test]
    fn test_endpoint_rejects_hostnames() {
        let err = Endpoint::parse("http://not-an-ip:26656").unwrap_err();
        assert_eq!(err, EndpointError::NotAnIp("not-an-ip".to_string()));

        assert!(Endpoint::parse("tcp://node0:26656").is_err());

        // Shorthand, integer, hex and octal forms the URL parser would rewrite
        for host in ["1.2.3", "2130706433", "0x7f.1", "010.0.0.1"] {
            for scheme in ["http", "https", "tcp"] {
                let raw = format!("{}://{}:26656", scheme, host);
                assert_eq!(
                    Endpoint::parse(&raw).unwrap_err(),
                    EndpointError::NotAnIp(host.to_string()),
                    "{}",
                    raw
                );
            }
        }
    }

    #[test]
    fn test_endpoint_host_read_from_authority() {
        assert_eq!(authority_host("http://user@10.0.0.1:80/x"), Some("10.0.0.1"));
        assert_eq!(authority_host("tcp://[::1]:26656"), Some("[::1]"));
        assert_eq!(authority_host("http://10.0.0.1?q"), Some("10.0.0.1"));
        assert_eq!(authority_host("http:10.0.0.1"), None);

        assert!(Endpoint::parse("https://user:pw@203.0.113.5:443/status").is_ok());
    }

    #[test]
    fn test_from_config_bootstraps_table() {
        let mut config = Config::default();
        config.agent_address = "p1".to_string();
        config.handshake.registered_addresses.insert("p2".to_string(), String::new());
        config.requests.ttl_secs = 30;

        let handler: TendermintHandler<(), Vec<Message<Tendermint>>> =
            TendermintHandler::from_config(&config, Vec::new());

        assert_eq!(handler.dialogues().lock().self_address(), "p1");
        assert_eq!(
            handler.registered_addresses().get("p1"),
            Some(config.handshake.tendermint_url.as_str())
        );
        assert_eq!(handler.registered_addresses().get("p2"), Some(""));
        assert!(handler.requests().lock().is_empty());
    }

    #[test]
    fn test_evict_expired_drops_stale_requests() {
        let mut config = Config::default();
        config.agent_address = "p1".to_string();
        config.handshake.registered_addresses.insert("p2".to_string(), String::new());
        config.requests.ttl_secs = 30;

        let mut handler: TendermintHandler<(), Vec<Message<Tendermint>>> =
            TendermintHandler::from_config(&config, Vec::new());
        let nonces = handler.request_addresses(|_, _: &mut ()| {}).unwrap();
        assert_eq!(nonces.len(), 1);

        assert!(handler.evict_expired(Instant::now()).is_empty());
        let later = Instant::now() + std::time::Duration::from_secs(31);
        assert_eq!(handler.evict_expired(later), nonces);
        assert!(handler.requests().lock().is_empty());
    }

    #[test]
    fn test_endpoint_rejects_garbage() {
        assert!(matches!(
            Endpoint::parse("203.0.113.5:26656"),
            Err(EndpointError::Url(_)) | Err(EndpointError::MissingHost(_))
        ));
        assert!(Endpoint::parse("").is_err());
        assert!(Endpoint::parse("mailto:node@example.com").is_err());
    }

    #[test]
    fn test_record_only_known_participants() {
        let mut table = RegisteredAddresses::from_entries([("p1", ""), ("p2", "")]);
        let endpoint = Endpoint::parse("http://203.0.113.5:26656").unwrap();

        assert!(table.record("p1", endpoint.clone()));
        assert!(!table.record("p3", endpoint));
        assert_eq!(table.get("p1"), Some("http://203.0.113.5:26656"));
        assert_eq!(table.get("p2"), Some(""));
        assert!(!table.contains("p3"));
        assert_eq!(table.len(), 2);
    }
}
