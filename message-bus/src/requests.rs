//! Pending-request table
//!
//! Maps the nonce of an outgoing request to the continuation that must run
//! when the matching response arrives. Entries are inserted once and popped
//! once; a callback can never fire twice.
//!
//! Entries never expire on their own. A table built with [`Requests::with_ttl`]
//! lets the owner sweep stale entries with [`Requests::evict_expired`], and
//! [`Requests::cancel`] drops a single entry explicitly.

use crate::{message::Message, protocol::Protocol, Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Continuation of a request: receives the response and the application state
pub type Callback<P, S> = Box<dyn FnOnce(&Message<P>, &mut S) + Send>;

/// Table shared between request-issuing code and handlers
pub type SharedRequests<P, S> = Arc<Mutex<Requests<P, S>>>;

struct Pending<P: Protocol, S> {
    callback: Callback<P, S>,
    registered_at: Instant,
}

/// Pending callbacks for one protocol
pub struct Requests<P: Protocol, S> {
    pending: HashMap<String, Pending<P, S>>,
    ttl: Option<Duration>,
}

impl<P: Protocol, S> Requests<P, S> {
    /// Table without expiry
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
            ttl: None,
        }
    }

    /// Table whose entries become evictable after `ttl`
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            ttl: Some(ttl),
        }
    }

    /// Wrap into a shared handle
    pub fn shared(self) -> SharedRequests<P, S> {
        Arc::new(Mutex::new(self))
    }

    /// Register the continuation for `nonce`
    pub fn register<F>(&mut self, nonce: impl Into<String>, callback: F) -> Result<()>
    where
        F: FnOnce(&Message<P>, &mut S) + Send + 'static,
    {
        let nonce = nonce.into();
        if self.pending.contains_key(&nonce) {
            return Err(Error::DuplicateCallback { nonce });
        }

        self.pending.insert(
            nonce,
            Pending {
                callback: Box::new(callback),
                registered_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Pop the continuation for `nonce`
    pub fn take(&mut self, nonce: &str) -> Option<Callback<P, S>> {
        self.pending.remove(nonce).map(|pending| pending.callback)
    }

    /// Drop the continuation for `nonce` without running it
    pub fn cancel(&mut self, nonce: &str) -> bool {
        self.pending.remove(nonce).is_some()
    }

    /// Whether a continuation is pending for `nonce`
    pub fn contains(&self, nonce: &str) -> bool {
        self.pending.contains_key(nonce)
    }

    /// Number of pending continuations
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Remove entries older than the TTL; returns the evicted nonces
    pub fn evict_expired(&mut self, now: Instant) -> Vec<String> {
        let ttl = match self.ttl {
            Some(ttl) => ttl,
            None => return Vec::new(),
        };

        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, pending)| now.saturating_duration_since(pending.registered_at) > ttl)
            .map(|(nonce, _)| nonce.clone())
            .collect();

        for nonce in &expired {
            self.pending.remove(nonce);
            debug!(protocol = P::NAME, %nonce, "evicted stale request");
        }
        expired
    }
}

impl<P: Protocol, S> Default for Requests<P, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Protocol, S> fmt::Debug for Requests<P, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Requests")
            .field("protocol", &P::NAME)
            .field("pending", &self.pending.keys().collect::<Vec<_>>())
            .field("ttl", &self.ttl)
            .finish()
    }
}
