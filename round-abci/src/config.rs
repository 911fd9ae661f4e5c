//! Configuration for the ABCI node

use crate::transaction::ED25519_LEDGER_ID;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address of this participant
    pub agent_address: String,

    /// Ledger transaction signatures are verified against
    pub ledger_id: String,

    /// ABCI server configuration
    pub abci: AbciConfig,

    /// Address handshake configuration
    pub handshake: HandshakeConfig,

    /// Pending request configuration
    pub requests: RequestsConfig,
}

/// ABCI server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbciConfig {
    /// Listen address for the consensus engine
    pub listen_addr: String,

    /// Recognised transaction types
    pub transaction_types: Vec<String>,
}

/// Address handshake configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeConfig {
    /// Endpoint of this participant's consensus node, shared with peers
    pub tendermint_url: String,

    /// Registered participants and their known endpoints (may be empty)
    #[serde(default)]
    pub registered_addresses: BTreeMap<String, String>,
}

/// Pending request configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestsConfig {
    /// Seconds after which an unanswered request is evicted; 0 keeps it forever
    pub ttl_secs: u64,
}

impl RequestsConfig {
    /// Eviction TTL, if enabled
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_secs > 0).then(|| Duration::from_secs(self.ttl_secs))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent_address: "agent-0".to_string(),
            ledger_id: ED25519_LEDGER_ID.to_string(),
            abci: AbciConfig {
                listen_addr: "127.0.0.1:26658".to_string(),
                transaction_types: vec!["registration".to_string()],
            },
            handshake: HandshakeConfig {
                tendermint_url: "tcp://127.0.0.1:26656".to_string(),
                registered_addresses: BTreeMap::new(),
            },
            requests: RequestsConfig { ttl_secs: 0 },
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(agent_address) = std::env::var("ABCI_AGENT_ADDRESS") {
            config.agent_address = agent_address;
        }

        if let Ok(ledger_id) = std::env::var("ABCI_LEDGER_ID") {
            config.ledger_id = ledger_id;
        }

        if let Ok(listen_addr) = std::env::var("ABCI_LISTEN_ADDR") {
            config.abci.listen_addr = listen_addr;
        }

        if let Ok(tendermint_url) = std::env::var("ABCI_TENDERMINT_URL") {
            config.handshake.tendermint_url = tendermint_url;
        }

        Ok(config)
    }

    /// Address table to bootstrap the handshake with
    ///
    /// This participant is always included with its own endpoint.
    pub fn registered_addresses(&self) -> BTreeMap<String, String> {
        let mut addresses = self.handshake.registered_addresses.clone();
        addresses.insert(
            self.agent_address.clone(),
            self.handshake.tendermint_url.clone(),
        );
        addresses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
agent_address = "p1"
ledger_id = "ed25519"

[abci]
listen_addr = "0.0.0.0:26658"
transaction_types = ["registration", "vote"]

[handshake]
tendermint_url = "tcp://203.0.113.5:26656"

[handshake.registered_addresses]
p1 = ""
p2 = ""

[requests]
ttl_secs = 60
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.agent_address, "p1");
        assert_eq!(config.abci.transaction_types.len(), 2);
        assert_eq!(config.requests.ttl(), Some(Duration::from_secs(60)));

        let addresses = config.registered_addresses();
        assert_eq!(addresses["p1"], "tcp://203.0.113.5:26656");
        assert_eq!(addresses["p2"], "");
    }

    #[test]
    fn test_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "agent_address = ").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn test_default_keeps_requests_forever() {
        let config = Config::default();
        assert_eq!(config.requests.ttl(), None);
        assert_eq!(config.ledger_id, ED25519_LEDGER_ID);
    }
}
