use crate::transport::TransportConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Everything a peer needs, loadable from a JSON file. Missing fields keep
/// their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    pub transport: TransportConfig,
    pub negotiation: NegotiationConfig,
    pub relay: RelayConfig,
}

impl PeerConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NegotiationConfig {
    /// Window after `OfferSent`/`AnswerApplied` in which the transport must
    /// report connected.
    pub deadline_ms: u64,
    /// Allow starting without local tracks.
    pub receive_only: bool,
}

impl NegotiationConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            deadline_ms: 30_000,
            receive_only: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub reconnect_backoff_ms: u64,
}

impl RelayConfig {
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            reconnect_backoff_ms: 1_000,
        }
    }
}
