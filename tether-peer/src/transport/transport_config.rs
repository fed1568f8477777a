use serde::Deserialize;
use tether_core::IceServerConfig;

pub const DEFAULT_STUN_ADDR: &str = "stun:stun.l.google.com:19302";

/// Peer-connection settings handed to the transport binding.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub ice_servers: Vec<IceServerConfig>,
}

impl TransportConfig {
    /// Host candidates only. Enough for peers on the same machine or LAN.
    pub fn host_only() -> Self {
        Self {
            ice_servers: Vec::new(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServerConfig::stun(DEFAULT_STUN_ADDR)],
        }
    }
}
