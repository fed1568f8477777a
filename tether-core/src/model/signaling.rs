use crate::model::candidate::IceCandidate;
use crate::model::description::SessionDescription;
use crate::model::session::SessionId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// Messages exchanged over the relay.
///
/// On the wire:
/// `{"op":"session_description","d":{"type":"offer","payload":"v=0..."}}`
/// `{"op":"ice_candidate","d":{"payload":"{...}","session_tag":"<uuid>"}}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", content = "d", rename_all = "snake_case")]
pub enum SignalMessage {
    SessionDescription(SessionDescription),
    IceCandidate(IceCandidate),
}

impl SignalMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            SignalMessage::SessionDescription(_) => MessageKind::SessionDescription,
            SignalMessage::IceCandidate(_) => MessageKind::IceCandidate,
        }
    }
}

/// Relay subscriptions are per kind; ordering holds only inside one kind.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum MessageKind {
    SessionDescription,
    IceCandidate,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::SessionDescription => f.write_str("session_description"),
            MessageKind::IceCandidate => f.write_str("ice_candidate"),
        }
    }
}

/// The relay multiplexes sessions, so every message names its session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelayEnvelope {
    pub session_id: SessionId,
    pub message: SignalMessage,
}

impl RelayEnvelope {
    pub fn new(session_id: SessionId, message: SignalMessage) -> Self {
        Self {
            session_id,
            message,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
