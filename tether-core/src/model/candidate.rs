use crate::model::session::SessionId;
use serde::{Deserialize, Serialize};

/// A trickled ICE candidate. `payload` is the JSON-encoded candidate init as
/// produced by the transport; `session_tag` names the round that produced it.
#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq, Hash)]
pub struct IceCandidate {
    pub payload: String,
    pub session_tag: SessionId,
}

impl IceCandidate {
    pub fn new(payload: impl Into<String>, session_tag: SessionId) -> Self {
        Self {
            payload: payload.into(),
            session_tag,
        }
    }
}
