use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdpType::Offer => f.write_str("offer"),
            SdpType::Answer => f.write_str("answer"),
        }
    }
}

/// One half of an offer/answer exchange. The payload is opaque to the
/// signaling layer; only the transport binding interprets it.
#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub payload: String,
}

impl SessionDescription {
    pub fn offer(payload: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            payload: payload.into(),
        }
    }

    pub fn answer(payload: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            payload: payload.into(),
        }
    }

    pub fn is_offer(&self) -> bool {
        self.sdp_type == SdpType::Offer
    }
}
