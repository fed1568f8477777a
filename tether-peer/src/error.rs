use crate::negotiator::NegotiationState;
use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by the signaling core.
///
/// Candidate-level errors are absorbed by the session; description-level and
/// precondition errors end it and reach observers as `SessionEvent::Failed`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignalingError {
    /// The relay has not connected yet. Callers queue or reject.
    #[error("relay channel is not ready")]
    NotReady,

    /// Malformed or out-of-sequence description. Fatal to the session.
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    /// The transport refused a remote candidate. Never fatal.
    #[error("invalid ICE candidate: {0}")]
    InvalidCandidate(String),

    /// `start()` was called without any local track while not receive-only.
    #[error("no local tracks attached")]
    NoTracksAttached,

    /// The relay refused or failed a send. Retry is the caller's decision.
    #[error("relay transport unavailable: {0}")]
    TransportUnavailable(String),

    /// `Connected` was not reached within the negotiation window.
    #[error("negotiation did not complete within {0:?}")]
    NegotiationTimeout(Duration),

    /// The call does not apply in the session's current state.
    #[error("operation not valid in state {0:?}")]
    InvalidState(NegotiationState),

    /// The session has been torn down.
    #[error("session is closed")]
    SessionClosed,
}

impl SignalingError {
    /// Whether this error ends the session it occurred in.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SignalingError::Negotiation(_)
                | SignalingError::NoTracksAttached
                | SignalingError::TransportUnavailable(_)
                | SignalingError::NegotiationTimeout(_)
        )
    }
}
