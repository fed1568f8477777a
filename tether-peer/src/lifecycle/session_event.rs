use crate::error::SignalingError;
use crate::lifecycle::Supervision;
use crate::negotiator::NegotiationState;
use crate::transport::RemoteTrack;
use tether_core::SessionId;

/// Everything an external observer can learn about a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Negotiation {
        session_id: SessionId,
        state: NegotiationState,
    },
    Supervisory {
        session_id: SessionId,
        supervision: Supervision,
    },
    RemoteTrack {
        session_id: SessionId,
        track: RemoteTrack,
    },
    /// The session ended because of `error`.
    Failed {
        session_id: SessionId,
        error: SignalingError,
    },
    /// Resources are released. Emitted once per session.
    Closed { session_id: SessionId },
}

impl SessionEvent {
    pub fn session_id(&self) -> SessionId {
        match self {
            SessionEvent::Negotiation { session_id, .. }
            | SessionEvent::Supervisory { session_id, .. }
            | SessionEvent::RemoteTrack { session_id, .. }
            | SessionEvent::Failed { session_id, .. }
            | SessionEvent::Closed { session_id } => *session_id,
        }
    }
}
