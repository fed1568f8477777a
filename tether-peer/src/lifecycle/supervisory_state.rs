use crate::transport::PeerConnectionState;

/// Aggregate view of the transport's health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisoryState {
    Connecting,
    Connected,
    /// Transient loss; the transport may recover on its own.
    Degraded,
    Terminated,
}

impl SupervisoryState {
    pub fn from_transport(state: PeerConnectionState) -> Self {
        match state {
            PeerConnectionState::New | PeerConnectionState::Connecting => {
                SupervisoryState::Connecting
            }
            PeerConnectionState::Connected => SupervisoryState::Connected,
            PeerConnectionState::Disconnected => SupervisoryState::Degraded,
            PeerConnectionState::Failed | PeerConnectionState::Closed => {
                SupervisoryState::Terminated
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    TransportFailed,
    TransportClosed,
    DeadlineExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Supervision {
    pub state: SupervisoryState,
    /// Set only when `state` is `Terminated`.
    pub reason: Option<TerminationReason>,
}

impl Supervision {
    pub fn new(state: SupervisoryState) -> Self {
        Self {
            state,
            reason: None,
        }
    }

    pub fn terminated(reason: TerminationReason) -> Self {
        Self {
            state: SupervisoryState::Terminated,
            reason: Some(reason),
        }
    }

    pub fn from_transport(state: PeerConnectionState) -> Self {
        match state {
            PeerConnectionState::Failed => Self::terminated(TerminationReason::TransportFailed),
            PeerConnectionState::Closed => Self::terminated(TerminationReason::TransportClosed),
            other => Self::new(SupervisoryState::from_transport(other)),
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.state == SupervisoryState::Terminated
    }
}
