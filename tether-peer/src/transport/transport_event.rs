use std::fmt;
use tokio::sync::mpsc;

const EVENT_BUFFER: usize = 256;

/// Raw connection state as reported by the peer-connection transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl fmt::Display for PeerConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PeerConnectionState::New => "new",
            PeerConnectionState::Connecting => "connecting",
            PeerConnectionState::Connected => "connected",
            PeerConnectionState::Disconnected => "disconnected",
            PeerConnectionState::Failed => "failed",
            PeerConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Output of local ICE gathering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalCandidate {
    /// JSON-encoded candidate init, ready to be trickled to the remote side.
    Candidate(String),
    GatheringComplete,
}

/// A media track announced by the remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub id: String,
    pub kind: String,
    pub stream_id: String,
}

/// Write side of the three transport event streams. Handed to the binding
/// when it is created; the binding pushes into it from its callbacks.
#[derive(Clone)]
pub struct TransportEventSink {
    local_candidates: mpsc::Sender<LocalCandidate>,
    connection_states: mpsc::Sender<PeerConnectionState>,
    remote_tracks: mpsc::Sender<RemoteTrack>,
}

/// Read side of the transport event streams. Dropping a receiver cancels that
/// stream; the binding then discards further events of that kind.
pub struct TransportEvents {
    pub local_candidates: mpsc::Receiver<LocalCandidate>,
    pub connection_states: mpsc::Receiver<PeerConnectionState>,
    pub remote_tracks: mpsc::Receiver<RemoteTrack>,
}

pub fn transport_event_channel() -> (TransportEventSink, TransportEvents) {
    let (candidate_tx, candidate_rx) = mpsc::channel(EVENT_BUFFER);
    let (state_tx, state_rx) = mpsc::channel(EVENT_BUFFER);
    let (track_tx, track_rx) = mpsc::channel(EVENT_BUFFER);

    (
        TransportEventSink {
            local_candidates: candidate_tx,
            connection_states: state_tx,
            remote_tracks: track_tx,
        },
        TransportEvents {
            local_candidates: candidate_rx,
            connection_states: state_rx,
            remote_tracks: track_rx,
        },
    )
}

impl TransportEventSink {
    pub async fn local_candidate(&self, candidate: LocalCandidate) {
        let _ = self.local_candidates.send(candidate).await;
    }

    pub async fn connection_state(&self, state: PeerConnectionState) {
        let _ = self.connection_states.send(state).await;
    }

    pub async fn remote_track(&self, track: RemoteTrack) {
        let _ = self.remote_tracks.send(track).await;
    }
}
