use crate::registry::SessionRegistry;
use std::collections::{HashMap, VecDeque};
use tether_core::{
    IceCandidate, MessageKind, SdpType, SessionDescription, SessionId, SignalMessage,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Sessions for which early candidates are held at once.
pub const MAX_ORPHAN_SESSIONS: usize = 32;
/// Early candidates held per unknown session.
pub const MAX_ORPHAN_CANDIDATES: usize = 64;

/// Candidates that arrived before the offer that creates their session.
#[derive(Debug, Default)]
struct OrphanCandidates {
    by_session: HashMap<SessionId, Vec<IceCandidate>>,
    arrival: VecDeque<SessionId>,
}

impl OrphanCandidates {
    fn hold(&mut self, session_id: SessionId, candidate: IceCandidate) {
        if !self.by_session.contains_key(&session_id) {
            if self.arrival.len() >= MAX_ORPHAN_SESSIONS {
                if let Some(evicted) = self.arrival.pop_front() {
                    self.by_session.remove(&evicted);
                    warn!(session = %evicted, "Dropping early candidates of unclaimed session");
                }
            }
            self.arrival.push_back(session_id);
        }

        let held = self.by_session.entry(session_id).or_default();
        if held.len() >= MAX_ORPHAN_CANDIDATES {
            warn!(session = %session_id, "Too many early candidates; dropping one");
            return;
        }
        held.push(candidate);
    }

    fn take(&mut self, session_id: SessionId) -> Vec<IceCandidate> {
        self.arrival.retain(|id| *id != session_id);
        self.by_session.remove(&session_id).unwrap_or_default()
    }

    fn len(&self, session_id: SessionId) -> usize {
        self.by_session.get(&session_id).map_or(0, Vec::len)
    }
}

/// Reads the relay and hands each message to the session it belongs to.
pub struct SignalRouter {
    registry: SessionRegistry,
    accept_offers: bool,
    descriptions_rx: mpsc::UnboundedReceiver<(SessionId, SignalMessage)>,
    candidates_rx: mpsc::UnboundedReceiver<(SessionId, SignalMessage)>,
    orphans: OrphanCandidates,
}

impl SignalRouter {
    pub fn new(registry: SessionRegistry, accept_offers: bool) -> Self {
        let relay = registry.relay();
        Self {
            descriptions_rx: relay.subscribe(MessageKind::SessionDescription),
            candidates_rx: relay.subscribe(MessageKind::IceCandidate),
            registry,
            accept_offers,
            orphans: OrphanCandidates::default(),
        }
    }

    pub async fn run(mut self) {
        info!(accept_offers = self.accept_offers, "Signal router started");
        let mut descriptions_open = true;
        let mut candidates_open = true;

        while descriptions_open || candidates_open {
            tokio::select! {
                msg = self.descriptions_rx.recv(), if descriptions_open => match msg {
                    Some((id, SignalMessage::SessionDescription(d))) => {
                        self.route_description(id, d).await;
                    }
                    Some((id, other)) => self.route(id, other).await,
                    None => descriptions_open = false,
                },

                msg = self.candidates_rx.recv(), if candidates_open => match msg {
                    Some((id, SignalMessage::IceCandidate(c))) => {
                        self.route_candidate(id, c);
                    }
                    Some((id, other)) => self.route(id, other).await,
                    None => candidates_open = false,
                },
            }
        }

        info!("Signal router finished");
    }

    async fn route(&mut self, session_id: SessionId, message: SignalMessage) {
        match message {
            SignalMessage::SessionDescription(d) => self.route_description(session_id, d).await,
            SignalMessage::IceCandidate(c) => self.route_candidate(session_id, c),
        }
    }

    async fn route_description(&mut self, session_id: SessionId, description: SessionDescription) {
        if let Some(handle) = self.registry.get(session_id) {
            handle.deliver(SignalMessage::SessionDescription(description));
            return;
        }

        if self.registry.is_retired(session_id) {
            debug!(session = %session_id, "Discarding {} for ended session", description.sdp_type);
            return;
        }

        if description.sdp_type != SdpType::Offer || !self.accept_offers {
            debug!(session = %session_id, "Discarding {} for unknown session", description.sdp_type);
            return;
        }

        let handle = match self.registry.open_responder(session_id).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(session = %session_id, "Could not answer offer: {:#}", e);
                return;
            }
        };

        let early = self.orphans.take(session_id);
        if !early.is_empty() {
            debug!(session = %session_id, "Replaying {} early candidate(s)", early.len());
        }
        for candidate in early {
            handle.deliver(SignalMessage::IceCandidate(candidate));
        }
        handle.deliver(SignalMessage::SessionDescription(description));
    }

    fn route_candidate(&mut self, session_id: SessionId, candidate: IceCandidate) {
        if let Some(handle) = self.registry.get(session_id) {
            handle.deliver(SignalMessage::IceCandidate(candidate));
            return;
        }

        if self.registry.is_retired(session_id) {
            debug!(session = %session_id, "Discarding candidate for ended session");
            return;
        }

        self.orphans.hold(session_id, candidate);
        debug!(
            session = %session_id,
            held = self.orphans.len(session_id),
            "Holding candidate for unknown session"
        );
    }
}
