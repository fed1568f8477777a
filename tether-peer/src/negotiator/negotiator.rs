use crate::candidate::CandidateDisposition;
use crate::config::NegotiationConfig;
use crate::error::SignalingError;
use crate::lifecycle::{
    LifecycleHandle, LifecycleMonitor, SessionEvent, SupervisoryState, Supervision,
    TerminationReason,
};
use crate::negotiator::{
    NegotiationState, NegotiatorCommand, Session, SessionHandle, SessionSnapshot,
};
use crate::relay::{RelayChannel, RelayState};
use crate::transport::{LocalCandidate, RemoteTrack, TransportBinding, TransportEvents};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tether_core::{
    IceCandidate, MessageKind, Role, SdpType, SessionDescription, SessionId, SignalMessage,
};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

/// The state machine of one session, run as its own task.
///
/// Commands, local candidates, remote tracks, supervision changes and relay
/// state changes are handled one at a time, so transport calls for a session
/// never overlap.
pub struct Negotiator {
    session: Session,
    config: NegotiationConfig,
    transport: Arc<dyn TransportBinding>,
    relay: Arc<dyn RelayChannel>,
    lifecycle: LifecycleHandle,
    command_rx: mpsc::UnboundedReceiver<NegotiatorCommand>,
    local_candidates_rx: mpsc::Receiver<LocalCandidate>,
    remote_tracks_rx: mpsc::Receiver<RemoteTrack>,
    closing_tx: Arc<watch::Sender<bool>>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    events_tx: broadcast::Sender<SessionEvent>,
    outbox: VecDeque<SignalMessage>,
}

impl Negotiator {
    /// Starts the negotiator and its lifecycle monitor for a fresh session.
    pub fn spawn(
        session_id: SessionId,
        role: Role,
        config: NegotiationConfig,
        transport: Arc<dyn TransportBinding>,
        events: TransportEvents,
        relay: Arc<dyn RelayChannel>,
        events_tx: broadcast::Sender<SessionEvent>,
    ) -> SessionHandle {
        let TransportEvents {
            local_candidates,
            connection_states,
            remote_tracks,
        } = events;

        let lifecycle = LifecycleMonitor::spawn(
            session_id,
            config.deadline(),
            connection_states,
            events_tx.clone(),
        );

        let session = Session::new(session_id, role);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());
        let (closing_tx, _) = watch::channel(false);
        let closing_tx = Arc::new(closing_tx);

        let negotiator = Self {
            session,
            config,
            transport,
            relay,
            lifecycle,
            command_rx,
            local_candidates_rx: local_candidates,
            remote_tracks_rx: remote_tracks,
            closing_tx: Arc::clone(&closing_tx),
            snapshot_tx,
            events_tx: events_tx.clone(),
            outbox: VecDeque::new(),
        };
        tokio::spawn(negotiator.run());

        SessionHandle::new(
            session_id,
            role,
            command_tx,
            closing_tx,
            snapshot_rx,
            events_tx,
        )
    }

    pub async fn run(mut self) {
        let id = self.session.id();
        info!(session = %id, role = %self.session.role(), "Negotiator started");

        let mut closing_rx = self.closing_tx.subscribe();
        let mut supervision_rx = self.lifecycle.supervision();
        let mut relay_state_rx = self.relay.state();
        let mut candidates_open = true;
        let mut tracks_open = true;
        let mut supervision_open = true;
        let mut relay_open = true;

        while !self.session.state().is_terminal() {
            if *closing_rx.borrow_and_update() {
                self.teardown(NegotiationState::Closed).await;
                break;
            }

            tokio::select! {
                cmd = self.command_rx.recv() => match cmd {
                    Some(c) => self.handle_command(c).await,
                    None => {
                        info!(session = %id, "All handles dropped. Closing session.");
                        self.teardown(NegotiationState::Closed).await;
                    }
                },

                candidate = self.local_candidates_rx.recv(), if candidates_open => match candidate {
                    Some(c) => self.handle_local_candidate(c),
                    None => candidates_open = false,
                },

                track = self.remote_tracks_rx.recv(), if tracks_open => match track {
                    Some(t) => self.handle_remote_track(t),
                    None => tracks_open = false,
                },

                changed = supervision_rx.changed(), if supervision_open => match changed {
                    Ok(()) => {
                        let supervision = *supervision_rx.borrow_and_update();
                        self.handle_supervision(supervision).await;
                    }
                    Err(_) => supervision_open = false,
                },

                changed = relay_state_rx.changed(), if relay_open => match changed {
                    Ok(()) => {
                        let state = *relay_state_rx.borrow_and_update();
                        self.handle_relay_state(state).await;
                    }
                    Err(_) => relay_open = false,
                },

                _ = closing_rx.changed() => {}
            }

            self.publish_snapshot();
        }

        self.publish_snapshot();
        info!(session = %id, "Negotiator finished in state {}", self.session.state());
    }

    async fn handle_command(&mut self, cmd: NegotiatorCommand) {
        match cmd {
            NegotiatorCommand::Start { reply } => {
                let result = self.start().await;
                self.publish_snapshot();
                let _ = reply.send(result);
            }

            NegotiatorCommand::Signal(SignalMessage::SessionDescription(description)) => {
                match description.sdp_type {
                    SdpType::Answer => self.apply_answer(description).await,
                    SdpType::Offer => self.apply_offer(description).await,
                }
            }

            NegotiatorCommand::Signal(SignalMessage::IceCandidate(candidate)) => {
                self.handle_remote_candidate(candidate).await;
            }

            NegotiatorCommand::Close { reply } => {
                self.teardown(NegotiationState::Closed).await;
                let _ = reply.send(());
            }
        }
    }

    async fn start(&mut self) -> Result<(), SignalingError> {
        let state = self.session.state();
        if self.session.role() != Role::Initiator || state != NegotiationState::Idle {
            warn!(
                session = %self.session.id(),
                "start() ignored for {} in state {}", self.session.role(), state
            );
            return Err(SignalingError::InvalidState(state));
        }

        self.require_tracks().await?;
        self.transition(NegotiationState::OfferPending);
        self.compose_local_description(SdpType::Offer).await?;
        self.transition(NegotiationState::OfferSent);
        self.lifecycle.arm_deadline();
        Ok(())
    }

    async fn apply_answer(&mut self, answer: SessionDescription) {
        let state = self.session.state();
        if state != NegotiationState::OfferSent {
            warn!(
                session = %self.session.id(),
                "Discarding answer received in state {}", state
            );
            return;
        }

        if self.apply_remote_description(answer).await.is_err() {
            return;
        }
        self.transition(NegotiationState::AnswerApplied);
        self.promote_if_connected();
    }

    async fn apply_offer(&mut self, offer: SessionDescription) {
        let state = self.session.state();
        if self.session.role() != Role::Responder || state != NegotiationState::Idle {
            warn!(
                session = %self.session.id(),
                "Discarding offer received as {} in state {}", self.session.role(), state
            );
            return;
        }

        if self.require_tracks().await.is_err() {
            return;
        }
        self.transition(NegotiationState::AwaitingAnswer);
        if self.apply_remote_description(offer).await.is_err() {
            return;
        }
        if self
            .compose_local_description(SdpType::Answer)
            .await
            .is_err()
        {
            return;
        }
        self.transition(NegotiationState::AnswerApplied);
        self.lifecycle.arm_deadline();
        self.promote_if_connected();
    }

    /// Fails the session unless tracks are attached or it is receive-only.
    async fn require_tracks(&mut self) -> Result<(), SignalingError> {
        if self.config.receive_only || self.transport.local_track_count() > 0 {
            return Ok(());
        }
        Err(self.fail(SignalingError::NoTracksAttached).await)
    }

    /// Creates the local offer or answer, applies it, records it and sends it.
    async fn compose_local_description(&mut self, sdp_type: SdpType) -> Result<(), SignalingError> {
        let created = match sdp_type {
            SdpType::Offer => unless_closed(&self.closing_tx, self.transport.create_offer()).await,
            SdpType::Answer => {
                unless_closed(&self.closing_tx, self.transport.create_answer()).await
            }
        };

        let description = match created {
            None => return Err(SignalingError::SessionClosed),
            Some(Err(e)) => {
                let reason = format!("create {} failed: {:#}", sdp_type, e);
                return Err(self.fail(SignalingError::Negotiation(reason)).await);
            }
            Some(Ok(d)) if d.sdp_type != sdp_type => {
                let reason = format!("transport produced {} instead of {}", d.sdp_type, sdp_type);
                return Err(self.fail(SignalingError::Negotiation(reason)).await);
            }
            Some(Ok(d)) => d,
        };

        let applied = unless_closed(
            &self.closing_tx,
            self.transport.set_local_description(&description),
        )
        .await;
        match applied {
            None => return Err(SignalingError::SessionClosed),
            Some(Err(e)) => {
                let reason = format!("setLocalDescription failed: {:#}", e);
                return Err(self.fail(SignalingError::Negotiation(reason)).await);
            }
            Some(Ok(())) => {}
        }

        if let Err(e) = self.session.set_local_description(description.clone()) {
            return Err(self.fail(e).await);
        }
        if let Err(e) = self.send_or_hold(SignalMessage::SessionDescription(description)) {
            return Err(self.fail(e).await);
        }
        Ok(())
    }

    /// Applies the remote description and drains the candidate queue before
    /// any later event is looked at.
    async fn apply_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), SignalingError> {
        let applied = unless_closed(
            &self.closing_tx,
            self.transport.set_remote_description(&description),
        )
        .await;
        match applied {
            None => return Err(SignalingError::SessionClosed),
            Some(Err(e)) => {
                let reason = format!("setRemoteDescription failed: {:#}", e);
                return Err(self.fail(SignalingError::Negotiation(reason)).await);
            }
            Some(Ok(())) => {}
        }

        if let Err(e) = self.session.set_remote_description(description) {
            return Err(self.fail(e).await);
        }

        let transport = Arc::clone(&self.transport);
        let drained = unless_closed(
            &self.closing_tx,
            self.session.candidates_mut().drain(transport.as_ref()),
        )
        .await;
        let Some(report) = drained else {
            return Err(SignalingError::SessionClosed);
        };

        debug!(
            session = %self.session.id(),
            "Remote description applied; replayed {} candidate(s), {} rejected",
            report.applied, report.rejected
        );
        Ok(())
    }

    async fn handle_remote_candidate(&mut self, candidate: IceCandidate) {
        let id = self.session.id();
        if candidate.session_tag != id {
            debug!(
                session = %id,
                "Discarding candidate from stale session {}", candidate.session_tag
            );
            return;
        }
        if !self.session.candidates_mut().admit(&candidate) {
            debug!(session = %id, "Discarding duplicate candidate");
            return;
        }

        let remote_applied = self.session.remote_description_applied();
        let transport = Arc::clone(&self.transport);
        let outcome = unless_closed(
            &self.closing_tx,
            self.session
                .candidates_mut()
                .enqueue_or_apply(candidate, remote_applied, transport.as_ref()),
        )
        .await;

        match outcome {
            None => {}
            Some(Ok(CandidateDisposition::Queued)) => debug!(
                session = %id,
                queued = self.session.candidates().len(),
                "Holding candidate until the remote description is applied"
            ),
            Some(Ok(CandidateDisposition::Applied)) => {
                debug!(session = %id, "Applied remote candidate")
            }
            Some(Err(e)) => warn!(session = %id, "{}", e),
        }
    }

    fn handle_local_candidate(&mut self, candidate: LocalCandidate) {
        let id = self.session.id();
        match candidate {
            LocalCandidate::GatheringComplete => info!(session = %id, "ICE gathering completed"),
            LocalCandidate::Candidate(payload) => {
                let message = SignalMessage::IceCandidate(IceCandidate::new(payload, id));
                if let Err(e) = self.send_or_hold(message) {
                    warn!(session = %id, "Dropping local candidate: {}", e);
                }
            }
        }
    }

    fn handle_remote_track(&mut self, track: RemoteTrack) {
        let session_id = self.session.id();
        info!(
            session = %session_id,
            "Remote {} track {} (stream {})", track.kind, track.id, track.stream_id
        );
        self.publish(SessionEvent::RemoteTrack { session_id, track });
    }

    async fn handle_supervision(&mut self, supervision: Supervision) {
        let id = self.session.id();
        self.session.set_lifecycle(supervision.state);

        match supervision.state {
            SupervisoryState::Connecting => {}
            SupervisoryState::Connected => self.promote_if_connected(),
            SupervisoryState::Degraded => {
                info!(session = %id, "Transport degraded; waiting for it to recover")
            }
            SupervisoryState::Terminated => match supervision.reason {
                Some(TerminationReason::DeadlineExceeded) => {
                    let window = self.config.deadline();
                    self.fail(SignalingError::NegotiationTimeout(window)).await;
                }
                reason => {
                    warn!(session = %id, "Transport terminated ({:?}); tearing down", reason);
                    self.teardown(NegotiationState::Closed).await;
                }
            },
        }
    }

    async fn handle_relay_state(&mut self, state: RelayState) {
        let id = self.session.id();
        debug!(session = %id, "Relay state -> {:?}", state);
        if state != RelayState::Connected || self.outbox.is_empty() {
            return;
        }

        while let Some(message) = self.outbox.pop_front() {
            match self.relay.send(id, &message) {
                Ok(()) => {}
                Err(SignalingError::NotReady) => {
                    self.outbox.push_front(message);
                    return;
                }
                Err(e) if message.kind() == MessageKind::SessionDescription => {
                    self.fail(e).await;
                    return;
                }
                Err(e) => warn!(session = %id, "Dropping held candidate: {}", e),
            }
        }
        info!(session = %id, "Flushed held signaling messages");
    }

    /// Sends through the relay. While the relay is not ready, messages wait in
    /// the outbox and everything sent later queues behind them.
    fn send_or_hold(&mut self, message: SignalMessage) -> Result<(), SignalingError> {
        if !self.outbox.is_empty() {
            self.outbox.push_back(message);
            return Ok(());
        }

        match self.relay.send(self.session.id(), &message) {
            Ok(()) => Ok(()),
            Err(SignalingError::NotReady) => {
                debug!(
                    session = %self.session.id(),
                    "Relay not ready; holding {} message", message.kind()
                );
                self.outbox.push_back(message);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn promote_if_connected(&mut self) {
        if self.session.state() == NegotiationState::AnswerApplied
            && self.lifecycle.current().state == SupervisoryState::Connected
        {
            self.transition(NegotiationState::Connected);
        }
    }

    fn transition(&mut self, next: NegotiationState) {
        if self.session.transition(next) {
            self.publish(SessionEvent::Negotiation {
                session_id: self.session.id(),
                state: next,
            });
        }
    }

    /// Ends the session with `error` and surfaces it to observers.
    async fn fail(&mut self, error: SignalingError) -> SignalingError {
        if self.session.state().is_terminal() {
            return error;
        }
        error!(session = %self.session.id(), "Session failed: {}", error);
        self.publish(SessionEvent::Failed {
            session_id: self.session.id(),
            error: error.clone(),
        });
        self.teardown(NegotiationState::Failed).await;
        error
    }

    async fn teardown(&mut self, terminal: NegotiationState) {
        if !self.session.teardown(terminal) {
            return;
        }
        let session_id = self.session.id();

        self.outbox.clear();
        self.lifecycle.shutdown();
        if let Err(e) = self.transport.close().await {
            warn!(session = %session_id, "Failed to close transport: {:#}", e);
        }

        self.publish(SessionEvent::Negotiation {
            session_id,
            state: terminal,
        });
        self.publish(SessionEvent::Closed { session_id });
        self.publish_snapshot();
    }

    fn publish(&self, event: SessionEvent) {
        let _ = self.events_tx.send(event);
    }

    fn publish_snapshot(&self) {
        let next = self.session.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

/// Runs a transport operation unless the session is closed first. A result
/// that arrives after `close()` is discarded.
async fn unless_closed<T>(
    closing: &watch::Sender<bool>,
    op: impl Future<Output = T>,
) -> Option<T> {
    let mut closing_rx = closing.subscribe();
    if *closing_rx.borrow_and_update() {
        return None;
    }

    let out = tokio::select! {
        biased;
        _ = closing_rx.changed() => return None,
        out = op => out,
    };

    if *closing.borrow() { None } else { Some(out) }
}
