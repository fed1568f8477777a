use crate::candidate::CandidateQueue;
use crate::error::SignalingError;
use crate::lifecycle::SupervisoryState;
use crate::negotiator::NegotiationState;
use tether_core::{Role, SessionDescription, SessionId};
use tracing::{info, warn};

/// Aggregate root of one negotiation round. Owned by its negotiator task.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    role: Role,
    state: NegotiationState,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    candidates: CandidateQueue,
    lifecycle: SupervisoryState,
}

/// Read-only copy of a session, published after every processed event.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub role: Role,
    pub state: NegotiationState,
    pub lifecycle: SupervisoryState,
    pub local_description: Option<SessionDescription>,
    pub remote_description: Option<SessionDescription>,
    pub queued_candidates: usize,
    pub applied_candidates: usize,
    pub rejected_candidates: usize,
}

impl Session {
    pub fn new(id: SessionId, role: Role) -> Self {
        Self {
            id,
            role,
            state: NegotiationState::Idle,
            local_description: None,
            remote_description: None,
            candidates: CandidateQueue::new(),
            lifecycle: SupervisoryState::Connecting,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn lifecycle(&self) -> SupervisoryState {
        self.lifecycle
    }

    pub fn set_lifecycle(&mut self, lifecycle: SupervisoryState) {
        self.lifecycle = lifecycle;
    }

    /// Moves to `next` if the state machine allows it.
    pub fn transition(&mut self, next: NegotiationState) -> bool {
        if !self.state.can_transition_to(next) {
            warn!(
                session = %self.id,
                "Refusing transition {} -> {}", self.state, next
            );
            return false;
        }
        info!(session = %self.id, role = %self.role, "{} -> {}", self.state, next);
        self.state = next;
        true
    }

    pub fn local_description_applied(&self) -> bool {
        self.local_description.is_some()
    }

    pub fn remote_description_applied(&self) -> bool {
        self.remote_description.is_some()
    }

    /// Records the applied local description. It is set once per session.
    pub fn set_local_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), SignalingError> {
        if self.local_description.is_some() {
            return Err(SignalingError::Negotiation(
                "local description already applied".to_owned(),
            ));
        }
        self.local_description = Some(description);
        Ok(())
    }

    /// Records the applied remote description. It is set once per session.
    pub fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), SignalingError> {
        if self.remote_description.is_some() {
            return Err(SignalingError::Negotiation(
                "remote description already applied".to_owned(),
            ));
        }
        self.remote_description = Some(description);
        Ok(())
    }

    pub fn candidates(&self) -> &CandidateQueue {
        &self.candidates
    }

    pub fn candidates_mut(&mut self) -> &mut CandidateQueue {
        &mut self.candidates
    }

    /// Enters `terminal` and releases descriptions and queued candidates.
    /// Returns false if the session had already ended.
    pub fn teardown(&mut self, terminal: NegotiationState) -> bool {
        debug_assert!(terminal.is_terminal());
        if self.state.is_terminal() {
            return false;
        }
        info!(session = %self.id, "{} -> {} (teardown)", self.state, terminal);
        self.state = terminal;
        self.candidates.clear();
        self.local_description = None;
        self.remote_description = None;
        true
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            role: self.role,
            state: self.state,
            lifecycle: self.lifecycle,
            local_description: self.local_description.clone(),
            remote_description: self.remote_description.clone(),
            queued_candidates: self.candidates.len(),
            applied_candidates: self.candidates.applied(),
            rejected_candidates: self.candidates.rejected(),
        }
    }
}
