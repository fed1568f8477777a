use crate::error::SignalingError;
use crate::lifecycle::SessionEvent;
use crate::negotiator::{NegotiationState, NegotiatorCommand, SessionSnapshot};
use std::sync::Arc;
use tether_core::{Role, SessionId, SignalMessage};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::debug;

/// Cloneable handle to a running negotiator.
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    role: Role,
    command_tx: mpsc::UnboundedSender<NegotiatorCommand>,
    closing_tx: Arc<watch::Sender<bool>>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    events_tx: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    pub(crate) fn new(
        id: SessionId,
        role: Role,
        command_tx: mpsc::UnboundedSender<NegotiatorCommand>,
        closing_tx: Arc<watch::Sender<bool>>,
        snapshot_rx: watch::Receiver<SessionSnapshot>,
        events_tx: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            id,
            role,
            command_tx,
            closing_tx,
            snapshot_rx,
            events_tx,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Creates, applies and sends the local offer. Initiator sessions only.
    pub async fn start(&self) -> Result<(), SignalingError> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(NegotiatorCommand::Start { reply })
            .map_err(|_| SignalingError::SessionClosed)?;
        rx.await.map_err(|_| SignalingError::SessionClosed)?
    }

    /// Hands a message received from the relay to the negotiator without
    /// waiting for it to be processed. Messages for a session that has
    /// already ended are dropped.
    pub fn deliver(&self, message: SignalMessage) {
        if self.command_tx.send(NegotiatorCommand::Signal(message)).is_err() {
            debug!(session = %self.id, "Dropping signal for ended session");
        }
    }

    /// Tears the session down. Safe to call any number of times, from any
    /// number of tasks; teardown happens once.
    pub async fn close(&self) {
        self.closing_tx.send_replace(true);

        let (reply, rx) = oneshot::channel();
        if self
            .command_tx
            .send(NegotiatorCommand::Close { reply })
            .is_ok()
        {
            let _ = rx.await;
            return;
        }

        // The negotiator has already exited; wait for its final snapshot.
        let mut snapshot_rx = self.snapshot_rx.clone();
        let _ = snapshot_rx.wait_for(|s| s.state.is_terminal()).await;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn state(&self) -> NegotiationState {
        self.snapshot_rx.borrow().state
    }

    pub fn is_terminated(&self) -> bool {
        self.state().is_terminal()
    }

    /// Follows snapshot changes of this session.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Subscribes to the event stream this session publishes into. The
    /// stream is shared with every session of the same registry.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }
}
