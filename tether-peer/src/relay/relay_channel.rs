use crate::error::SignalingError;
use dashmap::DashMap;
use tether_core::{MessageKind, RelayEnvelope, SessionId, SignalMessage};
use tokio::sync::{mpsc, watch};
use tracing::trace;

/// A message delivered by the relay, tagged with the session it belongs to.
pub type InboundSignal = (SessionId, SignalMessage);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Never connected yet. Sends fail with `NotReady`.
    Connecting,
    Connected,
    /// Lost after having been connected. Sends fail with `TransportUnavailable`.
    Disconnected,
}

/// The signaling path between peers.
///
/// Delivery is at-least-once and ordered only within one message kind.
pub trait RelayChannel: Send + Sync {
    /// Fire-and-forget. Fails instead of buffering when the channel is down.
    fn send(&self, session_id: SessionId, message: &SignalMessage) -> Result<(), SignalingError>;

    /// An unbounded stream of inbound messages of one kind. It keeps
    /// delivering across reconnects until the receiver is dropped.
    fn subscribe(&self, kind: MessageKind) -> mpsc::UnboundedReceiver<InboundSignal>;

    fn state(&self) -> watch::Receiver<RelayState>;
}

/// Fan-out of inbound envelopes to per-kind subscribers.
#[derive(Default)]
pub struct SubscriberSet {
    by_kind: DashMap<MessageKind, Vec<mpsc::UnboundedSender<InboundSignal>>>,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, kind: MessageKind) -> mpsc::UnboundedReceiver<InboundSignal> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.by_kind.entry(kind).or_default().push(tx);
        rx
    }

    /// Delivers to every live subscriber of the envelope's kind and forgets
    /// the ones that went away.
    pub fn dispatch(&self, envelope: RelayEnvelope) {
        let kind = envelope.message.kind();
        let Some(mut subscribers) = self.by_kind.get_mut(&kind) else {
            trace!("No subscriber for {} message", kind);
            return;
        };

        subscribers.retain(|tx| {
            tx.send((envelope.session_id, envelope.message.clone()))
                .is_ok()
        });
    }
}
