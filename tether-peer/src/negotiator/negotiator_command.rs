use crate::error::SignalingError;
use tether_core::SignalMessage;
use tokio::sync::oneshot;

/// Inputs to a session's negotiator, processed strictly one at a time.
#[derive(Debug)]
pub enum NegotiatorCommand {
    /// Begin the initiator path: create, apply and send the offer.
    Start {
        reply: oneshot::Sender<Result<(), SignalingError>>,
    },

    /// A description or candidate received from the relay.
    Signal(SignalMessage),

    /// Tear the session down. Replies once resources are released.
    Close { reply: oneshot::Sender<()> },
}
