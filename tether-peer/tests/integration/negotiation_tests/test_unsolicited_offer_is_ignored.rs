use tether_core::{SessionDescription, SessionId, SignalMessage};
use tether_peer::{NegotiationState, SignalingError};

use crate::integration::{TestPeer, init_tracing};
use crate::utils::{MemoryRelayHub, next_transport};

#[tokio::test]
async fn test_initiator_discards_offers() {
    init_tracing();

    let hub = MemoryRelayHub::new();
    let mut alice = TestPeer::new(hub.endpoint(), 1, false);

    let session = alice
        .registry
        .open_initiator()
        .await
        .expect("Failed to open initiator");
    let transport = next_transport(&mut alice.transports)
        .await
        .expect("No transport");

    session
        .deliver(SignalMessage::SessionDescription(SessionDescription::offer(
            "v=0 competing offer",
        )));
    session.start().await.expect("start() failed");

    assert_eq!(session.state(), NegotiationState::OfferSent);
    assert!(transport.remote_description().is_none());

    let again = session.start().await;
    assert_eq!(
        again,
        Err(SignalingError::InvalidState(NegotiationState::OfferSent))
    );

    session.close().await;
}

#[tokio::test]
async fn test_router_without_accept_offers_opens_nothing() {
    init_tracing();

    let hub = MemoryRelayHub::new();
    let alice = TestPeer::new(hub.endpoint(), 1, false);
    let stranger = SessionId::new();

    alice.relay.inject(
        stranger,
        SignalMessage::SessionDescription(SessionDescription::offer("v=0 stranger")),
    );
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    assert!(alice.registry.is_empty());
    assert!(alice.registry.get(stranger).is_none());
}
