use tether_peer::{NegotiationConfig, NegotiationState, SessionEvent, SignalingError};

use crate::integration::{TestPeer, init_tracing};
use crate::utils::{MemoryRelayHub, STATE_TIMEOUT_MS, next_transport, wait_for_event, wait_until};

#[tokio::test]
async fn test_initiator_without_tracks_fails() {
    init_tracing();

    let hub = MemoryRelayHub::new();
    let mut alice = TestPeer::new(hub.endpoint(), 0, false);
    let mut events_rx = alice.registry.subscribe();

    let session = alice
        .registry
        .open_initiator()
        .await
        .expect("Failed to open initiator");
    let transport = next_transport(&mut alice.transports)
        .await
        .expect("No transport");

    let result = session.start().await;
    assert_eq!(result, Err(SignalingError::NoTracksAttached));
    assert_eq!(session.state(), NegotiationState::Failed);

    let event = wait_for_event(
        &mut events_rx,
        |e| matches!(e, SessionEvent::Failed { .. }),
        STATE_TIMEOUT_MS,
    )
    .await
    .expect("Failure was not surfaced");
    assert_eq!(
        event,
        SessionEvent::Failed {
            session_id: session.id(),
            error: SignalingError::NoTracksAttached,
        }
    );

    // Nothing reached the network and the transport was released
    assert!(alice.relay.sent().is_empty());
    assert!(transport.local_description().is_none());
    assert_eq!(transport.close_calls(), 1);
}

#[tokio::test]
async fn test_receive_only_initiator_needs_no_tracks() {
    init_tracing();

    let hub = MemoryRelayHub::new();
    let config = NegotiationConfig {
        receive_only: true,
        ..NegotiationConfig::default()
    };
    let alice = TestPeer::with_config(hub.endpoint(), 0, config, false);

    let session = alice
        .registry
        .open_initiator()
        .await
        .expect("Failed to open initiator");

    session.start().await.expect("Receive-only start() failed");
    assert_eq!(session.state(), NegotiationState::OfferSent);
    assert_eq!(alice.relay.sent().len(), 1);

    session.close().await;
}

#[tokio::test]
async fn test_responder_without_tracks_sends_no_answer() {
    init_tracing();

    let hub = MemoryRelayHub::new();
    let alice = TestPeer::new(hub.endpoint(), 1, false);
    let bob = TestPeer::new(hub.endpoint(), 0, true);
    let mut bob_events = bob.registry.subscribe();

    let offerer = alice
        .registry
        .open_initiator()
        .await
        .expect("Failed to open initiator");
    offerer.start().await.expect("start() failed");

    let event = wait_for_event(
        &mut bob_events,
        |e| matches!(e, SessionEvent::Failed { .. }),
        STATE_TIMEOUT_MS,
    )
    .await
    .expect("Responder failure was not surfaced");
    assert_eq!(
        event,
        SessionEvent::Failed {
            session_id: offerer.id(),
            error: SignalingError::NoTracksAttached,
        }
    );

    let id = offerer.id();
    let registry = bob.registry.clone();
    wait_until(|| registry.is_retired(id), STATE_TIMEOUT_MS)
        .await
        .expect("Failed responder was not retired");

    assert!(bob.relay.sent().is_empty());
    assert_eq!(offerer.state(), NegotiationState::OfferSent);

    offerer.close().await;
}
