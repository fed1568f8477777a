use tether_core::{IceCandidate, SignalMessage};
use tether_peer::{
    NegotiationState, PeerConnectionState, SessionEvent, SupervisoryState, TerminationReason,
};

use crate::integration::{TestPeer, create_connected_pair, init_tracing};
use crate::utils::{MemoryRelayHub, STATE_TIMEOUT_MS, wait_for_event, wait_for_state, wait_until};

#[tokio::test]
async fn test_transport_failure_closes_session() {
    init_tracing();

    let hub = MemoryRelayHub::new();
    let alice = TestPeer::new(hub.endpoint(), 1, false);
    let bob = TestPeer::new(hub.endpoint(), 1, true);
    let pair = create_connected_pair(alice, bob).await;
    let mut events_rx = pair.alice.registry.subscribe();

    pair.offerer_transport
        .emit_state(PeerConnectionState::Failed)
        .await;

    let event = wait_for_event(
        &mut events_rx,
        |e| matches!(e, SessionEvent::Supervisory { .. }),
        STATE_TIMEOUT_MS,
    )
    .await
    .expect("Termination was not surfaced");
    match event {
        SessionEvent::Supervisory { supervision, .. } => {
            assert_eq!(supervision.state, SupervisoryState::Terminated);
            assert_eq!(supervision.reason, Some(TerminationReason::TransportFailed));
        }
        other => panic!("Unexpected event {:?}", other),
    }

    wait_for_state(&pair.offerer, NegotiationState::Closed, STATE_TIMEOUT_MS)
        .await
        .expect("Session did not close after transport failure");
    assert_eq!(pair.offerer_transport.close_calls(), 1);

    // Candidates after teardown are not processed
    let applied_before = pair.offerer_transport.applied_candidates();
    pair.offerer
        .deliver(SignalMessage::IceCandidate(IceCandidate::new(
            "late",
            pair.offerer.id(),
        )));
    pair.alice
        .relay
        .inject(
            pair.offerer.id(),
            SignalMessage::IceCandidate(IceCandidate::new("late-relay", pair.offerer.id())),
        );
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(pair.offerer_transport.applied_candidates(), applied_before);

    let registry = pair.alice.registry.clone();
    let id = pair.offerer.id();
    wait_until(|| registry.get(id).is_none() && registry.is_retired(id), STATE_TIMEOUT_MS)
        .await
        .expect("Closed session stayed registered");

    // The other side is unaffected until its own transport reports
    assert_eq!(pair.answerer.state(), NegotiationState::Connected);
    pair.bob.registry.close_all().await;
}

#[tokio::test]
async fn test_disconnect_only_degrades() {
    init_tracing();

    let hub = MemoryRelayHub::new();
    let alice = TestPeer::new(hub.endpoint(), 1, false);
    let bob = TestPeer::new(hub.endpoint(), 1, true);
    let pair = create_connected_pair(alice, bob).await;

    pair.offerer_transport
        .emit_state(PeerConnectionState::Disconnected)
        .await;

    let mut snapshots = pair.offerer.watch();
    snapshots
        .wait_for(|s| s.lifecycle == SupervisoryState::Degraded)
        .await
        .expect("Degraded state was not reported");
    assert_eq!(pair.offerer.state(), NegotiationState::Connected);

    pair.offerer_transport
        .emit_state(PeerConnectionState::Connected)
        .await;
    snapshots
        .wait_for(|s| s.lifecycle == SupervisoryState::Connected)
        .await
        .expect("Recovery was not reported");
    assert_eq!(pair.offerer.state(), NegotiationState::Connected);

    pair.alice.registry.close_all().await;
    pair.bob.registry.close_all().await;
}
