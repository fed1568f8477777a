use tether_core::{MessageKind, Role, SdpType, SignalMessage};
use tether_peer::{NegotiationState, SessionEvent};

use crate::integration::{TestPeer, create_connected_pair, init_tracing};
use crate::utils::{MemoryRelayHub, STATE_TIMEOUT_MS, wait_for_event, wait_until};

#[tokio::test]
async fn test_offer_answer_reaches_connected() {
    init_tracing();

    let hub = MemoryRelayHub::new();
    let alice = TestPeer::new(hub.endpoint(), 1, false);
    let bob = TestPeer::new(hub.endpoint(), 1, true);

    let pair = create_connected_pair(alice, bob).await;

    // Both sides share the session id and hold each other's descriptions
    assert_eq!(pair.offerer.id(), pair.answerer.id());
    assert_eq!(pair.offerer.role(), Role::Initiator);
    assert_eq!(pair.answerer.role(), Role::Responder);

    let offer = pair
        .offerer_transport
        .local_description()
        .expect("Initiator has no local offer");
    let answer = pair
        .answerer_transport
        .local_description()
        .expect("Responder has no local answer");
    assert_eq!(offer.sdp_type, SdpType::Offer);
    assert_eq!(answer.sdp_type, SdpType::Answer);
    assert_eq!(pair.answerer_transport.remote_description(), Some(offer.clone()));
    assert_eq!(pair.offerer_transport.remote_description(), Some(answer.clone()));

    let snapshot = pair.offerer.snapshot();
    assert_eq!(snapshot.local_description, Some(offer));
    assert_eq!(snapshot.remote_description, Some(answer));

    // Exactly one description went each way
    let offers_sent = pair
        .alice
        .relay
        .sent()
        .iter()
        .filter(|e| e.message.kind() == MessageKind::SessionDescription)
        .count();
    let answers_sent = pair
        .bob
        .relay
        .sent()
        .iter()
        .filter(|e| e.message.kind() == MessageKind::SessionDescription)
        .count();
    assert_eq!(offers_sent, 1);
    assert_eq!(answers_sent, 1);

    // Trickled candidates reach the other side in both directions
    pair.offerer_transport.emit_candidate("cand-a1").await;
    pair.answerer_transport.emit_candidate("cand-b1").await;

    let answerer_transport = pair.answerer_transport.clone();
    wait_until(
        || answerer_transport.applied_candidates() == vec!["cand-a1".to_string()],
        STATE_TIMEOUT_MS,
    )
    .await
    .expect("Responder never applied the initiator's candidate");

    let offerer_transport = pair.offerer_transport.clone();
    wait_until(
        || offerer_transport.applied_candidates() == vec!["cand-b1".to_string()],
        STATE_TIMEOUT_MS,
    )
    .await
    .expect("Initiator never applied the responder's candidate");

    // Every candidate carried the session id as its tag
    for envelope in pair.alice.relay.sent() {
        if let SignalMessage::IceCandidate(c) = &envelope.message {
            assert_eq!(c.session_tag, pair.offerer.id());
        }
    }

    // Remote tracks are surfaced to observers
    let mut events_rx = pair.bob.registry.subscribe();
    pair.answerer_transport.emit_track("video-1").await;
    let event = wait_for_event(
        &mut events_rx,
        |e| matches!(e, SessionEvent::RemoteTrack { .. }),
        STATE_TIMEOUT_MS,
    )
    .await
    .expect("Remote track was not surfaced");
    assert_eq!(event.session_id(), pair.answerer.id());

    pair.alice.registry.close_all().await;
    pair.bob.registry.close_all().await;

    assert_eq!(pair.offerer.state(), NegotiationState::Closed);
    assert_eq!(pair.answerer.state(), NegotiationState::Closed);
    assert_eq!(pair.offerer_transport.close_calls(), 1);
    assert_eq!(pair.answerer_transport.close_calls(), 1);
}
