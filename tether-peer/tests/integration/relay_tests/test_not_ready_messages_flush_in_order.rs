use tether_core::{MessageKind, SdpType, SignalMessage};
use tether_peer::{NegotiationState, RelayState};

use crate::integration::{TestPeer, init_tracing};
use crate::utils::{MemoryRelayHub, STATE_TIMEOUT_MS, next_transport, wait_for_state, wait_until};

/// Messages refused with NotReady before the relay first connects are held
/// and go out in their original order once it does.
#[tokio::test]
async fn test_not_ready_messages_flush_in_order() {
    init_tracing();

    let hub = MemoryRelayHub::new();
    let mut alice = TestPeer::new(hub.pending_endpoint(), 1, false);
    let mut bob = TestPeer::new(hub.endpoint(), 1, true);

    let offerer = alice
        .registry
        .open_initiator()
        .await
        .expect("Failed to open initiator");
    let offerer_transport = next_transport(&mut alice.transports)
        .await
        .expect("No transport");

    offerer.start().await.expect("start() should hold the offer");
    assert_eq!(offerer.state(), NegotiationState::OfferSent);

    offerer_transport.emit_candidate("a1").await;
    offerer_transport.emit_candidate("a2").await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(alice.relay.sent().is_empty());

    alice.relay.set_state(RelayState::Connected);

    let relay = alice.relay.clone();
    wait_until(|| relay.sent().len() == 3, STATE_TIMEOUT_MS)
        .await
        .expect("Held messages were not flushed");

    let sent = alice.relay.sent();
    match &sent[0].message {
        SignalMessage::SessionDescription(d) => assert_eq!(d.sdp_type, SdpType::Offer),
        other => panic!("Expected the offer first, got {:?}", other),
    }
    let candidates: Vec<String> = sent[1..]
        .iter()
        .filter_map(|e| match &e.message {
            SignalMessage::IceCandidate(c) => Some(c.payload.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(candidates, vec!["a1", "a2"]);
    assert!(sent.iter().all(|e| e.session_id == offerer.id()));
    assert_eq!(sent[0].message.kind(), MessageKind::SessionDescription);

    // The flushed offer and candidates complete the exchange
    let answerer = bob.wait_for_session(&offerer).await;
    let answerer_transport = next_transport(&mut bob.transports)
        .await
        .expect("No responder transport");
    wait_for_state(&answerer, NegotiationState::AnswerApplied, STATE_TIMEOUT_MS)
        .await
        .expect("Responder did not answer");
    wait_until(
        || answerer_transport.applied_candidates() == vec!["a1", "a2"],
        STATE_TIMEOUT_MS,
    )
    .await
    .expect("Responder did not apply the held candidates");
    wait_for_state(&offerer, NegotiationState::AnswerApplied, STATE_TIMEOUT_MS)
        .await
        .expect("Initiator did not apply the answer");

    alice.registry.close_all().await;
    bob.registry.close_all().await;
}
