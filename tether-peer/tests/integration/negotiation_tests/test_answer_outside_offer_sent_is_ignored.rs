use tether_core::{SessionDescription, SignalMessage};
use tether_peer::{NegotiationState, SignalingError};

use crate::integration::{TestPeer, init_tracing};
use crate::utils::{MemoryRelayHub, STATE_TIMEOUT_MS, next_transport, wait_for_state};

#[tokio::test]
async fn test_answer_outside_offer_sent_is_ignored() {
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

    // An answer while still Idle changes nothing
    session
        .deliver(SignalMessage::SessionDescription(SessionDescription::answer(
            "v=0 early answer",
        )));
    session.start().await.expect("start() failed");

    assert_eq!(session.state(), NegotiationState::OfferSent);
    assert!(transport.remote_description().is_none());
    assert!(session.snapshot().remote_description.is_none());

    // The first answer in OfferSent is applied
    let answer = SessionDescription::answer("v=0 real answer");
    session
        .deliver(SignalMessage::SessionDescription(answer.clone()));
    wait_for_state(&session, NegotiationState::AnswerApplied, STATE_TIMEOUT_MS)
        .await
        .expect("Answer was not applied");

    // A second answer is discarded; start() doubles as a barrier here since
    // commands are handled in order
    session
        .deliver(SignalMessage::SessionDescription(SessionDescription::answer(
            "v=0 late answer",
        )));
    let result = session.start().await;
    assert_eq!(
        result,
        Err(SignalingError::InvalidState(NegotiationState::AnswerApplied))
    );

    assert_eq!(session.state(), NegotiationState::AnswerApplied);
    assert_eq!(transport.remote_description(), Some(answer.clone()));
    assert_eq!(session.snapshot().remote_description, Some(answer));

    session.close().await;
}
