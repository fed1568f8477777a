use std::sync::Arc;
use tether_core::{IceCandidate, SignalMessage};
use tether_peer::NegotiationState;
use tokio::sync::Notify;
use tokio::time::{Duration, timeout};

use crate::integration::{TestPeer, init_tracing};
use crate::utils::{MemoryRelayHub, STATE_TIMEOUT_MS, next_transport, wait_for_state, wait_until};

const FLOOD: usize = 200;

/// A responder stuck in `set_remote_description` with a full inbox does not
/// keep the router from opening and driving another session.
#[tokio::test]
async fn test_busy_session_does_not_stall_others() {
    init_tracing();

    let gate = Arc::new(Notify::new());
    let hub = MemoryRelayHub::new();
    let mut alice = TestPeer::new(hub.endpoint(), 1, false);
    let mut bob = TestPeer::gated(hub.endpoint(), Arc::clone(&gate), true);

    let first = alice
        .registry
        .open_initiator()
        .await
        .expect("Failed to open first initiator");
    next_transport(&mut alice.transports)
        .await
        .expect("No first initiator transport");
    first.start().await.expect("First start() failed");

    let first_remote = next_transport(&mut bob.transports)
        .await
        .expect("No first responder transport");
    timeout(
        Duration::from_millis(STATE_TIMEOUT_MS),
        first_remote.remote_pending.notified(),
    )
    .await
    .expect("First responder never reached set_remote_description");

    for i in 0..FLOOD {
        bob.relay.inject(
            first.id(),
            SignalMessage::IceCandidate(IceCandidate::new(format!("flood-{}", i), first.id())),
        );
    }

    let second = alice
        .registry
        .open_initiator()
        .await
        .expect("Failed to open second initiator");
    next_transport(&mut alice.transports)
        .await
        .expect("No second initiator transport");
    second.start().await.expect("Second start() failed");

    let second_remote = next_transport(&mut bob.transports)
        .await
        .expect("Second session was not opened while the first was busy");
    timeout(
        Duration::from_millis(STATE_TIMEOUT_MS),
        second_remote.remote_pending.notified(),
    )
    .await
    .expect("Second responder never reached set_remote_description");
    assert!(first_remote.remote_description().is_none());

    gate.notify_waiters();

    wait_for_state(&first, NegotiationState::AnswerApplied, STATE_TIMEOUT_MS)
        .await
        .expect("First initiator did not apply the answer");
    wait_for_state(&second, NegotiationState::AnswerApplied, STATE_TIMEOUT_MS)
        .await
        .expect("Second initiator did not apply the answer");
    wait_until(
        || first_remote.applied_candidates().len() == FLOOD,
        STATE_TIMEOUT_MS,
    )
    .await
    .expect("Flooded candidates were not all applied");
}
