use tether_peer::{NegotiationState, SessionEvent, SignalingError};

use crate::integration::{TestPeer, init_tracing};
use crate::utils::{MemoryRelayHub, next_transport};

#[tokio::test]
async fn test_close_is_idempotent() {
    init_tracing();

    let hub = MemoryRelayHub::new();
    let mut alice = TestPeer::new(hub.endpoint(), 1, false);
    let mut events_rx = alice.registry.subscribe();

    let session = alice
        .registry
        .open_initiator()
        .await
        .expect("Failed to open initiator");
    let transport = next_transport(&mut alice.transports)
        .await
        .expect("No transport");
    session.start().await.expect("start() failed");

    let other = session.clone();
    tokio::join!(session.close(), other.close(), session.close());
    session.close().await;

    assert_eq!(session.state(), NegotiationState::Closed);
    assert_eq!(transport.close_calls(), 1);

    let snapshot = session.snapshot();
    assert!(snapshot.local_description.is_none());
    assert!(snapshot.remote_description.is_none());
    assert_eq!(snapshot.queued_candidates, 0);

    let mut closed_events = 0;
    while let Ok(event) = events_rx.try_recv() {
        if matches!(event, SessionEvent::Closed { .. }) {
            closed_events += 1;
        }
    }
    assert_eq!(closed_events, 1);

    // Calls on a closed session report it instead of acting
    assert_eq!(session.start().await, Err(SignalingError::SessionClosed));
}
