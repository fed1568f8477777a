use std::sync::Arc;
use std::time::Duration;
use tether_core::PeerId;
use tether_peer::{
    NegotiationConfig, NegotiationState, RelayChannel, RelayConfig, RelayState, SessionRegistry,
    WsRelay,
};
use tether_relay::{RelayService, serve};
use tokio::net::TcpListener;
use tokio::time::timeout;

use crate::integration::init_tracing;
use crate::utils::{
    MockTransportFactory, STATE_TIMEOUT_MS, next_transport, wait_for_state, wait_until,
};

/// The offerer joins an empty room and sends its offer and a candidate. The
/// relay holds both until the answerer joins.
#[tokio::test]
async fn test_offer_sent_before_answerer_joins() {
    init_tracing();

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("No local address");
    let service = RelayService::new();
    tokio::spawn(serve(listener, service.clone()));

    let base = format!("ws://{}", addr);
    let config = RelayConfig {
        reconnect_backoff_ms: 50,
    };

    let alice_relay = Arc::new(WsRelay::connect(
        WsRelay::room_url(&base, "late", &PeerId::new()),
        config.clone(),
    ));
    let (alice_factory, mut alice_transports) = MockTransportFactory::new(1);
    let alice = SessionRegistry::new(
        alice_relay.clone(),
        Arc::new(alice_factory),
        NegotiationConfig::default(),
    );
    alice.spawn_router(false);

    let mut alice_state = alice_relay.state();
    timeout(
        Duration::from_millis(STATE_TIMEOUT_MS),
        alice_state.wait_for(|s| *s == RelayState::Connected),
    )
    .await
    .expect("Relay did not connect in time")
    .expect("Relay state channel closed");

    let offerer = alice.open_initiator().await.expect("Failed to open initiator");
    let offerer_transport = next_transport(&mut alice_transports)
        .await
        .expect("No initiator transport");
    offerer.start().await.expect("start() failed");
    offerer_transport.emit_candidate("held-c1").await;

    wait_until(|| service.held_count("late") == 2, STATE_TIMEOUT_MS)
        .await
        .expect("Relay did not hold the offer and candidate");
    assert_eq!(service.peer_count("late"), 1);

    // The answerer subscribes before its socket is up, so the replay is seen
    let bob_relay = Arc::new(WsRelay::connect(
        WsRelay::room_url(&base, "late", &PeerId::new()),
        config,
    ));
    let (bob_factory, mut bob_transports) = MockTransportFactory::new(1);
    let bob = SessionRegistry::new(
        bob_relay.clone(),
        Arc::new(bob_factory),
        NegotiationConfig::default(),
    );
    bob.spawn_router(true);

    let answerer_transport = next_transport(&mut bob_transports)
        .await
        .expect("No responder transport");
    wait_for_state(&offerer, NegotiationState::AnswerApplied, STATE_TIMEOUT_MS)
        .await
        .expect("Initiator did not apply the answer");
    wait_until(
        || answerer_transport.applied_candidates() == vec!["held-c1"],
        STATE_TIMEOUT_MS,
    )
    .await
    .expect("Held candidate was not applied");
    assert_eq!(service.held_count("late"), 0);

    alice.close_all().await;
    bob.close_all().await;
    alice_relay.shutdown();
    bob_relay.shutdown();
}
