use crate::config::RelayConfig;
use crate::error::SignalingError;
use crate::relay::{InboundSignal, RelayChannel, RelayState, SubscriberSet};
use futures::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use tether_core::{MessageKind, PeerId, RelayEnvelope, SessionId, SignalMessage};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

struct WsRelayInner {
    url: String,
    subscribers: SubscriberSet,
    state_tx: watch::Sender<RelayState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
}

/// WebSocket client for `tether-relay`.
///
/// Connects in the background and reconnects after a fixed backoff whenever
/// the socket drops. Subscriptions survive reconnects.
pub struct WsRelay {
    inner: Arc<WsRelayInner>,
    task: JoinHandle<()>,
}

impl WsRelay {
    /// `ws://host:port/ws/{room}/{peer_id}` for the given relay base URL.
    pub fn room_url(base: &str, room: &str, peer_id: &PeerId) -> String {
        format!("{}/ws/{}/{}", base.trim_end_matches('/'), room, peer_id)
    }

    pub fn connect(url: impl Into<String>, config: RelayConfig) -> Self {
        let (state_tx, _) = watch::channel(RelayState::Connecting);
        let inner = Arc::new(WsRelayInner {
            url: url.into(),
            subscribers: SubscriberSet::new(),
            state_tx,
            outbound: Mutex::new(None),
        });

        let task = tokio::spawn(run_connection_loop(Arc::clone(&inner), config));

        Self { inner, task }
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Stops reconnecting and drops the current socket.
    pub fn shutdown(&self) {
        self.task.abort();
        self.inner.set_outbound(None);
        if *self.inner.state_tx.borrow() == RelayState::Connected {
            self.inner.state_tx.send_replace(RelayState::Disconnected);
        }
    }
}

impl Drop for WsRelay {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl WsRelayInner {
    fn set_outbound(&self, tx: Option<mpsc::UnboundedSender<Message>>) {
        *self.outbound.lock().unwrap_or_else(|e| e.into_inner()) = tx;
    }
}

async fn run_connection_loop(inner: Arc<WsRelayInner>, config: RelayConfig) {
    loop {
        match connect_async(inner.url.as_str()).await {
            Ok((socket, _)) => {
                info!("Relay connected: {}", inner.url);
                let (tx, rx) = mpsc::unbounded_channel();
                inner.set_outbound(Some(tx));
                inner.state_tx.send_replace(RelayState::Connected);

                pump_socket(&inner, socket, rx).await;

                inner.set_outbound(None);
                inner.state_tx.send_replace(RelayState::Disconnected);
                warn!("Relay connection lost: {}", inner.url);
            }
            Err(e) => debug!("Relay connect to {} failed: {}", inner.url, e),
        }

        tokio::time::sleep(config.reconnect_backoff()).await;
    }
}

async fn pump_socket(
    inner: &WsRelayInner,
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    let (mut sender, mut receiver) = socket.split();

    let send_loop = async {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    };

    let recv_loop = async {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match RelayEnvelope::from_json(text.as_str()) {
                    Ok(envelope) => inner.subscribers.dispatch(envelope),
                    Err(e) => warn!("Invalid relay envelope: {}", e),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    };

    tokio::select! {
        _ = send_loop => {},
        _ = recv_loop => {},
    }
}

impl RelayChannel for WsRelay {
    fn send(&self, session_id: SessionId, message: &SignalMessage) -> Result<(), SignalingError> {
        let state = *self.inner.state_tx.borrow();
        if state == RelayState::Connecting {
            return Err(SignalingError::NotReady);
        }

        let json = RelayEnvelope::new(session_id, message.clone())
            .to_json()
            .map_err(|e| SignalingError::TransportUnavailable(e.to_string()))?;

        let outbound = self
            .inner
            .outbound
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let Some(tx) = outbound.as_ref() else {
            return Err(SignalingError::TransportUnavailable(
                "relay socket is not connected".to_owned(),
            ));
        };
        tx.send(Message::Text(json.into()))
            .map_err(|_| SignalingError::TransportUnavailable("relay socket closed".to_owned()))
    }

    fn subscribe(&self, kind: MessageKind) -> mpsc::UnboundedReceiver<InboundSignal> {
        self.inner.subscribers.subscribe(kind)
    }

    fn state(&self) -> watch::Receiver<RelayState> {
        self.inner.state_tx.subscribe()
    }
}
