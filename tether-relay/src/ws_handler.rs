use crate::RelayService;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use tether_core::{PeerId, RelayEnvelope};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path((room, peer_id)): Path<(String, String)>,
    State(service): State<RelayService>,
) -> Response {
    let peer_id = match peer_id.parse::<PeerId>() {
        Ok(id) => id,
        Err(e) => {
            warn!("Rejected connection with bad peer id {:?}: {}", peer_id, e);
            return (StatusCode::BAD_REQUEST, "invalid peer id").into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, room, peer_id, service))
}

async fn handle_socket(socket: WebSocket, room: String, peer_id: PeerId, service: RelayService) {
    info!(%room, "New WebSocket connection: {}", peer_id);

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let conn = service.add_peer(&room, peer_id.clone(), tx);

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn({
        let service = service.clone();
        let room = room.clone();
        let peer_id = peer_id.clone();

        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => match RelayEnvelope::from_json(text.as_str()) {
                        Ok(envelope) => {
                            let delivered = service.forward(&room, &peer_id, text.as_str());
                            debug!(
                                %room,
                                session = %envelope.session_id,
                                "Relayed {} from {} to {} peer(s)",
                                envelope.message.kind(), peer_id, delivered
                            );
                        }
                        Err(e) => warn!(%room, "Invalid envelope from {}: {}", peer_id, e),
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    service.remove_peer(&room, &peer_id, conn);
    info!(%room, "WebSocket disconnected: {}", peer_id);
}
