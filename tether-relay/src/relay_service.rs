use axum::extract::ws::Message;
use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tether_core::PeerId;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Envelopes a room keeps for the next peer to join while nobody else is
/// there to receive them.
pub const MAX_HELD_PER_ROOM: usize = 64;

/// Identifies one socket of a peer. A reconnecting peer gets a new one.
pub type ConnectionId = u64;

struct PeerSlot {
    conn: ConnectionId,
    tx: mpsc::UnboundedSender<Message>,
}

#[derive(Default)]
struct Room {
    peers: HashMap<PeerId, PeerSlot>,
    held: VecDeque<(PeerId, String)>,
}

impl Room {
    fn hold(&mut self, room: &str, from: PeerId, text: String) {
        if self.held.len() >= MAX_HELD_PER_ROOM {
            self.held.pop_front();
            warn!(%room, "Held envelopes full; dropping the oldest");
        }
        self.held.push_back((from, text));
    }

    /// Hands every held envelope not sent by `peer_id` to its queue.
    fn replay_to(&mut self, room: &str, peer_id: &PeerId, tx: &mpsc::UnboundedSender<Message>) {
        let mut replayed = 0;
        let mut kept = VecDeque::new();

        for (from, text) in std::mem::take(&mut self.held) {
            if &from == peer_id {
                kept.push_back((from, text));
                continue;
            }
            match tx.send(Message::Text(text.clone().into())) {
                Ok(()) => replayed += 1,
                Err(_) => kept.push_back((from, text)),
            }
        }
        self.held = kept;

        if replayed > 0 {
            debug!(%room, "Replayed {} held envelope(s) to {}", replayed, peer_id);
        }
    }
}

#[derive(Default)]
struct RelayInner {
    rooms: DashMap<String, Room>,
    next_conn: AtomicU64,
}

/// Connected peers, grouped by room.
#[derive(Clone, Default)]
pub struct RelayService {
    inner: Arc<RelayInner>,
}

impl RelayService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a peer's outbound socket queue and replays what the room
    /// held for it. A peer id that is already in the room replaces the older
    /// connection.
    pub fn add_peer(
        &self,
        room: &str,
        peer_id: PeerId,
        tx: mpsc::UnboundedSender<Message>,
    ) -> ConnectionId {
        let conn = self.inner.next_conn.fetch_add(1, Ordering::Relaxed);
        let mut entry = self.inner.rooms.entry(room.to_owned()).or_default();
        let state = entry.value_mut();

        state.replay_to(room, &peer_id, &tx);
        if state
            .peers
            .insert(peer_id.clone(), PeerSlot { conn, tx })
            .is_some()
        {
            warn!(%room, "Peer {} reconnected; replacing its old socket", peer_id);
        }
        conn
    }

    /// Unregisters the connection `conn` of `peer_id`. A newer connection of
    /// the same peer is left in place.
    pub fn remove_peer(&self, room: &str, peer_id: &PeerId, conn: ConnectionId) {
        if let Some(mut state) = self.inner.rooms.get_mut(room) {
            match state.peers.get(peer_id).map(|slot| slot.conn == conn) {
                Some(true) => {
                    state.peers.remove(peer_id);
                }
                Some(false) => debug!(%room, "Keeping newer connection of {}", peer_id),
                None => {}
            }
        }
        self.inner
            .rooms
            .remove_if(room, |_, state| state.peers.is_empty());
    }

    /// Sends `text` to every peer of `room` except `from`. When nobody else
    /// is there it is held for the next peer to join. Returns how many peers
    /// it was queued for.
    pub fn forward(&self, room: &str, from: &PeerId, text: &str) -> usize {
        let Some(mut entry) = self.inner.rooms.get_mut(room) else {
            return 0;
        };
        let state = entry.value_mut();

        let mut delivered = 0;
        for (peer_id, slot) in state.peers.iter() {
            if peer_id == from {
                continue;
            }
            match slot.tx.send(Message::Text(text.to_owned().into())) {
                Ok(()) => delivered += 1,
                Err(_) => debug!(%room, "Peer {} already gone", peer_id),
            }
        }

        if delivered == 0 {
            state.hold(room, from.clone(), text.to_owned());
        }
        delivered
    }

    pub fn peer_count(&self, room: &str) -> usize {
        self.inner.rooms.get(room).map_or(0, |state| state.peers.len())
    }

    /// Envelopes `room` holds for a peer that has not joined yet.
    pub fn held_count(&self, room: &str) -> usize {
        self.inner.rooms.get(room).map_or(0, |state| state.held.len())
    }

    pub fn room_count(&self) -> usize {
        self.inner.rooms.len()
    }
}
