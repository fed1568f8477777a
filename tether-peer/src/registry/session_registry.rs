use crate::config::NegotiationConfig;
use crate::lifecycle::SessionEvent;
use crate::negotiator::{Negotiator, SessionHandle};
use crate::registry::SignalRouter;
use crate::relay::RelayChannel;
use crate::transport::{TransportFactory, transport_event_channel};
use anyhow::{Context, Result, bail};
use dashmap::DashMap;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tether_core::{Role, SessionId};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const EVENT_BUS_CAPACITY: usize = 256;

/// Ended sessions remembered so late traffic for them can be discarded.
pub const MAX_RETIRED_SESSIONS: usize = 1024;

/// Ids of ended sessions, forgetting the oldest past the cap.
#[derive(Debug, Default)]
struct RetiredSessions {
    ids: HashSet<SessionId>,
    order: VecDeque<SessionId>,
}

impl RetiredSessions {
    fn insert(&mut self, session_id: SessionId) {
        if !self.ids.insert(session_id) {
            return;
        }
        self.order.push_back(session_id);
        if self.order.len() > MAX_RETIRED_SESSIONS {
            if let Some(forgotten) = self.order.pop_front() {
                self.ids.remove(&forgotten);
            }
        }
    }

    fn contains(&self, session_id: SessionId) -> bool {
        self.ids.contains(&session_id)
    }
}

/// Live sessions of one peer, keyed by session id.
///
/// Every session shares the registry's relay, transport factory and event
/// bus. Sessions leave the registry once they reach a terminal state; the
/// most recent of their ids are remembered so late traffic for them can be
/// discarded.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<SessionId, SessionHandle>>,
    retired: Arc<Mutex<RetiredSessions>>,
    relay: Arc<dyn RelayChannel>,
    factory: Arc<dyn TransportFactory>,
    config: NegotiationConfig,
    events_tx: broadcast::Sender<SessionEvent>,
}

impl SessionRegistry {
    pub fn new(
        relay: Arc<dyn RelayChannel>,
        factory: Arc<dyn TransportFactory>,
        config: NegotiationConfig,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            sessions: Arc::new(DashMap::new()),
            retired: Arc::new(Mutex::new(RetiredSessions::default())),
            relay,
            factory,
            config,
            events_tx,
        }
    }

    /// Events of every session in this registry.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    fn retired(&self) -> MutexGuard<'_, RetiredSessions> {
        self.retired.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn relay(&self) -> Arc<dyn RelayChannel> {
        Arc::clone(&self.relay)
    }

    /// Opens a session under a freshly minted id. Call `start()` on the
    /// returned handle to send the offer.
    pub async fn open_initiator(&self) -> Result<SessionHandle> {
        self.open(SessionId::new(), Role::Initiator).await
    }

    /// Opens a session that will answer the offer carrying `session_id`.
    pub async fn open_responder(&self, session_id: SessionId) -> Result<SessionHandle> {
        self.open(session_id, Role::Responder).await
    }

    async fn open(&self, session_id: SessionId, role: Role) -> Result<SessionHandle> {
        if self.sessions.contains_key(&session_id) || self.is_retired(session_id) {
            bail!("Session {} already exists", session_id);
        }

        let (sink, events) = transport_event_channel();
        let transport = self
            .factory
            .create(session_id, sink)
            .await
            .with_context(|| format!("Failed to create transport for session {}", session_id))?;

        let handle = Negotiator::spawn(
            session_id,
            role,
            self.config.clone(),
            transport,
            events,
            Arc::clone(&self.relay),
            self.events_tx.clone(),
        );
        self.sessions.insert(session_id, handle.clone());
        info!(session = %session_id, %role, "Session opened");

        self.spawn_reaper(&handle);
        Ok(handle)
    }

    /// Moves the session to the retired set once it reaches a terminal state.
    fn spawn_reaper(&self, handle: &SessionHandle) {
        let session_id = handle.id();
        let mut snapshot_rx = handle.watch();
        let registry = self.clone();

        tokio::spawn(async move {
            let _ = snapshot_rx.wait_for(|s| s.state.is_terminal()).await;
            registry.retire(session_id);
        });
    }

    fn retire(&self, session_id: SessionId) {
        if self.sessions.remove(&session_id).is_some() {
            debug!(session = %session_id, "Session retired");
        }
        self.retired().insert(session_id);
    }

    /// The live session with this id, if any.
    pub fn get(&self, session_id: SessionId) -> Option<SessionHandle> {
        let handle = self.sessions.get(&session_id)?.clone();
        if handle.is_terminated() {
            self.retire(session_id);
            return None;
        }
        Some(handle)
    }

    /// Whether this id belonged to a session that has ended.
    pub fn is_retired(&self, session_id: SessionId) -> bool {
        self.retired().contains(session_id)
    }

    pub async fn close(&self, session_id: SessionId) {
        let Some((_, handle)) = self.sessions.remove(&session_id) else {
            return;
        };
        self.retired().insert(session_id);
        handle.close().await;
    }

    pub async fn close_all(&self) {
        let ids: Vec<SessionId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            self.close(id).await;
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Starts routing relay traffic into this registry. With `accept_offers`
    /// set, an offer for an unknown session opens a responder for it.
    pub fn spawn_router(&self, accept_offers: bool) -> JoinHandle<()> {
        let router = SignalRouter::new(self.clone(), accept_offers);
        tokio::spawn(router.run())
    }
}
