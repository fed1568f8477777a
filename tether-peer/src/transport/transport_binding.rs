use crate::transport::TransportEventSink;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tether_core::{IceCandidate, SessionDescription, SessionId};

/// The capability set the negotiator needs from a peer-connection transport.
///
/// Events (local candidates, connection state, remote tracks) flow through the
/// `TransportEventSink` the binding was created with. Implementations need not
/// be safe for concurrent mutation; the negotiator serializes every call.
#[async_trait]
pub trait TransportBinding: Send + Sync {
    /// Number of local media tracks attached so far.
    fn local_track_count(&self) -> usize;

    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, description: &SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, description: &SessionDescription) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Builds one binding per session.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        session_id: SessionId,
        events: TransportEventSink,
    ) -> Result<Arc<dyn TransportBinding>>;
}
