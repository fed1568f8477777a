//! Minimal signaling relay: peers join a room over WebSocket and every valid
//! envelope one of them sends is forwarded to the others.

mod relay_service;
mod ws_handler;

pub use relay_service::*;
pub use ws_handler::*;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tracing::info;

pub fn router(service: RelayService) -> Router {
    Router::new()
        .route("/ws/{room}/{peer_id}", get(ws_handler))
        .route("/health", get(|| async { "ok" }))
        .with_state(service)
}

/// Serves the relay on an already bound listener until the task is dropped.
pub async fn serve(listener: TcpListener, service: RelayService) -> Result<()> {
    let addr = listener.local_addr().context("Listener has no local address")?;
    info!("Relay listening on {}", addr);

    axum::serve(listener, router(service))
        .await
        .context("Relay server stopped")
}
