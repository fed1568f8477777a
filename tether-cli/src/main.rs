use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tether_core::{PeerId, Role};
use tether_peer::{
    NegotiationState, PeerConfig, SessionEvent, SessionRegistry, SupervisoryState,
    WebRtcTransportFactory, WsRelay, sample_video_track,
};
use tether_relay::RelayService;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "WebRTC signaling over a WebSocket relay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay server.
    Relay {
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: SocketAddr,
    },

    /// Open a session and send the offer.
    Offer(PeerArgs),

    /// Wait for offers and answer them.
    Answer(PeerArgs),
}

#[derive(clap::Args)]
struct PeerArgs {
    /// Relay base URL.
    #[arg(long, default_value = "ws://127.0.0.1:8080")]
    relay: String,

    #[arg(long, default_value = "default")]
    room: String,

    /// JSON peer configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Negotiate without attaching the sample track.
    #[arg(long)]
    receive_only: bool,

    /// Overrides `negotiation.deadline_ms`.
    #[arg(long)]
    deadline_ms: Option<u64>,

    /// Send the other peer's video back to it instead of the sample track.
    #[arg(long)]
    reflect: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Commands::Relay { bind } => run_relay(bind).await,
        Commands::Offer(args) => run_peer(args, Role::Initiator).await,
        Commands::Answer(args) => run_peer(args, Role::Responder).await,
    }
}

async fn run_relay(bind: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind relay to {}", bind))?;

    println!("{}", format!("🚀 Relay listening on ws://{}", bind).green().bold());
    tether_relay::serve(listener, RelayService::new()).await
}

fn load_config(args: &PeerArgs) -> Result<PeerConfig> {
    let mut config = match &args.config {
        Some(path) => PeerConfig::from_json_file(path)?,
        None => PeerConfig::default(),
    };

    if args.receive_only {
        config.negotiation.receive_only = true;
    }
    if let Some(ms) = args.deadline_ms {
        config.negotiation.deadline_ms = ms;
    }
    Ok(config)
}

async fn run_peer(args: PeerArgs, role: Role) -> Result<()> {
    let config = load_config(&args)?;
    let peer_id = PeerId::new();
    let url = WsRelay::room_url(&args.relay, &args.room, &peer_id);

    println!(
        "{}",
        format!("📡 {} {} joining room '{}'", role, peer_id, args.room).cyan()
    );
    let relay = Arc::new(WsRelay::connect(url, config.relay.clone()));

    let receive_only = config.negotiation.receive_only;
    let mut factory = WebRtcTransportFactory::new(config.transport.clone())
        .receive_only(receive_only)
        .reflect_remote_video(args.reflect);
    if !receive_only && !args.reflect {
        factory = factory.with_track(sample_video_track(&peer_id.to_string()));
    }

    let registry = SessionRegistry::new(
        relay.clone(),
        Arc::new(factory),
        config.negotiation.clone(),
    );
    let mut events = registry.subscribe();
    registry.spawn_router(role == Role::Responder);

    if role == Role::Initiator {
        let session = registry
            .open_initiator()
            .await
            .context("Failed to open session")?;
        session
            .start()
            .await
            .context("Failed to start negotiation")?;
        info!(session = %session.id(), "Offer created");
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    report(&event);
                    if role == Role::Initiator && matches!(event, SessionEvent::Closed { .. }) {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => warn!("Missed {} session events", n),
                Err(broadcast::error::RecvError::Closed) => break,
            },

            _ = &mut ctrl_c => {
                println!("{}", "Shutting down...".yellow());
                break;
            }
        }
    }

    registry.close_all().await;
    relay.shutdown();
    Ok(())
}

fn report(event: &SessionEvent) {
    let session = event.session_id().to_string();
    let line = match event {
        SessionEvent::Negotiation { state, .. } => {
            let text = format!("[{}] negotiation -> {}", session, state);
            match state {
                NegotiationState::Connected => text.green().bold(),
                NegotiationState::Failed => text.red(),
                _ => text.cyan(),
            }
        }
        SessionEvent::Supervisory { supervision, .. } => {
            let text = format!("[{}] transport -> {:?}", session, supervision.state);
            match supervision.state {
                SupervisoryState::Connected => text.green(),
                SupervisoryState::Terminated => text.red(),
                _ => text.yellow(),
            }
        }
        SessionEvent::RemoteTrack { track, .. } => format!(
            "[{}] remote {} track {} (stream {})",
            session, track.kind, track.id, track.stream_id
        )
        .magenta(),
        SessionEvent::Failed { error, .. } => {
            format!("[{}] failed: {}", session, error).red().bold()
        }
        SessionEvent::Closed { .. } => format!("[{}] closed", session).dimmed(),
    };
    println!("{}", line);
}
