use crate::transport::{
    LocalCandidate, PeerConnectionState, RemoteTrack, TransportBinding, TransportConfig,
    TransportEventSink, TransportFactory,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tether_core::{IceCandidate, SdpType, SessionDescription, SessionId};
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_VP8, MediaEngine};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::{TrackLocal, TrackLocalWriter};
use webrtc::track::track_remote::TrackRemote;

/// `TransportBinding` backed by a `webrtc` peer connection.
pub struct WebRtcBinding {
    pub session_id: SessionId,
    pub peer_connection: Arc<RTCPeerConnection>,
    local_tracks: AtomicUsize,
    /// Outbound track that remote video is copied into, once enabled.
    reflect_track: Arc<OnceLock<Arc<TrackLocalStaticRTP>>>,
}

impl WebRtcBinding {
    /// Builds the peer connection and wires its callbacks into `events`.
    pub async fn new(
        session_id: SessionId,
        config: &TransportConfig,
        events: TransportEventSink,
    ) -> Result<Self> {
        let mut m = MediaEngine::default();
        m.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut m)?;

        let api = APIBuilder::new()
            .with_media_engine(m)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: config
                .ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                })
                .collect(),
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await?);

        let state_events = events.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let events = state_events.clone();

                Box::pin(async move {
                    debug!(session = %session_id, "Peer connection state: {:?}", s);
                    events.connection_state(map_connection_state(s)).await;
                })
            },
        ));

        let ice_events = events.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let events = ice_events.clone();

            Box::pin(async move {
                let Some(candidate) = c else {
                    events.local_candidate(LocalCandidate::GatheringComplete).await;
                    return;
                };
                match local_candidate_payload(&candidate) {
                    Ok(payload) => {
                        events
                            .local_candidate(LocalCandidate::Candidate(payload))
                            .await;
                    }
                    Err(e) => warn!(
                        session = %session_id,
                        "Dropping local candidate {}: {:#}", candidate, e
                    ),
                }
            })
        }));

        let reflect_track: Arc<OnceLock<Arc<TrackLocalStaticRTP>>> = Arc::new(OnceLock::new());
        let track_events = events;
        let reflect_slot = Arc::clone(&reflect_track);
        peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let events = track_events.clone();
                let reflect = reflect_slot.get().cloned();

                Box::pin(async move {
                    let remote = RemoteTrack {
                        id: track.id(),
                        kind: track.kind().to_string(),
                        stream_id: track.stream_id(),
                    };
                    events.remote_track(remote).await;

                    if let Some(output) = reflect {
                        if track.kind() == RTPCodecType::Video {
                            tokio::spawn(reflect_rtp(session_id, track, output));
                        }
                    }
                })
            },
        ));

        Ok(Self {
            session_id,
            peer_connection,
            local_tracks: AtomicUsize::new(0),
            reflect_track,
        })
    }

    /// Sends the remote peer's video back to it unchanged. Adds the outbound
    /// track now, so it has to happen before the offer or answer is created.
    pub async fn reflect_remote_video(&self) -> Result<()> {
        let output = Arc::new(TrackLocalStaticRTP::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90000,
                ..Default::default()
            },
            "video".to_owned(),
            format!("reflect-{}", self.session_id),
        ));

        if self.reflect_track.set(Arc::clone(&output)).is_err() {
            debug!(session = %self.session_id, "Remote video is already reflected");
            return Ok(());
        }
        self.add_track(output).await
    }

    /// Attaches a local media track. Must happen before the offer or answer is
    /// created for the track to be negotiated.
    pub async fn add_track(&self, track: Arc<dyn TrackLocal + Send + Sync>) -> Result<()> {
        let rtp_sender = self
            .peer_connection
            .add_track(track)
            .await
            .context("Failed to add local track")?;

        // RTCP has to be read for interceptors to run.
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while rtp_sender.read(&mut rtcp_buf).await.is_ok() {}
        });

        self.local_tracks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Asks to receive video without sending any.
    pub async fn receive_video_only(&self) -> Result<()> {
        self.peer_connection
            .add_transceiver_from_kind(
                RTPCodecType::Video,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: Vec::new(),
                }),
            )
            .await
            .context("Failed to add receive-only transceiver")?;
        Ok(())
    }
}

#[async_trait]
impl TransportBinding for WebRtcBinding {
    fn local_track_count(&self) -> usize {
        self.local_tracks.load(Ordering::SeqCst)
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.peer_connection.create_offer(None).await?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.peer_connection.create_answer(None).await?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, description: &SessionDescription) -> Result<()> {
        let desc = to_rtc_description(description)?;
        self.peer_connection
            .set_local_description(desc)
            .await
            .context("Failed to set local description")?;
        Ok(())
    }

    async fn set_remote_description(&self, description: &SessionDescription) -> Result<()> {
        let desc = to_rtc_description(description)?;
        self.peer_connection
            .set_remote_description(desc)
            .await
            .context("Failed to set remote description")?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        let init: RTCIceCandidateInit = serde_json::from_str(&candidate.payload)
            .context("Failed to parse ICE candidate JSON")?;
        self.peer_connection.add_ice_candidate(init).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.peer_connection.close().await?;
        Ok(())
    }
}

/// Serializes a gathered candidate the way `add_ice_candidate` reads it back.
fn local_candidate_payload(candidate: &RTCIceCandidate) -> Result<String> {
    let init = candidate
        .to_json()
        .context("Failed to convert ICE candidate")?;
    serde_json::to_string(&init).context("Failed to encode ICE candidate")
}

/// Copies RTP from `track` into `output` until the remote track ends.
async fn reflect_rtp(
    session_id: SessionId,
    track: Arc<TrackRemote>,
    output: Arc<TrackLocalStaticRTP>,
) {
    info!(
        session = %session_id,
        "Reflecting remote {} track {}", track.codec().capability.mime_type, track.id()
    );

    let mut forwarded = 0u64;
    while let Ok((packet, _)) = track.read_rtp().await {
        if let Err(e) = output.write_rtp(&packet).await {
            warn!(session = %session_id, "Failed to reflect RTP packet: {}", e);
            continue;
        }
        forwarded += 1;
    }

    debug!(session = %session_id, "Remote track ended after {} reflected packet(s)", forwarded);
}

fn to_rtc_description(description: &SessionDescription) -> Result<RTCSessionDescription> {
    let desc = match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.payload.clone()),
        SdpType::Answer => RTCSessionDescription::answer(description.payload.clone()),
    };
    desc.with_context(|| format!("Malformed {} description", description.sdp_type))
}

fn map_connection_state(state: RTCPeerConnectionState) -> PeerConnectionState {
    match state {
        RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => {
            PeerConnectionState::New
        }
        RTCPeerConnectionState::Connecting => PeerConnectionState::Connecting,
        RTCPeerConnectionState::Connected => PeerConnectionState::Connected,
        RTCPeerConnectionState::Disconnected => PeerConnectionState::Disconnected,
        RTCPeerConnectionState::Failed => PeerConnectionState::Failed,
        RTCPeerConnectionState::Closed => PeerConnectionState::Closed,
    }
}

/// A VP8 track that never produces frames. Stands in for a capture device
/// when only the negotiation matters.
pub fn sample_video_track(stream_id: &str) -> Arc<TrackLocalStaticSample> {
    Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            ..Default::default()
        },
        "video".to_owned(),
        stream_id.to_owned(),
    ))
}

/// Creates a `WebRtcBinding` per session and attaches the configured tracks.
#[derive(Clone)]
pub struct WebRtcTransportFactory {
    config: TransportConfig,
    tracks: Vec<Arc<dyn TrackLocal + Send + Sync>>,
    receive_only: bool,
    reflect: bool,
}

impl WebRtcTransportFactory {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            tracks: Vec::new(),
            receive_only: false,
            reflect: false,
        }
    }

    pub fn with_track(mut self, track: Arc<dyn TrackLocal + Send + Sync>) -> Self {
        self.tracks.push(track);
        self
    }

    pub fn receive_only(mut self, receive_only: bool) -> Self {
        self.receive_only = receive_only;
        self
    }

    /// Sends every session's remote video back to its sender.
    pub fn reflect_remote_video(mut self, reflect: bool) -> Self {
        self.reflect = reflect;
        self
    }
}

#[async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn create(
        &self,
        session_id: SessionId,
        events: TransportEventSink,
    ) -> Result<Arc<dyn TransportBinding>> {
        let binding = WebRtcBinding::new(session_id, &self.config, events).await?;

        for track in &self.tracks {
            binding.add_track(Arc::clone(track)).await?;
        }
        if self.reflect {
            binding.reflect_remote_video().await?;
        } else if self.receive_only && self.tracks.is_empty() {
            binding.receive_video_only().await?;
        }

        info!(
            session = %session_id,
            reflect = self.reflect,
            "Created WebRTC transport with {} local track(s)",
            binding.local_track_count()
        );
        Ok(Arc::new(binding))
    }
}
