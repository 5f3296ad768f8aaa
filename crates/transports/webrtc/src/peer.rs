//! Peer connections backed by webrtc-rs
//!
//! [`WebRtcPeerFactory`] builds one webrtc-rs API per connection so each
//! can get its own network settings. [`WebRtcPeer`] adapts the stack's
//! callbacks to the typed [`PeerEvent`] registry and fills in two gaps
//! between webrtc-rs and browser behavior:
//!
//! - remote candidates that arrive before the remote description are
//!   queued and applied once it is set
//! - `close` may be called any number of times

use crate::channel::WebRtcDataChannel;
use crate::error::Error;
use crate::media::VideoPump;
use async_trait::async_trait;
use parking_lot::Mutex;
use rtcscan_core::ice::{IceCandidate, IceServer};
use rtcscan_core::media::LocalStream;
use rtcscan_core::peer::{
    DataChannel, MediaKind, PeerConnection, PeerConnectionFactory, PeerEvent, RtcConfig, SdpType,
    SessionDescription, SignalingState, StatsSelector,
};
use rtcscan_core::stats::StatsEntry;
use rtcscan_core::{EventRegistry, Result};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_VP8};
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::ice::network_type::NetworkType;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// Creates [`WebRtcPeer`] connections
#[derive(Debug, Clone, Default)]
pub struct WebRtcPeerFactory {
    /// Also gather on loopback interfaces
    pub include_loopback: bool,
}

impl WebRtcPeerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loopback(mut self, include: bool) -> Self {
        self.include_loopback = include;
        self
    }

    /// Build an API with default codecs and interceptors
    ///
    /// IPv6 networks are only gathered when the configuration asks for them.
    fn build_api(&self, config: &RtcConfig) -> crate::error::Result<API> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let mut setting_engine = SettingEngine::default();
        let mut networks = vec![NetworkType::Udp4];
        if config.enable_ipv6 {
            networks.push(NetworkType::Udp6);
        }
        setting_engine.set_network_types(networks);
        setting_engine.set_include_loopback_candidate(self.include_loopback);

        Ok(APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .with_setting_engine(setting_engine)
            .build())
    }
}

#[async_trait]
impl PeerConnectionFactory for WebRtcPeerFactory {
    async fn create(&self, config: &RtcConfig) -> Result<Arc<dyn PeerConnection>> {
        let api = self.build_api(config)?;
        let rtc_config = RTCConfiguration {
            ice_servers: config.ice_servers.iter().map(to_rtc_ice_server).collect(),
            ..Default::default()
        };
        let pc = api.new_peer_connection(rtc_config).await.map_err(Error::from)?;
        let peer = WebRtcPeer::new(Arc::new(pc));
        Ok(peer)
    }
}

fn to_rtc_ice_server(server: &IceServer) -> RTCIceServer {
    RTCIceServer {
        urls: server.urls.clone(),
        username: server.username.clone().unwrap_or_default(),
        credential: server.credential.clone().unwrap_or_default(),
        ..Default::default()
    }
}

/// [`PeerConnection`] backed by an `RTCPeerConnection`
pub struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
    events: Arc<EventRegistry<PeerEvent>>,
    /// Remote candidates held until the remote description is set.
    /// `None` once it has been.
    pending_candidates: Mutex<Option<Vec<RTCIceCandidateInit>>>,
    pumps: Mutex<Vec<VideoPump>>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl WebRtcPeer {
    /// Wrap a connection and install its event handlers
    pub fn new(pc: Arc<RTCPeerConnection>) -> Arc<Self> {
        let events = Arc::new(EventRegistry::buffered());

        let candidate_events = Arc::clone(&events);
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let events = Arc::clone(&candidate_events);
            Box::pin(async move {
                match candidate {
                    Some(candidate) => match to_ice_candidate(&candidate) {
                        Ok(candidate) => {
                            events.emit(PeerEvent::IceCandidate(Some(candidate)));
                        }
                        Err(e) => warn!("Dropping unreadable local candidate: {}", e),
                    },
                    None => {
                        events.emit(PeerEvent::IceCandidate(None));
                    }
                }
            })
        }));

        let channel_events = Arc::clone(&events);
        pc.on_data_channel(Box::new(move |rtc_channel| {
            debug!("Remote opened data channel '{}'", rtc_channel.label());
            let channel: Arc<dyn DataChannel> = WebRtcDataChannel::wrap(rtc_channel);
            channel_events.emit(PeerEvent::DataChannel(channel));
            Box::pin(async {})
        }));

        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            match state {
                RTCPeerConnectionState::Failed => warn!("Peer connection state changed: {}", state),
                _ => debug!("Peer connection state changed: {}", state),
            }
            Box::pin(async {})
        }));

        Arc::new(Self {
            pc,
            events,
            pending_candidates: Mutex::new(Some(Vec::new())),
            pumps: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// The underlying webrtc-rs connection
    pub fn rtc_peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.pc
    }

    /// Number of remote candidates waiting for the remote description
    pub fn pending_candidate_count(&self) -> usize {
        self.pending_candidates.lock().as_ref().map_or(0, Vec::len)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed.into());
        }
        Ok(())
    }

    async fn flush_pending_candidates(&self) -> Result<()> {
        let pending = self.pending_candidates.lock().take().unwrap_or_default();
        if !pending.is_empty() {
            debug!("Applying {} queued remote candidates", pending.len());
        }
        for init in pending {
            self.pc.add_ice_candidate(init).await.map_err(Error::from)?;
        }
        Ok(())
    }
}

fn to_rtc_description(description: SessionDescription) -> crate::error::Result<RTCSessionDescription> {
    let parsed = match description.kind {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp),
        SdpType::Answer => RTCSessionDescription::answer(description.sdp),
    };
    parsed.map_err(|e| Error::Sdp(e.to_string()))
}

fn to_ice_candidate(candidate: &RTCIceCandidate) -> Result<IceCandidate> {
    let init = candidate.to_json().map_err(Error::from)?;
    let sdp_mid = init.sdp_mid.filter(|mid| !mid.is_empty());
    Ok(IceCandidate::parse(&init.candidate)?.with_media(sdp_mid, init.sdp_mline_index))
}

fn to_candidate_init(candidate: &IceCandidate) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: candidate.to_candidate_line(),
        sdp_mid: candidate.sdp_mid.clone(),
        sdp_mline_index: candidate.sdp_mline_index,
        username_fragment: None,
    }
}

fn to_signaling_state(state: RTCSignalingState) -> SignalingState {
    match state {
        RTCSignalingState::HaveLocalOffer => SignalingState::HaveLocalOffer,
        RTCSignalingState::HaveRemoteOffer => SignalingState::HaveRemoteOffer,
        RTCSignalingState::HaveLocalPranswer => SignalingState::HaveLocalPranswer,
        RTCSignalingState::HaveRemotePranswer => SignalingState::HaveRemotePranswer,
        RTCSignalingState::Closed => SignalingState::Closed,
        _ => SignalingState::Stable,
    }
}

/// Flatten a stats report into entries.
///
/// Each report is serialized to a JSON object. Objects without a `type` are
/// skipped; a missing `id` is filled from the report key.
fn to_stats_entries<'a, I, T>(reports: I) -> Vec<StatsEntry>
where
    I: IntoIterator<Item = (&'a String, &'a T)>,
    T: serde::Serialize + 'a,
{
    reports
        .into_iter()
        .filter_map(|(id, report)| {
            let mut value = serde_json::to_value(report).ok()?;
            if let Value::Object(map) = &mut value {
                map.entry("id").or_insert_with(|| Value::String(id.clone()));
            }
            StatsEntry::from_value(value)
        })
        .collect()
}

#[async_trait]
impl PeerConnection for WebRtcPeer {
    async fn create_offer(&self) -> Result<SessionDescription> {
        self.ensure_open()?;
        let offer = self.pc.create_offer(None).await.map_err(Error::from)?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.ensure_open()?;
        let answer = self.pc.create_answer(None).await.map_err(Error::from)?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.ensure_open()?;
        let description = to_rtc_description(description)?;
        self.pc
            .set_local_description(description)
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.ensure_open()?;
        let description = to_rtc_description(description)?;
        self.pc
            .set_remote_description(description)
            .await
            .map_err(Error::from)?;
        self.flush_pending_candidates().await
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.ensure_open()?;
        let init = to_candidate_init(&candidate);
        {
            let mut pending = self.pending_candidates.lock();
            if let Some(queue) = pending.as_mut() {
                queue.push(init);
                return Ok(());
            }
        }
        self.pc.add_ice_candidate(init).await.map_err(Error::from)?;
        Ok(())
    }

    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>> {
        self.ensure_open()?;
        let init = RTCDataChannelInit {
            ordered: Some(true),
            ..Default::default()
        };
        let rtc_channel = self
            .pc
            .create_data_channel(label, Some(init))
            .await
            .map_err(Error::from)?;
        Ok(WebRtcDataChannel::wrap(rtc_channel))
    }

    async fn add_receive_transceiver(&self, kind: MediaKind) -> Result<()> {
        self.ensure_open()?;
        let codec_type = match kind {
            MediaKind::Audio => RTPCodecType::Audio,
            MediaKind::Video => RTPCodecType::Video,
        };
        self.pc
            .add_transceiver_from_kind(
                codec_type,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn add_local_stream(&self, stream: &LocalStream) -> Result<()> {
        self.ensure_open()?;
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90000,
                channels: 0,
                sdp_fmtp_line: "".to_owned(),
                rtcp_feedback: vec![],
            },
            "video".to_owned(),
            stream.id.clone(),
        ));

        let sender = self
            .pc
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| Error::Track(format!("add track: {}", e)))?;

        // Interceptors only see RTCP that somebody reads
        let rtcp_cancel = self.cancel.child_token();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            loop {
                tokio::select! {
                    _ = rtcp_cancel.cancelled() => break,
                    read = sender.read(&mut buf) => {
                        if read.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        info!(
            "Sending stream {} ({}x{}) on a VP8 track",
            stream.id, stream.width, stream.height
        );
        let mut pumps = self.pumps.lock();
        pumps.retain(|pump| !pump.is_finished());
        pumps.push(VideoPump::start(track, stream.clone(), &self.cancel));
        Ok(())
    }

    async fn get_stats(&self, selector: &StatsSelector) -> Result<Vec<StatsEntry>> {
        self.ensure_open()?;
        if let StatsSelector::Stream(id) = selector {
            debug!("Stats are connection-wide, ignoring stream selector {}", id);
        }
        let report = self.pc.get_stats().await;
        Ok(to_stats_entries(report.reports.iter()))
    }

    fn signaling_state(&self) -> SignalingState {
        if self.closed.load(Ordering::SeqCst) {
            return SignalingState::Closed;
        }
        to_signaling_state(self.pc.signaling_state())
    }

    fn events(&self) -> &EventRegistry<PeerEvent> {
        &self.events
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.cancel.cancel();
        for pump in self.pumps.lock().drain(..) {
            pump.stop();
        }
        self.pending_candidates.lock().take();
        self.pc.close().await.map_err(Error::from)?;
        debug!("Peer connection closed");
        Ok(())
    }
}
