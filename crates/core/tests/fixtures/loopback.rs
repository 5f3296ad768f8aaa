//! In-process loopback peer stack for testing
//!
//! Implements the peer traits without any networking. Peers are paired in
//! creation order (1st with 2nd, 3rd with 4th, ...). A pair "connects" once
//! both sides have a remote description and at least one remote candidate;
//! data channels then open and carry messages between the two sides.
//!
//! # Features
//!
//! - Scripted local candidates, emitted on `set_local_description`
//! - Scripted stats snapshots and injected poll failures
//! - Injected creation and negotiation failures
//! - Instrumentation: add-candidate counts, close counts, stats calls
//!
//! # Usage
//!
//! ```ignore
//! let factory = LoopbackFactory::new();
//! factory.push_script(PeerScript::with_candidates(vec![host_candidate()]));
//! let harness = ConnectionHarness::new(&factory, &RtcConfig::default(), config).await?;
//! ```

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rtcscan_core::error::{Error, Result};
use rtcscan_core::events::EventRegistry;
use rtcscan_core::ice::IceCandidate;
use rtcscan_core::media::LocalStream;
use rtcscan_core::peer::{
    ChannelEvent, ChannelMessage, DataChannel, MediaKind, PeerConnection, PeerConnectionFactory,
    PeerEvent, RtcConfig, SdpType, SelectorMode, SessionDescription, SignalingState, StatsSelector,
};
use rtcscan_core::stats::StatsEntry;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

pub const OFFER_SDP: &str = "v=0\r\nm=video 9 UDP/TLS/RTP/SAVPF 96 97 98\r\na=mid:0\r\na=rtpmap:96 VP8/90000\r\na=rtpmap:97 red/90000\r\na=rtpmap:98 ulpfec/90000\r\n";

/// Behaviour of one peer
#[derive(Debug, Clone, Default)]
pub struct PeerScript {
    /// Local candidates gathered after `set_local_description`
    pub candidates: Vec<IceCandidate>,
    /// Never signal the end of gathering
    pub hold_gathering: bool,
    /// Stats snapshots returned in order; the last one repeats
    pub stats: Vec<Vec<StatsEntry>>,
    /// Stats poll (0-based) that fails
    pub fail_stats_at: Option<usize>,
    /// `create` fails with this message
    pub fail_create: Option<String>,
    /// `create_offer` / `create_answer` fail
    pub fail_negotiation: bool,
    /// Outgoing channel text is replaced with this
    pub corrupt_outgoing: Option<String>,
    pub selector_mode: Option<SelectorMode>,
}

impl PeerScript {
    pub fn with_candidates(candidates: Vec<IceCandidate>) -> Self {
        Self {
            candidates,
            ..Default::default()
        }
    }
}

pub fn candidate(line: &str) -> IceCandidate {
    IceCandidate::parse(line).expect("valid candidate line")
}

pub fn host_candidate() -> IceCandidate {
    candidate("candidate:1 1 udp 2122260223 192.168.1.10 50000 typ host")
}

pub fn srflx_candidate() -> IceCandidate {
    candidate("candidate:2 1 udp 1686052607 203.0.113.7 61000 typ srflx raddr 192.168.1.10 rport 50000")
}

pub fn relay_candidate() -> IceCandidate {
    candidate("candidate:3 1 udp 41885439 198.51.100.20 3478 typ relay raddr 203.0.113.7 rport 61000")
}

/// Connection state shared by the two peers of a pair
#[derive(Default)]
struct PairState {
    connected: AtomicBool,
}

/// Factory handing out loopback peers
#[derive(Default)]
pub struct LoopbackFactory {
    scripts: Mutex<VecDeque<PeerScript>>,
    peers: Mutex<Vec<Arc<LoopbackPeer>>>,
    configs: Mutex<Vec<RtcConfig>>,
}

impl LoopbackFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script for the next created peer; unscripted peers use the default
    pub fn push_script(&self, script: PeerScript) {
        self.scripts.lock().push_back(script);
    }

    pub fn peer(&self, index: usize) -> Arc<LoopbackPeer> {
        Arc::clone(&self.peers.lock()[index])
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().len()
    }

    /// Configurations passed to `create`, in order
    pub fn configs(&self) -> Vec<RtcConfig> {
        self.configs.lock().clone()
    }
}

#[async_trait]
impl PeerConnectionFactory for LoopbackFactory {
    async fn create(&self, config: &RtcConfig) -> Result<Arc<dyn PeerConnection>> {
        self.configs.lock().push(config.clone());
        let script = self.scripts.lock().pop_front().unwrap_or_default();
        if let Some(message) = &script.fail_create {
            return Err(Error::Peer(message.clone()));
        }

        let mut peers = self.peers.lock();
        let (pair, partner) = if peers.len() % 2 == 1 {
            let first = &peers[peers.len() - 1];
            (Arc::clone(&first.pair), Some(Arc::clone(first)))
        } else {
            (Arc::new(PairState::default()), None)
        };

        let peer = Arc::new(LoopbackPeer::new(script, pair));
        if let Some(partner) = partner {
            *partner.partner.lock() = Arc::downgrade(&peer);
            *peer.partner.lock() = Arc::downgrade(&partner);
        }
        peers.push(Arc::clone(&peer));
        Ok(peer)
    }
}

/// One loopback endpoint
pub struct LoopbackPeer {
    script: PeerScript,
    pair: Arc<PairState>,
    partner: Mutex<Weak<LoopbackPeer>>,
    events: EventRegistry<PeerEvent>,
    state: Mutex<SignalingState>,
    remote_description: AtomicBool,
    local_descriptions: Mutex<Vec<SessionDescription>>,
    remote_descriptions: Mutex<Vec<SessionDescription>>,
    received_candidates: Mutex<Vec<IceCandidate>>,
    channels: Mutex<Vec<Arc<LoopbackChannel>>>,
    streams: Mutex<Vec<String>>,
    transceivers: Mutex<Vec<MediaKind>>,
    selectors: Mutex<Vec<StatsSelector>>,
    stats_calls: AtomicUsize,
    close_calls: AtomicUsize,
}

impl LoopbackPeer {
    fn new(script: PeerScript, pair: Arc<PairState>) -> Self {
        Self {
            script,
            pair,
            partner: Mutex::new(Weak::new()),
            events: EventRegistry::buffered(),
            state: Mutex::new(SignalingState::Stable),
            remote_description: AtomicBool::new(false),
            local_descriptions: Mutex::new(Vec::new()),
            remote_descriptions: Mutex::new(Vec::new()),
            received_candidates: Mutex::new(Vec::new()),
            channels: Mutex::new(Vec::new()),
            streams: Mutex::new(Vec::new()),
            transceivers: Mutex::new(Vec::new()),
            selectors: Mutex::new(Vec::new()),
            stats_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
        }
    }

    /// Number of `add_ice_candidate` calls
    pub fn add_candidate_count(&self) -> usize {
        self.received_candidates.lock().len()
    }

    pub fn received_candidates(&self) -> Vec<IceCandidate> {
        self.received_candidates.lock().clone()
    }

    pub fn local_descriptions(&self) -> Vec<SessionDescription> {
        self.local_descriptions.lock().clone()
    }

    pub fn remote_descriptions(&self) -> Vec<SessionDescription> {
        self.remote_descriptions.lock().clone()
    }

    pub fn close_count(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn stats_calls(&self) -> usize {
        self.stats_calls.load(Ordering::SeqCst)
    }

    pub fn selectors(&self) -> Vec<StatsSelector> {
        self.selectors.lock().clone()
    }

    pub fn streams(&self) -> Vec<String> {
        self.streams.lock().clone()
    }

    pub fn transceivers(&self) -> Vec<MediaKind> {
        self.transceivers.lock().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.pair.connected.load(Ordering::SeqCst)
    }

    fn partner(&self) -> Option<Arc<LoopbackPeer>> {
        self.partner.lock().upgrade()
    }

    fn is_closed(&self) -> bool {
        *self.state.lock() == SignalingState::Closed
    }

    fn ready(&self) -> bool {
        !self.is_closed()
            && self.remote_description.load(Ordering::SeqCst)
            && !self.received_candidates.lock().is_empty()
    }

    fn try_connect(&self) {
        let Some(partner) = self.partner() else {
            return;
        };
        if !(self.ready() && partner.ready()) {
            return;
        }
        if self.pair.connected.swap(true, Ordering::SeqCst) {
            return;
        }
        let pending: Vec<_> = self.channels.lock().clone();
        for channel in pending {
            self.open_remote(&partner, &channel);
        }
        let pending: Vec<_> = partner.channels.lock().clone();
        for channel in pending {
            partner.open_remote(self, &channel);
        }
    }

    /// Create the partner's end of `local` and open both ends
    fn open_remote(&self, partner: &LoopbackPeer, local: &Arc<LoopbackChannel>) {
        let remote = Arc::new(LoopbackChannel::new(&local.label, partner.script.corrupt_outgoing.clone()));
        *local.remote.lock() = Arc::downgrade(&remote);
        *remote.remote.lock() = Arc::downgrade(local);

        partner.events.emit(PeerEvent::DataChannel(remote.clone()));
        local.open();
        remote.open();
    }

    fn check_negotiation(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        if self.script.fail_negotiation {
            return Err(Error::Negotiation("scripted failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PeerConnection for LoopbackPeer {
    async fn create_offer(&self) -> Result<SessionDescription> {
        self.check_negotiation()?;
        Ok(SessionDescription::offer(OFFER_SDP))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.check_negotiation()?;
        Ok(SessionDescription::answer(OFFER_SDP.replace("a=rtpmap:97 red/90000\r\na=rtpmap:98 ulpfec/90000\r\n", "")))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.check_negotiation()?;
        *self.state.lock() = match description.kind {
            SdpType::Offer => SignalingState::HaveLocalOffer,
            SdpType::Answer => SignalingState::Stable,
        };
        self.local_descriptions.lock().push(description);
        for candidate in &self.script.candidates {
            self.events.emit(PeerEvent::IceCandidate(Some(candidate.clone())));
        }
        if !self.script.hold_gathering {
            self.events.emit(PeerEvent::IceCandidate(None));
        }
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.check_negotiation()?;
        *self.state.lock() = match description.kind {
            SdpType::Offer => SignalingState::HaveRemoteOffer,
            SdpType::Answer => SignalingState::Stable,
        };
        self.remote_descriptions.lock().push(description);
        self.remote_description.store(true, Ordering::SeqCst);
        self.try_connect();
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        self.received_candidates.lock().push(candidate);
        self.try_connect();
        Ok(())
    }

    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let channel = Arc::new(LoopbackChannel::new(label, self.script.corrupt_outgoing.clone()));
        self.channels.lock().push(Arc::clone(&channel));
        if self.is_connected() {
            if let Some(partner) = self.partner() {
                self.open_remote(&partner, &channel);
            }
        }
        Ok(channel)
    }

    async fn add_receive_transceiver(&self, kind: MediaKind) -> Result<()> {
        self.transceivers.lock().push(kind);
        Ok(())
    }

    async fn add_local_stream(&self, stream: &LocalStream) -> Result<()> {
        self.streams.lock().push(stream.id.clone());
        Ok(())
    }

    async fn get_stats(&self, selector: &StatsSelector) -> Result<Vec<StatsEntry>> {
        let call = self.stats_calls.fetch_add(1, Ordering::SeqCst);
        self.selectors.lock().push(selector.clone());
        if self.script.fail_stats_at == Some(call) {
            return Err(Error::Peer("scripted stats failure".to_string()));
        }
        let stats = &self.script.stats;
        Ok(stats.get(call).or_else(|| stats.last()).cloned().unwrap_or_default())
    }

    fn stats_selector_mode(&self) -> SelectorMode {
        self.script.selector_mode.unwrap_or(SelectorMode::Universal)
    }

    fn signaling_state(&self) -> SignalingState {
        *self.state.lock()
    }

    fn events(&self) -> &EventRegistry<PeerEvent> {
        &self.events
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        *self.state.lock() = SignalingState::Closed;
        for channel in self.channels.lock().iter() {
            channel.shut();
        }
        Ok(())
    }
}

/// One end of a loopback data channel
pub struct LoopbackChannel {
    label: String,
    open: AtomicBool,
    remote: Mutex<Weak<LoopbackChannel>>,
    corrupt_outgoing: Option<String>,
    events: EventRegistry<ChannelEvent>,
    sent: Mutex<Vec<ChannelMessage>>,
}

impl LoopbackChannel {
    fn new(label: &str, corrupt_outgoing: Option<String>) -> Self {
        Self {
            label: label.to_string(),
            open: AtomicBool::new(false),
            remote: Mutex::new(Weak::new()),
            corrupt_outgoing,
            events: EventRegistry::buffered(),
            sent: Mutex::new(Vec::new()),
        }
    }

    fn open(&self) {
        if !self.open.swap(true, Ordering::SeqCst) {
            self.events.emit(ChannelEvent::Open);
        }
    }

    fn shut(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.events.emit(ChannelEvent::Close);
        }
    }

    pub fn sent(&self) -> Vec<ChannelMessage> {
        self.sent.lock().clone()
    }

    fn deliver(&self, message: ChannelMessage) -> Result<()> {
        if !self.is_open() {
            return Err(Error::Closed);
        }
        self.sent.lock().push(message.clone());
        let remote = self.remote.lock().upgrade().ok_or(Error::Closed)?;
        remote.events.emit(ChannelEvent::Message(message));
        Ok(())
    }
}

#[async_trait]
impl DataChannel for LoopbackChannel {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        let text = self.corrupt_outgoing.clone().unwrap_or_else(|| text.to_string());
        self.deliver(ChannelMessage::Text(text))
    }

    async fn send(&self, data: Bytes) -> Result<()> {
        self.deliver(ChannelMessage::Binary(data))
    }

    async fn buffered_amount(&self) -> usize {
        0
    }

    fn events(&self) -> &EventRegistry<ChannelEvent> {
        &self.events
    }

    async fn close(&self) -> Result<()> {
        self.shut();
        Ok(())
    }
}
