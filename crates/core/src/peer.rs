//! Peer connection abstraction
//!
//! The harness and scenarios only talk to these traits. A production
//! backend wraps a real WebRTC stack; tests plug in an in-process loopback.
//! Callbacks are replaced by typed events: each connection and channel owns
//! an [`EventRegistry`] that consumers subscribe to.

use crate::error::Result;
use crate::events::{EventRegistry, TaggedEvent};
use crate::ice::{IceCandidate, IceServer};
use crate::media::LocalStream;
use crate::stats::StatsEntry;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

/// Configuration passed when a peer connection is created
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RtcConfig {
    pub ice_servers: Vec<IceServer>,
    /// Gather IPv6 candidates
    pub enable_ipv6: bool,
}

impl RtcConfig {
    pub fn new(ice_servers: Vec<IceServer>) -> Self {
        Self {
            ice_servers,
            enable_ipv6: false,
        }
    }

    pub fn with_ipv6(mut self, enable: bool) -> Self {
        self.enable_ipv6 = enable;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpType {
    Offer,
    Answer,
}

/// An offer or answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    /// Same description with its SDP text rewritten
    pub fn map_sdp(self, patch: impl FnOnce(&str) -> String) -> Self {
        Self {
            sdp: patch(&self.sdp),
            kind: self.kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveLocalPranswer,
    HaveRemotePranswer,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

/// How a stack wants stats requests scoped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorMode {
    /// Stats must be requested per local stream
    RequiresStream,
    /// A single unscoped request returns everything
    Universal,
}

/// Argument of a stats request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsSelector {
    Universal,
    Stream(String),
}

impl StatsSelector {
    /// Pick the selector a connection's stack expects.
    ///
    /// Falls back to `Universal` when the stack wants a stream but none is
    /// available.
    pub fn for_mode(mode: SelectorMode, stream: Option<&LocalStream>) -> Self {
        match (mode, stream) {
            (SelectorMode::RequiresStream, Some(stream)) => StatsSelector::Stream(stream.id.clone()),
            _ => StatsSelector::Universal,
        }
    }
}

/// Data channel payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMessage {
    Text(String),
    Binary(Bytes),
}

impl ChannelMessage {
    pub fn len(&self) -> usize {
        match self {
            ChannelMessage::Text(text) => text.len(),
            ChannelMessage::Binary(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ChannelMessage::Text(text) => Some(text),
            ChannelMessage::Binary(_) => None,
        }
    }
}

/// Events raised by a data channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Open,
    Message(ChannelMessage),
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelEventKind {
    Open,
    Message,
    Close,
}

impl TaggedEvent for ChannelEvent {
    type Kind = ChannelEventKind;

    fn kind(&self) -> ChannelEventKind {
        match self {
            ChannelEvent::Open => ChannelEventKind::Open,
            ChannelEvent::Message(_) => ChannelEventKind::Message,
            ChannelEvent::Close => ChannelEventKind::Close,
        }
    }
}

/// Events raised by a peer connection
#[derive(Clone)]
pub enum PeerEvent {
    /// A local candidate was gathered; `None` marks the end of gathering
    IceCandidate(Option<IceCandidate>),
    /// The remote side opened a data channel
    DataChannel(Arc<dyn DataChannel>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerEventKind {
    IceCandidate,
    DataChannel,
}

impl TaggedEvent for PeerEvent {
    type Kind = PeerEventKind;

    fn kind(&self) -> PeerEventKind {
        match self {
            PeerEvent::IceCandidate(_) => PeerEventKind::IceCandidate,
            PeerEvent::DataChannel(_) => PeerEventKind::DataChannel,
        }
    }
}

impl fmt::Debug for PeerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerEvent::IceCandidate(c) => f.debug_tuple("IceCandidate").field(c).finish(),
            PeerEvent::DataChannel(dc) => f.debug_tuple("DataChannel").field(&dc.label()).finish(),
        }
    }
}

/// A bidirectional data channel
#[async_trait]
pub trait DataChannel: Send + Sync {
    fn label(&self) -> String;

    /// Whether the channel is open for sending
    fn is_open(&self) -> bool;

    async fn send_text(&self, text: &str) -> Result<()>;

    async fn send(&self, data: Bytes) -> Result<()>;

    /// Bytes queued but not yet sent
    async fn buffered_amount(&self) -> usize;

    /// Open, message and close events
    fn events(&self) -> &EventRegistry<ChannelEvent>;

    async fn close(&self) -> Result<()>;
}

/// One endpoint of a peer-to-peer session
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    /// Add a candidate gathered by the remote side
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>>;

    /// Add a receive-only transceiver, used to trigger candidate gathering
    async fn add_receive_transceiver(&self, kind: MediaKind) -> Result<()>;

    /// Send a local capture stream
    async fn add_local_stream(&self, stream: &LocalStream) -> Result<()>;

    /// Snapshot of the connection's statistics
    async fn get_stats(&self, selector: &StatsSelector) -> Result<Vec<StatsEntry>>;

    fn stats_selector_mode(&self) -> SelectorMode {
        SelectorMode::Universal
    }

    fn signaling_state(&self) -> SignalingState;

    /// Candidate and data channel events
    fn events(&self) -> &EventRegistry<PeerEvent>;

    async fn close(&self) -> Result<()>;
}

/// Creates peer connections for a configuration
#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    async fn create(&self, config: &RtcConfig) -> Result<Arc<dyn PeerConnection>>;
}
