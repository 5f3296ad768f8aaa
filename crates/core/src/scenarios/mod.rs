//! Concrete diagnostics built on the harness and test lifecycle
//!
//! Every scenario holds an `Arc<ScenarioContext>` with the collaborators it
//! needs: a peer factory, the ICE configuration source, an optional media
//! provider, and the scan configuration.

mod audio;
mod bandwidth;
mod camera;
mod connectivity;
mod network;
mod throughput;

pub use audio::AudioCaptureTest;
pub use bandwidth::{BandwidthReport, VideoBandwidthTest};
pub use camera::{resolution_matches, CameraReport, CameraTest};
pub use connectivity::ConnectivityTest;
pub use network::NetworkTest;
pub use throughput::DataThroughputTest;

use crate::config::ScanConfig;
use crate::diagnostic::Diagnostic;
use crate::events::{Subscription, TaggedEvent};
use crate::ice::{CandidateCategory, IceConfigProvider, TransportProtocol};
use crate::media::MediaProvider;
use crate::peer::PeerConnectionFactory;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Collaborators shared by all scenarios of a scan
#[derive(Clone)]
pub struct ScenarioContext {
    pub factory: Arc<dyn PeerConnectionFactory>,
    pub ice: IceConfigProvider,
    pub media: Option<Arc<dyn MediaProvider>>,
    pub config: ScanConfig,
}

impl ScenarioContext {
    pub fn new(
        factory: Arc<dyn PeerConnectionFactory>,
        ice: IceConfigProvider,
        config: ScanConfig,
    ) -> Self {
        Self {
            factory,
            ice,
            media: None,
            config,
        }
    }

    pub fn with_media(mut self, media: Arc<dyn MediaProvider>) -> Self {
        self.media = Some(media);
        self
    }
}

/// Every diagnostic the crate provides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioKind {
    HostConnectivity,
    ReflexiveConnectivity,
    RelayConnectivity,
    DataThroughput,
    VideoBandwidth,
    UdpEnabled,
    TcpEnabled,
    Ipv6Enabled,
    CameraResolution,
    AudioCapture,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 10] = [
        ScenarioKind::AudioCapture,
        ScenarioKind::CameraResolution,
        ScenarioKind::UdpEnabled,
        ScenarioKind::TcpEnabled,
        ScenarioKind::Ipv6Enabled,
        ScenarioKind::RelayConnectivity,
        ScenarioKind::ReflexiveConnectivity,
        ScenarioKind::HostConnectivity,
        ScenarioKind::DataThroughput,
        ScenarioKind::VideoBandwidth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioKind::HostConnectivity => "host-connectivity",
            ScenarioKind::ReflexiveConnectivity => "reflexive-connectivity",
            ScenarioKind::RelayConnectivity => "relay-connectivity",
            ScenarioKind::DataThroughput => "data-throughput",
            ScenarioKind::VideoBandwidth => "video-bandwidth",
            ScenarioKind::UdpEnabled => "udp-enabled",
            ScenarioKind::TcpEnabled => "tcp-enabled",
            ScenarioKind::Ipv6Enabled => "ipv6-enabled",
            ScenarioKind::CameraResolution => "camera-resolution",
            ScenarioKind::AudioCapture => "audio-capture",
        }
    }

    /// Instantiate the diagnostic
    pub fn build(&self, ctx: Arc<ScenarioContext>) -> Box<dyn Diagnostic> {
        match self {
            ScenarioKind::HostConnectivity => {
                Box::new(ConnectivityTest::new(ctx, CandidateCategory::Host))
            }
            ScenarioKind::ReflexiveConnectivity => {
                Box::new(ConnectivityTest::new(ctx, CandidateCategory::Reflexive))
            }
            ScenarioKind::RelayConnectivity => {
                Box::new(ConnectivityTest::new(ctx, CandidateCategory::Relay))
            }
            ScenarioKind::DataThroughput => Box::new(DataThroughputTest::new(ctx)),
            ScenarioKind::VideoBandwidth => Box::new(VideoBandwidthTest::new(ctx)),
            ScenarioKind::UdpEnabled => Box::new(NetworkTest::relay(ctx, TransportProtocol::Udp)),
            ScenarioKind::TcpEnabled => Box::new(NetworkTest::relay(ctx, TransportProtocol::Tcp)),
            ScenarioKind::Ipv6Enabled => Box::new(NetworkTest::ipv6(ctx)),
            ScenarioKind::CameraResolution => Box::new(CameraTest::new(ctx)),
            ScenarioKind::AudioCapture => Box::new(AudioCaptureTest::new(ctx)),
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScenarioKind {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScenarioKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| crate::error::Error::Config(format!("unknown diagnostic: {}", s)))
    }
}

/// Next event of an optional subscription; pending forever while unset
pub(crate) async fn next_event<E: TaggedEvent>(sub: &mut Option<Subscription<E>>) -> Option<E> {
    match sub {
        Some(sub) => sub.recv().await,
        None => std::future::pending().await,
    }
}

/// JavaScript-style rendering of a measurement, `Infinity` for unbounded
pub(crate) fn format_value(value: f64) -> String {
    if value.is_infinite() {
        if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if value.is_nan() {
        "NaN".to_string()
    } else {
        value.to_string()
    }
}
