//! rtcscan core - loopback WebRTC diagnostics
//!
//! This crate holds everything that does not depend on a concrete WebRTC
//! stack:
//!
//! - Peer abstraction (`PeerConnection`, `DataChannel`, factory traits)
//!   with typed event registries instead of callbacks
//! - `ConnectionHarness`: two loopback peers, filtered candidate relay, SDP
//!   patches and stats polling
//! - ICE candidate model and classification, ICE server filtering, and an
//!   injectable credential cache
//! - Streaming statistics aggregation
//! - The `DiagnosticTest` lifecycle and the concrete scenarios
//!
//! Stack bindings (see `rtcscan-webrtc`) implement the peer traits.
//!
//! # Example
//!
//! ```ignore
//! use rtcscan_core::config::ScanConfig;
//! use rtcscan_core::diagnostic::{run_diagnostic, TracingSink};
//! use rtcscan_core::ice::IceConfigProvider;
//! use rtcscan_core::scenarios::{ScenarioContext, ScenarioKind};
//! use std::sync::Arc;
//!
//! let config = ScanConfig::load(None::<&str>)?;
//! let ice = IceConfigProvider::from_settings(config.ice.clone());
//! let ctx = Arc::new(ScenarioContext::new(factory, ice, config));
//!
//! let diagnostic = ScenarioKind::HostConnectivity.build(ctx);
//! let outcome = run_diagnostic(diagnostic.as_ref(), Arc::new(TracingSink)).await;
//! println!("{}: {}", outcome.name, outcome.state);
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod diagnostic;
pub mod error;
pub mod events;
pub mod harness;
pub mod ice;
pub mod media;
pub mod peer;
pub mod scenarios;
pub mod sdp;
pub mod stats;

pub use config::ScanConfig;
pub use diagnostic::{
    run_diagnostic, Diagnostic, DiagnosticTest, LogEntry, LogLevel, ReportSink, TestOutcome, TestState,
};
pub use error::{Error, Result};
pub use events::{EventRegistry, Subscription, SubscriptionId, TaggedEvent};
pub use harness::{ConnectionHarness, HarnessConfig, HarnessEvent, HarnessEventKind, Side};
pub use ice::{CandidateCategory, CandidateFilter, IceCandidate, IceConfigProvider, IceServer};
pub use media::{AudioCapture, LocalStream, MediaProvider, VideoConstraints};
pub use peer::{
    ChannelEvent, ChannelEventKind, ChannelMessage, DataChannel, MediaKind, PeerConnection,
    PeerConnectionFactory, PeerEvent, PeerEventKind, RtcConfig, SdpType, SelectorMode,
    SessionDescription, SignalingState, StatsSelector,
};
pub use stats::{StatisticsAggregate, StatsEntry, StatsSeries};
