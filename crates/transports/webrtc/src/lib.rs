//! webrtc-rs backend for rtcscan
//!
//! Implements the `rtcscan-core` peer traits on top of the `webrtc` crate:
//!
//! - [`WebRtcPeerFactory`] / [`WebRtcPeer`] - peer connections with typed
//!   candidate and data channel events
//! - [`WebRtcDataChannel`] - ordered data channels
//! - [`SyntheticMedia`] - headless camera and microphone for the media
//!   scenarios
//!
//! # Example
//!
//! ```ignore
//! use rtcscan_core::scenarios::ScenarioContext;
//! use rtcscan_webrtc::{SyntheticMedia, WebRtcPeerFactory};
//! use std::sync::Arc;
//!
//! let ctx = ScenarioContext::new(Arc::new(WebRtcPeerFactory::new()), ice, config)
//!     .with_media(Arc::new(SyntheticMedia::new()));
//! ```

#![warn(clippy::all)]

mod channel;
pub mod error;
pub mod media;
mod peer;

pub use channel::WebRtcDataChannel;
pub use error::{Error, Result};
pub use media::{SyntheticMedia, TestPattern, VideoPump};
pub use peer::{WebRtcPeer, WebRtcPeerFactory};
