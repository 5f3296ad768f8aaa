//! Frame and audio quality analysis for rtcscan
//!
//! This crate holds the pure media-analysis pieces used by the diagnostic
//! scenarios:
//!
//! - [`ssim`] - structural similarity between two luma buffers
//! - [`frame`] - RGBA frames, luma extraction and black-frame detection
//! - [`checker`] - [`VideoFrameChecker`] counting black and frozen frames
//! - [`sampler`] - a periodic sampler driving a checker from a [`FrameSource`]
//! - [`audio`] - per-channel level statistics and mono detection
//!
//! # Example
//!
//! ```
//! use rtcscan_frame_analyzer::{VideoFrame, VideoFrameChecker};
//!
//! let checker = VideoFrameChecker::new();
//! let frame = VideoFrame::solid(4, 4, [0, 0, 0, 255]);
//! checker.check_frame(&frame);
//! checker.check_frame(&frame);
//!
//! let stats = checker.frame_stats();
//! assert_eq!(stats.num_frames, 2);
//! assert_eq!(stats.num_black_frames, 2);
//! assert_eq!(stats.num_frozen_frames, 1);
//! ```

pub mod audio;
pub mod checker;
pub mod error;
pub mod frame;
pub mod sampler;
pub mod ssim;

pub use audio::{AudioAnalysis, AudioThresholds, ChannelLevels};
pub use checker::{FrameStats, VideoFrameChecker};
pub use error::{AnalyzerError, Result};
pub use frame::VideoFrame;
pub use sampler::{FrameSampler, FrameSource, SamplerHandle};
pub use ssim::ssim;
