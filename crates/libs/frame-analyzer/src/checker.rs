//! Black and frozen frame detection
//!
//! [`VideoFrameChecker`] consumes frames one at a time and keeps running
//! counters. A frame is *black* when its average luma stays under
//! [`DEFAULT_BLACK_LUMA_THRESHOLD`]; it is *frozen* when its SSIM against the
//! previously checked frame exceeds [`DEFAULT_FROZEN_SSIM_THRESHOLD`].
//!
//! The checker is shared between the sampling task and the code that reads
//! the counters, so all state sits behind one lock. Once [`stop`] returns,
//! no further frame changes the counters.
//!
//! [`stop`]: VideoFrameChecker::stop

use crate::frame::VideoFrame;
use crate::ssim::ssim;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Average luma under which a frame counts as black
pub const DEFAULT_BLACK_LUMA_THRESHOLD: f64 = 20.0;

/// SSIM above which two consecutive frames count as identical
pub const DEFAULT_FROZEN_SSIM_THRESHOLD: f64 = 0.985;

/// Frame counters, monotonically increasing over a checker's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameStats {
    pub num_frames: u64,
    pub num_black_frames: u64,
    pub num_frozen_frames: u64,
}

#[derive(Debug)]
struct CheckerState {
    running: bool,
    previous_luma: Option<Vec<u8>>,
    stats: FrameStats,
}

/// Counts black and frozen frames in a sequence of captured frames
#[derive(Debug)]
pub struct VideoFrameChecker {
    black_luma_threshold: f64,
    frozen_ssim_threshold: f64,
    state: Mutex<CheckerState>,
}

impl Default for VideoFrameChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoFrameChecker {
    /// Create a running checker with the default thresholds
    pub fn new() -> Self {
        Self::with_thresholds(DEFAULT_BLACK_LUMA_THRESHOLD, DEFAULT_FROZEN_SSIM_THRESHOLD)
    }

    /// Create a running checker with custom thresholds
    ///
    /// # Arguments
    /// * `black_luma_threshold` - Average luma at or under which a frame is black
    /// * `frozen_ssim_threshold` - SSIM above which a frame is a repeat of the last one
    pub fn with_thresholds(black_luma_threshold: f64, frozen_ssim_threshold: f64) -> Self {
        Self {
            black_luma_threshold,
            frozen_ssim_threshold,
            state: Mutex::new(CheckerState {
                running: true,
                previous_luma: None,
                stats: FrameStats::default(),
            }),
        }
    }

    /// Analyze one frame and update the counters.
    ///
    /// The first frame is never compared since there is nothing to compare
    /// it against.
    ///
    /// # Returns
    /// `false` if the checker was stopped and the frame was ignored
    pub fn check_frame(&self, frame: &VideoFrame) -> bool {
        // Analysis runs outside the lock; the running flag is checked again
        // before any counter changes.
        if !self.is_running() {
            return false;
        }

        let is_black = frame.is_black(self.black_luma_threshold);
        let luma = frame.luma();

        let mut state = self.state.lock();
        if !state.running {
            return false;
        }

        let is_frozen = state
            .previous_luma
            .as_deref()
            .map(|previous| ssim(previous, &luma) > self.frozen_ssim_threshold)
            .unwrap_or(false);

        if is_black {
            state.stats.num_black_frames += 1;
        }
        if is_frozen {
            state.stats.num_frozen_frames += 1;
        }
        state.previous_luma = Some(luma);
        state.stats.num_frames += 1;
        true
    }

    /// Stop counting. Safe to call any number of times.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if state.running {
            state.running = false;
            state.previous_luma = None;
            tracing::debug!(frames = state.stats.num_frames, "Frame checker stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Snapshot of the counters
    pub fn frame_stats(&self) -> FrameStats {
        self.state.lock().stats
    }
}
