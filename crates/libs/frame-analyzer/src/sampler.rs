//! Periodic frame sampling
//!
//! A [`FrameSampler`] polls a [`FrameSource`] on a fixed interval and feeds
//! each captured frame to a shared [`VideoFrameChecker`]. Sampling pauses
//! while the source is not playing and ends when the returned
//! [`SamplerHandle`] is stopped.

use crate::checker::{FrameStats, VideoFrameChecker};
use crate::error::Result;
use crate::frame::VideoFrame;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

/// Default delay between two frame captures
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(20);

/// Live video surface frames can be grabbed from
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Whether the surface is currently delivering video
    fn is_playing(&self) -> bool;

    /// Grab the current frame
    async fn capture(&self) -> Result<VideoFrame>;
}

/// Builder for a sampling task
pub struct FrameSampler {
    source: Arc<dyn FrameSource>,
    checker: Arc<VideoFrameChecker>,
    interval: Duration,
}

impl FrameSampler {
    pub fn new(source: Arc<dyn FrameSource>) -> Self {
        Self {
            source,
            checker: Arc::new(VideoFrameChecker::new()),
            interval: DEFAULT_SAMPLE_INTERVAL,
        }
    }

    /// Use an existing checker instead of a fresh one
    pub fn with_checker(mut self, checker: Arc<VideoFrameChecker>) -> Self {
        self.checker = checker;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Spawn the sampling task on the current runtime
    pub fn start(self) -> SamplerHandle {
        let checker = Arc::clone(&self.checker);
        let task = tokio::spawn(sample_loop(self.source, Arc::clone(&checker), self.interval));
        SamplerHandle {
            checker,
            task: Mutex::new(Some(task)),
        }
    }
}

async fn sample_loop(
    source: Arc<dyn FrameSource>,
    checker: Arc<VideoFrameChecker>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if !checker.is_running() {
            break;
        }
        if !source.is_playing() {
            trace!("Frame source not playing, skipping tick");
            continue;
        }
        match source.capture().await {
            Ok(frame) => {
                checker.check_frame(&frame);
            }
            Err(e) => debug!("Frame capture failed: {}", e),
        }
    }
    debug!("Frame sampling loop exited");
}

/// Handle to a running sampler
pub struct SamplerHandle {
    checker: Arc<VideoFrameChecker>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SamplerHandle {
    /// Stop sampling and detach from the source. Idempotent.
    pub fn stop(&self) {
        self.checker.stop();
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    pub fn frame_stats(&self) -> FrameStats {
        self.checker.frame_stats()
    }

    pub fn checker(&self) -> &Arc<VideoFrameChecker> {
        &self.checker
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
