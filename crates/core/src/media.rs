//! Local capture streams and the provider that opens them
//!
//! Device enumeration and capture live outside this crate. Scenarios ask a
//! [`MediaProvider`] for a stream and get back a handle exposing what the
//! analysis needs: the delivered resolution and a [`FrameSource`].

use crate::error::Result;
use async_trait::async_trait;
use rtcscan_frame_analyzer::FrameSource;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Requested capture resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoConstraints {
    pub width: u32,
    pub height: u32,
}

impl VideoConstraints {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// An open local video stream
#[derive(Clone)]
pub struct LocalStream {
    pub id: String,
    /// Device label, empty when unknown
    pub label: String,
    /// Resolution the device actually delivers
    pub width: u32,
    pub height: u32,
    frames: Option<Arc<dyn FrameSource>>,
    ended: Arc<AtomicBool>,
}

impl LocalStream {
    pub fn new(label: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            label: label.into(),
            width,
            height,
            frames: None,
            ended: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_frames(mut self, frames: Arc<dyn FrameSource>) -> Self {
        self.frames = Some(frames);
        self
    }

    /// Surface frames can be captured from, if the provider exposes one
    pub fn frames(&self) -> Option<Arc<dyn FrameSource>> {
        self.frames.clone()
    }

    /// Stop all tracks of the stream. Clones share the flag.
    pub fn stop(&self) {
        self.ended.store(true, Ordering::SeqCst);
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for LocalStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalStream")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("has_frames", &self.frames.is_some())
            .field("ended", &self.is_ended())
            .finish()
    }
}

/// Live microphone capture
#[async_trait]
pub trait AudioCapture: Send {
    fn sample_rate(&self) -> u32;

    /// Next buffer, one `Vec<f32>` per channel; `None` when capture ended
    async fn next_buffer(&mut self) -> Option<Vec<Vec<f32>>>;

    fn stop(&mut self);
}

/// Opens capture streams
#[async_trait]
pub trait MediaProvider: Send + Sync {
    async fn open_video(&self, constraints: &VideoConstraints) -> Result<LocalStream>;

    async fn open_audio(&self) -> Result<Box<dyn AudioCapture>>;
}
