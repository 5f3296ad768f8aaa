//! Synthetic capture devices and the VP8 sample pump
//!
//! Headless runs have no camera or microphone. [`SyntheticMedia`] stands in
//! for both: a moving test pattern as the video preview surface and a sine
//! tone as microphone input. Streams added to a peer are fed by a
//! [`VideoPump`] writing fixed-size samples at the capture frame rate, which
//! is enough to drive the sender's RTP and bandwidth statistics.

use async_trait::async_trait;
use bytes::Bytes;
use rtcscan_core::media::{AudioCapture, LocalStream, MediaProvider, VideoConstraints};
use rtcscan_core::{Error, Result};
use rtcscan_frame_analyzer::{FrameSource, VideoFrame};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use webrtc::media::Sample;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Label reported for the synthetic camera
pub const SYNTHETIC_CAMERA_LABEL: &str = "Synthetic Camera";

/// Preview surface size, independent of the negotiated resolution
const PREVIEW_WIDTH: u32 = 160;
const PREVIEW_HEIGHT: u32 = 120;

/// Frames per second written to outgoing video tracks
const PUMP_FPS: u64 = 30;

/// Samples per microphone buffer (10 ms at 48 kHz)
const AUDIO_BUFFER_FRAMES: usize = 480;

/// Headless stand-in for camera and microphone
#[derive(Debug, Clone)]
pub struct SyntheticMedia {
    /// Largest resolution the camera accepts
    pub max_width: u32,
    pub max_height: u32,
    pub sample_rate: u32,
    /// Microphone channel count
    pub channels: usize,
    pub tone_hz: f32,
    /// Peak amplitude of the tone, 0.0 to 1.0
    pub amplitude: f32,
}

impl Default for SyntheticMedia {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1080,
            sample_rate: 48_000,
            channels: 1,
            tone_hz: 440.0,
            amplitude: 0.25,
        }
    }
}

impl SyntheticMedia {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_resolution(mut self, width: u32, height: u32) -> Self {
        self.max_width = width;
        self.max_height = height;
        self
    }

    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }
}

#[async_trait]
impl MediaProvider for SyntheticMedia {
    async fn open_video(&self, constraints: &VideoConstraints) -> Result<LocalStream> {
        if constraints.width > self.max_width || constraints.height > self.max_height {
            return Err(Error::Media(format!(
                "{}x{} exceeds {}x{}",
                constraints.width, constraints.height, self.max_width, self.max_height
            )));
        }
        Ok(
            LocalStream::new(SYNTHETIC_CAMERA_LABEL, constraints.width, constraints.height)
                .with_frames(Arc::new(TestPattern::new(PREVIEW_WIDTH, PREVIEW_HEIGHT))),
        )
    }

    async fn open_audio(&self) -> Result<Box<dyn AudioCapture>> {
        if self.channels == 0 {
            return Err(Error::Media("no audio channels".to_string()));
        }
        Ok(Box::new(ToneCapture::new(self)))
    }
}

/// Moving gradient; every capture differs from the previous one
pub struct TestPattern {
    width: u32,
    height: u32,
    tick: AtomicU32,
}

impl TestPattern {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tick: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl FrameSource for TestPattern {
    fn is_playing(&self) -> bool {
        true
    }

    async fn capture(&self) -> rtcscan_frame_analyzer::Result<VideoFrame> {
        let tick = self.tick.fetch_add(1, Ordering::Relaxed);
        let mut data = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for y in 0..self.height {
            for x in 0..self.width {
                let r = (x.wrapping_add(tick * 3) % 256) as u8;
                let g = (y.wrapping_add(tick * 5) % 256) as u8;
                let b = ((x ^ y).wrapping_add(tick * 7) % 256) as u8;
                data.extend_from_slice(&[r, g, b, 255]);
            }
        }
        VideoFrame::new(self.width, self.height, data)
    }
}

/// Sine tone delivered in real time
struct ToneCapture {
    sample_rate: u32,
    channels: usize,
    step: f32,
    amplitude: f32,
    phase: f32,
    ticker: Interval,
    stopped: bool,
}

impl ToneCapture {
    fn new(media: &SyntheticMedia) -> Self {
        let buffer_ms = AUDIO_BUFFER_FRAMES as u64 * 1000 / media.sample_rate.max(1) as u64;
        let mut ticker = tokio::time::interval(Duration::from_millis(buffer_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            sample_rate: media.sample_rate,
            channels: media.channels,
            step: 2.0 * std::f32::consts::PI * media.tone_hz / media.sample_rate.max(1) as f32,
            amplitude: media.amplitude,
            phase: 0.0,
            ticker,
            stopped: false,
        }
    }
}

#[async_trait]
impl AudioCapture for ToneCapture {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    async fn next_buffer(&mut self) -> Option<Vec<Vec<f32>>> {
        if self.stopped {
            return None;
        }
        self.ticker.tick().await;

        let mut samples = Vec::with_capacity(AUDIO_BUFFER_FRAMES);
        for _ in 0..AUDIO_BUFFER_FRAMES {
            samples.push(self.phase.sin() * self.amplitude);
            self.phase = (self.phase + self.step) % (2.0 * std::f32::consts::PI);
        }
        Some(vec![samples; self.channels])
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

/// Task writing samples to a local video track until cancelled or the
/// stream ends
pub struct VideoPump {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl VideoPump {
    /// Start pumping into `track`.
    ///
    /// # Arguments
    /// * `track` - VP8 track already added to the peer connection
    /// * `stream` - Capture stream whose resolution sizes the samples
    /// * `cancel` - Parent token; the pump gets a child of it
    pub fn start(
        track: Arc<TrackLocalStaticSample>,
        stream: LocalStream,
        cancel: &CancellationToken,
    ) -> Self {
        let cancel = cancel.child_token();
        let token = cancel.clone();
        let frame_duration = Duration::from_millis(1000 / PUMP_FPS);
        let payload = Bytes::from(vec![0u8; sample_size(stream.width, stream.height)]);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(frame_duration);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut written: u64 = 0;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if stream.is_ended() {
                    break;
                }
                let sample = Sample {
                    data: payload.clone(),
                    duration: frame_duration,
                    ..Default::default()
                };
                if let Err(e) = track.write_sample(&sample).await {
                    warn!("Stopping video pump for stream {}: {}", stream.id, e);
                    break;
                }
                written += 1;
            }
            debug!("Video pump for stream {} wrote {} samples", stream.id, written);
        });

        Self { cancel, handle }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for VideoPump {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Bytes per sample, roughly what an encoder emits at this resolution
fn sample_size(width: u32, height: u32) -> usize {
    ((width as usize * height as usize) / 256).clamp(200, 12_000)
}
