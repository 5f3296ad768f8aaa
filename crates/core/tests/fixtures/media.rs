//! Scripted capture devices for scenario tests

#![allow(dead_code)]

use async_trait::async_trait;
use rtcscan_core::error::{Error, Result};
use rtcscan_core::media::{AudioCapture, LocalStream, MediaProvider, VideoConstraints};
use rtcscan_frame_analyzer::{FrameSource, VideoFrame};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Media provider returning canned streams
#[derive(Default)]
pub struct MockMedia {
    /// Resolution delivered for any request, `None` fails the open
    pub video: Option<(u32, u32)>,
    /// Attach a moving test pattern to opened video streams
    pub frames: bool,
    /// Buffers played back by the microphone, `None` fails the open
    pub audio: Option<Vec<Vec<Vec<f32>>>>,
    pub audio_stopped: Arc<AtomicBool>,
}

impl MockMedia {
    pub fn camera(width: u32, height: u32) -> Self {
        Self {
            video: Some((width, height)),
            ..Default::default()
        }
    }

    /// Camera whose stream exposes changing, non-black frames
    pub fn live_camera(width: u32, height: u32) -> Self {
        Self {
            frames: true,
            ..Self::camera(width, height)
        }
    }

    pub fn microphone(buffers: Vec<Vec<Vec<f32>>>) -> Self {
        Self {
            audio: Some(buffers),
            ..Default::default()
        }
    }
}

/// `count` buffers of a 440 Hz tone at 48 kHz, 10 ms each
pub fn tone(channels: usize, amplitude: f32, count: usize) -> Vec<Vec<Vec<f32>>> {
    let samples: Vec<f32> = (0..480)
        .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 48_000.0).sin() * amplitude)
        .collect();
    vec![vec![samples; channels]; count]
}

#[async_trait]
impl MediaProvider for MockMedia {
    async fn open_video(&self, _constraints: &VideoConstraints) -> Result<LocalStream> {
        match self.video {
            Some((width, height)) => {
                let stream = LocalStream::new("Mock Camera", width, height);
                if self.frames {
                    Ok(stream.with_frames(Arc::new(PatternSource::default())))
                } else {
                    Ok(stream)
                }
            }
            None => Err(Error::Media("device not found".to_string())),
        }
    }

    async fn open_audio(&self) -> Result<Box<dyn AudioCapture>> {
        match &self.audio {
            Some(buffers) => Ok(Box::new(MockCapture {
                buffers: buffers.iter().cloned().collect(),
                stopped: Arc::clone(&self.audio_stopped),
            })),
            None => Err(Error::Media("permission denied".to_string())),
        }
    }
}

struct MockCapture {
    buffers: VecDeque<Vec<Vec<f32>>>,
    stopped: Arc<AtomicBool>,
}

#[async_trait]
impl AudioCapture for MockCapture {
    fn sample_rate(&self) -> u32 {
        48_000
    }

    async fn next_buffer(&mut self) -> Option<Vec<Vec<f32>>> {
        self.buffers.pop_front()
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Frame source producing a different pattern on every capture
#[derive(Default)]
pub struct PatternSource {
    seed: AtomicU32,
}

#[async_trait]
impl FrameSource for PatternSource {
    fn is_playing(&self) -> bool {
        true
    }

    async fn capture(&self) -> rtcscan_frame_analyzer::Result<VideoFrame> {
        let seed = self.seed.fetch_add(1, Ordering::SeqCst) as u8;
        let data = (0..16 * 16)
            .flat_map(|i: u32| {
                let v = ((i * 37) as u8).wrapping_add(seed.wrapping_mul(91));
                [v, v.wrapping_add(40), v.wrapping_add(80), 255]
            })
            .collect();
        VideoFrame::new(16, 16, data)
    }
}
