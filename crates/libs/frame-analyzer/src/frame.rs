//! RGBA video frames and luma helpers

use crate::error::{AnalyzerError, Result};

/// Rec. 709 luma weights applied to R, G and B
const LUMA_R: f64 = 0.21;
const LUMA_G: f64 = 0.72;
const LUMA_B: f64 = 0.07;

/// A captured video frame in packed RGBA (4 bytes per pixel)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl VideoFrame {
    /// Wrap an RGBA pixel buffer.
    ///
    /// Fails when `data.len() != width * height * 4`.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(AnalyzerError::InvalidFrame(format!(
                "{}x{} frame needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Frame filled with a single RGBA color
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel_count(&self) -> usize {
        self.data.len() / 4
    }

    /// Per-pixel luma plane, one byte per pixel
    pub fn luma(&self) -> Vec<u8> {
        self.data
            .chunks_exact(4)
            .map(|px| pixel_luma(px).round().clamp(0.0, 255.0) as u8)
            .collect()
    }

    /// Classify the frame as black.
    ///
    /// Accumulates luma pixel by pixel and stops as soon as the running
    /// average exceeds `threshold`, so bright frames exit after a few pixels.
    pub fn is_black(&self, threshold: f64) -> bool {
        let mut accu = 0.0;
        for (i, px) in self.data.chunks_exact(4).enumerate() {
            accu += pixel_luma(px);
            if accu > threshold * (i + 1) as f64 {
                return false;
            }
        }
        true
    }
}

fn pixel_luma(px: &[u8]) -> f64 {
    LUMA_R * f64::from(px[0]) + LUMA_G * f64::from(px[1]) + LUMA_B * f64::from(px[2])
}
