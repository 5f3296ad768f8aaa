//! Microphone level analysis
//!
//! Buffers arrive as one `Vec<f32>` per channel, samples in `[-1.0, 1.0]`.
//! [`AudioCollector`] keeps the non-silent ones until enough audio has been
//! seen, then [`AudioCollector::analyze`] reduces them to per-channel levels.

use serde::{Deserialize, Serialize};

/// Detection thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioThresholds {
    /// Absolute sample value under which audio is silence
    pub silent: f64,
    /// RMS level in dBFS under which input is reported as too low
    pub low_volume_db: f64,
    /// Per-sample difference under which two channels are identical
    pub mono_detect: f64,
    /// Consecutive clipped samples that count as clipping
    pub clip_count: u32,
    /// Absolute sample value treated as clipped
    pub clip_level: f64,
}

impl Default for AudioThresholds {
    fn default() -> Self {
        Self {
            silent: 1.0 / 32767.0,
            low_volume_db: -60.0,
            mono_detect: 1.0 / 65536.0,
            clip_count: 6,
            clip_level: 1.0,
        }
    }
}

/// Level statistics for one channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelLevels {
    pub max_peak: f64,
    pub max_rms: f64,
    pub clip_count: u32,
    pub max_clip_count: u32,
}

impl ChannelLevels {
    /// Compute levels over a channel's buffers.
    ///
    /// RMS is taken per buffer and the maximum kept; empty buffers are
    /// skipped. The clip run carries over buffer boundaries.
    pub fn compute(buffers: &[Vec<f32>], clip_level: f64) -> Self {
        let mut levels = Self::default();
        for samples in buffers {
            let mut sum_sq = 0.0;
            for &sample in samples {
                let sample = f64::from(sample);
                levels.max_peak = levels.max_peak.max(sample.abs());
                if sample.abs() >= clip_level {
                    levels.clip_count += 1;
                    levels.max_clip_count = levels.max_clip_count.max(levels.clip_count);
                } else {
                    levels.clip_count = 0;
                }
                sum_sq += sample * sample;
            }
            if !samples.is_empty() {
                levels.max_rms = levels.max_rms.max((sum_sq / samples.len() as f64).sqrt());
            }
        }
        levels
    }
}

/// Convert a linear gain to dBFS, rounded to one decimal
pub fn dbfs(gain: f64) -> f64 {
    let db = 20.0 * gain.log10();
    (db * 10.0).round() / 10.0
}

/// Whether two channels carry the same signal
pub fn is_mono(left: &[Vec<f32>], right: &[Vec<f32>], threshold: f64) -> bool {
    !left.iter().zip(right).any(|(l, r)| {
        l.iter()
            .zip(r)
            .any(|(&a, &b)| (f64::from(a) - f64::from(b)).abs() > threshold)
    })
}

/// Per-channel verdict produced by [`AudioCollector::analyze`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelReport {
    pub index: usize,
    pub levels: ChannelLevels,
    pub active: bool,
    pub peak_db: f64,
    pub rms_db: f64,
    pub low_volume: bool,
    pub clipping: bool,
}

/// Result of analyzing collected audio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioAnalysis {
    pub channels: Vec<ChannelReport>,
    /// `Some` only when exactly two channels are active
    pub mono: Option<bool>,
}

impl AudioAnalysis {
    pub fn active_channels(&self) -> impl Iterator<Item = &ChannelReport> {
        self.channels.iter().filter(|c| c.active)
    }

    pub fn active_count(&self) -> usize {
        self.active_channels().count()
    }
}

/// Accumulates non-silent audio buffers
#[derive(Debug, Clone)]
pub struct AudioCollector {
    thresholds: AudioThresholds,
    sample_rate: u32,
    collect_seconds: f64,
    channels: Vec<Vec<Vec<f32>>>,
    collected_samples: u64,
}

impl AudioCollector {
    /// # Arguments
    /// * `sample_rate` - Input sample rate in Hz
    /// * `collect_seconds` - Non-silent audio needed before collection is complete
    /// * `thresholds` - Detection thresholds
    pub fn new(sample_rate: u32, collect_seconds: f64, thresholds: AudioThresholds) -> Self {
        Self {
            thresholds,
            sample_rate,
            collect_seconds,
            channels: Vec::new(),
            collected_samples: 0,
        }
    }

    /// Add one multi-channel buffer.
    ///
    /// A channel's buffer is kept only if its first or last sample is above
    /// the silence threshold; silent ones are stored empty so channels stay
    /// aligned.
    ///
    /// # Returns
    /// `true` once enough non-silent audio has been collected
    pub fn push(&mut self, buffer: &[Vec<f32>]) -> bool {
        if self.channels.len() < buffer.len() {
            let missing = self.channels.first().map(Vec::len).unwrap_or(0);
            self.channels.resize(buffer.len(), vec![Vec::new(); missing]);
        }

        let mut all_silent = true;
        let mut sample_count = 0;
        for (channel, data) in self.channels.iter_mut().zip(buffer) {
            sample_count = sample_count.max(data.len());
            let first = data.first().map(|s| f64::from(s.abs())).unwrap_or(0.0);
            let last = data.last().map(|s| f64::from(s.abs())).unwrap_or(0.0);
            if first > self.thresholds.silent || last > self.thresholds.silent {
                channel.push(data.clone());
                all_silent = false;
            } else {
                channel.push(Vec::new());
            }
        }

        if !all_silent {
            self.collected_samples += sample_count as u64;
        }
        self.is_complete()
    }

    pub fn is_complete(&self) -> bool {
        self.sample_rate > 0
            && self.collected_samples as f64 / f64::from(self.sample_rate) >= self.collect_seconds
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Reduce the collected buffers to per-channel verdicts
    pub fn analyze(&self) -> AudioAnalysis {
        let t = &self.thresholds;
        let channels: Vec<ChannelReport> = self
            .channels
            .iter()
            .enumerate()
            .map(|(index, buffers)| {
                let levels = ChannelLevels::compute(buffers, t.clip_level);
                let active = levels.max_peak > t.silent;
                let rms_db = dbfs(levels.max_rms);
                ChannelReport {
                    index,
                    levels,
                    active,
                    peak_db: dbfs(levels.max_peak),
                    rms_db,
                    low_volume: active && rms_db < t.low_volume_db,
                    clipping: active && levels.max_clip_count > t.clip_count,
                }
            })
            .collect();

        let active: Vec<usize> = channels.iter().filter(|c| c.active).map(|c| c.index).collect();
        let mono = match active.as_slice() {
            [l, r] => Some(is_mono(&self.channels[*l], &self.channels[*r], t.mono_detect)),
            _ => None,
        };

        AudioAnalysis { channels, mono }
    }
}
