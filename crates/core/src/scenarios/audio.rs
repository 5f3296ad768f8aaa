//! Microphone level analysis
//!
//! Collects non-silent input until enough audio was captured or the timeout
//! fires, then reports per-channel levels, low volume, clipping and whether
//! a two-channel device is actually mono.

use super::ScenarioContext;
use crate::diagnostic::{Diagnostic, DiagnosticTest, LogLevel};
use crate::media::AudioCapture;
use async_trait::async_trait;
use rtcscan_frame_analyzer::audio::{AudioCollector, AudioThresholds};
use rtcscan_frame_analyzer::AudioAnalysis;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct AudioCaptureTest {
    ctx: Arc<ScenarioContext>,
}

impl AudioCaptureTest {
    pub fn new(ctx: Arc<ScenarioContext>) -> Self {
        Self { ctx }
    }

    fn thresholds(&self) -> AudioThresholds {
        let config = &self.ctx.config.audio;
        AudioThresholds {
            low_volume_db: config.low_volume_db,
            clip_count: config.clip_count_threshold,
            ..AudioThresholds::default()
        }
    }

    async fn collect(&self, capture: &mut dyn AudioCapture) -> AudioCollector {
        let config = &self.ctx.config.audio;
        let mut collector = AudioCollector::new(capture.sample_rate(), config.collect_seconds, self.thresholds());

        let deadline = tokio::time::sleep(Duration::from_millis(config.timeout_ms));
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                buffer = capture.next_buffer() => match buffer {
                    Some(buffer) => {
                        if collector.push(&buffer) {
                            debug!("Collected enough audio");
                            break;
                        }
                    }
                    None => {
                        debug!("Audio capture ended");
                        break;
                    }
                },
                _ = &mut deadline => {
                    debug!("Audio collection timed out");
                    break;
                }
            }
        }
        capture.stop();
        collector
    }
}

/// Write an analysis to the test log
pub(crate) fn report_analysis(analysis: &AudioAnalysis, test: &mut DiagnosticTest) {
    for channel in analysis.active_channels() {
        test.info(format!(
            "Channel {} levels: {:.1} dB (peak), {:.1} dB (RMS)",
            channel.index, channel.peak_db, channel.rms_db
        ));
        if channel.low_volume {
            test.error(
                "Microphone input level is low, increase input volume or move closer to the microphone.",
            );
        }
        if channel.clipping {
            test.warning(
                "Clipping detected! Microphone input level is high. Decrease input volume or move away from the microphone.",
            );
        }
    }

    let active = analysis.active_count();
    if active == 0 {
        test.error(
            "No active input channels detected. Microphone is most likely muted or broken, please check if muted in the sound settings or physically on the device. Then rerun the test.",
        );
    } else {
        test.success(format!("Active audio input channels: {}", active));
    }

    if let Some(mono) = analysis.mono {
        test.info(if mono {
            "Mono microphone detected."
        } else {
            "Stereo microphone detected."
        });
    }
}

#[async_trait]
impl Diagnostic for AudioCaptureTest {
    fn name(&self) -> &str {
        "audio-capture"
    }

    async fn run(&self, test: &mut DiagnosticTest) {
        let Some(media) = self.ctx.media.as_ref() else {
            test.report_fatal(LogLevel::Error, "Microphone open failed: no media provider");
            return;
        };
        let mut capture = match media.open_audio().await {
            Ok(capture) => capture,
            Err(e) => {
                test.report_fatal(LogLevel::Error, format!("Microphone open failed: {}", e));
                return;
            }
        };

        let collector = self.collect(capture.as_mut()).await;
        report_analysis(&collector.analyze(), test);
        test.done();
    }
}
