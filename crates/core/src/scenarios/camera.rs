//! Camera capture analysis at one resolution
//!
//! Opens the camera, samples its frames for black and frozen content while
//! sending the stream over a loopback call, then checks the encoder stats,
//! the delivered resolution and the frame counters.

use super::{format_value, ScenarioContext};
use crate::diagnostic::{Diagnostic, DiagnosticTest, LogLevel};
use crate::harness::{ConnectionHarness, HarnessConfig};
use crate::media::{LocalStream, VideoConstraints};
use crate::peer::RtcConfig;
use crate::stats::{array_average, array_max, array_min, StatsEntry, StatsSeries};
use async_trait::async_trait;
use rtcscan_frame_analyzer::{FrameSampler, FrameStats, VideoFrameChecker};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Below this average sent frame rate the camera is reported as failing
const MIN_SENT_FPS: f64 = 5.0;

/// Encoder numbers from one stats entry
#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct EncoderSample {
    encode_ms: Option<f64>,
    input_fps: Option<f64>,
    sent_fps: Option<f64>,
}

impl EncoderSample {
    /// Only entries recorded after the encoder started producing frames
    fn from_entry(entry: &StatsEntry) -> Option<Self> {
        match entry.kind.as_str() {
            "ssrc" => {
                let input_fps = entry.number("googFrameRateInput")?.trunc();
                (input_fps > 0.0).then(|| EncoderSample {
                    encode_ms: entry.number("googAvgEncodeMs").map(f64::trunc),
                    input_fps: Some(input_fps),
                    sent_fps: entry.number("googFrameRateSent").map(f64::trunc),
                })
            }
            "outbound-rtp" => {
                let sent_fps = entry.number("framesPerSecond")?.trunc();
                let encode_ms = match (entry.number("totalEncodeTime"), entry.number("framesEncoded")) {
                    (Some(total), Some(frames)) if frames > 0.0 => Some((total * 1000.0 / frames).trunc()),
                    _ => None,
                };
                (sent_fps > 0.0).then_some(EncoderSample {
                    encode_ms,
                    input_fps: None,
                    sent_fps: Some(sent_fps),
                })
            }
            "media-source" => {
                let input_fps = entry.number("framesPerSecond")?.trunc();
                (input_fps > 0.0).then_some(EncoderSample {
                    input_fps: Some(input_fps),
                    ..Default::default()
                })
            }
            _ => None,
        }
    }

    fn marks_encoder_running(entry: &StatsEntry) -> bool {
        matches!(entry.kind.as_str(), "ssrc" | "outbound-rtp") && Self::from_entry(entry).is_some()
    }
}

/// Everything the camera test measured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraReport {
    pub camera_name: Option<String>,
    pub actual_video_width: u32,
    pub actual_video_height: u32,
    pub mandatory_width: u32,
    pub mandatory_height: u32,
    pub encode_setup_time_ms: Option<f64>,
    pub avg_encode_time_ms: Option<f64>,
    pub min_encode_time_ms: Option<f64>,
    pub max_encode_time_ms: Option<f64>,
    pub avg_input_fps: Option<f64>,
    pub min_input_fps: Option<f64>,
    pub max_input_fps: Option<f64>,
    pub avg_sent_fps: Option<f64>,
    pub min_sent_fps: Option<f64>,
    pub max_sent_fps: Option<f64>,
    pub tested_frames: u64,
    pub black_frames: u64,
    pub frozen_frames: u64,
}

impl CameraReport {
    /// # Arguments
    /// * `stream` - The opened stream, giving name and delivered resolution
    /// * `requested` - Resolution the camera was asked for
    /// * `series` - Stats polled from the sending peer
    /// * `frames` - Counters of the frame checker
    pub fn build(
        stream: &LocalStream,
        requested: VideoConstraints,
        series: &StatsSeries,
        frames: FrameStats,
    ) -> Self {
        let mut encode_ms = Vec::new();
        let mut input_fps = Vec::new();
        let mut sent_fps = Vec::new();
        for (entry, _) in series.iter() {
            if let Some(sample) = EncoderSample::from_entry(entry) {
                encode_ms.extend(sample.encode_ms);
                input_fps.extend(sample.input_fps);
                sent_fps.extend(sample.sent_fps);
            }
        }

        Self {
            camera_name: Some(stream.label.clone()).filter(|l| !l.is_empty()),
            actual_video_width: stream.width,
            actual_video_height: stream.height,
            mandatory_width: requested.width,
            mandatory_height: requested.height,
            encode_setup_time_ms: encoder_setup_time(series),
            avg_encode_time_ms: array_average(&encode_ms),
            min_encode_time_ms: array_min(&encode_ms),
            max_encode_time_ms: array_max(&encode_ms),
            avg_input_fps: array_average(&input_fps),
            min_input_fps: array_min(&input_fps),
            max_input_fps: array_max(&input_fps),
            avg_sent_fps: array_average(&sent_fps),
            min_sent_fps: array_min(&sent_fps),
            max_sent_fps: array_max(&sent_fps),
            tested_frames: frames.num_frames,
            black_frames: frames.num_black_frames,
            frozen_frames: frames.num_frozen_frames,
        }
    }

    /// Report fields in display order, `None` when unavailable
    fn fields(&self) -> Vec<(&'static str, Option<String>)> {
        let num = |v: Option<f64>| v.map(format_value);
        vec![
            ("cameraName", self.camera_name.clone()),
            ("actualVideoWidth", Some(self.actual_video_width.to_string())),
            ("actualVideoHeight", Some(self.actual_video_height.to_string())),
            ("mandatoryWidth", Some(self.mandatory_width.to_string())),
            ("mandatoryHeight", Some(self.mandatory_height.to_string())),
            ("encodeSetupTimeMs", num(self.encode_setup_time_ms)),
            ("avgEncodeTimeMs", num(self.avg_encode_time_ms)),
            ("minEncodeTimeMs", num(self.min_encode_time_ms)),
            ("maxEncodeTimeMs", num(self.max_encode_time_ms)),
            ("avgInputFps", num(self.avg_input_fps)),
            ("minInputFps", num(self.min_input_fps)),
            ("maxInputFps", num(self.max_input_fps)),
            ("avgSentFps", num(self.avg_sent_fps)),
            ("minSentFps", num(self.min_sent_fps)),
            ("maxSentFps", num(self.max_sent_fps)),
            ("testedFrames", Some(self.tested_frames.to_string())),
            ("blackFrames", Some(self.black_frames.to_string())),
            ("frozenFrames", Some(self.frozen_frames.to_string())),
        ]
    }

    /// Log every value and the pass/fail checks
    pub fn test_expectations(&self, test: &mut DiagnosticTest) {
        let mut missing = Vec::new();
        for (key, value) in self.fields() {
            match value {
                Some(value) => test.info(format!("{}: {}", key, value)),
                None => missing.push(key),
            }
        }
        if !missing.is_empty() {
            test.info(format!("Not available: {}", missing.join(", ")));
        }

        match self.avg_sent_fps {
            None => test.info("Cannot verify sent FPS."),
            Some(fps) if fps < MIN_SENT_FPS => {
                test.error(format!("Low average sent FPS: {}", format_value(fps)))
            }
            Some(_) => test.success("Average FPS above threshold"),
        }

        if resolution_matches(
            self.actual_video_width,
            self.actual_video_height,
            self.mandatory_width,
            self.mandatory_height,
        ) {
            test.success("Captured video using expected resolution.");
        } else {
            test.error("Incorrect captured resolution.");
        }

        if self.tested_frames == 0 {
            test.error("Could not analyze any video frame.");
        } else {
            let limit = self.tested_frames as f64 / 3.0;
            if self.black_frames as f64 > limit {
                test.error("Camera delivering lots of black frames.");
            }
            if self.frozen_frames as f64 > limit {
                test.error("Camera delivering lots of frozen frames.");
            }
        }
    }
}

/// Time from the first poll until the encoder produced frames
fn encoder_setup_time(series: &StatsSeries) -> Option<f64> {
    let first = *series.timestamps.first()?;
    series
        .iter()
        .find(|(entry, _)| EncoderSample::marks_encoder_running(entry))
        .map(|(_, at)| (at - first) as f64)
}

/// Compare resolutions ignoring rotation, and cropping to a square
pub fn resolution_matches(a_width: u32, a_height: u32, b_width: u32, b_height: u32) -> bool {
    let min_res = b_width.min(b_height);
    (a_width == b_width && a_height == b_height)
        || (a_width == b_height && a_height == b_width)
        || (a_width == min_res && b_height == min_res)
}

pub struct CameraTest {
    ctx: Arc<ScenarioContext>,
}

impl CameraTest {
    pub fn new(ctx: Arc<ScenarioContext>) -> Self {
        Self { ctx }
    }

    fn requested(&self) -> VideoConstraints {
        VideoConstraints::new(self.ctx.config.camera.width, self.ctx.config.camera.height)
    }

    async fn call(&self, stream: &LocalStream, test: &mut DiagnosticTest) -> Option<StatsSeries> {
        // No relay needed, host candidates are enough for the loopback
        let harness = match ConnectionHarness::new(
            self.ctx.factory.as_ref(),
            &RtcConfig::default(),
            HarnessConfig::default(),
        )
        .await
        {
            Ok(harness) => harness,
            Err(e) => {
                test.error(e.to_string());
                return None;
            }
        };

        let series = async {
            harness.pc1().add_local_stream(stream).await?;
            harness.establish_connection().await?;

            let stop = harness.stop_token();
            let duration = Duration::from_millis(self.ctx.config.camera.duration_ms);
            let gather = harness.gather_stats(harness.pc1(), Some(stream), stop.clone());
            let (series, ()) = tokio::join!(gather, end_call_after(duration, stop));
            series
        }
        .await;

        stream.stop();
        harness.close().await;

        match series {
            Ok(series) => Some(series),
            Err(e) => {
                test.error(e.to_string());
                None
            }
        }
    }
}

async fn end_call_after(duration: Duration, stop: CancellationToken) {
    tokio::time::sleep(duration).await;
    stop.cancel();
}

#[async_trait]
impl Diagnostic for CameraTest {
    fn name(&self) -> &str {
        "camera-resolution"
    }

    async fn run(&self, test: &mut DiagnosticTest) {
        let requested = self.requested();
        let Some(media) = self.ctx.media.as_ref() else {
            test.report_fatal(LogLevel::Error, "Camera open failed: no media provider");
            return;
        };

        let stream = match media.open_video(&requested).await {
            Ok(stream) => stream,
            Err(e) => {
                test.info(format!("{}x{} not supported", requested.width, requested.height));
                test.report_fatal(LogLevel::Error, format!("Camera open failed: {}", e));
                return;
            }
        };

        let checker = Arc::new(VideoFrameChecker::new());
        let sampler = stream
            .frames()
            .map(|source| FrameSampler::new(source).with_checker(Arc::clone(&checker)).start());
        if sampler.is_none() {
            debug!("Stream exposes no frames, skipping frame analysis");
        }

        let series = self.call(&stream, test).await;
        if let Some(sampler) = &sampler {
            sampler.stop();
        }

        if let Some(series) = series {
            let report = CameraReport::build(&stream, requested, &series, checker.frame_stats());
            debug!(report = ?report, "Camera report");
            report.test_expectations(test);
        }
        test.done();
    }
}
