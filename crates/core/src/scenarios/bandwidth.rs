//! Video bandwidth estimation ramp-up
//!
//! Runs a capped video call over relay candidates and feeds the sender's
//! bandwidth estimate into a [`StatisticsAggregate`] whose threshold is 75%
//! of the cap, which yields the ramp-up time. Both legacy (`goog*` fields)
//! and standard stats are understood.

use super::{format_value, ScenarioContext};
use crate::diagnostic::{Diagnostic, DiagnosticTest, LogLevel};
use crate::harness::{ConnectionHarness, HarnessConfig};
use crate::ice::CandidateCategory;
use crate::media::{LocalStream, VideoConstraints};
use crate::stats::{StatisticsAggregate, StatsEntry, StatsSeries};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Share of the bitrate cap counted as "ramped up"
const RAMP_UP_FRACTION: f64 = 0.75;

/// Aggregated result of one bandwidth run
#[derive(Debug, Clone)]
pub struct BandwidthReport {
    pub bwe: StatisticsAggregate,
    pub rtt: StatisticsAggregate,
    pub frame_width: f64,
    pub frame_height: f64,
    pub packets_lost: f64,
}

impl BandwidthReport {
    /// Empty report for a `max_kbps` cap
    pub fn new(max_kbps: u32) -> Self {
        Self {
            bwe: StatisticsAggregate::new(RAMP_UP_FRACTION * f64::from(max_kbps) * 1000.0),
            rtt: StatisticsAggregate::default(),
            frame_width: 0.0,
            frame_height: 0.0,
            packets_lost: 0.0,
        }
    }

    /// Fold a polled series into the report.
    ///
    /// Samples are timed by their poll capture time so the ramp-up is
    /// measured on the same clock for every stack.
    pub fn from_series(max_kbps: u32, series: &StatsSeries) -> Self {
        let mut report = Self::new(max_kbps);
        for (entry, captured_at) in series.iter() {
            report.add(entry, captured_at as f64);
        }
        report
    }

    fn add(&mut self, entry: &StatsEntry, time: f64) {
        if entry.id == "bweforvideo" {
            if let Some(bwe) = entry.number("googAvailableSendBandwidth") {
                self.bwe.add(time, bwe.trunc());
            }
            return;
        }

        match entry.kind.as_str() {
            "ssrc" => {
                if let Some(rtt) = entry.number("googRtt") {
                    self.rtt.add(time, rtt.trunc());
                }
                // Last values win
                if let Some(width) = entry.number("googFrameWidthSent") {
                    self.frame_width = width;
                }
                if let Some(height) = entry.number("googFrameHeightSent") {
                    self.frame_height = height;
                }
                if let Some(lost) = entry.number("packetsLost") {
                    self.packets_lost = lost;
                }
            }
            "candidate-pair" if is_active_pair(entry) => {
                if let Some(bitrate) = entry.number("availableOutgoingBitrate") {
                    self.bwe.add(time, bitrate.trunc());
                }
                if let Some(rtt) = entry.number("currentRoundTripTime") {
                    self.rtt.add(time, (rtt * 1000.0).round());
                }
            }
            "outbound-rtp" if is_video(entry) => {
                if let Some(width) = entry.number("frameWidth") {
                    self.frame_width = width;
                }
                if let Some(height) = entry.number("frameHeight") {
                    self.frame_height = height;
                }
            }
            "remote-inbound-rtp" if is_video(entry) => {
                if let Some(lost) = entry.number("packetsLost") {
                    self.packets_lost = lost;
                }
            }
            _ => {}
        }
    }

    /// Stacks report 2x2 when a camera starts but never delivers frames
    pub fn camera_working(&self) -> bool {
        !(self.frame_width <= 2.0 && self.frame_height <= 2.0)
    }

    /// Write the report to the test log
    pub fn log_to(&self, test: &mut DiagnosticTest) {
        let resolution = format!(
            "{}x{}",
            format_value(self.frame_width),
            format_value(self.frame_height)
        );
        if self.camera_working() {
            test.success(format!("Video resolution: {}", resolution));
            test.info(format!(
                "Send bandwidth estimate average: {} bps",
                format_value(self.bwe.average())
            ));
            test.info(format!(
                "Send bandwidth estimate max: {} bps",
                format_value(self.bwe.max())
            ));
            test.info(format!(
                "Send bandwidth ramp-up time: {} ms",
                format_value(self.bwe.ramp_up_time())
            ));
        } else {
            test.error(format!(
                "Camera failure: {}. Cannot test bandwidth without a working camera.",
                resolution
            ));
        }
        test.info(format!("RTT average: {} ms", format_value(self.rtt.average())));
        test.info(format!("RTT max: {} ms", format_value(self.rtt.max())));
        test.info(format!("Lost packets: {}", format_value(self.packets_lost)));
    }
}

fn is_video(entry: &StatsEntry) -> bool {
    entry
        .text("kind")
        .or_else(|| entry.text("mediaType"))
        .map_or(true, |kind| kind == "video")
}

fn is_active_pair(entry: &StatsEntry) -> bool {
    entry.fields.get("nominated").and_then(|v| v.as_bool()) == Some(true)
        || entry.text("state") == Some("succeeded")
}

pub struct VideoBandwidthTest {
    ctx: Arc<ScenarioContext>,
}

impl VideoBandwidthTest {
    pub fn new(ctx: Arc<ScenarioContext>) -> Self {
        Self { ctx }
    }

    async fn call(
        &self,
        harness: &ConnectionHarness,
        stream: &LocalStream,
        test: &mut DiagnosticTest,
    ) -> Option<StatsSeries> {
        let config = &self.ctx.config.bandwidth;

        if let Err(e) = harness.pc1().add_local_stream(stream).await {
            test.error(e.to_string());
            return None;
        }
        if let Err(e) = harness.establish_connection().await {
            test.error(e.to_string());
            return None;
        }

        let stop = CancellationToken::new();
        let timer = {
            let stop = stop.clone();
            let duration = config.duration();
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                stop.cancel();
            })
        };

        let series = harness.gather_stats(harness.pc1(), Some(stream), stop.clone()).await;
        stop.cancel();
        timer.abort();

        match series {
            Ok(series) => Some(series),
            Err(e) => {
                test.error(e.to_string());
                None
            }
        }
    }
}

#[async_trait]
impl Diagnostic for VideoBandwidthTest {
    fn name(&self) -> &str {
        "video-bandwidth"
    }

    async fn run(&self, test: &mut DiagnosticTest) {
        let config = &self.ctx.config.bandwidth;

        let rtc_config = match self.ctx.ice.turn_config().await {
            Ok(config) => config,
            Err(e) => {
                test.report_fatal(LogLevel::Error, e.to_string());
                return;
            }
        };

        let Some(media) = self.ctx.media.as_ref() else {
            test.report_fatal(LogLevel::Error, "Camera open failed: no media provider");
            return;
        };
        // 720p gives a meaningful ramp-up time
        let stream = match media.open_video(&VideoConstraints::new(1280, 720)).await {
            Ok(stream) => stream,
            Err(e) => {
                test.report_fatal(LogLevel::Error, format!("Camera open failed: {}", e));
                return;
            }
        };

        let harness_config = HarnessConfig::default()
            .with_filter(CandidateCategory::Relay)
            .with_video_bitrate_cap(config.max_video_bitrate_kbps)
            .with_fec_removed()
            .with_stat_step(config.stat_step());
        let harness = match ConnectionHarness::new(self.ctx.factory.as_ref(), &rtc_config, harness_config).await {
            Ok(harness) => harness,
            Err(e) => {
                stream.stop();
                test.report_fatal(LogLevel::Error, e.to_string());
                return;
            }
        };

        let series = self.call(&harness, &stream, test).await;
        stream.stop();
        harness.close().await;

        if let Some(series) = series {
            debug!(entries = series.len(), "Analyzing bandwidth stats");
            let report = BandwidthReport::from_series(config.max_video_bitrate_kbps, &series);
            info!(
                bwe_samples = report.bwe.count(),
                rtt_samples = report.rtt.count(),
                "Bandwidth run complete"
            );
            report.log_to(test);
        }
        test.done();
    }
}
