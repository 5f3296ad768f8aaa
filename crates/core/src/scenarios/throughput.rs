//! Data channel throughput over relay candidates
//!
//! The sender keeps the channel's buffered amount topped up for the
//! configured duration. The receiver reports the achieved rate once per
//! second and the total once everything sent has arrived.

use super::{next_event, ScenarioContext};
use crate::config::ThroughputConfig;
use crate::diagnostic::{Diagnostic, DiagnosticTest, LogLevel};
use crate::harness::{ConnectionHarness, HarnessConfig};
use crate::ice::CandidateCategory;
use crate::peer::{ChannelEvent, ChannelEventKind, DataChannel, PeerEvent, PeerEventKind};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

const SEND_STEP: Duration = Duration::from_millis(1);

/// Sender/receiver byte accounting
#[derive(Debug)]
struct Transfer {
    started: Option<Instant>,
    sent_bytes: usize,
    received_bytes: usize,
    last_measure: Option<Instant>,
    last_received_bytes: usize,
    stop_sending: bool,
}

impl Transfer {
    fn new() -> Self {
        Self {
            started: None,
            sent_bytes: 0,
            received_bytes: 0,
            last_measure: None,
            last_received_bytes: 0,
            stop_sending: false,
        }
    }

    /// Rate since the last report in kbps, once at least a second passed
    fn measure(&mut self, now: Instant) -> Option<f64> {
        let last = self.last_measure?;
        let elapsed_ms = now.duration_since(last).as_secs_f64() * 1000.0;
        if elapsed_ms < 1000.0 {
            return None;
        }
        let bytes_per_ms = (self.received_bytes - self.last_received_bytes) as f64 / elapsed_ms;
        self.last_received_bytes = self.received_bytes;
        self.last_measure = Some(now);
        Some((bytes_per_ms * 1000.0 * 8.0).round() / 1000.0)
    }

    fn is_complete(&self) -> bool {
        self.stop_sending && self.sent_bytes == self.received_bytes
    }

    fn summary(&self, now: Instant) -> String {
        let elapsed_ms = self
            .started
            .map_or(0.0, |s| now.duration_since(s).as_secs_f64() * 1000.0);
        let seconds = (elapsed_ms * 10.0).round() / 10000.0;
        let kilobits = self.received_bytes as f64 * 8.0 / 1000.0;
        format!("Total transmitted: {} kilo-bits in {} seconds.", kilobits, seconds)
    }
}

pub struct DataThroughputTest {
    ctx: Arc<ScenarioContext>,
}

impl DataThroughputTest {
    pub fn new(ctx: Arc<ScenarioContext>) -> Self {
        Self { ctx }
    }

    /// One sending step: fill the channel up to the buffered limit
    async fn send_step(
        channel: &dyn DataChannel,
        config: &ThroughputConfig,
        packet: &str,
        transfer: &mut Transfer,
    ) -> crate::error::Result<()> {
        let now = Instant::now();
        let started = *transfer.started.get_or_insert(now);
        transfer.last_measure.get_or_insert(now);

        let limit = config.bytes_to_keep_buffered();
        for _ in 0..config.max_packets_to_send {
            if channel.buffered_amount().await >= limit {
                break;
            }
            transfer.sent_bytes += packet.len();
            channel.send_text(packet).await?;
        }

        if now.duration_since(started) >= Duration::from_secs(config.duration_secs) {
            transfer.stop_sending = true;
        }
        Ok(())
    }

    async fn transfer(&self, harness: &ConnectionHarness, test: &mut DiagnosticTest) {
        let config = &self.ctx.config.throughput;
        let packet = "h".repeat(config.packet_size);

        let mut remote_channels = harness.pc2().events().subscribe(PeerEventKind::DataChannel);
        let sender = match harness.pc1().create_data_channel("").await {
            Ok(channel) => channel,
            Err(e) => {
                test.error(e.to_string());
                return;
            }
        };
        let mut sender_open = sender.events().subscribe(ChannelEventKind::Open);
        // Dropping the remote end closes the channel
        let mut _receiver = None;
        let mut receiver_messages = None;

        let negotiate = harness.establish_connection();
        tokio::pin!(negotiate);
        let mut negotiating = true;

        let overall = tokio::time::sleep(Duration::from_secs(config.overall_timeout_secs));
        tokio::pin!(overall);

        let mut ticker = tokio::time::interval(SEND_STEP);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sending = false;
        let mut transfer = Transfer::new();

        loop {
            tokio::select! {
                result = &mut negotiate, if negotiating => {
                    negotiating = false;
                    if let Err(e) = result {
                        test.error(e.to_string());
                        return;
                    }
                }
                Some(ChannelEvent::Open) = sender_open.recv() => {
                    debug!("Sender channel open, starting transfer");
                    sending = true;
                }
                Some(PeerEvent::DataChannel(channel)) = remote_channels.recv() => {
                    receiver_messages = Some(channel.events().subscribe(ChannelEventKind::Message));
                    _receiver = Some(channel);
                }
                _ = ticker.tick(), if sending => {
                    if let Err(e) = Self::send_step(sender.as_ref(), config, &packet, &mut transfer).await {
                        test.error(e.to_string());
                        return;
                    }
                    sending = !transfer.stop_sending;
                    // Everything may already have arrived
                    if transfer.is_complete() {
                        test.success(transfer.summary(Instant::now()));
                        return;
                    }
                }
                Some(ChannelEvent::Message(message)) = next_event(&mut receiver_messages) => {
                    transfer.received_bytes += message.len();
                    let now = Instant::now();
                    if let Some(kbps) = transfer.measure(now) {
                        test.success(format!("Transmitting at {} kbps.", kbps));
                    }
                    if transfer.is_complete() {
                        test.success(transfer.summary(now));
                        return;
                    }
                }
                _ = &mut overall => {
                    test.error("Timed out");
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl Diagnostic for DataThroughputTest {
    fn name(&self) -> &str {
        "data-throughput"
    }

    async fn run(&self, test: &mut DiagnosticTest) {
        let rtc_config = match self.ctx.ice.turn_config().await {
            Ok(config) => config,
            Err(e) => {
                test.report_fatal(LogLevel::Error, e.to_string());
                return;
            }
        };

        let harness_config = HarnessConfig::default()
            .with_filter(CandidateCategory::Relay)
            .with_fec_removed();
        let harness = match ConnectionHarness::new(self.ctx.factory.as_ref(), &rtc_config, harness_config).await {
            Ok(harness) => harness,
            Err(e) => {
                test.report_fatal(LogLevel::Error, e.to_string());
                return;
            }
        };

        self.transfer(&harness, test).await;
        harness.close().await;
        test.done();
    }
}
