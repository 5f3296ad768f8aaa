//! Data channel connectivity over one candidate category
//!
//! pc1 opens a channel and sends `hello`; pc2 answers `world`. Only
//! candidates of the tested category are relayed, so the exchange can only
//! succeed over that kind of path.

use super::{next_event, ScenarioContext};
use crate::diagnostic::{Diagnostic, DiagnosticTest, LogLevel};
use crate::error::Error;
use crate::harness::{ConnectionHarness, HarnessConfig, HarnessEvent, HarnessEventKind, Side};
use crate::ice::{CandidateCategory, IceCandidate};
use crate::peer::{ChannelEvent, ChannelEventKind, PeerEvent, PeerEventKind, RtcConfig};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const PING: &str = "hello";
const PONG: &str = "world";
const INVALID_DATA: &str = "Invalid data transmitted.";
const TIMED_OUT: &str = "Timed out";

pub struct ConnectivityTest {
    ctx: Arc<ScenarioContext>,
    category: CandidateCategory,
    name: String,
}

impl ConnectivityTest {
    pub fn new(ctx: Arc<ScenarioContext>, category: CandidateCategory) -> Self {
        Self {
            ctx,
            category,
            name: format!("{}-connectivity", category),
        }
    }

    pub fn category(&self) -> CandidateCategory {
        self.category
    }

    async fn rtc_config(&self) -> crate::error::Result<RtcConfig> {
        match self.ctx.ice.turn_config().await {
            // Host paths need no servers
            Err(Error::Credentials(reason)) if self.category == CandidateCategory::Host => {
                debug!("No ICE servers for host connectivity: {}", reason);
                Ok(RtcConfig::default())
            }
            other => other,
        }
    }

    async fn exchange(&self, harness: &ConnectionHarness, test: &mut DiagnosticTest) -> Option<&'static str> {
        let mut gathered: Vec<IceCandidate> = Vec::new();
        let mut candidates = harness.events().subscribe(HarnessEventKind::Candidate);
        let mut remote_channels = harness.pc2().events().subscribe(PeerEventKind::DataChannel);

        let ch1 = match harness.pc1().create_data_channel("").await {
            Ok(ch) => ch,
            Err(e) => {
                test.error(e.to_string());
                return None;
            }
        };
        let mut ch1_events = ch1.events().subscribe_many(&[ChannelEventKind::Open, ChannelEventKind::Message]);
        let mut ch2 = None;
        let mut ch2_messages = None;

        let negotiate = harness.establish_connection();
        tokio::pin!(negotiate);
        let mut negotiating = true;

        let deadline = tokio::time::sleep(Duration::from_millis(self.ctx.config.connectivity.timeout_ms));
        tokio::pin!(deadline);

        let hangup = loop {
            // Candidates are logged before the exchange can finish
            tokio::select! {
                biased;
                result = &mut negotiate, if negotiating => {
                    negotiating = false;
                    if let Err(e) = result {
                        test.error(e.to_string());
                        break None;
                    }
                }
                Some(HarnessEvent::Candidate { side, candidate, .. }) = candidates.recv() => {
                    if side == Side::First {
                        if self.category.matches(&candidate) {
                            test.info(format!("Gathered candidate of {}", candidate));
                        }
                        gathered.push(candidate);
                    }
                }
                Some(PeerEvent::DataChannel(channel)) = remote_channels.recv() => {
                    ch2_messages = Some(channel.events().subscribe(ChannelEventKind::Message));
                    ch2 = Some(channel);
                }
                Some(event) = ch1_events.recv() => match event {
                    ChannelEvent::Open => {
                        if let Err(e) = ch1.send_text(PING).await {
                            test.error(e.to_string());
                            break None;
                        }
                    }
                    ChannelEvent::Message(message) => {
                        if message.as_text() == Some(PONG) {
                            test.success("Data successfully transmitted between peers.");
                        } else {
                            test.error(INVALID_DATA);
                        }
                        break None;
                    }
                    ChannelEvent::Close => {}
                },
                Some(ChannelEvent::Message(message)) = next_event(&mut ch2_messages) => {
                    if message.as_text() != Some(PING) {
                        break Some(INVALID_DATA);
                    }
                    if let Some(ch2) = &ch2 {
                        if let Err(e) = ch2.send_text(PONG).await {
                            test.error(e.to_string());
                            break None;
                        }
                    }
                }
                _ = &mut deadline => break Some(TIMED_OUT),
            }
        };

        if hangup == Some(TIMED_OUT)
            && self.category == CandidateCategory::Reflexive
            && gathered.iter().any(|c| CandidateCategory::Reflexive.matches(c))
        {
            test.warning(
                "Could not connect using reflexive candidates, likely due to the network environment/configuration.",
            );
            return None;
        }
        hangup
    }
}

#[async_trait]
impl Diagnostic for ConnectivityTest {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, test: &mut DiagnosticTest) {
        let rtc_config = match self.rtc_config().await {
            Ok(config) => config,
            Err(e) => {
                test.report_fatal(LogLevel::Error, e.to_string());
                return;
            }
        };

        let harness_config = HarnessConfig::default().with_filter(self.category);
        let harness = match ConnectionHarness::new(self.ctx.factory.as_ref(), &rtc_config, harness_config).await {
            Ok(harness) => harness,
            Err(e) => {
                test.report_fatal(LogLevel::Error, e.to_string());
                return;
            }
        };

        if let Some(message) = self.exchange(&harness, test).await {
            test.error(message);
        }
        harness.close().await;
        test.done();
    }
}
