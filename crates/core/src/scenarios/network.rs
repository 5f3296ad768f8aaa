//! Protocol reachability
//!
//! A single peer connection gathers candidates for an audio receive-only
//! offer. The test passes on the first candidate of the wanted category:
//! a UDP or TCP relay candidate through TURN servers restricted to that
//! transport, or an IPv6 host candidate.

use super::ScenarioContext;
use crate::diagnostic::{Diagnostic, DiagnosticTest, LogLevel};
use crate::ice::{filter_ice_servers, CandidateCategory, TransportProtocol};
use crate::peer::{MediaKind, PeerConnection, PeerEvent, PeerEventKind, RtcConfig};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct NetworkTest {
    ctx: Arc<ScenarioContext>,
    /// `None` for the IPv6 check, which needs no servers
    protocol: Option<TransportProtocol>,
    category: CandidateCategory,
    name: String,
}

impl NetworkTest {
    /// Relay reachability over `protocol`
    pub fn relay(ctx: Arc<ScenarioContext>, protocol: TransportProtocol) -> Self {
        Self {
            ctx,
            protocol: Some(protocol),
            category: CandidateCategory::Relay,
            name: format!("{}-enabled", protocol),
        }
    }

    /// IPv6 host candidate availability
    pub fn ipv6(ctx: Arc<ScenarioContext>) -> Self {
        Self {
            ctx,
            protocol: None,
            category: CandidateCategory::Ipv6,
            name: "ipv6-enabled".to_string(),
        }
    }

    fn is_ipv6(&self) -> bool {
        self.protocol.is_none()
    }

    fn failure(&self, test: &mut DiagnosticTest) {
        if self.is_ipv6() {
            test.warning("Failed to gather IPv6 candidates, it might not be setup/supported on the network.");
        } else {
            test.error("Failed to gather specified candidates");
        }
    }

    async fn rtc_config(&self) -> crate::error::Result<RtcConfig> {
        match self.protocol {
            Some(protocol) => {
                let config = self.ctx.ice.turn_config().await?;
                let servers = filter_ice_servers(&config.ice_servers, protocol);
                debug!(protocol = %protocol, servers = servers.len(), "Filtered ICE servers");
                Ok(RtcConfig::new(servers))
            }
            None => Ok(RtcConfig::default().with_ipv6(true)),
        }
    }

    /// Gather until a matching candidate, the end of gathering or the timeout
    async fn gather(&self, pc: &dyn PeerConnection, test: &mut DiagnosticTest) {
        let mut candidates = pc.events().subscribe(PeerEventKind::IceCandidate);

        let offer = async {
            pc.add_receive_transceiver(MediaKind::Audio).await?;
            let offer = pc.create_offer().await?;
            pc.set_local_description(offer).await
        };
        if let Err(e) = offer.await {
            test.error(e.to_string());
            return;
        }

        let deadline = tokio::time::sleep(Duration::from_millis(self.ctx.config.network.timeout_ms));
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                event = candidates.recv() => match event {
                    Some(PeerEvent::IceCandidate(Some(candidate))) => {
                        if self.category.matches(&candidate) {
                            test.success(format!("Gathered candidate of {}", candidate));
                            return;
                        }
                        debug!(candidate = %candidate, "Ignoring candidate");
                    }
                    Some(PeerEvent::IceCandidate(None)) | None => {
                        debug!("Gathering finished without a matching candidate");
                        self.failure(test);
                        return;
                    }
                    Some(PeerEvent::DataChannel(_)) => {}
                },
                _ = &mut deadline => {
                    debug!("Gathering timed out");
                    self.failure(test);
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl Diagnostic for NetworkTest {
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

        let pc = match self.ctx.factory.create(&rtc_config).await {
            Ok(pc) => pc,
            Err(e) => {
                if self.is_ipv6() {
                    test.report_fatal(
                        LogLevel::Warning,
                        "Failed to create peer connection, IPv6 might not be setup/supported on the network.",
                    );
                } else {
                    test.report_fatal(LogLevel::Error, format!("Failed to create peer connection: {}", e));
                }
                return;
            }
        };

        self.gather(pc.as_ref(), test).await;
        if let Err(e) = pc.close().await {
            warn!("Failed to close peer connection: {}", e);
        }
        test.done();
    }
}
