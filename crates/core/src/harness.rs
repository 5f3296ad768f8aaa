//! Loopback connection harness
//!
//! [`ConnectionHarness`] owns two peer connections talking to each other in
//! the same process. It:
//!
//! - relays local ICE candidates from each side to the other, but only those
//!   accepted by the configured [`CandidateFilter`], so a test controls which
//!   paths the two ends can use
//! - runs the offer/answer exchange, optionally patching the SDP
//! - polls connection statistics until the connection closes or the caller
//!   cancels
//!
//! Both connections live and die with the harness; [`close`] shuts down both
//! and is safe to call more than once.
//!
//! [`close`]: ConnectionHarness::close

use crate::error::{Error, Result};
use crate::events::{EventRegistry, Subscription, TaggedEvent};
use crate::ice::{CandidateFilter, IceCandidate};
use crate::media::LocalStream;
use crate::peer::{
    PeerConnection, PeerConnectionFactory, PeerEvent, PeerEventKind, RtcConfig, SignalingState,
    StatsSelector,
};
use crate::sdp;
use crate::stats::StatsSeries;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Default delay between two stats polls
pub const DEFAULT_STAT_STEP: Duration = Duration::from_millis(100);

/// Negotiation and relay settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Candidates relayed between the peers
    pub filter: CandidateFilter,
    /// Inject `b=AS:<kbps>` into the answer's video section
    pub constrain_video_bitrate_kbps: Option<u32>,
    /// Strip RED/ULPFEC from the offer
    pub remove_video_fec: bool,
    /// Delay between stats polls
    pub stat_step: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            filter: CandidateFilter::Any,
            constrain_video_bitrate_kbps: None,
            remove_video_fec: false,
            stat_step: DEFAULT_STAT_STEP,
        }
    }
}

impl HarnessConfig {
    pub fn with_filter(mut self, filter: impl Into<CandidateFilter>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_video_bitrate_cap(mut self, kbps: u32) -> Self {
        self.constrain_video_bitrate_kbps = Some(kbps);
        self
    }

    pub fn with_fec_removed(mut self) -> Self {
        self.remove_video_fec = true;
        self
    }

    pub fn with_stat_step(mut self, step: Duration) -> Self {
        self.stat_step = step;
        self
    }
}

/// Which of the two peers an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The offerer
    First,
    /// The answerer
    Second,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::First => f.write_str("pc1"),
            Side::Second => f.write_str("pc2"),
        }
    }
}

/// Events raised by the harness
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarnessEvent {
    /// A side gathered a local candidate; `relayed` tells whether it passed
    /// the filter and was handed to the other side
    Candidate {
        side: Side,
        candidate: IceCandidate,
        relayed: bool,
    },
    /// A side finished gathering
    GatheringComplete { side: Side },
    /// Offer and answer were applied on both sides
    NegotiationDone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HarnessEventKind {
    Candidate,
    GatheringComplete,
    NegotiationDone,
}

impl TaggedEvent for HarnessEvent {
    type Kind = HarnessEventKind;

    fn kind(&self) -> HarnessEventKind {
        match self {
            HarnessEvent::Candidate { .. } => HarnessEventKind::Candidate,
            HarnessEvent::GatheringComplete { .. } => HarnessEventKind::GatheringComplete,
            HarnessEvent::NegotiationDone => HarnessEventKind::NegotiationDone,
        }
    }
}

/// Clears the gathering flag when a poll loop ends or is dropped
struct GatheringGuard<'a>(&'a AtomicBool);

impl Drop for GatheringGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Two connected peers plus the candidate relay between them
pub struct ConnectionHarness {
    pc1: Arc<dyn PeerConnection>,
    pc2: Arc<dyn PeerConnection>,
    config: RwLock<HarnessConfig>,
    filter: Arc<RwLock<CandidateFilter>>,
    events: Arc<EventRegistry<HarnessEvent>>,
    gathering_stats: AtomicBool,
    closed: AtomicBool,
    shutdown: CancellationToken,
    relay_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ConnectionHarness {
    /// Create both peers from `factory` and start relaying candidates.
    ///
    /// If the second peer cannot be created the first one is closed again.
    pub async fn new(
        factory: &dyn PeerConnectionFactory,
        rtc_config: &RtcConfig,
        config: HarnessConfig,
    ) -> Result<Self> {
        let pc1 = factory.create(rtc_config).await?;
        let pc2 = match factory.create(rtc_config).await {
            Ok(pc) => pc,
            Err(e) => {
                if let Err(close_err) = pc1.close().await {
                    debug!("Closing first peer after setup failure: {}", close_err);
                }
                return Err(e);
            }
        };
        Ok(Self::from_peers(pc1, pc2, config))
    }

    /// Wrap two existing peers. Must be called inside a tokio runtime.
    pub fn from_peers(
        pc1: Arc<dyn PeerConnection>,
        pc2: Arc<dyn PeerConnection>,
        config: HarnessConfig,
    ) -> Self {
        let filter = Arc::new(RwLock::new(config.filter));
        let events = Arc::new(EventRegistry::buffered());
        let shutdown = CancellationToken::new();

        let relay_tasks = vec![
            tokio::spawn(relay_candidates(
                Side::First,
                pc1.events().subscribe(PeerEventKind::IceCandidate),
                Arc::clone(&pc2),
                Arc::clone(&filter),
                Arc::clone(&events),
                shutdown.child_token(),
            )),
            tokio::spawn(relay_candidates(
                Side::Second,
                pc2.events().subscribe(PeerEventKind::IceCandidate),
                Arc::clone(&pc1),
                Arc::clone(&filter),
                Arc::clone(&events),
                shutdown.child_token(),
            )),
        ];

        debug!(filter = ?config.filter, "Connection harness created");

        Self {
            pc1,
            pc2,
            config: RwLock::new(config),
            filter,
            events,
            gathering_stats: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            shutdown,
            relay_tasks: Mutex::new(relay_tasks),
        }
    }

    /// The offering peer
    pub fn pc1(&self) -> &Arc<dyn PeerConnection> {
        &self.pc1
    }

    /// The answering peer
    pub fn pc2(&self) -> &Arc<dyn PeerConnection> {
        &self.pc2
    }

    pub fn events(&self) -> &EventRegistry<HarnessEvent> {
        &self.events
    }

    pub fn config(&self) -> HarnessConfig {
        self.config.read().clone()
    }

    /// Change which candidates are relayed from now on
    pub fn set_filter(&self, filter: impl Into<CandidateFilter>) {
        let filter = filter.into();
        *self.filter.write() = filter;
        self.config.write().filter = filter;
    }

    pub fn set_video_bitrate_cap(&self, kbps: Option<u32>) {
        self.config.write().constrain_video_bitrate_kbps = kbps;
    }

    pub fn set_remove_video_fec(&self, remove: bool) {
        self.config.write().remove_video_fec = remove;
    }

    pub fn is_gathering_stats(&self) -> bool {
        self.gathering_stats.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Token cancelled when the harness closes
    pub fn stop_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// Run the offer/answer exchange between the two peers.
    ///
    /// pc1 offers, pc2 answers. The offer is stripped of video FEC and the
    /// answer gets a bandwidth cap when configured; both patches are applied
    /// before the descriptions are set on either side.
    pub async fn establish_connection(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let config = self.config();

        let mut offer = self.pc1.create_offer().await.map_err(negotiation("create offer"))?;
        if config.remove_video_fec {
            offer = offer.map_sdp(sdp::remove_video_fec);
        }
        self.pc1
            .set_local_description(offer.clone())
            .await
            .map_err(negotiation("apply local offer"))?;
        self.pc2
            .set_remote_description(offer)
            .await
            .map_err(negotiation("apply remote offer"))?;

        let mut answer = self.pc2.create_answer().await.map_err(negotiation("create answer"))?;
        if let Some(kbps) = config.constrain_video_bitrate_kbps {
            answer = answer.map_sdp(|s| sdp::constrain_video_bitrate(s, kbps));
        }
        self.pc2
            .set_local_description(answer.clone())
            .await
            .map_err(negotiation("apply local answer"))?;
        self.pc1
            .set_remote_description(answer)
            .await
            .map_err(negotiation("apply remote answer"))?;

        info!("Loopback negotiation complete");
        self.events.emit(HarnessEvent::NegotiationDone);
        Ok(())
    }

    /// Poll `pc` for statistics until it closes or `stop` fires.
    ///
    /// Each poll appends every returned entry with the capture time. A poll
    /// that completes after the connection closed or `stop` fired is
    /// discarded. A failing poll ends the loop and is only logged.
    ///
    /// # Arguments
    /// * `pc` - Connection to poll, normally one of the harness peers
    /// * `stream` - Local stream, used as the selector on stacks requiring one
    /// * `stop` - Cancels the loop between polls
    ///
    /// # Returns
    /// The accumulated series, or an error if a poll loop is already running
    pub async fn gather_stats(
        &self,
        pc: &Arc<dyn PeerConnection>,
        stream: Option<&LocalStream>,
        stop: CancellationToken,
    ) -> Result<StatsSeries> {
        if self.gathering_stats.swap(true, Ordering::SeqCst) {
            return Err(Error::Other("stats gathering already running".to_string()));
        }
        let _guard = GatheringGuard(&self.gathering_stats);

        let step = self.config.read().stat_step;
        let selector = StatsSelector::for_mode(pc.stats_selector_mode(), stream);
        let mut series = StatsSeries::new();

        loop {
            if stop.is_cancelled() || pc.signaling_state() == SignalingState::Closed {
                break;
            }

            match pc.get_stats(&selector).await {
                Ok(entries) => {
                    if stop.is_cancelled() || pc.signaling_state() == SignalingState::Closed {
                        trace!("Discarding stats poll that finished after close");
                        break;
                    }
                    series.push_snapshot(entries, chrono::Utc::now().timestamp_millis());
                }
                Err(e) => {
                    warn!("Could not gather stats: {}", e);
                    break;
                }
            }

            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(step) => {}
            }
        }

        debug!(entries = series.len(), "Stats gathering finished");
        Ok(series)
    }

    /// Close both peers and stop relaying. Later calls are no-ops.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            trace!("Connection harness already closed");
            return;
        }

        self.shutdown.cancel();
        for task in self.relay_tasks.lock().drain(..) {
            task.abort();
        }

        let (first, second) = futures::join!(self.pc1.close(), self.pc2.close());
        if let Err(e) = first {
            warn!("Failed to close pc1: {}", e);
        }
        if let Err(e) = second {
            warn!("Failed to close pc2: {}", e);
        }
        info!("Connection harness closed");
    }
}

impl Drop for ConnectionHarness {
    fn drop(&mut self) {
        self.shutdown.cancel();
        for task in self.relay_tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

fn negotiation(step: &'static str) -> impl Fn(Error) -> Error {
    move |e| Error::Negotiation(format!("{}: {}", step, e))
}

/// Forward `side`'s local candidates to `remote`, in gathering order
async fn relay_candidates(
    side: Side,
    mut candidates: Subscription<PeerEvent>,
    remote: Arc<dyn PeerConnection>,
    filter: Arc<RwLock<CandidateFilter>>,
    events: Arc<EventRegistry<HarnessEvent>>,
    stop: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = stop.cancelled() => break,
            event = candidates.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            PeerEvent::IceCandidate(Some(candidate)) => {
                let relayed = filter.read().accepts(&candidate);
                if relayed {
                    trace!(%side, candidate = %candidate, "Relaying candidate");
                    if let Err(e) = remote.add_ice_candidate(candidate.clone()).await {
                        warn!(%side, "Failed to add relayed candidate: {}", e);
                    }
                } else {
                    trace!(%side, candidate = %candidate, "Candidate filtered out");
                }
                events.emit(HarnessEvent::Candidate {
                    side,
                    candidate,
                    relayed,
                });
            }
            PeerEvent::IceCandidate(None) => {
                events.emit(HarnessEvent::GatheringComplete { side });
            }
            PeerEvent::DataChannel(_) => {}
        }
    }
    trace!(%side, "Candidate relay stopped");
}
