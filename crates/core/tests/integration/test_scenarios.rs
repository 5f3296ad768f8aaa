//! Network, throughput, bandwidth, camera and microphone scenarios

#[path = "../fixtures/loopback.rs"]
mod loopback;
#[path = "../fixtures/media.rs"]
mod media;

use loopback::{candidate, host_candidate, relay_candidate, LoopbackFactory, PeerScript};
use media::{tone, MockMedia};
use rtcscan_core::config::{IceSettings, ScanConfig};
use rtcscan_core::diagnostic::{run_diagnostic, TestOutcome, TracingSink};
use rtcscan_core::ice::IceConfigProvider;
use rtcscan_core::media::MediaProvider;
use rtcscan_core::peer::{MediaKind, StatsSelector};
use rtcscan_core::scenarios::{ScenarioContext, ScenarioKind};
use rtcscan_core::stats::StatsEntry;
use rtcscan_core::{LogLevel, TestState};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn turn_settings() -> IceSettings {
    IceSettings {
        turn_uri: Some("turn:turn.example.org:3478".to_string()),
        turn_username: Some("user".to_string()),
        turn_credential: Some("secret".to_string()),
        ..IceSettings::default()
    }
}

struct Setup {
    factory: Arc<LoopbackFactory>,
    settings: IceSettings,
    config: ScanConfig,
    media: Option<Arc<dyn MediaProvider>>,
}

impl Setup {
    fn new() -> Self {
        Self {
            factory: Arc::new(LoopbackFactory::new()),
            settings: turn_settings(),
            config: ScanConfig::default(),
            media: None,
        }
    }

    fn with_media(mut self, media: MockMedia) -> Self {
        self.media = Some(Arc::new(media));
        self
    }

    async fn run(&self, kind: ScenarioKind) -> TestOutcome {
        let mut ctx = ScenarioContext::new(
            self.factory.clone(),
            IceConfigProvider::from_settings(self.settings.clone()),
            self.config.clone(),
        );
        if let Some(media) = &self.media {
            ctx = ctx.with_media(Arc::clone(media));
        }
        let diagnostic = kind.build(Arc::new(ctx));
        run_diagnostic(diagnostic.as_ref(), Arc::new(TracingSink)).await
    }
}

fn messages(outcome: &TestOutcome, level: LogLevel) -> Vec<String> {
    outcome.entries_at(level).map(|e| e.message.clone()).collect()
}

fn ipv6_candidate() -> rtcscan_core::IceCandidate {
    candidate("candidate:4 1 udp 2122262783 2001:db8::1 50001 typ host")
}

#[tokio::test]
async fn test_udp_enabled_gathers_relay_candidate() {
    let setup = Setup::new();
    setup
        .factory
        .push_script(PeerScript::with_candidates(vec![host_candidate(), relay_candidate()]));

    let outcome = setup.run(ScenarioKind::UdpEnabled).await;

    assert_eq!(outcome.name, "udp-enabled");
    assert_eq!(outcome.state, TestState::Success);
    assert_eq!(
        messages(&outcome, LogLevel::Success),
        vec!["Gathered candidate of Type: relay Protocol: udp Address: 198.51.100.20".to_string()]
    );

    let peer = setup.factory.peer(0);
    assert_eq!(peer.transceivers(), vec![MediaKind::Audio]);
    assert_eq!(peer.close_count(), 1);
    assert_eq!(
        setup.factory.configs()[0].ice_servers[0].urls,
        vec!["turn:turn.example.org:3478?transport=udp".to_string()]
    );
}

#[tokio::test]
async fn test_tcp_enabled_fails_without_relay_candidate() {
    let setup = Setup::new();
    setup
        .factory
        .push_script(PeerScript::with_candidates(vec![host_candidate()]));

    let outcome = setup.run(ScenarioKind::TcpEnabled).await;

    assert_eq!(outcome.state, TestState::Error);
    assert_eq!(
        messages(&outcome, LogLevel::Error),
        vec!["Failed to gather specified candidates".to_string()]
    );
    assert_eq!(
        setup.factory.configs()[0].ice_servers[0].urls,
        vec!["turn:turn.example.org:3478?transport=tcp".to_string()]
    );
}

#[tokio::test]
async fn test_ipv6_enabled_gathers_ipv6_host() {
    let mut setup = Setup::new();
    setup.settings = IceSettings::default();
    setup
        .factory
        .push_script(PeerScript::with_candidates(vec![host_candidate(), ipv6_candidate()]));

    let outcome = setup.run(ScenarioKind::Ipv6Enabled).await;

    assert_eq!(outcome.state, TestState::Success);
    let config = &setup.factory.configs()[0];
    assert!(config.enable_ipv6);
    assert!(config.ice_servers.is_empty());
}

#[tokio::test]
async fn test_ipv6_missing_is_a_warning() {
    let setup = Setup::new();
    setup
        .factory
        .push_script(PeerScript::with_candidates(vec![host_candidate()]));

    let outcome = setup.run(ScenarioKind::Ipv6Enabled).await;

    assert_eq!(outcome.state, TestState::Warning);
    assert_eq!(
        messages(&outcome, LogLevel::Warning),
        vec!["Failed to gather IPv6 candidates, it might not be setup/supported on the network.".to_string()]
    );
}

#[tokio::test]
async fn test_ipv6_peer_creation_failure_is_a_warning() {
    let setup = Setup::new();
    setup.factory.push_script(PeerScript {
        fail_create: Some("address family not supported".to_string()),
        ..Default::default()
    });

    let outcome = setup.run(ScenarioKind::Ipv6Enabled).await;

    assert_eq!(outcome.state, TestState::Warning);
    assert_eq!(
        messages(&outcome, LogLevel::Warning),
        vec!["Failed to create peer connection, IPv6 might not be setup/supported on the network.".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_network_gathering_timeout() {
    let mut setup = Setup::new();
    setup.config.network.timeout_ms = 500;
    setup.factory.push_script(PeerScript {
        candidates: vec![host_candidate()],
        hold_gathering: true,
        ..Default::default()
    });

    let started = tokio::time::Instant::now();
    let outcome = setup.run(ScenarioKind::UdpEnabled).await;

    assert_eq!(outcome.state, TestState::Error);
    assert_eq!(
        messages(&outcome, LogLevel::Error),
        vec!["Failed to gather specified candidates".to_string()]
    );
    assert!(started.elapsed() >= std::time::Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn test_data_throughput_completes() {
    let mut setup = Setup::new();
    setup.config.throughput.duration_secs = 1;
    setup
        .factory
        .push_script(PeerScript::with_candidates(vec![relay_candidate()]));
    setup
        .factory
        .push_script(PeerScript::with_candidates(vec![relay_candidate()]));

    let outcome = setup.run(ScenarioKind::DataThroughput).await;

    assert_eq!(outcome.state, TestState::Success);
    let successes = messages(&outcome, LogLevel::Success);
    assert!(successes.iter().any(|m| m.starts_with("Transmitting at ")));
    assert!(successes
        .last()
        .is_some_and(|m| m.starts_with("Total transmitted: ") && m.ends_with(" seconds.")));
}

#[tokio::test(start_paused = true)]
async fn test_data_throughput_times_out_without_relay() {
    let mut setup = Setup::new();
    setup.config.throughput.overall_timeout_secs = 3;
    setup
        .factory
        .push_script(PeerScript::with_candidates(vec![host_candidate()]));
    setup
        .factory
        .push_script(PeerScript::with_candidates(vec![host_candidate()]));

    let outcome = setup.run(ScenarioKind::DataThroughput).await;

    assert_eq!(outcome.state, TestState::Error);
    assert_eq!(messages(&outcome, LogLevel::Error), vec!["Timed out".to_string()]);
}

fn legacy_video_stats(width: &str, height: &str) -> Vec<StatsEntry> {
    vec![
        StatsEntry::new("bweforvideo", "VideoBwe", 0.0).with_field("googAvailableSendBandwidth", "1600000"),
        StatsEntry::new("ssrc_1_send", "ssrc", 0.0)
            .with_field("googRtt", "40")
            .with_field("googFrameWidthSent", width)
            .with_field("googFrameHeightSent", height)
            .with_field("googFrameRateInput", "30")
            .with_field("googFrameRateSent", "29")
            .with_field("googAvgEncodeMs", "4")
            .with_field("packetsLost", "2"),
    ]
}

#[tokio::test(start_paused = true)]
async fn test_video_bandwidth_reports_estimates() {
    let mut setup = Setup::new().with_media(MockMedia::camera(1280, 720));
    setup.config.bandwidth.duration_ms = 1000;
    setup.factory.push_script(PeerScript {
        stats: vec![legacy_video_stats("1280", "720")],
        ..Default::default()
    });

    let outcome = setup.run(ScenarioKind::VideoBandwidth).await;

    assert_eq!(outcome.state, TestState::Success);
    assert_eq!(
        messages(&outcome, LogLevel::Success),
        vec!["Video resolution: 1280x720".to_string()]
    );
    let info = messages(&outcome, LogLevel::Info);
    assert!(info.contains(&"Send bandwidth estimate max: 1600000 bps".to_string()));
    assert!(info.contains(&"RTT average: 40 ms".to_string()));
    assert!(info.contains(&"Lost packets: 2".to_string()));

    let sender = setup.factory.peer(0);
    assert_eq!(sender.streams().len(), 1);
    assert!(sender.stats_calls() >= 10);
    let answer = &sender.remote_descriptions()[0].sdp;
    assert!(answer.contains("b=AS:2000\r\n"));
}

#[tokio::test(start_paused = true)]
async fn test_video_bandwidth_flags_broken_camera() {
    let mut setup = Setup::new().with_media(MockMedia::camera(1280, 720));
    setup.config.bandwidth.duration_ms = 500;
    setup.factory.push_script(PeerScript {
        stats: vec![legacy_video_stats("2", "2")],
        ..Default::default()
    });

    let outcome = setup.run(ScenarioKind::VideoBandwidth).await;

    assert_eq!(outcome.state, TestState::Error);
    assert_eq!(
        messages(&outcome, LogLevel::Error),
        vec!["Camera failure: 2x2. Cannot test bandwidth without a working camera.".to_string()]
    );
}

#[tokio::test]
async fn test_video_bandwidth_without_camera() {
    let setup = Setup::new().with_media(MockMedia::default());

    let outcome = setup.run(ScenarioKind::VideoBandwidth).await;

    assert_eq!(outcome.state, TestState::Error);
    assert_eq!(
        messages(&outcome, LogLevel::Error),
        vec!["Camera open failed: Media error: device not found".to_string()]
    );
    assert_eq!(setup.factory.peer_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_camera_resolution_passes_with_live_frames() {
    let mut setup = Setup::new().with_media(MockMedia::live_camera(1280, 720));
    setup.config.camera.duration_ms = 1000;
    setup.factory.push_script(PeerScript {
        selector_mode: Some(rtcscan_core::SelectorMode::RequiresStream),
        stats: vec![legacy_video_stats("1280", "720")],
        ..Default::default()
    });

    let outcome = setup.run(ScenarioKind::CameraResolution).await;

    assert_eq!(outcome.state, TestState::Success, "{:?}", outcome.entries);
    assert_eq!(
        messages(&outcome, LogLevel::Success),
        vec![
            "Average FPS above threshold".to_string(),
            "Captured video using expected resolution.".to_string(),
        ]
    );
    let info = messages(&outcome, LogLevel::Info);
    assert_eq!(info[0], "cameraName: Mock Camera");
    assert!(info.contains(&"avgSentFps: 29".to_string()));
    assert!(info.contains(&"encodeSetupTimeMs: 0".to_string()));
    assert!(matches!(
        setup.factory.peer(0).selectors().first(),
        Some(StatsSelector::Stream(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_camera_resolution_without_frames() {
    let mut setup = Setup::new().with_media(MockMedia::camera(640, 480));
    setup.config.camera.duration_ms = 500;

    let outcome = setup.run(ScenarioKind::CameraResolution).await;

    assert_eq!(outcome.state, TestState::Error);
    let errors = messages(&outcome, LogLevel::Error);
    assert!(errors.contains(&"Incorrect captured resolution.".to_string()));
    assert!(errors.contains(&"Could not analyze any video frame.".to_string()));
    assert!(messages(&outcome, LogLevel::Info).contains(&"Cannot verify sent FPS.".to_string()));
}

#[tokio::test]
async fn test_camera_open_failure() {
    let setup = Setup::new().with_media(MockMedia::default());

    let outcome = setup.run(ScenarioKind::CameraResolution).await;

    assert_eq!(outcome.state, TestState::Error);
    assert_eq!(
        messages(&outcome, LogLevel::Info),
        vec!["1280x720 not supported".to_string()]
    );
}

#[tokio::test]
async fn test_audio_capture_detects_mono_device() {
    let microphone = MockMedia::microphone(tone(2, 0.5, 20));
    let stopped = Arc::clone(&microphone.audio_stopped);
    let mut setup = Setup::new().with_media(microphone);
    setup.config.audio.collect_seconds = 0.1;

    let outcome = setup.run(ScenarioKind::AudioCapture).await;

    assert_eq!(outcome.state, TestState::Success, "{:?}", outcome.entries);
    assert_eq!(
        messages(&outcome, LogLevel::Success),
        vec!["Active audio input channels: 2".to_string()]
    );
    assert!(messages(&outcome, LogLevel::Info).contains(&"Mono microphone detected.".to_string()));
    assert!(stopped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_audio_capture_silence_is_error() {
    let mut setup = Setup::new().with_media(MockMedia::microphone(tone(1, 0.0, 20)));
    setup.config.audio.collect_seconds = 0.1;

    let outcome = setup.run(ScenarioKind::AudioCapture).await;

    assert_eq!(outcome.state, TestState::Error);
}

#[tokio::test]
async fn test_audio_capture_open_failure() {
    let setup = Setup::new().with_media(MockMedia::default());

    let outcome = setup.run(ScenarioKind::AudioCapture).await;

    assert_eq!(outcome.state, TestState::Error);
    assert_eq!(
        messages(&outcome, LogLevel::Error),
        vec!["Microphone open failed: Media error: permission denied".to_string()]
    );
}
