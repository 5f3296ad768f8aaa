//! Data channel connectivity scenarios over the loopback stack

#[path = "../fixtures/loopback.rs"]
mod loopback;

use loopback::{host_candidate, relay_candidate, srflx_candidate, LoopbackFactory, PeerScript};
use rtcscan_core::config::{IceSettings, ScanConfig};
use rtcscan_core::diagnostic::{run_diagnostic, ChannelSink, ReportEvent, TestOutcome, TracingSink};
use rtcscan_core::ice::IceConfigProvider;
use rtcscan_core::scenarios::{ScenarioContext, ScenarioKind};
use rtcscan_core::{LogLevel, TestState};
use std::sync::Arc;

fn turn_settings() -> IceSettings {
    IceSettings {
        turn_uri: Some("turn:turn.example.org:3478".to_string()),
        turn_username: Some("user".to_string()),
        turn_credential: Some("secret".to_string()),
        ..IceSettings::default()
    }
}

fn context(factory: &Arc<LoopbackFactory>, settings: IceSettings, timeout_ms: u64) -> Arc<ScenarioContext> {
    let mut config = ScanConfig::default();
    config.connectivity.timeout_ms = timeout_ms;
    Arc::new(ScenarioContext::new(
        factory.clone(),
        IceConfigProvider::from_settings(settings),
        config,
    ))
}

async fn run(kind: ScenarioKind, ctx: Arc<ScenarioContext>) -> TestOutcome {
    let diagnostic = kind.build(ctx);
    run_diagnostic(diagnostic.as_ref(), Arc::new(TracingSink)).await
}

fn messages(outcome: &TestOutcome, level: LogLevel) -> Vec<String> {
    outcome.entries_at(level).map(|e| e.message.clone()).collect()
}

#[tokio::test]
async fn test_host_connectivity_without_ice_servers() {
    let factory = Arc::new(LoopbackFactory::new());
    factory.push_script(PeerScript::with_candidates(vec![host_candidate(), srflx_candidate()]));
    factory.push_script(PeerScript::with_candidates(vec![host_candidate()]));

    let outcome = run(
        ScenarioKind::HostConnectivity,
        context(&factory, IceSettings::default(), 5000),
    )
    .await;

    assert_eq!(outcome.name, "host-connectivity");
    assert_eq!(outcome.state, TestState::Success);
    assert_eq!(
        messages(&outcome, LogLevel::Success),
        vec!["Data successfully transmitted between peers.".to_string()]
    );
    assert_eq!(
        messages(&outcome, LogLevel::Info),
        vec!["Gathered candidate of Type: host Protocol: udp Address: 192.168.1.10".to_string()]
    );
    assert!(factory.configs()[0].ice_servers.is_empty());
    assert_eq!(factory.peer(0).close_count(), 1);
    assert_eq!(factory.peer(1).close_count(), 1);
}

#[tokio::test]
async fn test_relay_connectivity_uses_turn_servers() {
    let factory = Arc::new(LoopbackFactory::new());
    factory.push_script(PeerScript::with_candidates(vec![host_candidate(), relay_candidate()]));
    factory.push_script(PeerScript::with_candidates(vec![relay_candidate()]));

    let outcome = run(
        ScenarioKind::RelayConnectivity,
        context(&factory, turn_settings(), 5000),
    )
    .await;

    assert_eq!(outcome.state, TestState::Success);
    assert_eq!(
        factory.configs()[0].ice_servers[0].urls,
        vec!["turn:turn.example.org:3478".to_string()]
    );
    assert_eq!(factory.peer(1).received_candidates(), vec![relay_candidate()]);
}

#[tokio::test(start_paused = true)]
async fn test_relay_connectivity_times_out_without_relay_candidates() {
    let factory = Arc::new(LoopbackFactory::new());
    factory.push_script(PeerScript::with_candidates(vec![host_candidate()]));
    factory.push_script(PeerScript::with_candidates(vec![host_candidate()]));

    let outcome = run(
        ScenarioKind::RelayConnectivity,
        context(&factory, turn_settings(), 2000),
    )
    .await;

    assert_eq!(outcome.state, TestState::Error);
    assert_eq!(messages(&outcome, LogLevel::Error), vec!["Timed out".to_string()]);
    assert_eq!(factory.peer(1).add_candidate_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reflexive_timeout_downgrades_to_warning() {
    let factory = Arc::new(LoopbackFactory::new());
    // The answerer gathers nothing, so the pair never connects
    factory.push_script(PeerScript::with_candidates(vec![srflx_candidate()]));
    factory.push_script(PeerScript::default());

    let outcome = run(
        ScenarioKind::ReflexiveConnectivity,
        context(&factory, turn_settings(), 2000),
    )
    .await;

    assert_eq!(outcome.state, TestState::Warning);
    assert!(messages(&outcome, LogLevel::Error).is_empty());
    assert_eq!(
        messages(&outcome, LogLevel::Warning),
        vec!["Could not connect using reflexive candidates, likely due to the network environment/configuration.".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_reflexive_timeout_without_reflexive_candidates_is_error() {
    let factory = Arc::new(LoopbackFactory::new());
    factory.push_script(PeerScript::with_candidates(vec![host_candidate()]));
    factory.push_script(PeerScript::default());

    let outcome = run(
        ScenarioKind::ReflexiveConnectivity,
        context(&factory, turn_settings(), 2000),
    )
    .await;

    assert_eq!(outcome.state, TestState::Error);
    assert_eq!(messages(&outcome, LogLevel::Error), vec!["Timed out".to_string()]);
}

#[tokio::test]
async fn test_corrupted_reply_is_invalid_data() {
    let factory = Arc::new(LoopbackFactory::new());
    factory.push_script(PeerScript::with_candidates(vec![host_candidate()]));
    factory.push_script(PeerScript {
        candidates: vec![host_candidate()],
        corrupt_outgoing: Some("garbage".to_string()),
        ..Default::default()
    });

    let outcome = run(
        ScenarioKind::HostConnectivity,
        context(&factory, IceSettings::default(), 5000),
    )
    .await;

    assert_eq!(outcome.state, TestState::Error);
    assert_eq!(
        messages(&outcome, LogLevel::Error),
        vec!["Invalid data transmitted.".to_string()]
    );
}

#[tokio::test]
async fn test_corrupted_request_is_invalid_data() {
    let factory = Arc::new(LoopbackFactory::new());
    factory.push_script(PeerScript {
        candidates: vec![host_candidate()],
        corrupt_outgoing: Some("garbage".to_string()),
        ..Default::default()
    });
    factory.push_script(PeerScript::with_candidates(vec![host_candidate()]));

    let outcome = run(
        ScenarioKind::HostConnectivity,
        context(&factory, IceSettings::default(), 5000),
    )
    .await;

    assert_eq!(outcome.state, TestState::Error);
    assert!(messages(&outcome, LogLevel::Success).is_empty());
    assert_eq!(
        messages(&outcome, LogLevel::Error),
        vec!["Invalid data transmitted.".to_string()]
    );
}

#[tokio::test]
async fn test_relay_connectivity_without_servers_fails_fast() {
    let factory = Arc::new(LoopbackFactory::new());

    let outcome = run(
        ScenarioKind::RelayConnectivity,
        context(&factory, IceSettings::default(), 5000),
    )
    .await;

    assert_eq!(outcome.state, TestState::Error);
    assert_eq!(factory.peer_count(), 0);
}

#[tokio::test]
async fn test_report_events_reach_channel_sink() {
    let factory = Arc::new(LoopbackFactory::new());
    factory.push_script(PeerScript::with_candidates(vec![host_candidate()]));
    factory.push_script(PeerScript::with_candidates(vec![host_candidate()]));
    let (sink, mut events) = ChannelSink::with_default_capacity();

    let diagnostic = ScenarioKind::HostConnectivity.build(context(&factory, IceSettings::default(), 5000));
    let outcome = run_diagnostic(diagnostic.as_ref(), Arc::new(sink)).await;

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    assert_eq!(received.len(), outcome.entries.len() + 1);
    assert!(matches!(
        received.last(),
        Some(ReportEvent::Finished { state: TestState::Success, .. })
    ));
}
