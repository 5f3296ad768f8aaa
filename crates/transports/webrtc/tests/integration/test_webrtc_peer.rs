//! webrtc-rs backend behavior

use rtcscan_core::config::{IceSettings, ScanConfig};
use rtcscan_core::diagnostic::{run_diagnostic, TracingSink};
use rtcscan_core::ice::{IceCandidate, IceConfigProvider};
use rtcscan_core::peer::{PeerConnectionFactory, RtcConfig, SignalingState};
use rtcscan_core::scenarios::{ScenarioContext, ScenarioKind};
use rtcscan_core::{ConnectionHarness, HarnessConfig, TestState};
use rtcscan_webrtc::{SyntheticMedia, WebRtcPeerFactory};
use std::sync::Arc;

fn remote_candidate() -> IceCandidate {
    IceCandidate::parse("candidate:1 1 udp 2130706431 192.168.1.100 54321 typ host").unwrap()
}

#[tokio::test]
async fn test_remote_candidates_wait_for_remote_description() {
    let factory = WebRtcPeerFactory::new();
    let pc1 = factory.create(&RtcConfig::default()).await.unwrap();
    let pc2 = factory.create(&RtcConfig::default()).await.unwrap();

    pc1.create_data_channel("diagnostics").await.unwrap();
    let offer = pc1.create_offer().await.unwrap();
    pc1.set_local_description(offer.clone()).await.unwrap();
    assert_eq!(pc1.signaling_state(), SignalingState::HaveLocalOffer);

    // Accepted even though webrtc-rs would reject it at this point
    pc2.add_ice_candidate(remote_candidate()).await.unwrap();

    pc2.set_remote_description(offer).await.unwrap();
    assert_eq!(pc2.signaling_state(), SignalingState::HaveRemoteOffer);
    pc2.add_ice_candidate(remote_candidate()).await.unwrap();

    pc1.close().await.unwrap();
    pc2.close().await.unwrap();
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let factory = WebRtcPeerFactory::new();
    let pc = factory.create(&RtcConfig::default()).await.unwrap();

    pc.close().await.unwrap();
    pc.close().await.unwrap();

    assert_eq!(pc.signaling_state(), SignalingState::Closed);
    assert!(pc.create_offer().await.is_err());
}

#[tokio::test]
async fn test_offer_carries_application_section() {
    let factory = WebRtcPeerFactory::new();
    let pc = factory.create(&RtcConfig::default()).await.unwrap();

    pc.create_data_channel("diagnostics").await.unwrap();
    let offer = pc.create_offer().await.unwrap();
    assert!(offer.sdp.contains("m=application"));

    pc.close().await.unwrap();
}

#[tokio::test]
#[ignore = "Binds UDP sockets on local interfaces and runs a full DTLS handshake"]
async fn test_harness_connects_over_loopback() {
    let factory = Arc::new(WebRtcPeerFactory::new().with_loopback(true));
    let harness = ConnectionHarness::new(factory.as_ref(), &RtcConfig::default(), HarnessConfig::default())
        .await
        .unwrap();

    // Without an m-section the offer carries no ICE credentials
    harness.pc1().create_data_channel("diagnostics").await.unwrap();
    harness.establish_connection().await.unwrap();
    assert_eq!(harness.pc1().signaling_state(), SignalingState::Stable);

    harness.close().await;
    harness.close().await;
    assert!(harness.is_closed());
}

#[tokio::test]
#[ignore = "Binds UDP sockets on local interfaces and runs a full DTLS handshake"]
async fn test_host_connectivity_end_to_end() {
    let ctx = Arc::new(
        ScenarioContext::new(
            Arc::new(WebRtcPeerFactory::new().with_loopback(true)),
            IceConfigProvider::from_settings(IceSettings::default()),
            ScanConfig::default(),
        )
        .with_media(Arc::new(SyntheticMedia::new())),
    );

    let diagnostic = ScenarioKind::HostConnectivity.build(ctx);
    let outcome = run_diagnostic(diagnostic.as_ref(), Arc::new(TracingSink)).await;

    assert_eq!(outcome.state, TestState::Success);
}
