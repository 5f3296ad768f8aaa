//! Credential cache and HTTP fetcher tests
//!
//! The cache runs on tokio's clock, so expiry is exercised with paused time.

#[path = "../fixtures/mock_server.rs"]
mod mock_server;

use async_trait::async_trait;
use mock_server::MockCredentialServer;
use rtcscan_core::config::IceSettings;
use rtcscan_core::ice::{
    CredentialCache, CredentialFetcher, HttpCredentialFetcher, IceConfigProvider, IceServer,
    IceServerList,
};
use rtcscan_core::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Fetcher counting its calls, optionally slow
struct CountingFetcher {
    calls: AtomicUsize,
    lifetime: u64,
    delay: Duration,
}

impl CountingFetcher {
    fn new(lifetime: u64) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            lifetime,
            delay: Duration::ZERO,
        }
    }

    fn slow(lifetime: u64, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(lifetime)
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialFetcher for CountingFetcher {
    async fn fetch(&self) -> rtcscan_core::Result<IceServerList> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(IceServerList {
            ice_servers: vec![IceServer::new(vec![
                "turn:turn.example.org:3478".to_string(),
                "stun:stun.example.org:19302".to_string(),
            ])
            .with_credentials(format!("user-{}", call), "secret")],
            lifetime_duration: self.lifetime,
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_cached_credentials_reused_within_budget() {
    let fetcher = Arc::new(CountingFetcher::new(300));
    let cache = CredentialCache::with_budget(fetcher.clone(), Duration::from_secs(240));

    let first = cache.ice_servers().await.unwrap();
    tokio::time::advance(Duration::from_secs(30)).await;
    let second = cache.ice_servers().await.unwrap();

    assert_eq!(fetcher.calls(), 1);
    assert_eq!(first, second);
}

#[tokio::test(start_paused = true)]
async fn test_credentials_refetched_once_budget_is_exceeded() {
    let fetcher = Arc::new(CountingFetcher::new(300));
    let cache = CredentialCache::with_budget(fetcher.clone(), Duration::from_secs(240));

    cache.ice_servers().await.unwrap();
    tokio::time::advance(Duration::from_secs(250)).await;
    let refreshed = cache.ice_servers().await.unwrap();

    assert_eq!(fetcher.calls(), 2);
    assert_eq!(refreshed.ice_servers[0].username.as_deref(), Some("user-1"));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_share_one_fetch() {
    let fetcher = Arc::new(CountingFetcher::slow(86_400, Duration::from_millis(50)));
    let cache = Arc::new(CredentialCache::new(fetcher.clone()));

    let calls: Vec<_> = (0..5)
        .map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.ice_servers().await })
        })
        .collect();
    for call in calls {
        call.await.unwrap().unwrap();
    }

    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_forces_refetch() {
    let fetcher = Arc::new(CountingFetcher::new(86_400));
    let cache = CredentialCache::new(fetcher.clone());

    cache.ice_servers().await.unwrap();
    cache.invalidate().await;
    cache.ice_servers().await.unwrap();

    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn test_provider_splits_turn_and_stun() {
    let fetcher = Arc::new(CountingFetcher::new(86_400));
    let cache = Arc::new(CredentialCache::new(fetcher.clone()));
    let provider = IceConfigProvider::new(IceSettings::default(), Some(cache));

    let turn = provider.turn_config().await.unwrap();
    let stun = provider.stun_config().await.unwrap();

    assert_eq!(turn.ice_servers[0].urls.len(), 2);
    assert_eq!(
        stun.ice_servers,
        vec![IceServer::new(vec!["stun:stun.example.org:19302".to_string()])]
    );
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn test_provider_prefers_explicit_settings() {
    let settings = IceSettings {
        turn_uri: Some("turn:a.example.org:3478, turns:a.example.org:443".to_string()),
        turn_username: Some("alice".to_string()),
        turn_credential: Some("pw".to_string()),
        ..IceSettings::default()
    };
    let fetcher = Arc::new(CountingFetcher::new(86_400));
    let provider = IceConfigProvider::new(settings, Some(Arc::new(CredentialCache::new(fetcher.clone()))));

    let turn = provider.turn_config().await.unwrap();

    assert_eq!(
        turn.ice_servers[0].urls,
        vec!["turn:a.example.org:3478".to_string(), "turns:a.example.org:443".to_string()]
    );
    assert_eq!(turn.ice_servers[0].username.as_deref(), Some("alice"));
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn test_provider_without_sources_fails() {
    let provider = IceConfigProvider::from_settings(IceSettings::default());
    assert!(matches!(provider.turn_config().await, Err(Error::Credentials(_))));
}

#[tokio::test]
async fn test_http_fetcher_parses_response() {
    let body = r#"{"iceServers":[{"urls":["turn:turn.example.org:3478?transport=udp"],"username":"u","credential":"c"}],"lifetimeDuration":"86400s"}"#;
    let server = MockCredentialServer::start(200, body).await.unwrap();

    let fetcher = HttpCredentialFetcher::new(&server.base_url(), "secret-key");
    let list = fetcher.fetch().await.unwrap();

    assert_eq!(list.lifetime_duration, 86_400);
    assert_eq!(list.ice_servers[0].username.as_deref(), Some("u"));
    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].starts_with("POST /turn?key=secret-key "));

    server.shutdown().await;
}

#[tokio::test]
async fn test_http_fetcher_reports_status() {
    let server = MockCredentialServer::start(403, "{}").await.unwrap();

    let fetcher = HttpCredentialFetcher::new(&server.base_url(), "bad-key");
    let err = fetcher.fetch().await.unwrap_err();

    assert!(matches!(err, Error::CredentialRequest { status: 403 }));
    server.shutdown().await;
}
