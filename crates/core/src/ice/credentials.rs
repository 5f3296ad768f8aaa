//! ICE server credential fetching and caching
//!
//! [`CredentialCache`] is an explicitly owned cache shared by every test in a
//! run. Credentials are treated as expired once less than the test run-time
//! budget remains in their lifetime:
//!
//! ```text
//! expired = elapsed_secs > lifetime_duration - budget_secs
//! ```
//!
//! Refreshes are single-flight: the cache lock is held across the fetch, so
//! concurrent callers wait for the one in-flight request and then read its
//! result. Every read hands out an owned copy.

use super::servers::{split_uris, stun_only, IceServer, IceServerList};
use crate::config::IceSettings;
use crate::error::{Error, Result};
use crate::peer::RtcConfig;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Source of fresh ICE server credentials
#[async_trait]
pub trait CredentialFetcher: Send + Sync {
    async fn fetch(&self) -> Result<IceServerList>;
}

/// Fetches credentials with an HTTP POST to `<turn_url><api_key>`
pub struct HttpCredentialFetcher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpCredentialFetcher {
    pub fn new(turn_url: &str, api_key: &str) -> Self {
        Self::with_client(reqwest::Client::new(), turn_url, api_key)
    }

    pub fn with_client(client: reqwest::Client, turn_url: &str, api_key: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}{}", turn_url, api_key),
        }
    }

    /// Build a fetcher from settings, `None` when no endpoint is configured
    pub fn from_settings(settings: &IceSettings) -> Option<Self> {
        let url = settings.turn_url.as_deref().filter(|u| !u.is_empty())?;
        Some(Self::new(url, settings.api_key.as_deref().unwrap_or("")))
    }
}

#[async_trait]
impl CredentialFetcher for HttpCredentialFetcher {
    async fn fetch(&self) -> Result<IceServerList> {
        debug!(endpoint = %self.endpoint, "Requesting ICE server credentials");
        let response = self.client.post(&self.endpoint).send().await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            warn!(status = status.as_u16(), "TURN request failed");
            return Err(Error::CredentialRequest {
                status: status.as_u16(),
            });
        }

        Ok(response.json::<IceServerList>().await?)
    }
}

struct CachedCredentials {
    servers: IceServerList,
    fetched_at: Instant,
}

/// Process-wide credential cache with a lifetime budget
pub struct CredentialCache {
    fetcher: Arc<dyn CredentialFetcher>,
    budget: Duration,
    state: Mutex<Option<CachedCredentials>>,
}

impl CredentialCache {
    /// Default share of the credential lifetime kept for a running test
    pub const DEFAULT_BUDGET: Duration = Duration::from_secs(240);

    pub fn new(fetcher: Arc<dyn CredentialFetcher>) -> Self {
        Self::with_budget(fetcher, Self::DEFAULT_BUDGET)
    }

    pub fn with_budget(fetcher: Arc<dyn CredentialFetcher>, budget: Duration) -> Self {
        Self {
            fetcher,
            budget,
            state: Mutex::new(None),
        }
    }

    /// Current credentials, fetching new ones when missing or expired
    pub async fn ice_servers(&self) -> Result<IceServerList> {
        let mut state = self.state.lock().await;

        if let Some(cached) = state.as_ref() {
            if !self.is_expired(cached) {
                debug!("Using cached credentials");
                return Ok(cached.servers.clone());
            }
        }

        info!("Fetching new credentials");
        let servers = self.fetcher.fetch().await?;
        *state = Some(CachedCredentials {
            servers: servers.clone(),
            fetched_at: Instant::now(),
        });
        Ok(servers)
    }

    /// Drop cached credentials so the next read refetches
    pub async fn invalidate(&self) {
        *self.state.lock().await = None;
    }

    fn is_expired(&self, cached: &CachedCredentials) -> bool {
        let elapsed = cached.fetched_at.elapsed().as_secs_f64();
        let usable = cached.servers.lifetime_duration as f64 - self.budget.as_secs_f64();
        elapsed > usable
    }
}

/// Builds peer configurations from settings, falling back to the cache
#[derive(Clone)]
pub struct IceConfigProvider {
    settings: IceSettings,
    cache: Option<Arc<CredentialCache>>,
}

impl IceConfigProvider {
    pub fn new(settings: IceSettings, cache: Option<Arc<CredentialCache>>) -> Self {
        Self { settings, cache }
    }

    /// Provider with an HTTP-backed cache when the settings name an endpoint
    pub fn from_settings(settings: IceSettings) -> Self {
        let budget = Duration::from_secs(settings.test_run_time_budget_secs);
        let cache = HttpCredentialFetcher::from_settings(&settings).map(|fetcher| {
            Arc::new(CredentialCache::with_budget(Arc::new(fetcher), budget))
        });
        Self::new(settings, cache)
    }

    /// Configuration with TURN servers
    pub async fn turn_config(&self) -> Result<RtcConfig> {
        if let Some(uri) = self.settings.turn_uri.as_deref().filter(|u| !u.is_empty()) {
            let server = IceServer::new(split_uris(uri)).with_credentials(
                self.settings.turn_username.clone().unwrap_or_default(),
                self.settings.turn_credential.clone().unwrap_or_default(),
            );
            info!(urls = ?server.urls, "Using TURN servers from settings");
            return Ok(RtcConfig::new(vec![server]));
        }

        let servers = self.cached_servers().await?;
        Ok(RtcConfig::new(servers.ice_servers))
    }

    /// Configuration with STUN servers only
    pub async fn stun_config(&self) -> Result<RtcConfig> {
        if let Some(uri) = self.settings.stun_uri.as_deref().filter(|u| !u.is_empty()) {
            let server = IceServer::new(split_uris(uri));
            info!(urls = ?server.urls, "Using STUN servers from settings");
            return Ok(RtcConfig::new(vec![server]));
        }

        let servers = self.cached_servers().await?;
        Ok(RtcConfig::new(stun_only(&servers.ice_servers)))
    }

    async fn cached_servers(&self) -> Result<IceServerList> {
        match &self.cache {
            Some(cache) => cache.ice_servers().await,
            None => Err(Error::Credentials(
                "no TURN settings or credential endpoint configured".to_string(),
            )),
        }
    }
}
