//! ICE server descriptors and transport filtering

use super::candidate::TransportProtocol;
use serde::{Deserialize, Deserializer, Serialize};

/// One STUN/TURN server entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    #[serde(deserialize_with = "one_or_many")]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls,
            username: None,
            credential: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, credential: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.credential = Some(credential.into());
        self
    }
}

/// Response of the credential endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceServerList {
    pub ice_servers: Vec<IceServer>,
    /// Credential lifetime in seconds
    #[serde(deserialize_with = "lifetime_secs")]
    pub lifetime_duration: u64,
}

/// Split a comma separated URI setting into trimmed, non-empty URLs
pub fn split_uris(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn is_turn_url(url: &str) -> bool {
    url.starts_with("turn:") || url.starts_with("turns:")
}

/// Restrict servers to URLs using `protocol`.
///
/// URLs that already carry `transport=<protocol>` are kept. TURN URLs
/// without any transport parameter get `transport=<protocol>` appended to
/// their query.
/// Everything else is removed, and servers left without URLs are dropped.
pub fn filter_ice_servers(servers: &[IceServer], protocol: TransportProtocol) -> Vec<IceServer> {
    let transport = format!("transport={}", protocol);
    servers
        .iter()
        .filter_map(|server| {
            let urls: Vec<String> = server
                .urls
                .iter()
                .filter_map(|url| {
                    if url.contains(&transport) {
                        Some(url.clone())
                    } else if is_turn_url(url) && !url.contains("transport=") {
                        let separator = if url.contains('?') { '&' } else { '?' };
                        Some(format!("{}{}{}", url, separator, transport))
                    } else {
                        None
                    }
                })
                .collect();
            if urls.is_empty() {
                None
            } else {
                Some(IceServer {
                    urls,
                    ..server.clone()
                })
            }
        })
        .collect()
}

/// Keep only `stun:`/`stuns:` URLs
pub fn stun_only(servers: &[IceServer]) -> Vec<IceServer> {
    servers
        .iter()
        .filter_map(|server| {
            let urls: Vec<String> = server
                .urls
                .iter()
                .filter(|url| url.starts_with("stun:") || url.starts_with("stuns:"))
                .cloned()
                .collect();
            (!urls.is_empty()).then(|| IceServer::new(urls))
        })
        .collect()
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Urls {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Urls::deserialize(deserializer)? {
        Urls::One(url) => vec![url],
        Urls::Many(urls) => urls,
    })
}

/// Accepts `86400`, `"86400"` and `"86400s"`
fn lifetime_secs<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lifetime {
        Number(u64),
        Text(String),
    }

    match Lifetime::deserialize(deserializer)? {
        Lifetime::Number(secs) => Ok(secs),
        Lifetime::Text(text) => {
            let digits: String = text.trim().chars().take_while(char::is_ascii_digit).collect();
            digits
                .parse()
                .map_err(|_| serde::de::Error::custom(format!("invalid lifetimeDuration '{}'", text)))
        }
    }
}
