//! ICE candidates, servers and credentials

pub mod candidate;
pub mod classifier;
pub mod credentials;
pub mod servers;

pub use candidate::{CandidateType, IceCandidate, TransportProtocol};
pub use classifier::{
    is_host, is_ipv6, is_not_host, is_reflexive, is_relay, CandidateCategory, CandidateFilter,
};
pub use credentials::{CredentialCache, CredentialFetcher, HttpCredentialFetcher, IceConfigProvider};
pub use servers::{filter_ice_servers, IceServer, IceServerList};
