//! Candidate categories and the filters built on them

use super::candidate::{CandidateType, IceCandidate};
use serde::{Deserialize, Serialize};
use std::fmt;

pub fn is_host(candidate: &IceCandidate) -> bool {
    candidate.kind == CandidateType::Host
}

/// Any path that leaves the local segment
pub fn is_not_host(candidate: &IceCandidate) -> bool {
    !is_host(candidate)
}

pub fn is_reflexive(candidate: &IceCandidate) -> bool {
    candidate.kind == CandidateType::Srflx
}

pub fn is_relay(candidate: &IceCandidate) -> bool {
    candidate.kind == CandidateType::Relay
}

/// IPv6 detection by looking for a colon in the related address, or in the
/// candidate address when there is none.
///
/// This is a textual approximation, not address-family parsing.
pub fn is_ipv6(candidate: &IceCandidate) -> bool {
    candidate
        .related_address
        .as_deref()
        .unwrap_or(&candidate.address)
        .contains(':')
}

/// Category a candidate can be tested against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandidateCategory {
    Host,
    NotHost,
    Reflexive,
    Relay,
    Ipv6,
}

impl CandidateCategory {
    pub fn matches(&self, candidate: &IceCandidate) -> bool {
        match self {
            CandidateCategory::Host => is_host(candidate),
            CandidateCategory::NotHost => is_not_host(candidate),
            CandidateCategory::Reflexive => is_reflexive(candidate),
            CandidateCategory::Relay => is_relay(candidate),
            CandidateCategory::Ipv6 => is_ipv6(candidate),
        }
    }
}

impl fmt::Display for CandidateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CandidateCategory::Host => "host",
            CandidateCategory::NotHost => "not-host",
            CandidateCategory::Reflexive => "reflexive",
            CandidateCategory::Relay => "relay",
            CandidateCategory::Ipv6 => "ipv6",
        };
        f.write_str(name)
    }
}

/// Which candidates the harness relays to the other peer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateFilter {
    /// Relay everything
    #[default]
    Any,
    /// Relay only candidates of one category
    Only(CandidateCategory),
}

impl CandidateFilter {
    pub fn accepts(&self, candidate: &IceCandidate) -> bool {
        match self {
            CandidateFilter::Any => true,
            CandidateFilter::Only(category) => category.matches(candidate),
        }
    }
}

impl From<CandidateCategory> for CandidateFilter {
    fn from(category: CandidateCategory) -> Self {
        CandidateFilter::Only(category)
    }
}
