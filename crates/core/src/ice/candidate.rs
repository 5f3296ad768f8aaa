//! ICE candidate model and `candidate:` line parsing

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Candidate type from the `typ` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateType {
    Host,
    Srflx,
    Prflx,
    Relay,
}

impl CandidateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateType::Host => "host",
            CandidateType::Srflx => "srflx",
            CandidateType::Prflx => "prflx",
            CandidateType::Relay => "relay",
        }
    }
}

impl fmt::Display for CandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CandidateType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "host" => Ok(CandidateType::Host),
            "srflx" => Ok(CandidateType::Srflx),
            "prflx" => Ok(CandidateType::Prflx),
            "relay" => Ok(CandidateType::Relay),
            other => Err(Error::Sdp(format!("unknown candidate type '{}'", other))),
        }
    }
}

/// Transport protocol of a candidate or ICE server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    Udp,
    Tcp,
}

impl TransportProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportProtocol::Udp => "udp",
            TransportProtocol::Tcp => "tcp",
        }
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportProtocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "udp" => Ok(TransportProtocol::Udp),
            "tcp" => Ok(TransportProtocol::Tcp),
            other => Err(Error::Sdp(format!("unknown transport '{}'", other))),
        }
    }
}

/// A discovered network path.
///
/// Produced by the transport layer when a local candidate is gathered, and
/// passed unchanged to the remote peer when relayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub foundation: String,
    pub component: u16,
    pub protocol: TransportProtocol,
    pub priority: u32,
    pub address: String,
    pub port: u16,
    #[serde(rename = "type")]
    pub kind: CandidateType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_port: Option<u16>,
    /// Media section the candidate belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
}

impl IceCandidate {
    /// Parse a `candidate:` attribute line.
    ///
    /// Accepts an optional `a=` prefix. Layout:
    /// `candidate:<foundation> <component> <protocol> <priority> <address>
    /// <port> typ <type> [raddr <addr>] [rport <port>] [tcptype <t>] ...`
    ///
    /// # Returns
    /// The parsed candidate, or `Error::Sdp` when a mandatory field is
    /// missing or malformed
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let line = line.strip_prefix("a=").unwrap_or(line);
        let body = line
            .strip_prefix("candidate:")
            .ok_or_else(|| Error::Sdp(format!("not a candidate line: '{}'", line)))?;

        let fields: Vec<&str> = body.split_whitespace().collect();
        if fields.len() < 8 || fields[6] != "typ" {
            return Err(Error::Sdp(format!("truncated candidate line: '{}'", line)));
        }

        let mut candidate = IceCandidate {
            foundation: fields[0].to_string(),
            component: parse_number(fields[1], "component")?,
            protocol: fields[2].parse()?,
            priority: parse_number(fields[3], "priority")?,
            address: fields[4].to_string(),
            port: parse_number(fields[5], "port")?,
            kind: fields[7].parse()?,
            tcp_type: None,
            related_address: None,
            related_port: None,
            sdp_mid: None,
            sdp_mline_index: None,
        };

        // Extension attributes come as key/value pairs
        for pair in fields[8..].chunks(2) {
            if let [key, value] = pair {
                match *key {
                    "raddr" => candidate.related_address = Some(value.to_string()),
                    "rport" => candidate.related_port = Some(parse_number(value, "rport")?),
                    "tcptype" => candidate.tcp_type = Some(value.to_string()),
                    _ => {}
                }
            }
        }

        Ok(candidate)
    }

    /// Attach the media-section identifiers the candidate was gathered for
    pub fn with_media(mut self, sdp_mid: Option<String>, sdp_mline_index: Option<u16>) -> Self {
        self.sdp_mid = sdp_mid;
        self.sdp_mline_index = sdp_mline_index;
        self
    }

    /// Render back to a `candidate:` line
    pub fn to_candidate_line(&self) -> String {
        let mut line = format!(
            "candidate:{} {} {} {} {} {} typ {}",
            self.foundation,
            self.component,
            self.protocol,
            self.priority,
            self.address,
            self.port,
            self.kind
        );
        if let Some(addr) = &self.related_address {
            line.push_str(&format!(" raddr {}", addr));
        }
        if let Some(port) = self.related_port {
            line.push_str(&format!(" rport {}", port));
        }
        if let Some(tcp_type) = &self.tcp_type {
            line.push_str(&format!(" tcptype {}", tcp_type));
        }
        line
    }
}

impl fmt::Display for IceCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Type: {} Protocol: {} Address: {}",
            self.kind, self.protocol, self.address
        )
    }
}

fn parse_number<T: FromStr>(value: &str, field: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Sdp(format!("invalid candidate {} '{}'", field, value)))
}
