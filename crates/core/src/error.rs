//! Error types for rtcscan core

use thiserror::Error;

/// Result type alias for rtcscan core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while setting up or running diagnostics
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration file or value error
    #[error("Configuration error: {0}")]
    Config(String),

    /// ICE server credentials unavailable
    #[error("Credentials error: {0}")]
    Credentials(String),

    /// Credential endpoint answered with a non-success status
    #[error("TURN request failed with status {status}")]
    CredentialRequest {
        /// HTTP status returned by the endpoint
        status: u16,
    },

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Peer connection construction or operation failed
    #[error("Peer connection error: {0}")]
    Peer(String),

    /// Offer/answer exchange was rejected
    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    /// Malformed SDP or candidate line
    #[error("SDP error: {0}")]
    Sdp(String),

    /// Media source could not be opened
    #[error("Media error: {0}")]
    Media(String),

    /// Operation on a closed connection or channel
    #[error("Connection closed")]
    Closed,

    /// Deadline elapsed
    #[error("Timed out after {0}ms")]
    Timeout(u64),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

impl From<rtcscan_frame_analyzer::AnalyzerError> for Error {
    fn from(err: rtcscan_frame_analyzer::AnalyzerError) -> Self {
        Error::Media(err.to_string())
    }
}
