//! Error types for the webrtc-rs backend

use thiserror::Error;

/// Result type alias for backend operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while driving webrtc-rs
#[derive(Debug, Error)]
pub enum Error {
    /// Error returned by the WebRTC stack
    #[error("WebRTC error: {0}")]
    WebRtc(#[from] webrtc::Error),

    /// Session description rejected or malformed
    #[error("SDP error: {0}")]
    Sdp(String),

    /// Media track setup failed
    #[error("Media track error: {0}")]
    Track(String),

    /// Operation on a closed peer connection
    #[error("Peer connection closed")]
    Closed,
}

impl From<Error> for rtcscan_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Sdp(msg) => rtcscan_core::Error::Sdp(msg),
            Error::Track(msg) => rtcscan_core::Error::Media(msg),
            Error::Closed => rtcscan_core::Error::Closed,
            other => rtcscan_core::Error::Peer(other.to_string()),
        }
    }
}
