//! Error types for frame analysis

/// Result type alias using AnalyzerError
pub type Result<T> = std::result::Result<T, AnalyzerError>;

/// Errors produced while capturing or validating frames
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    /// Pixel buffer does not match the declared dimensions
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Frame source failed to deliver a frame
    #[error("Capture error: {0}")]
    Capture(String),
}
