use thiserror::Error;

/// Failures surfaced by thumbnail production and startup.
///
/// The type is `Clone` because a single production outcome is handed to every
/// caller waiting on the same key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThumbnailError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Upstream capture failed: {0}")]
    UpstreamCapture(String),

    #[error("Thumbnail transform failed: {0}")]
    Transform(String),

    #[error("Invalid preview, empty buffer")]
    EmptyResult,
}

impl ThumbnailError {
    /// Whether this failure belongs to the timeout/unavailability class.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ThumbnailError::EmptyResult)
    }

    /// Short machine-readable name, used in logs and error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            ThumbnailError::Configuration(_) => "configuration",
            ThumbnailError::UpstreamCapture(_) => "upstream_capture",
            ThumbnailError::Transform(_) => "transform",
            ThumbnailError::EmptyResult => "empty_result",
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ThumbnailError::Configuration(_) => ErrorSeverity::Critical,
            ThumbnailError::UpstreamCapture(_) => ErrorSeverity::High,
            ThumbnailError::Transform(_) => ErrorSeverity::Medium,
            ThumbnailError::EmptyResult => ErrorSeverity::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Medium,
    High,
    Critical,
}

impl From<url::ParseError> for ThumbnailError {
    fn from(err: url::ParseError) -> Self {
        ThumbnailError::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for ThumbnailError {
    fn from(err: serde_json::Error) -> Self {
        ThumbnailError::Configuration(err.to_string())
    }
}

impl From<image::ImageError> for ThumbnailError {
    fn from(err: image::ImageError) -> Self {
        ThumbnailError::Transform(err.to_string())
    }
}
