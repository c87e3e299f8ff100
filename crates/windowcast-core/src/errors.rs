use thiserror::Error;

/// Errors surfaced by capture streams and the stream manager.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    /// Window resolution failed, including after one refresh-and-retry.
    #[error("Window not found: {query}")]
    WindowNotFound { query: String },

    /// Native session could not start (permission, platform, native error).
    #[error("Capture session failed to start: {reason}")]
    SessionStartFailed { reason: String },

    #[error("Concurrent stream limit reached ({max})")]
    CapacityExceeded { max: usize },

    /// Native session ended on its own after a successful start.
    /// Only ever delivered through the error callback.
    #[error("Capture interrupted: {reason}")]
    CaptureInterrupted { reason: String },

    #[error("Window enumeration failed: {reason}")]
    EnumerationFailed { reason: String },

    #[error("Configuration invalid: {reason}")]
    InvalidConfig { reason: String },

    #[error("Failed to encode frame: {reason}")]
    EncodeFailed { reason: String },

    #[error("Unknown stream: {id}")]
    UnknownStream { id: String },
}

impl CaptureError {
    pub fn window_not_found(query: impl Into<String>) -> Self {
        Self::WindowNotFound { query: query.into() }
    }

    pub fn start_failed(reason: impl Into<String>) -> Self {
        Self::SessionStartFailed { reason: reason.into() }
    }

    pub fn interrupted(reason: impl Into<String>) -> Self {
        Self::CaptureInterrupted { reason: reason.into() }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig { reason: reason.into() }
    }
}

/// Errors from loading configuration files.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Invalid(#[from] CaptureError),
}
