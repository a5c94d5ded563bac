use thiserror::Error;

/// Request validation failures. These never touch the browser and are
/// reported directly to the caller without acquiring any pool resources.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing url parameter")]
    MissingUrl,

    #[error("malformed url: {0}")]
    MalformedUrl(String),

    #[error("host is not allowed: {0}")]
    BlockedHost(String),

    #[error("unknown device profile: {0}")]
    UnknownDevice(String),

    #[error("invalid recording duration: {0}")]
    InvalidDuration(i64),
}

/// Failures of a capture job. Every variant is fatal to the current job
/// only; the owning context is released before any of these propagate.
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("browser engine launch failed: {0}")]
    EngineLaunchFailed(String),

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("capture failed: {0}")]
    CaptureFailed(String),

    /// A finalized recording could not be located at its assigned sink
    /// path. Internal invariant violation; reported upstream as a capture
    /// failure.
    #[error("recording artifact missing: {0}")]
    ArtifactMissing(String),
}

/// Stable, serializable classification of a job failure for the layers
/// above the engine. The `message` on [`CaptureError`] is diagnostic only
/// and not guaranteed stable across browser versions; this kind is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    EngineLaunchFailed,
    NavigationFailed,
    CaptureFailed,
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaptureError::Validation(_) => ErrorKind::Validation,
            CaptureError::EngineLaunchFailed(_) => ErrorKind::EngineLaunchFailed,
            CaptureError::NavigationFailed(_) => ErrorKind::NavigationFailed,
            // ArtifactMissing is an internal defect; callers see a capture
            // failure, the log carries the real variant.
            CaptureError::CaptureFailed(_) | CaptureError::ArtifactMissing(_) => {
                ErrorKind::CaptureFailed
            }
        }
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::CaptureFailed(err.to_string())
    }
}
