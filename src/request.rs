//! Capture request and result types exchanged with the layers above the
//! engine. The HTTP front-end parses query strings into the raw tuple the
//! validator consumes; the engine only ever sees a validated
//! [`CaptureRequest`].

use crate::{ArtifactRef, Viewport, MAX_RECORDING_SECONDS};
use std::time::Duration;
use url::Url;

/// What a job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    Screenshot,
    Recording,
}

/// A validated capture job description.
///
/// Only the validator constructs these, so the invariants hold by
/// construction: the URL is absolute http(s) with a non-blocked host, the
/// device name is a known profile, and any duration is positive. The
/// duration is not yet clamped; the engine applies the hard ceiling at
/// capture time.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    /// Unique job identifier.
    pub id: String,
    pub url: Url,
    /// Device profile name the viewport was resolved from.
    pub device: String,
    pub viewport: Viewport,
    pub mode: CaptureMode,
    /// Requested recording duration; `None` for screenshots.
    pub duration: Option<Duration>,
}

impl CaptureRequest {
    /// Wall-clock recording time the engine will actually wait:
    /// `min(requested, MAX_RECORDING_SECONDS)`.
    pub fn effective_duration(&self) -> Duration {
        let ceiling = Duration::from_secs(MAX_RECORDING_SECONDS);
        self.duration.map_or(ceiling, |d| d.min(ceiling))
    }
}

/// Successful capture output.
///
/// `payload` is inline bytes under the ephemeral disposal policy, or an
/// artifact reference under served-by-reference. Failures never reach
/// this type; they surface as [`crate::CaptureError`].
#[derive(Debug)]
pub struct CaptureResult {
    pub request_id: String,
    pub url: String,
    pub mime_type: &'static str,
    pub payload: CapturePayload,
    /// End-to-end job duration, acquisition through persistence.
    pub duration: Duration,
    pub metadata: CaptureMetadata,
}

#[derive(Debug)]
pub enum CapturePayload {
    /// Artifact bytes, file already deleted (ephemeral mode).
    Inline(Vec<u8>),
    /// Artifact left on scratch storage for the static-file layer
    /// (served-by-reference mode).
    Reference(ArtifactRef),
}

impl CapturePayload {
    pub fn len(&self) -> usize {
        match self {
            CapturePayload::Inline(bytes) => bytes.len(),
            CapturePayload::Reference(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct CaptureMetadata {
    pub device: String,
    pub viewport: Viewport,
    pub page_title: Option<String>,
    pub final_url: Option<String>,
    /// Pool instance the job ran on; 0 in per-job mode.
    pub browser_instance_id: usize,
}
