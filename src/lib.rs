//! # webcapture
//!
//! A headless web-page capture engine: given a target URL and a device
//! profile, render the page in Chromium and produce either a still image
//! or a short WebM recording. This crate is the orchestration core of
//! the capture service: browser and page lifecycle, per-request
//! resource limits, bounded concurrency, and safe reclamation of
//! transient artifacts. HTTP routing and artifact serving live in the
//! layers above and call in through [`RequestValidator`],
//! [`CaptureEngine`] and [`ArtifactStore`].
//!
//! ## Pipeline
//!
//! ```text
//! raw (url, device, mode, duration)
//!     → RequestValidator → CaptureEngine → BrowserPool (context)
//!     → navigate / capture → ArtifactStore → release → CaptureResult
//! ```
//!
//! Every job releases its browsing context exactly once, on success and
//! on every failure path; recording jobs write to a per-job sink path
//! assigned before the page exists, so concurrent recordings can never
//! claim each other's output.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use webcapture::{
//!     CaptureEngine, CaptureMode, Config, DeviceProfileTable, RequestValidator,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = CaptureEngine::new(Config::default()).await?;
//!     let validator = RequestValidator::new(Arc::new(DeviceProfileTable::builtin()));
//!
//!     let request = validator.validate(
//!         Some("https://example.com"),
//!         Some("phone"),
//!         CaptureMode::Screenshot,
//!         None,
//!     )?;
//!     let result = engine.capture(request).await?;
//!     println!("captured {} bytes", result.payload.len());
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

/// Configuration, launch/disposal policies and Chrome arguments
pub mod config;

/// Error taxonomy for validation and capture failures
pub mod error;

/// Device profile presets and viewport resolution
pub mod device;

/// Capture request and result types
pub mod request;

/// Request validation (URL, blocked hosts, device, duration)
pub mod validate;

/// Browser engine pool and browsing-context lifecycle
pub mod browser_pool;

/// Screencast-to-WebM recording
pub mod recorder;

/// The capture job state machine
pub mod capture_engine;

/// Scratch-directory artifact persistence and retention sweep
pub mod artifact_store;

/// Engine metrics behind the `metrics` facade
pub mod metrics;

/// Command-line interface
pub mod cli;

/// Small formatting and filename helpers
pub mod utils;

#[cfg(test)]
mod tests;

pub use artifact_store::*;
pub use browser_pool::*;
pub use capture_engine::*;
pub use cli::*;
pub use config::*;
pub use device::*;
pub use error::*;
pub use self::metrics::*;
pub use recorder::*;
pub use request::*;
pub use utils::*;
pub use validate::*;
