//! Configuration management with serde serialization/deserialization
//!
//! This module provides all configuration structures for the capture
//! service, including browser pool policy, timeouts, artifact disposal,
//! and Chrome launch arguments.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Hard ceiling on recording wall-clock duration, applied regardless of
/// the client-requested value.
pub const MAX_RECORDING_SECONDS: u64 = 30;

/// Main configuration structure for the capture service
///
/// Controls the browser pool, per-job resource limits, and the artifact
/// scratch directory.
///
/// # Examples
///
/// ```rust
/// use webcapture::Config;
///
/// // Use default configuration
/// let config = Config::default();
///
/// // Create custom configuration
/// let config = Config {
///     browser_pool_size: 2,
///     max_concurrent_jobs: 8,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// How browser engine processes are provisioned (default: pooled)
    ///
    /// `Pooled` amortizes the expensive Chromium launch across jobs;
    /// `PerJob` launches a fresh process per capture and pays that cost
    /// every time, but needs no cross-job process state.
    pub launch_policy: LaunchPolicy,

    /// Number of Chromium processes kept alive in pooled mode (default: 2)
    ///
    /// Ignored under `LaunchPolicy::PerJob`.
    pub browser_pool_size: usize,

    /// Maximum number of capture jobs in flight (default: 2 × CPUs)
    pub max_concurrent_jobs: usize,

    /// Hard timeout for loading the target page (default: 30 seconds)
    ///
    /// Jobs whose navigation exceeds this fail with `NavigationFailed`.
    pub navigation_timeout: Duration,

    /// Settle delay after the load event, letting late network activity
    /// and rendering quiesce before capture (default: 500ms)
    pub quiescence_wait: Duration,

    /// Scratch directory for screenshot and recording artifacts
    pub scratch_dir: PathBuf,

    /// How artifacts are handed back to the caller (default: ephemeral)
    pub disposal: DisposalPolicy,

    /// Age beyond which the periodic sweep deletes an artifact
    /// (default: 30 minutes). Only meaningful in served-by-reference mode.
    pub retention_window: Duration,

    /// Interval between sweep runs (default: 5 minutes)
    pub sweep_interval: Duration,

    /// Output image format for screenshots (default: PNG)
    pub output_format: OutputFormat,

    /// Path to Chrome/Chromium executable (default: auto-detect)
    pub chrome_path: Option<String>,

    /// Path to the ffmpeg executable used to encode recordings
    /// (default: resolve `ffmpeg` from PATH)
    pub ffmpeg_path: Option<String>,

    /// Custom User-Agent string for page loads (default: Chrome default)
    pub user_agent: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            launch_policy: LaunchPolicy::Pooled,
            browser_pool_size: 2,
            max_concurrent_jobs: num_cpus::get() * 2,
            navigation_timeout: Duration::from_secs(30),
            quiescence_wait: Duration::from_millis(500),
            scratch_dir: std::env::temp_dir().join("webcapture"),
            disposal: DisposalPolicy::Ephemeral,
            retention_window: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
            output_format: OutputFormat::Png,
            chrome_path: None,
            ffmpeg_path: None,
            user_agent: None,
        }
    }
}

/// Browser engine provisioning policy
///
/// One policy is active per deployment. Pooled mode keeps long-lived
/// Chromium processes and gives each job an isolated browser context
/// inside one of them; per-job mode launches and terminates a dedicated
/// process for every capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchPolicy {
    Pooled,
    PerJob,
}

/// Artifact disposal policy
///
/// `Ephemeral`: artifact bytes are streamed back inline and the file is
/// deleted immediately after being read. `Retained`: the caller receives
/// a reference and the file lives until the retention sweep removes it.
/// Never both for the same artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisposalPolicy {
    Ephemeral,
    Retained,
}

/// Supported output image formats for screenshots
///
/// Recordings are always WebM; this only affects still images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// PNG format - lossless compression, best quality
    Png,
    /// JPEG format - lossy compression, smaller files
    Jpeg,
    /// WebP format - modern compression, good balance of size and quality
    Webp,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Webp => "webp",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Webp => "image/webp",
        }
    }
}

/// Generate Chrome command-line arguments based on configuration
///
/// Creates a set of Chrome arguments for headless capture operation with
/// unique per-instance directories so pooled processes never fight over
/// the profile singleton.
pub fn get_chrome_args(config: &Config, instance_id: usize) -> Vec<String> {
    let unique_id = format!("{}-{}", std::process::id(), instance_id);

    let mut args = vec![
        "--headless=new".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-background-timer-throttling".to_string(),
        "--disable-backgrounding-occluded-windows".to_string(),
        "--disable-renderer-backgrounding".to_string(),
        "--disable-extensions".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--mute-audio".to_string(),
        "--hide-scrollbars".to_string(),
        format!("--user-data-dir=/tmp/webcapture-profile-{unique_id}"),
        format!("--remote-debugging-port={}", 9300 + instance_id),
    ];

    if let Some(user_agent) = &config.user_agent {
        args.push(format!("--user-agent={user_agent}"));
    }

    args
}

/// Build the chromiumoxide launch configuration for one engine instance.
pub fn create_browser_config(
    config: &Config,
    instance_id: usize,
) -> Result<chromiumoxide::browser::BrowserConfig, String> {
    use chromiumoxide::browser::BrowserConfig;

    let mut builder = BrowserConfig::builder()
        .args(get_chrome_args(config, instance_id))
        .request_timeout(config.navigation_timeout);

    if let Some(chrome_path) = &config.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder.build()
}

/// Reject configurations that cannot possibly serve a capture.
pub fn validate_config(config: &Config) -> Result<(), String> {
    if config.launch_policy == LaunchPolicy::Pooled && config.browser_pool_size == 0 {
        return Err("browser pool size must be greater than 0 in pooled mode".to_string());
    }
    if config.max_concurrent_jobs == 0 {
        return Err("max concurrent jobs must be greater than 0".to_string());
    }
    if config.navigation_timeout.as_secs() == 0 {
        return Err("navigation timeout must be greater than 0".to_string());
    }
    if config.retention_window.as_secs() == 0 {
        return Err("retention window must be greater than 0".to_string());
    }
    if config.sweep_interval.as_secs() == 0 {
        return Err("sweep interval must be greater than 0".to_string());
    }
    Ok(())
}
