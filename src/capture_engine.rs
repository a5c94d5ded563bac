//! Capture job orchestration.
//!
//! One call to [`CaptureEngine::capture`] drives a validated request
//! through the whole pipeline: context acquisition, navigation, capture,
//! persistence, release. The state machine is
//! `Idle → ContextAcquired → Navigated → Captured → Persisted → Released`,
//! and release happens on every path out of every state past acquisition.
//! A leaked context or engine process exhausts the host under load long
//! before anything else breaks.

use crate::{
    ArtifactKind, ArtifactRef, ArtifactStore, BrowserPool, BrowsingContext, CaptureError,
    CaptureMetadata, CaptureMode, CapturePayload, CaptureRequest, CaptureResult, Config,
    DisposalPolicy, Metrics, OutputFormat,
};
use chromiumoxide::page::{Page, ScreenshotParams};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// Injected before still captures so animated pages produce
/// deterministic pixels.
const FREEZE_ANIMATIONS_JS: &str = r#"
(() => {
    const style = document.createElement('style');
    style.textContent =
        '*, *::before, *::after {' +
        ' animation: none !important;' +
        ' transition: none !important;' +
        ' caret-color: transparent !important; }';
    document.documentElement.appendChild(style);
})()
"#;

pub struct CaptureEngine {
    pool: Arc<BrowserPool>,
    store: Arc<ArtifactStore>,
    config: Config,
    metrics: Arc<Metrics>,
    job_limiter: Arc<Semaphore>,
}

impl CaptureEngine {
    pub async fn new(config: Config) -> Result<Self, CaptureError> {
        let pool = Arc::new(BrowserPool::new(config.clone()).await?);
        let store = Arc::new(ArtifactStore::from_config(&config)?);
        Ok(Self::with_parts(config, pool, store))
    }

    /// Assemble from pre-built collaborators (the binary shares the store
    /// with the sweep task).
    pub fn with_parts(config: Config, pool: Arc<BrowserPool>, store: Arc<ArtifactStore>) -> Self {
        let job_limiter = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        Self {
            pool,
            store,
            config,
            metrics: Arc::new(Metrics::new()),
            job_limiter,
        }
    }

    pub fn pool(&self) -> &Arc<BrowserPool> {
        &self.pool
    }

    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    /// Run one capture job end to end.
    ///
    /// Jobs are independent and unordered; concurrency is bounded by
    /// `max_concurrent_jobs`. Whatever happens after the context is
    /// acquired, it is released exactly once before this returns.
    pub async fn capture(&self, request: CaptureRequest) -> Result<CaptureResult, CaptureError> {
        let _permit = self
            .job_limiter
            .acquire()
            .await
            .map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;

        let start = Instant::now();
        self.metrics.job_started();
        let result = self.run_released(&request, start).await;
        self.metrics
            .job_finished(start.elapsed(), result.is_ok(), request.mode);

        match &result {
            Ok(outcome) => info!(
                job = %request.id,
                url = %request.url,
                device = %request.device,
                bytes = outcome.payload.len(),
                elapsed = ?start.elapsed(),
                "capture complete"
            ),
            Err(e) => warn!(
                job = %request.id,
                url = %request.url,
                kind = ?e.kind(),
                "capture failed: {e}"
            ),
        }
        result
    }

    /// Acquire, run, and unconditionally release.
    async fn run_released(
        &self,
        request: &CaptureRequest,
        start: Instant,
    ) -> Result<CaptureResult, CaptureError> {
        let recording_sink = match request.mode {
            CaptureMode::Recording => Some(self.store.reserve_sink("webm")),
            CaptureMode::Screenshot => None,
        };

        // Idle → ContextAcquired. Failure here acquired nothing the pool
        // has not already cleaned up itself.
        let mut ctx = self
            .pool
            .acquire_context(&request.viewport, recording_sink)
            .await?;

        let outcome = self.run_job(&mut ctx, request, start).await;

        // Released(Success|Failure): the one release per job, on every
        // exit path. A failed job's live recorder is torn down (and its
        // partial sink removed) inside release.
        self.pool.release_context(ctx).await;

        outcome
    }

    /// ContextAcquired → Navigated → Captured → Persisted.
    async fn run_job(
        &self,
        ctx: &mut BrowsingContext,
        request: &CaptureRequest,
        start: Instant,
    ) -> Result<CaptureResult, CaptureError> {
        let page = ctx.page().clone();

        self.navigate(&page, request).await?;

        let page_title = page.get_title().await.ok().flatten();
        let final_url = page.url().await.ok().flatten();

        let (artifact, mime_type) = match request.mode {
            CaptureMode::Screenshot => self.capture_screenshot(&page, request).await?,
            CaptureMode::Recording => self.capture_recording(ctx, request).await?,
        };

        let payload = self.dispose(&artifact)?;

        Ok(CaptureResult {
            request_id: request.id.clone(),
            url: request.url.to_string(),
            mime_type,
            payload,
            duration: start.elapsed(),
            metadata: CaptureMetadata {
                device: request.device.clone(),
                viewport: request.viewport.clone(),
                page_title,
                final_url,
                browser_instance_id: ctx.instance_id(),
            },
        })
    }

    /// Load the target and wait for activity to settle, all under the
    /// hard navigation timeout. The redirect chain is not re-validated
    /// against the blocked-host list; only the initial request host was
    /// checked.
    async fn navigate(&self, page: &Page, request: &CaptureRequest) -> Result<(), CaptureError> {
        let load = async {
            page.goto(request.url.as_str())
                .await
                .map_err(|e| CaptureError::NavigationFailed(e.to_string()))?;
            page.wait_for_navigation()
                .await
                .map_err(|e| CaptureError::NavigationFailed(e.to_string()))?;
            Ok::<_, CaptureError>(())
        };

        timeout(self.config.navigation_timeout, load)
            .await
            .map_err(|_| {
                CaptureError::NavigationFailed(format!(
                    "timed out after {:?}",
                    self.config.navigation_timeout
                ))
            })??;

        // Quiescence: let late requests and rendering settle.
        sleep(self.config.quiescence_wait).await;
        debug!(job = %request.id, "navigation settled");
        Ok(())
    }

    async fn capture_screenshot(
        &self,
        page: &Page,
        request: &CaptureRequest,
    ) -> Result<(ArtifactRef, &'static str), CaptureError> {
        // Best effort; a page that rejects script injection still gets
        // captured, just without frozen animations.
        if let Err(e) = page.evaluate(FREEZE_ANIMATIONS_JS).await {
            debug!(job = %request.id, "animation freeze failed: {e}");
        }

        let params = ScreenshotParams::builder()
            .format(chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat::Png)
            .full_page(request.viewport.is_full_page())
            .build();

        let png = page
            .screenshot(params)
            .await
            .map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;

        let bytes = convert_image_format(png, self.config.output_format)?;
        let artifact = self.store.put_bytes(
            &bytes,
            ArtifactKind::Image,
            &request.device,
            self.config.output_format.extension(),
        )?;

        Ok((artifact, self.config.output_format.mime_type()))
    }

    /// The context has been recording since creation; wait out the
    /// clamped duration of wall-clock time, stop, and register the
    /// finalized file at its pre-assigned sink path.
    async fn capture_recording(
        &self,
        ctx: &mut BrowsingContext,
        request: &CaptureRequest,
    ) -> Result<(ArtifactRef, &'static str), CaptureError> {
        let wait = request.effective_duration();
        debug!(job = %request.id, seconds = wait.as_secs(), "recording");
        sleep(wait).await;

        let recorder = ctx.take_recorder().ok_or_else(|| {
            // Wiring bug, not a user-visible condition; kind() maps it to
            // a capture failure upstream.
            error!(job = %request.id, "recording job has no recorder attached");
            CaptureError::ArtifactMissing("recorder was not wired at acquisition".to_string())
        })?;

        let sink = recorder.finish().await?;

        match self
            .store
            .register_file(sink.clone(), ArtifactKind::Video, &request.device)
        {
            Ok(artifact) => Ok((artifact, "video/webm")),
            Err(e) => {
                // Finalized but unregistrable: scrub the orphan so the
                // sweep is not its only cleanup.
                let _ = std::fs::remove_file(&sink);
                Err(e)
            }
        }
    }

    /// Apply the deployment's disposal policy: inline bytes with
    /// immediate deletion, or a reference left for the static-file layer
    /// and the retention sweep.
    fn dispose(&self, artifact: &ArtifactRef) -> Result<CapturePayload, CaptureError> {
        match self.config.disposal {
            DisposalPolicy::Ephemeral => {
                let bytes = self.store.read(artifact)?;
                self.store.remove(artifact);
                Ok(CapturePayload::Inline(bytes))
            }
            DisposalPolicy::Retained => Ok(CapturePayload::Reference(artifact.clone())),
        }
    }

    pub async fn shutdown(&self) {
        info!("shutting down capture engine");
        self.pool.shutdown().await;
        info!("capture engine shutdown complete");
    }
}

impl Clone for CaptureEngine {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            store: self.store.clone(),
            config: self.config.clone(),
            metrics: self.metrics.clone(),
            job_limiter: self.job_limiter.clone(),
        }
    }
}

fn convert_image_format(png: Vec<u8>, format: OutputFormat) -> Result<Vec<u8>, CaptureError> {
    let target = match format {
        OutputFormat::Png => return Ok(png),
        OutputFormat::Jpeg => image::ImageFormat::Jpeg,
        OutputFormat::Webp => image::ImageFormat::WebP,
    };

    let img = image::load_from_memory(&png)
        .map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;

    let mut out = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut out), target)
        .map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;
    Ok(out)
}
