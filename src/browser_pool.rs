//! Browser engine pool and browsing-context lifecycle.
//!
//! The pool owns every Chromium process so the capture engine never
//! touches OS subprocess handles directly. Two provisioning policies sit
//! behind one interface: pooled (long-lived processes, one isolated
//! browser context per job) and per-job (a dedicated process per capture).
//! Process launch, restart and shutdown are serialized on the instance
//! table; contexts on one process operate in parallel without locking.

use crate::{
    create_browser_config, CaptureError, Config, LaunchPolicy, ScreencastRecorder, Viewport,
};
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Health of one pooled engine process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStatus {
    Healthy,
    Failed,
}

/// One long-lived Chromium process in the pool.
pub struct EngineInstance {
    pub id: usize,
    browser: Arc<Mutex<Browser>>,
    /// Background task polling the CDP event stream; a finished handler
    /// means the process is gone.
    handler: tokio::task::JoinHandle<()>,
    status: InstanceStatus,
    contexts_served: usize,
    failure_count: usize,
}

impl EngineInstance {
    fn is_healthy(&self) -> bool {
        self.status == InstanceStatus::Healthy && !self.handler.is_finished()
    }

    async fn shutdown(self) {
        let _ = self.browser.lock().await.close().await;
        self.handler.abort();
    }
}

/// An isolated browsing session owned by exactly one capture job.
///
/// Created by [`BrowserPool::acquire_context`], destroyed by
/// [`BrowserPool::release_context`]; never reused across jobs, so cookie
/// and storage state cannot leak between unrelated captures. Ownership is
/// moved into `release_context`, which makes a double release
/// unrepresentable.
pub struct BrowsingContext {
    page: Page,
    browser: Arc<Mutex<Browser>>,
    browser_context_id: Option<BrowserContextId>,
    recorder: Option<ScreencastRecorder>,
    recording_sink: Option<PathBuf>,
    instance_id: usize,
    /// Handler task to tear down for per-job engines; `None` when pooled.
    dedicated_handler: Option<tokio::task::JoinHandle<()>>,
}

impl BrowsingContext {
    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn instance_id(&self) -> usize {
        self.instance_id
    }

    pub fn recording_sink(&self) -> Option<&PathBuf> {
        self.recording_sink.as_ref()
    }

    /// Hand the live recorder to the job for finalization. After this the
    /// release path sees no recorder and will not touch the sink.
    pub fn take_recorder(&mut self) -> Option<ScreencastRecorder> {
        self.recorder.take()
    }
}

pub struct BrowserPool {
    config: Config,
    instances: Arc<Mutex<Vec<EngineInstance>>>,
    next_instance: AtomicUsize,
    active_contexts: Arc<AtomicUsize>,
    is_shutting_down: AtomicBool,
}

impl BrowserPool {
    /// Build the pool. Under `LaunchPolicy::Pooled` this launches every
    /// engine process up front so the first capture pays no launch cost;
    /// under `PerJob` it launches nothing until a job arrives.
    pub async fn new(config: Config) -> Result<Self, CaptureError> {
        let pool = Self {
            config,
            instances: Arc::new(Mutex::new(Vec::new())),
            next_instance: AtomicUsize::new(0),
            active_contexts: Arc::new(AtomicUsize::new(0)),
            is_shutting_down: AtomicBool::new(false),
        };

        if pool.config.launch_policy == LaunchPolicy::Pooled {
            let mut instances = pool.instances.lock().await;
            for id in 0..pool.config.browser_pool_size {
                let instance = launch_instance(&pool.config, id).await?;
                instances.push(instance);
                info!(instance = id, "browser engine launched");
            }
            info!("browser pool initialized with {} engines", instances.len());
        }

        Ok(pool)
    }

    /// Open a fresh isolated browsing context.
    ///
    /// `recording_sink` must be the job's pre-reserved output path when a
    /// recording is wanted; the screencast recorder is wired to it before
    /// any navigation happens.
    pub async fn acquire_context(
        &self,
        viewport: &Viewport,
        recording_sink: Option<PathBuf>,
    ) -> Result<BrowsingContext, CaptureError> {
        if self.is_shutting_down.load(Ordering::Relaxed) {
            return Err(CaptureError::EngineLaunchFailed(
                "browser pool is shutting down".to_string(),
            ));
        }

        let ctx = match self.config.launch_policy {
            LaunchPolicy::Pooled => self.acquire_pooled(viewport, recording_sink).await?,
            LaunchPolicy::PerJob => self.acquire_dedicated(viewport, recording_sink).await?,
        };

        self.active_contexts.fetch_add(1, Ordering::Relaxed);
        debug!(
            instance = ctx.instance_id,
            active = self.active_contexts.load(Ordering::Relaxed),
            "browsing context acquired"
        );
        Ok(ctx)
    }

    async fn acquire_pooled(
        &self,
        viewport: &Viewport,
        recording_sink: Option<PathBuf>,
    ) -> Result<BrowsingContext, CaptureError> {
        let pool_size = self.config.browser_pool_size;
        if pool_size == 0 {
            return Err(CaptureError::EngineLaunchFailed(
                "browser pool is empty".to_string(),
            ));
        }

        // Round-robin with restart-on-unhealthy; one retry per instance.
        for _attempt in 0..pool_size {
            let slot = self.next_instance.fetch_add(1, Ordering::Relaxed) % pool_size;

            let (browser, instance_id) = {
                let mut instances = self.instances.lock().await;
                let instance = instances.get_mut(slot).ok_or_else(|| {
                    CaptureError::EngineLaunchFailed("browser pool is empty".to_string())
                })?;

                if !instance.is_healthy() {
                    warn!(instance = slot, "engine unhealthy, restarting");
                    let old = std::mem::replace(
                        instance,
                        launch_instance(&self.config, slot).await?,
                    );
                    old.shutdown().await;
                    info!(instance = slot, "engine restarted");
                }

                instance.contexts_served += 1;
                (instance.browser.clone(), instance.id)
            };

            match open_context(&self.config, &browser, viewport, recording_sink.clone()).await {
                Ok((page, browser_context_id, recorder)) => {
                    return Ok(BrowsingContext {
                        page,
                        browser,
                        browser_context_id: Some(browser_context_id),
                        recorder,
                        recording_sink,
                        instance_id,
                        dedicated_handler: None,
                    });
                }
                Err(e) => {
                    let mut instances = self.instances.lock().await;
                    if let Some(instance) = instances.get_mut(slot) {
                        instance.failure_count += 1;
                        instance.status = InstanceStatus::Failed;
                    }
                    error!(instance = slot, "context creation failed: {e}");
                }
            }
        }

        Err(CaptureError::EngineLaunchFailed(
            "no healthy browser engine available".to_string(),
        ))
    }

    async fn acquire_dedicated(
        &self,
        viewport: &Viewport,
        recording_sink: Option<PathBuf>,
    ) -> Result<BrowsingContext, CaptureError> {
        let instance = launch_instance(&self.config, 0).await?;
        let browser = instance.browser.clone();
        let handler = instance.handler;

        match open_context(&self.config, &browser, viewport, recording_sink.clone()).await {
            Ok((page, browser_context_id, recorder)) => Ok(BrowsingContext {
                page,
                browser,
                browser_context_id: Some(browser_context_id),
                recorder,
                recording_sink,
                instance_id: 0,
                dedicated_handler: Some(handler),
            }),
            Err(e) => {
                // The fresh process must not outlive its failed job.
                let _ = browser.lock().await.close().await;
                handler.abort();
                Err(e)
            }
        }
    }

    /// Destroy a context and everything it holds.
    ///
    /// Called on every job exit path, success or failure; a context that
    /// escaped release would pin a browser context (and in per-job mode a
    /// whole Chromium process) for the life of the service. Errors during
    /// teardown are logged, never propagated: release cannot fail.
    pub async fn release_context(&self, mut ctx: BrowsingContext) {
        // A recorder still present here belongs to a failed job; tear it
        // down and scrub the partial output.
        if let Some(recorder) = ctx.recorder.take() {
            recorder.abort().await;
        }

        if let Err(e) = ctx.page.close().await {
            debug!("page close during release: {e}");
        }

        if let Some(context_id) = ctx.browser_context_id.take() {
            let browser = ctx.browser.lock().await;
            if let Err(e) = browser
                .execute(DisposeBrowserContextParams::new(context_id))
                .await
            {
                debug!("browser context dispose during release: {e}");
            }
        }

        if let Some(handler) = ctx.dedicated_handler.take() {
            let _ = ctx.browser.lock().await.close().await;
            handler.abort();
            debug!("dedicated engine terminated");
        }

        self.active_contexts.fetch_sub(1, Ordering::Relaxed);
        debug!(
            active = self.active_contexts.load(Ordering::Relaxed),
            "browsing context released"
        );
    }

    /// Number of contexts currently alive. Returns to zero once every
    /// job, successful or not, has released.
    pub fn active_contexts(&self) -> usize {
        self.active_contexts.load(Ordering::Relaxed)
    }

    pub async fn stats(&self) -> PoolStats {
        let instances = self.instances.lock().await;
        PoolStats {
            total_instances: instances.len(),
            healthy_instances: instances.iter().filter(|i| i.is_healthy()).count(),
            active_contexts: self.active_contexts(),
            contexts_served: instances.iter().map(|i| i.contexts_served).sum(),
            instance_failures: instances.iter().map(|i| i.failure_count).sum(),
        }
    }

    pub async fn shutdown(&self) {
        info!("shutting down browser pool");
        self.is_shutting_down.store(true, Ordering::Relaxed);

        let mut instances = self.instances.lock().await;
        for instance in instances.drain(..) {
            instance.shutdown().await;
        }
        info!("browser pool shutdown complete");
    }
}

#[derive(Debug, Clone)]
pub struct PoolStats {
    pub total_instances: usize,
    pub healthy_instances: usize,
    pub active_contexts: usize,
    pub contexts_served: usize,
    pub instance_failures: usize,
}

/// Launch one Chromium process and start polling its CDP event stream.
async fn launch_instance(config: &Config, id: usize) -> Result<EngineInstance, CaptureError> {
    let browser_config = create_browser_config(config, id)
        .map_err(CaptureError::EngineLaunchFailed)?;

    let (browser, mut handler) = Browser::launch(browser_config)
        .await
        .map_err(|e| CaptureError::EngineLaunchFailed(e.to_string()))?;

    let handler_task = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                debug!("cdp handler event error: {e}");
            }
        }
        debug!("cdp handler stream ended");
    });

    Ok(EngineInstance {
        id,
        browser: Arc::new(Mutex::new(browser)),
        handler: handler_task,
        status: InstanceStatus::Healthy,
        contexts_served: 0,
        failure_count: 0,
    })
}

/// Create an isolated browser context with a blank page, apply the
/// viewport, and wire the recorder when a sink is given. On any failure
/// the partially-created pieces are destroyed before the error returns.
async fn open_context(
    config: &Config,
    browser: &Arc<Mutex<Browser>>,
    viewport: &Viewport,
    recording_sink: Option<PathBuf>,
) -> Result<(Page, BrowserContextId, Option<ScreencastRecorder>), CaptureError> {
    let guard = browser.lock().await;

    let context_id = guard
        .execute(CreateBrowserContextParams::default())
        .await
        .map_err(|e| CaptureError::EngineLaunchFailed(format!("create context: {e}")))?
        .result
        .browser_context_id;

    let target = CreateTargetParams::builder()
        .url("about:blank")
        .browser_context_id(context_id.clone())
        .build()
        .map_err(CaptureError::EngineLaunchFailed)?;

    let page = match guard.new_page(target).await {
        Ok(page) => page,
        Err(e) => {
            let _ = guard
                .execute(DisposeBrowserContextParams::new(context_id))
                .await;
            return Err(CaptureError::EngineLaunchFailed(format!("new page: {e}")));
        }
    };
    drop(guard);

    if let Viewport::Fixed {
        width,
        height,
        device_scale_factor,
        mobile,
    } = viewport
    {
        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(*width as i64)
            .height(*height as i64)
            .device_scale_factor(*device_scale_factor)
            .mobile(*mobile)
            .build()
            .map_err(CaptureError::EngineLaunchFailed)?;

        if let Err(e) = page.execute(metrics).await {
            let _ = page.close().await;
            let _ = browser
                .lock()
                .await
                .execute(DisposeBrowserContextParams::new(context_id))
                .await;
            return Err(CaptureError::EngineLaunchFailed(format!(
                "viewport override: {e}"
            )));
        }
    }

    let recorder = match recording_sink {
        Some(sink) => {
            let dims = viewport.dimensions();
            match ScreencastRecorder::start(
                page.clone(),
                sink,
                config.ffmpeg_path.as_deref(),
                dims,
            )
            .await
            {
                Ok(recorder) => Some(recorder),
                Err(e) => {
                    let _ = page.close().await;
                    let _ = browser
                        .lock()
                        .await
                        .execute(DisposeBrowserContextParams::new(context_id))
                        .await;
                    return Err(e);
                }
            }
        }
        None => None,
    };

    Ok((page, context_id, recorder))
}
