//! Video recording for capture jobs.
//!
//! Recording is wired at context creation: Chromium streams screencast
//! frames over CDP, each frame is base64-decoded and piped into an ffmpeg
//! child process that encodes a WebM at the job's reserved sink path.
//! Because the sink path is assigned before the page exists, a finished
//! recording is always attributable to its own job; no directory scanning
//! is ever needed, even with sibling recordings completing concurrently.

use crate::CaptureError;
use base64::Engine;
use chromiumoxide::cdp::browser_protocol::page::{
    EventScreencastFrame, ScreencastFrameAckParams, StartScreencastFormat, StartScreencastParams,
    StopScreencastParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Frames per second fed to the encoder.
const FRAME_RATE: u32 = 10;

/// How long to wait for ffmpeg to finalize the container after EOF.
const ENCODER_FLUSH_TIMEOUT: Duration = Duration::from_secs(15);

/// One in-flight screencast recording bound to a single page.
pub struct ScreencastRecorder {
    sink: PathBuf,
    page: Page,
    child: Child,
    pump: tokio::task::JoinHandle<usize>,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl ScreencastRecorder {
    /// Start encoding screencast frames from `page` into `sink`.
    ///
    /// An unlaunchable ffmpeg is an infrastructure failure on par with an
    /// unlaunchable browser, so it reports as `EngineLaunchFailed`.
    pub async fn start(
        page: Page,
        sink: PathBuf,
        ffmpeg_path: Option<&str>,
        max_dimensions: Option<(u32, u32)>,
    ) -> Result<Self, CaptureError> {
        let mut child = Command::new(ffmpeg_path.unwrap_or("ffmpeg"))
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-f", "image2pipe"])
            .args(["-framerate", &FRAME_RATE.to_string()])
            .args(["-i", "-"])
            .args(["-c:v", "libvpx", "-pix_fmt", "yuv420p", "-auto-alt-ref", "0"])
            .arg(&sink)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CaptureError::EngineLaunchFailed(format!("ffmpeg unavailable: {e}")))?;

        let mut encoder_in = child
            .stdin
            .take()
            .ok_or_else(|| CaptureError::EngineLaunchFailed("ffmpeg stdin not piped".to_string()))?;

        let mut frames = page
            .event_listener::<EventScreencastFrame>()
            .await
            .map_err(|e| CaptureError::CaptureFailed(format!("screencast listener: {e}")))?;

        let mut start = StartScreencastParams::builder()
            .format(StartScreencastFormat::Jpeg)
            .every_nth_frame(1);
        if let Some((width, height)) = max_dimensions {
            start = start.max_width(width as i64).max_height(height as i64);
        }
        page.execute(start.build())
            .await
            .map_err(|e| CaptureError::CaptureFailed(format!("start screencast: {e}")))?;

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let ack_page = page.clone();

        // Frame pump: decode, feed the encoder, ack so Chromium keeps
        // sending. Ends on the stop signal or when the event stream
        // closes with the page; dropping stdin is what tells ffmpeg to
        // finalize the file.
        let pump = tokio::spawn(async move {
            let mut written = 0usize;
            loop {
                let frame = tokio::select! {
                    _ = &mut stop_rx => break,
                    frame = frames.next() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                };

                let ack = ScreencastFrameAckParams::new(frame.session_id);
                match base64::engine::general_purpose::STANDARD.decode(&frame.data) {
                    Ok(jpeg) => {
                        if let Err(e) = encoder_in.write_all(&jpeg).await {
                            warn!("encoder pipe closed early: {e}");
                            break;
                        }
                        written += 1;
                    }
                    Err(e) => warn!("undecodable screencast frame: {e}"),
                }

                if let Err(e) = ack_page.execute(ack).await {
                    debug!("screencast ack failed, page likely gone: {e}");
                    break;
                }
            }

            let _ = encoder_in.shutdown().await;
            written
        });

        debug!(sink = %sink.display(), "screencast recording started");
        Ok(Self {
            sink,
            page,
            child,
            pump,
            stop_tx: Some(stop_tx),
        })
    }

    pub fn sink(&self) -> &PathBuf {
        &self.sink
    }

    /// Stop the screencast and wait for the encoder to finalize the WebM.
    /// Returns the sink path once the file is verified on disk.
    pub async fn finish(mut self) -> Result<PathBuf, CaptureError> {
        if let Err(e) = self.page.execute(StopScreencastParams::default()).await {
            debug!("stop screencast failed, page likely gone: {e}");
        }

        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        let frames = self.pump.await.unwrap_or(0);

        let finalized = match tokio::time::timeout(ENCODER_FLUSH_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) if status.success() && frames > 0 => Ok(()),
            Ok(Ok(status)) if frames == 0 => Err(CaptureError::CaptureFailed(format!(
                "no screencast frames captured (encoder exited with {status})"
            ))),
            Ok(Ok(status)) => Err(CaptureError::CaptureFailed(format!(
                "encoder exited with {status}"
            ))),
            Ok(Err(e)) => Err(CaptureError::CaptureFailed(format!("encoder wait: {e}"))),
            Err(_) => {
                let _ = self.child.start_kill();
                let _ = self.child.wait().await;
                Err(CaptureError::CaptureFailed(
                    "encoder flush timed out".to_string(),
                ))
            }
        };

        // A failed finalize must not strand a partial file for the sweep
        // to find.
        if let Err(e) = finalized {
            remove_partial(&self.sink);
            return Err(e);
        }

        if !self.sink.is_file() {
            return Err(CaptureError::ArtifactMissing(format!(
                "encoder produced nothing at {}",
                self.sink.display()
            )));
        }

        debug!(frames, sink = %self.sink.display(), "recording finalized");
        Ok(self.sink)
    }

    /// Tear the recording down without finalizing, for failed jobs. Any
    /// partial output at the sink is deleted. Safe to call regardless of
    /// how far the job got.
    pub async fn abort(mut self) {
        if let Err(e) = self.page.execute(StopScreencastParams::default()).await {
            debug!("stop screencast during abort: {e}");
        }
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        self.pump.abort();
        if let Err(e) = self.child.start_kill() {
            debug!("encoder kill during abort: {e}");
        }
        let _ = self.child.wait().await;

        remove_partial(&self.sink);
    }
}

fn remove_partial(sink: &std::path::Path) {
    match std::fs::remove_file(sink) {
        Ok(()) => debug!(sink = %sink.display(), "partial recording removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(sink = %sink.display(), "partial recording cleanup failed: {e}"),
    }
}
