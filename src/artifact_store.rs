//! Artifact persistence on scratch storage.
//!
//! All capture jobs and the periodic sweep share one scratch directory.
//! Writers always use collision-resistant file names (millisecond
//! timestamp plus a random component), so concurrent jobs never contend
//! for the same path. Readers and the sweep expect deletion races and
//! treat a vanished file as benign.

use crate::{CaptureError, Config};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Image,
    Video,
}

impl ArtifactKind {
    pub fn extension(&self, image_ext: &'static str) -> &'static str {
        match self {
            ArtifactKind::Image => image_ext,
            ArtifactKind::Video => "webm",
        }
    }
}

/// Metadata for one persisted artifact.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub id: String,
    pub kind: ArtifactKind,
    pub device: String,
    pub created_at: DateTime<Utc>,
    pub path: PathBuf,
}

/// Opaque handle returned to callers; resolves back through
/// [`ArtifactStore::read`] or [`ArtifactStore::path`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub id: String,
}

/// Scratch-directory manager: unique-name writes, reads, and age-based
/// eviction.
pub struct ArtifactStore {
    root: PathBuf,
    retention: Duration,
    index: DashMap<String, Artifact>,
}

impl ArtifactStore {
    /// Create the store, ensuring the scratch directory exists.
    pub fn new(root: PathBuf, retention: Duration) -> Result<Self, CaptureError> {
        std::fs::create_dir_all(&root)
            .map_err(|e| CaptureError::CaptureFailed(format!("scratch dir unavailable: {e}")))?;

        Ok(Self {
            root,
            retention,
            index: DashMap::new(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, CaptureError> {
        Self::new(config.scratch_dir.clone(), config.retention_window)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Collision-resistant artifact file name. Timestamp alone is not
    /// unique under concurrent completion; the uuid component makes it so.
    pub fn unique_name(extension: &str) -> String {
        format!(
            "{}-{}.{}",
            Utc::now().timestamp_millis(),
            uuid::Uuid::new_v4().simple(),
            extension
        )
    }

    /// Reserve a per-job output path for a recording before the context is
    /// created. The recorder writes directly to this path, so the job can
    /// always find its own video without scanning the directory.
    pub fn reserve_sink(&self, extension: &str) -> PathBuf {
        self.root.join(Self::unique_name(extension))
    }

    /// Persist inline bytes (screenshots) under a fresh unique name.
    pub fn put_bytes(
        &self,
        bytes: &[u8],
        kind: ArtifactKind,
        device: &str,
        extension: &str,
    ) -> Result<ArtifactRef, CaptureError> {
        let path = self.root.join(Self::unique_name(extension));
        std::fs::write(&path, bytes)
            .map_err(|e| CaptureError::CaptureFailed(format!("artifact write failed: {e}")))?;

        debug!(path = %path.display(), size = bytes.len(), "artifact written");
        Ok(self.register(path, kind, device))
    }

    /// Register a file that is already on scratch storage (a finalized
    /// recording at its reserved sink path). No copy is made.
    pub fn register_file(
        &self,
        path: PathBuf,
        kind: ArtifactKind,
        device: &str,
    ) -> Result<ArtifactRef, CaptureError> {
        if !path.is_file() {
            return Err(CaptureError::ArtifactMissing(format!(
                "no file at {}",
                path.display()
            )));
        }
        Ok(self.register(path, kind, device))
    }

    fn register(&self, path: PathBuf, kind: ArtifactKind, device: &str) -> ArtifactRef {
        let id = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let artifact = Artifact {
            id: id.clone(),
            kind,
            device: device.to_string(),
            created_at: Utc::now(),
            path,
        };
        self.index.insert(id.clone(), artifact);
        ArtifactRef { id }
    }

    pub fn get(&self, artifact: &ArtifactRef) -> Option<Artifact> {
        self.index.get(&artifact.id).map(|entry| entry.value().clone())
    }

    /// Stream the artifact content back as bytes.
    pub fn read(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, CaptureError> {
        let meta = self
            .get(artifact)
            .ok_or_else(|| CaptureError::ArtifactMissing(artifact.id.clone()))?;
        std::fs::read(&meta.path)
            .map_err(|e| CaptureError::ArtifactMissing(format!("{}: {e}", artifact.id)))
    }

    /// On-disk path for the served-by-reference response mode.
    pub fn path(&self, artifact: &ArtifactRef) -> Option<PathBuf> {
        self.get(artifact).map(|meta| meta.path)
    }

    /// Delete the artifact file and forget it. A file already removed by
    /// the sweep is not an error.
    pub fn remove(&self, artifact: &ArtifactRef) {
        if let Some((_, meta)) = self.index.remove(&artifact.id) {
            match std::fs::remove_file(&meta.path) {
                Ok(()) => debug!(id = %artifact.id, "artifact removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(id = %artifact.id, "artifact removal failed: {e}"),
            }
        }
    }

    /// Delete every scratch file whose modification time is older than the
    /// retention window. Returns the number of files removed.
    ///
    /// Files can disappear between listing and deletion (a request that
    /// just finished streaming in ephemeral mode, or a concurrent sweep);
    /// those races are expected and skipped silently.
    pub fn sweep(&self) -> usize {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(root = %self.root.display(), "sweep could not list scratch dir: {e}");
                return 0;
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let expired = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .map(|age| age > self.retention)
                .unwrap_or(false);

            if !expired {
                continue;
            }

            match std::fs::remove_file(&path) {
                Ok(()) => {
                    removed += 1;
                    if let Some(name) = path.file_name() {
                        self.index.remove(&name.to_string_lossy().into_owned());
                    }
                    debug!(path = %path.display(), "swept expired artifact");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), "sweep delete failed: {e}"),
            }
        }

        if removed > 0 {
            info!(removed, "artifact sweep complete");
        }
        removed
    }

    pub fn tracked_count(&self) -> usize {
        self.index.len()
    }
}

/// Owned handle on the periodic sweep timer.
///
/// The timer is explicit process-lifecycle state: started once at init,
/// cancelled at shutdown. The sweep body itself only touches file
/// metadata and is independent of request traffic.
pub struct SweepTask {
    handle: tokio::task::JoinHandle<()>,
}

impl SweepTask {
    pub fn start(store: Arc<ArtifactStore>, interval: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so a fresh start
            // does not sweep an empty directory.
            timer.tick().await;
            loop {
                timer.tick().await;
                store.sweep();
            }
        });

        info!(interval_secs = interval.as_secs(), "artifact sweep scheduled");
        Self { handle }
    }

    pub fn cancel(self) {
        self.handle.abort();
        info!("artifact sweep cancelled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn scratch() -> PathBuf {
        let dir = std::env::temp_dir()
            .join("webcapture-test")
            .join(uuid::Uuid::new_v4().simple().to_string());
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_put_and_read_roundtrip() {
        let store = ArtifactStore::new(scratch(), Duration::from_secs(60)).unwrap();

        let artifact = store
            .put_bytes(b"png-bytes", ArtifactKind::Image, "phone", "png")
            .unwrap();
        assert_eq!(store.read(&artifact).unwrap(), b"png-bytes");

        let meta = store.get(&artifact).unwrap();
        assert_eq!(meta.kind, ArtifactKind::Image);
        assert_eq!(meta.device, "phone");
    }

    #[test]
    fn test_unique_names_under_concurrency() {
        let names: HashSet<String> = (0..1000).map(|_| ArtifactStore::unique_name("png")).collect();
        assert_eq!(names.len(), 1000);
    }

    #[test]
    fn test_register_file_missing_is_artifact_missing() {
        let store = ArtifactStore::new(scratch(), Duration::from_secs(60)).unwrap();
        let result = store.register_file(
            store.root().join("never-written.webm"),
            ArtifactKind::Video,
            "desktop",
        );
        assert!(matches!(result, Err(CaptureError::ArtifactMissing(_))));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let store = ArtifactStore::new(scratch(), Duration::from_secs(60)).unwrap();
        let artifact = store
            .put_bytes(b"x", ArtifactKind::Image, "desktop", "png")
            .unwrap();

        store.remove(&artifact);
        store.remove(&artifact); // second call is a no-op
        assert!(store.read(&artifact).is_err());
    }

    #[test]
    fn test_sweep_removes_only_expired_files() {
        let root = scratch();
        let store = ArtifactStore::new(root.clone(), Duration::from_secs(3600)).unwrap();

        let old = root.join("old.png");
        let fresh = root.join("fresh.png");
        std::fs::write(&old, b"old").unwrap();
        std::fs::write(&fresh, b"fresh").unwrap();

        // Back-date the old file past the retention window.
        let stale = SystemTime::now() - Duration::from_secs(2 * 3600);
        set_mtime(&old, stale);

        assert_eq!(store.sweep(), 1);
        assert!(!old.exists());
        assert!(fresh.exists());
    }

    #[test]
    fn test_sweep_tolerates_vanished_files() {
        let root = scratch();
        let store = ArtifactStore::new(root.clone(), Duration::from_secs(0)).unwrap();

        // Sweeping an emptied directory (everything "vanished") is fine.
        std::fs::write(root.join("gone.png"), b"x").unwrap();
        std::fs::remove_file(root.join("gone.png")).unwrap();
        assert_eq!(store.sweep(), 0);
    }

    fn set_mtime(path: &Path, to: SystemTime) {
        let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(to).unwrap();
    }
}
