//! Persistence for the selection engine snapshot

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::{FramegateError, Result};
use crate::models::PersistedSnapshot;

/// Storage backend for the engine snapshot
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the last saved snapshot, if any
    async fn load(&self) -> Result<Option<PersistedSnapshot>>;

    /// Replace the saved snapshot
    async fn save(&self, snapshot: &PersistedSnapshot) -> Result<()>;
}

/// Snapshot store backed by a JSON file
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn load(&self) -> Result<Option<PersistedSnapshot>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot = serde_json::from_slice(&raw).map_err(|e| {
            FramegateError::Storage(format!(
                "corrupt snapshot at {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &PersistedSnapshot) -> Result<()> {
        let raw = serde_json::to_vec_pretty(snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write then rename so a crash never leaves a half-written snapshot.
        let _guard = self.write_lock.lock().await;
        let temp = self.temp_path();
        if let Err(e) = tokio::fs::write(&temp, raw).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        tokio::fs::rename(&temp, &self.path).await?;

        debug!("Snapshot saved to {}", self.path.display());
        Ok(())
    }
}

/// In-process snapshot store
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshot: Mutex<Option<PersistedSnapshot>>,
    saves: AtomicUsize,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: PersistedSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Current stored value
    pub fn current(&self) -> Option<PersistedSnapshot> {
        self.snapshot.lock().clone()
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self) -> Result<Option<PersistedSnapshot>> {
        Ok(self.snapshot.lock().clone())
    }

    async fn save(&self, snapshot: &PersistedSnapshot) -> Result<()> {
        *self.snapshot.lock() = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
