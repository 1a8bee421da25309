//! Checkpoint storage - the resumable state of the current run

use crate::core::PipelineState;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Directory under the project root that holds run state
pub const STATE_DIR: &str = ".stepwise";

/// Checkpoint file name inside [`STATE_DIR`]
pub const CHECKPOINT_FILE: &str = "checkpoint.json";

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize checkpoint: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Durable storage for one checkpoint record
///
/// A missing or unreadable record loads as `None`; callers then start fresh.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Overwrite the stored record
    async fn save(&self, state: &PipelineState) -> Result<(), CheckpointError>;

    /// Load the stored record, if there is a usable one
    async fn load(&self) -> Result<Option<PipelineState>, CheckpointError>;

    /// Remove the stored record; removing nothing is not an error
    async fn clear(&self) -> Result<(), CheckpointError>;
}

/// JSON checkpoint file, written through a temp file and an atomic rename
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<project>/.stepwise/checkpoint.json`
    pub fn for_project(project_dir: impl AsRef<Path>) -> Self {
        Self::new(project_dir.as_ref().join(STATE_DIR).join(CHECKPOINT_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Persist the rename itself; failure here only weakens durability
    #[cfg(unix)]
    async fn sync_parent_dir(&self) {
        let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) else {
            return;
        };
        let synced = match tokio::fs::File::open(parent).await {
            Ok(dir) => dir.sync_all().await,
            Err(e) => Err(e),
        };
        if let Err(e) = synced {
            warn!("Could not sync checkpoint directory {}: {}", parent.display(), e);
        }
    }

    #[cfg(not(unix))]
    async fn sync_parent_dir(&self) {}

    fn io_error(&self, path: &Path, source: std::io::Error) -> CheckpointError {
        CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, state: &PipelineState) -> Result<(), CheckpointError> {
        let json = serde_json::to_vec_pretty(state)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.io_error(parent, e))?;
            }
        }

        // The data must be on disk before the rename makes it the checkpoint
        let temp = self.temp_path();
        let mut file = tokio::fs::File::create(&temp)
            .await
            .map_err(|e| self.io_error(&temp, e))?;
        file.write_all(&json)
            .await
            .map_err(|e| self.io_error(&temp, e))?;
        file.sync_all()
            .await
            .map_err(|e| self.io_error(&temp, e))?;
        drop(file);

        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| self.io_error(&self.path, e))?;
        self.sync_parent_dir().await;

        debug!(
            "Saved checkpoint to {} ({} completed steps)",
            self.path.display(),
            state.completed_steps.len()
        );
        Ok(())
    }

    async fn load(&self) -> Result<Option<PipelineState>, CheckpointError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                warn!("Could not read checkpoint {}: {}", self.path.display(), e);
                return Ok(None);
            }
        };

        match serde_json::from_slice::<PipelineState>(&bytes) {
            Ok(state) => {
                debug!(
                    "Loaded checkpoint from {} ({} completed steps)",
                    self.path.display(),
                    state.completed_steps.len()
                );
                Ok(Some(state))
            }
            Err(e) => {
                warn!(
                    "Ignoring malformed checkpoint {}: {}",
                    self.path.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    async fn clear(&self) -> Result<(), CheckpointError> {
        for path in [self.path.clone(), self.temp_path()] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!("Removed {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(self.io_error(&path, e)),
            }
        }
        Ok(())
    }
}

/// Checkpoint kept in memory (for testing or ephemeral runs)
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    state: Mutex<Option<PipelineState>>,
    saves: AtomicUsize,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Copy of the stored record
    pub fn snapshot(&self) -> Option<PipelineState> {
        self.state.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, state: &PipelineState) -> Result<(), CheckpointError> {
        if let Ok(mut slot) = self.state.lock() {
            *slot = Some(state.clone());
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self) -> Result<Option<PipelineState>, CheckpointError> {
        Ok(self.snapshot())
    }

    async fn clear(&self) -> Result<(), CheckpointError> {
        if let Ok(mut slot) = self.state.lock() {
            *slot = None;
        }
        Ok(())
    }
}
