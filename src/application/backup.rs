//! Last-resort on-disk backup of click events.
//!
//! One JSON file per event, named `<unix-nanos>-<click-id>.json` with the
//! timestamp zero-padded so lexicographic order is arrival order. Files are
//! written under a temporary name, flushed to disk, and renamed into place,
//! so a reader never sees a partial file and a saved event survives a crash.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::domain::click_event::ClickEvent;

const BACKUP_EXTENSION: &str = "json";
const QUARANTINE_EXTENSION: &str = "corrupt";

/// Errors raised by the disk backup.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("Backup I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Backup serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BackupError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Directory of backed-up click events.
#[derive(Debug, Clone)]
pub struct DiskBackup {
    dir: PathBuf,
    last_stamp: Arc<AtomicI64>,
}

impl DiskBackup {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            last_stamp: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes one event to its own file, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError`] if the directory or file cannot be written.
    pub async fn save(&self, event: &ClickEvent) -> Result<PathBuf, BackupError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| BackupError::io(&self.dir, e))?;

        let name = format!("{:020}-{}", self.next_stamp(), event.id);
        let path = self.dir.join(format!("{name}.{BACKUP_EXTENSION}"));
        let tmp_path = self.dir.join(format!("{name}.tmp"));

        let data = serde_json::to_vec(event)?;
        if let Err(e) = write_synced(&tmp_path, &data).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BackupError::io(&tmp_path, e));
        }
        fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| BackupError::io(&path, e))?;
        sync_dir(&self.dir)
            .await
            .map_err(|e| BackupError::io(&self.dir, e))?;

        debug!(click_id = %event.id, file = %path.display(), "Click written to backup");
        Ok(path)
    }

    /// Current time in nanoseconds, strictly increasing across calls.
    fn next_stamp(&self) -> i64 {
        let now = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
        let previous = self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last.saturating_add(1)))
            })
            .unwrap_or(now);
        now.max(previous.saturating_add(1))
    }

    /// Lists backup files in arrival order.
    ///
    /// A missing directory is an empty backlog.
    pub async fn list(&self) -> Result<Vec<PathBuf>, BackupError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BackupError::io(&self.dir, e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BackupError::io(&self.dir, e))?
        {
            let path = entry.path();
            let is_backup = path
                .extension()
                .is_some_and(|ext| ext == BACKUP_EXTENSION);
            let is_file = entry
                .file_type()
                .await
                .map(|kind| kind.is_file())
                .unwrap_or(false);

            if is_backup && is_file {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }

    /// Reads and decodes one backup file.
    pub async fn read(&self, path: &Path) -> Result<ClickEvent, BackupError> {
        let data = fs::read(path).await.map_err(|e| BackupError::io(path, e))?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Deletes a replayed backup file.
    pub async fn remove(&self, path: &Path) -> Result<(), BackupError> {
        fs::remove_file(path)
            .await
            .map_err(|e| BackupError::io(path, e))
    }

    /// Renames an undecodable file so it is no longer listed.
    pub async fn quarantine(&self, path: &Path) -> Result<PathBuf, BackupError> {
        let target = path.with_extension(QUARANTINE_EXTENSION);
        fs::rename(path, &target)
            .await
            .map_err(|e| BackupError::io(path, e))?;
        Ok(target)
    }
}

/// Writes `data` and waits for it to reach the disk.
async fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await
}

/// Persists the directory entry created by a rename.
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}
