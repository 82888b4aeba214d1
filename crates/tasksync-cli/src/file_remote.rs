//! Remote backed by a JSON file, so separate CLI databases can sync
//! through a shared path.
//!
//! Every call holds a lock file next to the remote while it reloads the
//! file and, for pushes, writes it back.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tasksync_core::models::Watermark;
use tasksync_core::sync::{
    MemoryRemote, PullBatch, PushItem, PushResult, Remote, RemoteError, RemoteSnapshot,
};

use crate::error::CliError;

/// How long a call waits for another client to release the lock
const LOCK_WAIT: Duration = Duration::from_secs(5);
const LOCK_RETRY: Duration = Duration::from_millis(20);
/// Lock files older than this belong to a client that died mid-write
const STALE_LOCK: Duration = Duration::from_secs(30);

pub struct FileRemote {
    path: PathBuf,
    inner: MemoryRemote,
}

/// Held while the remote file is read and rewritten; removes the lock file
/// on drop
struct RemoteLock {
    path: PathBuf,
}

impl Drop for RemoteLock {
    fn drop(&mut self) {
        if let Err(error) = fs::remove_file(&self.path) {
            tracing::warn!("Failed to release {}: {error}", self.path.display());
        }
    }
}

impl FileRemote {
    /// Load the remote at `path`; a missing file is an empty remote.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CliError> {
        let path = path.into();
        let snapshot = load_snapshot(&path).map_err(CliError::RemoteStore)?;

        Ok(Self {
            path,
            inner: MemoryRemote::from_snapshot(snapshot),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("json.lock")
    }

    async fn acquire(&self) -> Result<RemoteLock, RemoteError> {
        let lock_path = self.lock_path();
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(|error| self.unreachable(error))?;
        }

        let deadline = Instant::now() + LOCK_WAIT;
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(_) => return Ok(RemoteLock { path: lock_path }),
                Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
                    if lock_is_stale(&lock_path) {
                        tracing::warn!("Removing stale lock {}", lock_path.display());
                        // Another waiter may have removed it first.
                        let _ = fs::remove_file(&lock_path);
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(RemoteError::Unreachable(format!(
                            "{} is locked by another client",
                            self.path.display()
                        )));
                    }
                    tokio::time::sleep(LOCK_RETRY).await;
                }
                Err(error) => return Err(self.unreachable(error)),
            }
        }
    }

    /// Replace the in-memory state with what is on disk
    fn reload(&self) -> Result<(), RemoteError> {
        let snapshot = load_snapshot(&self.path).map_err(RemoteError::Unreachable)?;
        self.inner.restore(snapshot);
        Ok(())
    }

    fn persist(&self) -> Result<(), RemoteError> {
        let raw = serde_json::to_string_pretty(&self.inner.snapshot())
            .map_err(|error| self.unreachable(error))?;

        // Readers only ever see a complete file.
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, raw).map_err(|error| self.unreachable(error))?;
        fs::rename(&staging, &self.path).map_err(|error| self.unreachable(error))?;
        Ok(())
    }

    fn unreachable(&self, error: impl std::fmt::Display) -> RemoteError {
        RemoteError::Unreachable(format!("{}: {error}", self.path.display()))
    }
}

fn load_snapshot(path: &Path) -> Result<RemoteSnapshot, String> {
    match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str(&raw)
            .map_err(|error| format!("{} is not a remote file: {error}", path.display())),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(RemoteSnapshot::default()),
        Err(error) => Err(format!("{}: {error}", path.display())),
    }
}

fn lock_is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age > STALE_LOCK)
}

impl Remote for FileRemote {
    async fn push(&self, batch: &[PushItem]) -> Result<Vec<PushResult>, RemoteError> {
        let _lock = self.acquire().await?;
        self.reload()?;
        let results = self.inner.push(batch).await?;
        self.persist()?;
        tracing::debug!("Remote file {} updated", self.path.display());
        Ok(results)
    }

    async fn pull(&self, since: Option<&Watermark>) -> Result<PullBatch, RemoteError> {
        let _lock = self.acquire().await?;
        self.reload()?;
        self.inner.pull(since).await
    }
}
