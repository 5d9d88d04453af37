//! Single-restore-at-a-time guard for a live path
//!
//! The lock file lives in the system temp directory rather than next to the
//! live resource, so taking it never touches the resource's parent. Its name
//! is derived from the normalized live path, so two spellings of the same
//! path contend for the same lock.

use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use super::paths;

/// Contents written into a lock file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub live_path: String,
    /// RFC 3339 timestamp
    pub acquired_at: String,
}

#[derive(Error, Debug)]
pub enum LockError {
    #[error("another restore of this resource is in progress (lock file: {})", path.display())]
    Held {
        path: PathBuf,
        holder: Option<LockInfo>,
    },

    #[error("could not create lock file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Held lock; the file is removed when this is dropped
#[derive(Debug)]
pub struct RestoreLock {
    path: PathBuf,
}

impl RestoreLock {
    /// Take the lock for `live_path` in the system temp directory
    pub fn acquire(live_path: &Path) -> Result<Self, LockError> {
        Self::acquire_in(&std::env::temp_dir(), live_path)
    }

    /// Take the lock for `live_path`, placing the lock file in `lock_dir`
    pub fn acquire_in(lock_dir: &Path, live_path: &Path) -> Result<Self, LockError> {
        let normalized = paths::normalize_path(live_path).map_err(|source| LockError::Io {
            path: live_path.to_path_buf(),
            source,
        })?;
        let path = lock_file_path(lock_dir, &normalized);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let holder = read_holder(&path);
                return Err(LockError::Held { path, holder });
            }
            Err(source) => return Err(LockError::Io { path, source }),
        };

        let info = LockInfo {
            pid: std::process::id(),
            live_path: normalized.to_string_lossy().to_string(),
            acquired_at: chrono::Local::now().to_rfc3339(),
        };
        // The lock is held by the file's existence; the contents are informational
        if let Err(e) = write_info(&mut file, &info) {
            warn!(lock = %path.display(), error = %e, "Could not record lock holder");
        }

        debug!(lock = %path.display(), "Acquired restore lock");
        Ok(Self { path })
    }

    /// Location of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RestoreLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %e, "Failed to remove restore lock");
        }
    }
}

/// Lock file path for an already normalized live path
fn lock_file_path(lock_dir: &Path, normalized_live: &Path) -> PathBuf {
    let digest = md5::compute(normalized_live.to_string_lossy().as_bytes());
    lock_dir.join(format!("restore-tool-{:x}.lock", digest))
}

fn write_info<W: Write>(mut out: W, info: &LockInfo) -> io::Result<()> {
    serde_json::to_writer(&mut out, info)?;
    out.flush()
}

fn read_holder(path: &Path) -> Option<LockInfo> {
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}
