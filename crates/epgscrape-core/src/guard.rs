//! Non-reentrant execution guard.
//!
//! Two layers: an in-process flag shared by clones of the same guard, and
//! an exclusive advisory lock on a lock file for separate processes.
//! Acquisition never blocks; a busy guard means the caller skips its run.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use fs2::FileExt;

use crate::error::GuardError;

/// Guard allowing at most one pipeline run at a time.
#[derive(Debug, Clone)]
pub struct RunGuard {
    lock_path: PathBuf,
    running: Arc<AtomicBool>,
}

/// Held for the duration of a run; releases the guard on drop.
#[derive(Debug)]
pub struct RunPermit {
    file: File,
    running: Arc<AtomicBool>,
}

impl RunGuard {
    /// Creates a guard backed by `lock_path`.
    #[must_use]
    pub fn new(lock_path: impl Into<PathBuf>) -> Self {
        Self {
            lock_path: lock_path.into(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Lock file path.
    #[must_use]
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Tries to acquire the guard without waiting.
    ///
    /// Returns `Ok(None)` if another run holds it.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be opened or locked for a
    /// reason other than contention.
    pub fn try_acquire(&self) -> Result<Option<RunPermit>, GuardError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(None);
        }

        match self.lock_file() {
            Ok(Some(file)) => Ok(Some(RunPermit {
                file,
                running: Arc::clone(&self.running),
            })),
            other => {
                self.running.store(false, Ordering::Release);
                other
                    .map(|_| None)
                    .map_err(|source| GuardError {
                        path: self.lock_path.clone(),
                        source,
                    })
            }
        }
    }

    fn lock_file(&self) -> std::io::Result<Option<File>> {
        if let Some(parent) = self.lock_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Some(file)),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(error = %e, "failed to release run lock");
        }
        self.running.store(false, Ordering::Release);
    }
}
