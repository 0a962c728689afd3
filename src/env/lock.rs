//! Cross-process lock guarding one environment directory
//!
//! `flock(LOCK_EX)` on `<dir>.lock`. Waiting is unbounded: a process that
//! waits here never builds the same environment concurrently with another.
//! Locks belong to the open file description, so two handles opened
//! separately exclude each other even inside one process.

use crate::env::with_suffix;
use crate::error::{AutodepsError, AutodepsResult};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::MetadataExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exclusive hold on an environment's lock-file
#[derive(Debug)]
pub struct EnvLock {
    file: Option<File>,
    lock_path: PathBuf,
}

impl EnvLock {
    /// Lock-file guarding `dir`
    pub fn lock_path_for(dir: &Path) -> PathBuf {
        with_suffix(dir, ".lock")
    }

    /// Block until the lock for `dir` is held
    pub async fn acquire(dir: &Path) -> AutodepsResult<Self> {
        let lock_path = Self::lock_path_for(dir);
        let path = lock_path.clone();
        debug!("Waiting for lock {}", lock_path.display());

        let file = tokio::task::spawn_blocking(move || lock_blocking(&path))
            .await
            .map_err(|e| AutodepsError::Internal(format!("lock task failed: {}", e)))?
            .map_err(|e| AutodepsError::io(format!("locking {}", lock_path.display()), e))?;

        debug!("Acquired lock {}", lock_path.display());
        Ok(Self {
            file: Some(file),
            lock_path,
        })
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Remove the lock-file, then unlock
    ///
    /// The file is unlinked while still locked, so a waiter woken by the
    /// unlock always finds its inode gone and retries on a fresh file.
    /// Removal is best-effort.
    pub fn release(mut self) {
        match std::fs::remove_file(&self.lock_path) {
            Ok(()) => debug!("Removed lock {}", self.lock_path.display()),
            Err(e) => debug!("Lock {} not removed: {}", self.lock_path.display(), e),
        }
        self.unlock();
    }

    fn unlock(&mut self) {
        if let Some(file) = self.file.take() {
            // SAFETY: the descriptor is owned by `file`, which is alive here.
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
            if rc != 0 {
                debug!(
                    "Unlocking {} failed: {}",
                    self.lock_path.display(),
                    io::Error::last_os_error()
                );
            }
            // Closing the descriptor releases the lock regardless
            drop(file);
        }
    }
}

impl Drop for EnvLock {
    fn drop(&mut self) {
        self.unlock();
    }
}

fn lock_blocking(path: &Path) -> io::Result<File> {
    loop {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        flock_exclusive(&file)?;

        // A previous holder may have unlinked the path while we waited, in
        // which case we hold a lock nobody else can see. Start over.
        let held = file.metadata()?;
        match std::fs::metadata(path) {
            Ok(current) if current.dev() == held.dev() && current.ino() == held.ino() => {
                return Ok(file);
            }
            Ok(_) => debug!("Lock {} was replaced, retrying", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Lock {} was removed, retrying", path.display())
            }
            Err(e) => return Err(e),
        }
    }
}

fn flock_exclusive(file: &File) -> io::Result<()> {
    loop {
        // SAFETY: flock is a standard POSIX call on a descriptor owned by `file`.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}
