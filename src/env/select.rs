//! Environment directory selection
//!
//! A directory someone already started on wins over free space: if any
//! candidate (or its lock-file) exists, the first such candidate is used.
//! Otherwise the first candidate whose filesystem has room is created.

use crate::env::lock::EnvLock;
use crate::error::{AutodepsError, AutodepsResult};
use std::ffi::CString;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Free-space query for a (possibly not yet existing) path
pub trait SpaceProbe: Send + Sync {
    /// Free space in GiB on the filesystem that would hold `path`
    fn free_gigabytes(&self, path: &Path) -> io::Result<f64>;
}

/// `statvfs` on the nearest existing ancestor
#[derive(Debug, Clone, Copy, Default)]
pub struct Statvfs;

impl SpaceProbe for Statvfs {
    fn free_gigabytes(&self, path: &Path) -> io::Result<f64> {
        let existing = nearest_existing_ancestor(path).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no existing ancestor of {}", path.display()),
            )
        })?;
        statvfs_free_bytes(existing).map(|bytes| bytes as f64 / GIB)
    }
}

/// Walk up from `path` until something exists
pub fn nearest_existing_ancestor(path: &Path) -> Option<&Path> {
    path.ancestors()
        .find(|p| !p.as_os_str().is_empty() && p.exists())
}

fn statvfs_free_bytes(path: &Path) -> io::Result<u64> {
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    // SAFETY: statvfs is plain old data; zeroed is a valid initial value.
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: c_path is NUL-terminated and stat points to writable memory.
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    #[allow(clippy::unnecessary_cast)]
    let free = stat.f_bavail as u64 * stat.f_frsize as u64;
    Ok(free)
}

/// Picks the environment directory from prioritized candidates
pub struct DirectorySelector<'a> {
    candidates: Vec<PathBuf>,
    required_gigabytes: f64,
    probe: &'a dyn SpaceProbe,
}

impl<'a> DirectorySelector<'a> {
    pub fn new(candidates: Vec<PathBuf>, required_gigabytes: f64, probe: &'a dyn SpaceProbe) -> Self {
        Self {
            candidates,
            required_gigabytes,
            probe,
        }
    }

    /// Select, creating the directory when nothing existed yet
    pub fn select(&self) -> AutodepsResult<PathBuf> {
        if let Some(existing) = self.candidates.iter().find(|p| is_claimed(p)) {
            debug!("Using existing environment directory {}", existing.display());
            return Ok(existing.clone());
        }

        for path in &self.candidates {
            match self.probe.free_gigabytes(path) {
                Ok(free) if free > self.required_gigabytes => {}
                Ok(free) => {
                    debug!(
                        "Skipping {}: {:.2} GiB free, need {:.2}",
                        path.display(),
                        free,
                        self.required_gigabytes
                    );
                    continue;
                }
                Err(e) => {
                    debug!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            }

            match std::fs::create_dir_all(path) {
                Ok(()) => {
                    debug!("Created environment directory {}", path.display());
                    return Ok(path.clone());
                }
                Err(_) if is_claimed(path) => {
                    debug!("Lost creation race for {}, using it", path.display());
                    return Ok(path.clone());
                }
                Err(e) => {
                    debug!("Cannot create {}: {}", path.display(), e);
                }
            }
        }

        Err(AutodepsError::NoViableDirectory {
            candidates: self.candidates.clone(),
        })
    }
}

fn is_claimed(path: &Path) -> bool {
    path.exists() || EnvLock::lock_path_for(path).exists()
}
