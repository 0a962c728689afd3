//! Environment directories and their lifecycle on disk
//!
//! An environment is usable once its completion marker exists; nothing else
//! about the directory is trusted.
//!
//! # Layout
//!
//! | Path | Meaning |
//! |------|---------|
//! | `<dir>/` | Published environment |
//! | `<dir>/.completed` | Marker, contains a timestamp for diagnostics |
//! | `<dir>.lock` | Advisory lock guarding `<dir>` |
//! | `<dir>.build/` | Staging tree of the running or last failed build |
//! | `<dir>.restore/` | Scratch directory while extracting an archive |

pub mod activate;
pub mod latest;
pub mod lock;
pub mod select;

pub use activate::Activation;
pub use latest::update_latest_link;
pub use lock::EnvLock;
pub use select::{DirectorySelector, SpaceProbe, Statvfs};

use crate::deps::Identity;
use crate::error::{AutodepsError, AutodepsResult};
use chrono::Local;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Name of the completion marker inside an environment
pub const MARKER_FILE: &str = ".completed";

/// Append `suffix` to the last component of `path`
pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// One environment directory addressed by identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    path: PathBuf,
    identity: Identity,
}

impl Environment {
    pub fn new(path: PathBuf, identity: Identity) -> Self {
        Self { path, identity }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn marker_path(&self) -> PathBuf {
        self.path.join(MARKER_FILE)
    }

    /// Staging directory used while building
    pub fn staging_path(&self) -> PathBuf {
        with_suffix(&self.path, ".build")
    }

    pub fn lock_path(&self) -> PathBuf {
        EnvLock::lock_path_for(&self.path)
    }

    /// Whether the completion marker is present
    pub fn is_complete(&self) -> bool {
        self.marker_path().exists()
    }

    /// Write the completion marker
    pub async fn mark_complete(&self) -> AutodepsResult<()> {
        let marker = self.marker_path();
        let stamp = Local::now().to_rfc3339();
        fs::write(&marker, stamp)
            .await
            .map_err(|e| AutodepsError::io(format!("writing {}", marker.display()), e))?;
        debug!("Marked {} complete", self.path.display());
        Ok(())
    }

    /// Remove an incomplete directory left at the final path
    ///
    /// Only valid while holding the lock.
    pub async fn discard_incomplete(&self) -> AutodepsResult<()> {
        match fs::remove_dir_all(&self.path).await {
            Ok(()) => {
                debug!("Removed incomplete {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AutodepsError::io(
                format!("removing incomplete {}", self.path.display()),
                e,
            )),
        }
    }
}
