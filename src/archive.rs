//! Precomputed environment tarballs
//!
//! Archives are named `<identity>.tar.gz` and hold an environment directory
//! as their single top-level entry. Restoring extracts into a scratch
//! sibling `<target>.restore` and renames that entry onto the target, so the
//! archived name need not match. The archive directory is append-only: a tarball
//! is first written under a unique temporary name and then linked into
//! place without clobbering, so the first publisher wins and readers never
//! see a partial file.

use crate::build::toolchain::Toolchain;
use crate::deps::Identity;
use crate::env::with_suffix;
use crate::process::{LogTarget, ProcessRunner};
use crate::ui::ProgressReporter;
use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Log written inside the environment while packing it
pub const ARCHIVE_LOG: &str = "archive.log";

/// Result of a publish attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Published(PathBuf),
    Skipped(String),
}

/// Lookup and publication of environment tarballs
#[derive(Debug, Clone, Default)]
pub struct ArchiveCache {
    archive_dir: Option<PathBuf>,
    search_dirs: Vec<PathBuf>,
}

impl ArchiveCache {
    /// Search the archive directory first, then the parents of `env_candidates`
    pub fn new(archive_dir: Option<PathBuf>, env_candidates: &[PathBuf]) -> Self {
        let mut search_dirs: Vec<PathBuf> = Vec::new();
        let parents = env_candidates
            .iter()
            .filter_map(|c| c.parent().map(Path::to_path_buf));
        for dir in archive_dir.iter().cloned().chain(parents) {
            if !search_dirs.contains(&dir) {
                search_dirs.push(dir);
            }
        }
        Self {
            archive_dir,
            search_dirs,
        }
    }

    pub fn archive_dir(&self) -> Option<&Path> {
        self.archive_dir.as_deref()
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// Where the tarball for `identity` is published, if anywhere
    pub fn tarball_path(&self, identity: &Identity) -> Option<PathBuf> {
        self.archive_dir
            .as_ref()
            .map(|dir| dir.join(identity.archive_file_name()))
    }

    /// First existing tarball for `identity`
    pub fn find(&self, identity: &Identity) -> Option<PathBuf> {
        self.search_dirs
            .iter()
            .map(|dir| dir.join(identity.archive_file_name()))
            .find(|path| path.is_file())
    }

    /// Extract a matching tarball into `target`
    ///
    /// Returns whether the environment was restored. On failure the partial
    /// target is removed so the caller can build from scratch.
    pub async fn restore(
        &self,
        identity: &Identity,
        target: &Path,
        toolchain: &dyn Toolchain,
        runner: &ProcessRunner,
        progress: &mut ProgressReporter,
        submodule: Option<&Path>,
    ) -> bool {
        let tarball = match self.find(identity) {
            Some(tarball) => tarball,
            None => {
                debug!("No archive for {}", identity);
                return false;
            }
        };

        progress.set_total(1 + usize::from(submodule.is_some()));

        let scratch = with_suffix(target, ".restore");
        if let Err(e) = fresh_dir(&scratch).await {
            warn!("Cannot create {}: {}", scratch.display(), e);
            return false;
        }

        let step = format!("Extracting {} to {}", tarball.display(), target.display());
        let spec = toolchain.unpack(&tarball, &scratch);
        let extracted = match runner.run(&step, &spec, &LogTarget::Progress, progress).await {
            Ok(_) => adopt_extracted(&scratch, target).await,
            Err(e) => Err(io::Error::other(e.to_string())),
        };
        remove_dir_quietly(&scratch).await;

        if let Err(e) = extracted {
            warn!("Restoring from {} failed: {}", tarball.display(), e);
            remove_dir_quietly(target).await;
            return false;
        }

        if let Some(repo) = submodule {
            let log = LogTarget::File(target.join("submodules.log"));
            let spec = toolchain.update_submodules(repo);
            if let Err(e) = runner.run("Updating submodules", &spec, &log, progress).await {
                debug!("Submodule update failed: {}", e);
            }
        }

        info!("Restored {} from {}", target.display(), tarball.display());
        true
    }

    /// Pack `source` into the archive directory unless a tarball exists
    ///
    /// Never fails: every problem turns into `Skipped`.
    pub async fn publish(
        &self,
        identity: &Identity,
        source: &Path,
        toolchain: &dyn Toolchain,
        runner: &ProcessRunner,
        progress: &mut ProgressReporter,
    ) -> PublishOutcome {
        let (dir, dst) = match (self.archive_dir.as_ref(), self.tarball_path(identity)) {
            (Some(dir), Some(dst)) => (dir, dst),
            _ => return skipped("no archive directory configured"),
        };

        if !is_writable(dir) {
            return skipped(format!("{} is not writable", dir.display()));
        }
        if dst.exists() {
            return skipped(format!("{} already exists", dst.display()));
        }

        let tmp = dir.join(format!("{}_{}.tar.gz", identity, Uuid::new_v4().simple()));
        let log = LogTarget::File(source.join(ARCHIVE_LOG));
        let spec = toolchain.pack(source, &tmp);

        let outcome = match runner.run("Making tar archive", &spec, &log, progress).await {
            Ok(_) => place(&tmp, &dst),
            Err(e) => Err(io::Error::other(e.to_string())),
        };

        match outcome {
            Ok(true) => {
                info!("Published {}", dst.display());
                PublishOutcome::Published(dst)
            }
            Ok(false) => {
                remove_quietly(&tmp);
                skipped(format!("{} was published concurrently", dst.display()))
            }
            Err(e) => {
                remove_quietly(&tmp);
                skipped(format!("archiving failed: {}", e))
            }
        }
    }
}

fn skipped(reason: impl Into<String>) -> PublishOutcome {
    let reason = reason.into();
    debug!("Archive skipped: {}", reason);
    PublishOutcome::Skipped(reason)
}

/// Move `tmp` to `dst` unless `dst` exists; `Ok(false)` means someone else won
fn place(tmp: &Path, dst: &Path) -> io::Result<bool> {
    std::fs::set_permissions(tmp, std::fs::Permissions::from_mode(0o644))?;

    match std::fs::hard_link(tmp, dst) {
        Ok(()) => {
            remove_quietly(tmp);
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => {
            // Filesystems without hard links
            debug!("Hard link into {} failed ({}), renaming", dst.display(), e);
            if dst.exists() {
                return Ok(false);
            }
            std::fs::rename(tmp, dst)?;
            Ok(true)
        }
    }
}

async fn fresh_dir(dir: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }
    tokio::fs::create_dir_all(dir).await
}

/// Move the single directory extracted into `scratch` to `target`
async fn adopt_extracted(scratch: &Path, target: &Path) -> io::Result<()> {
    let mut entries = tokio::fs::read_dir(scratch).await?;
    let mut top = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        top.push(entry);
    }

    let extracted = match top.as_slice() {
        [entry] if entry.path().is_dir() => entry.path(),
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("expected one top-level directory, found {} entries", top.len()),
            ))
        }
    };

    match tokio::fs::remove_dir_all(target).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }
    tokio::fs::rename(&extracted, target).await
}

async fn remove_dir_quietly(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != io::ErrorKind::NotFound {
            debug!("Cannot remove {}: {}", dir.display(), e);
        }
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            debug!("Cannot remove {}: {}", path.display(), e);
        }
    }
}

fn is_writable(dir: &Path) -> bool {
    let Ok(c_path) = CString::new(dir.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: c_path is a valid NUL-terminated string.
    unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 }
}
