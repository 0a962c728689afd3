//! Provision-if-needed for one environment
//!
//! ```text
//! selected ──marker──▶ AlreadyComplete
//!    │
//!    └─lock─▶ marker ──▶ CompletedByPeer
//!               │
//!               ├─archive─▶ Restored ─┐
//!               └─build───▶ Built ────┴─▶ marker written, lock released
//! ```
//!
//! Nothing but the marker check happens before the lock is held.

use crate::archive::ArchiveCache;
use crate::build::{BuildOrchestrator, Toolchain};
use crate::deps::DependencySet;
use crate::env::{update_latest_link, EnvLock, Environment};
use crate::error::AutodepsResult;
use crate::process::ProcessRunner;
use crate::ui::ProgressReporter;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// How a request for an environment was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// Marker was present; no lock taken
    AlreadyComplete,
    /// Another process finished while we waited for the lock
    CompletedByPeer,
    /// Extracted from an archive
    Restored,
    /// Built from scratch
    Built,
}

impl fmt::Display for ProvisionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::AlreadyComplete => "already complete",
            Self::CompletedByPeer => "completed by another process",
            Self::Restored => "restored from archive",
            Self::Built => "built",
        };
        f.write_str(text)
    }
}

/// Drives one environment from "selected" to "usable"
pub struct Provisioner<'a> {
    toolchain: &'a dyn Toolchain,
    runner: &'a ProcessRunner,
    archive: &'a ArchiveCache,
    submodule: Option<&'a Path>,
    latest_link: Option<&'a Path>,
}

impl<'a> Provisioner<'a> {
    pub fn new(toolchain: &'a dyn Toolchain, runner: &'a ProcessRunner, archive: &'a ArchiveCache) -> Self {
        Self {
            toolchain,
            runner,
            archive,
            submodule: None,
            latest_link: None,
        }
    }

    /// Update submodules of `repo` after building or restoring
    pub fn with_submodule(mut self, repo: Option<&'a Path>) -> Self {
        self.submodule = repo;
        self
    }

    /// Keep `link` pointing at the environment
    pub fn with_latest_link(mut self, link: Option<&'a Path>) -> Self {
        self.latest_link = link;
        self
    }

    /// Make `env` usable, building or restoring it if needed
    pub async fn provision(
        &self,
        env: &Environment,
        deps: &DependencySet,
        progress: &mut ProgressReporter,
    ) -> AutodepsResult<ProvisionOutcome> {
        if let Some(link) = self.latest_link {
            update_latest_link(link, env.path());
        }

        if env.is_complete() {
            debug!("{} is complete", env.path().display());
            return Ok(ProvisionOutcome::AlreadyComplete);
        }

        let lock = EnvLock::acquire(env.path()).await?;
        let result = self.provision_locked(env, deps, progress).await;
        lock.release();

        if let Ok(outcome) = &result {
            info!("{}: {}", env.path().display(), outcome);
        }
        result
    }

    async fn provision_locked(
        &self,
        env: &Environment,
        deps: &DependencySet,
        progress: &mut ProgressReporter,
    ) -> AutodepsResult<ProvisionOutcome> {
        if env.is_complete() {
            return Ok(ProvisionOutcome::CompletedByPeer);
        }

        env.discard_incomplete().await?;

        let restored = self
            .archive
            .restore(
                env.identity(),
                env.path(),
                self.toolchain,
                self.runner,
                progress,
                self.submodule,
            )
            .await;

        let outcome = if restored {
            ProvisionOutcome::Restored
        } else {
            progress.info("deps changed, rebuilding virtualenv (this may take a while)");
            BuildOrchestrator::new(self.toolchain, self.runner, self.archive, self.submodule)
                .build(env, deps, progress)
                .await?;
            ProvisionOutcome::Built
        };

        env.mark_complete().await?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::Identity;
    use crate::error::AutodepsError;
    use crate::testutil::{CaptureBuffer, ScriptToolchain};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn quiet() -> ProgressReporter {
        ProgressReporter::with_writer(Box::new(CaptureBuffer::default()), false)
    }

    fn environment(root: &Path, deps: &DependencySet) -> Environment {
        Environment::new(root.join("envs").join("env"), Identity::compute("3.11", deps))
    }

    #[tokio::test]
    async fn complete_environment_takes_fast_path() {
        let temp = TempDir::new().unwrap();
        let deps = DependencySet::parse("foo\n");
        let env = environment(temp.path(), &deps);
        std::fs::create_dir_all(env.path()).unwrap();
        env.mark_complete().await.unwrap();

        let tc = ScriptToolchain::default();
        let runner = ProcessRunner::new(temp.path());
        let archive = ArchiveCache::default();
        let outcome = Provisioner::new(&tc, &runner, &archive)
            .provision(&env, &deps, &mut quiet())
            .await
            .unwrap();

        assert_eq!(outcome, ProvisionOutcome::AlreadyComplete);
        assert!(!env.lock_path().exists());
        assert_eq!(tc.creates(), 0);
        assert_eq!(tc.installs(), 0);
    }

    #[tokio::test]
    async fn builds_then_marks_and_links() {
        let temp = TempDir::new().unwrap();
        let deps = DependencySet::parse("foo\nbar\n");
        let env = environment(temp.path(), &deps);
        std::fs::create_dir_all(env.path()).unwrap();
        let link = temp.path().join(".venv_latest");

        let tc = ScriptToolchain::default();
        let runner = ProcessRunner::new(temp.path());
        let archive = ArchiveCache::default();
        let provisioner = Provisioner::new(&tc, &runner, &archive).with_latest_link(Some(link.as_path()));

        let outcome = provisioner.provision(&env, &deps, &mut quiet()).await.unwrap();
        assert_eq!(outcome, ProvisionOutcome::Built);
        assert!(env.is_complete());
        assert!(!env.lock_path().exists());
        assert_eq!(std::fs::read_link(&link).unwrap(), env.path());

        let again = provisioner.provision(&env, &deps, &mut quiet()).await.unwrap();
        assert_eq!(again, ProvisionOutcome::AlreadyComplete);
        assert_eq!(tc.creates(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_build_once() {
        let temp = TempDir::new().unwrap();
        let deps = DependencySet::parse("foo\n");
        let env = environment(temp.path(), &deps);
        std::fs::create_dir_all(env.path()).unwrap();

        let tc = Arc::new(ScriptToolchain::slow(0.3));
        let runner = Arc::new(ProcessRunner::new(temp.path()));
        let archive = Arc::new(ArchiveCache::default());

        let request = |env: Environment, deps: DependencySet| {
            let tc = tc.clone();
            let runner = runner.clone();
            let archive = archive.clone();
            tokio::spawn(async move {
                Provisioner::new(tc.as_ref(), &runner, &archive)
                    .provision(&env, &deps, &mut quiet())
                    .await
                    .unwrap()
            })
        };

        let (a, b) = tokio::join!(
            request(env.clone(), deps.clone()),
            request(env.clone(), deps.clone())
        );
        let outcomes = [a.unwrap(), b.unwrap()];

        assert_eq!(tc.creates(), 1);
        assert!(outcomes.contains(&ProvisionOutcome::Built));
        assert!(!outcomes.iter().all(|o| *o == ProvisionOutcome::Built));
        assert!(env.is_complete());
    }

    #[tokio::test]
    async fn failed_build_leaves_no_final_dir_and_retries() {
        let temp = TempDir::new().unwrap();
        let deps = DependencySet::parse("foo\nbroken\n");
        let env = environment(temp.path(), &deps);
        std::fs::create_dir_all(env.path()).unwrap();

        let tc = ScriptToolchain::failing_on("broken");
        let runner = ProcessRunner::new(temp.path());
        let archive = ArchiveCache::default();
        let provisioner = Provisioner::new(&tc, &runner, &archive);

        let err = provisioner
            .provision(&env, &deps, &mut quiet())
            .await
            .unwrap_err();
        assert!(matches!(err, AutodepsError::CommandFailed { .. }));
        assert!(!env.path().exists());
        assert!(env.staging_path().join("broken.out").exists());
        assert!(!env.lock_path().exists());

        tc.stop_failing();
        let outcome = provisioner.provision(&env, &deps, &mut quiet()).await.unwrap();
        assert_eq!(outcome, ProvisionOutcome::Built);
        assert!(env.is_complete());
        assert!(!env.staging_path().exists());
    }

    #[tokio::test]
    async fn archive_restore_skips_build() {
        let temp = TempDir::new().unwrap();
        let deps = DependencySet::parse("foo\n");
        let archive_dir = temp.path().join("archive");
        std::fs::create_dir(&archive_dir).unwrap();
        let archive = ArchiveCache::new(Some(archive_dir.clone()), &[]);
        let runner = ProcessRunner::new(temp.path());

        let first = environment(temp.path(), &deps);
        std::fs::create_dir_all(first.path()).unwrap();
        let builder = ScriptToolchain::default();
        let built = Provisioner::new(&builder, &runner, &archive)
            .provision(&first, &deps, &mut quiet())
            .await
            .unwrap();
        assert_eq!(built, ProvisionOutcome::Built);
        assert!(archive_dir.join(first.identity().archive_file_name()).exists());

        let second = Environment::new(temp.path().join("elsewhere"), first.identity().clone());
        std::fs::create_dir_all(second.path()).unwrap();
        let restorer = ScriptToolchain::default();
        let restored = Provisioner::new(&restorer, &runner, &archive)
            .provision(&second, &deps, &mut quiet())
            .await
            .unwrap();

        assert_eq!(restored, ProvisionOutcome::Restored);
        assert_eq!(restorer.creates(), 0);
        assert!(second.is_complete());
        assert!(second.path().join("installed").exists());
    }
}
