//! Environment build pipeline
//!
//! Everything happens in `<final>.build`; the final path only appears once
//! every mandatory step succeeded. A failed build leaves the staging tree
//! and its logs for inspection.

pub mod global;
pub mod toolchain;

pub use global::GlobalInstaller;
pub use toolchain::{Toolchain, Virtualenv};

use crate::archive::{ArchiveCache, PublishOutcome};
use crate::deps::{package_token, DependencySet};
use crate::env::Environment;
use crate::error::{AutodepsError, AutodepsResult};
use crate::process::{LogTarget, ProcessRunner};
use crate::ui::ProgressReporter;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

/// Manifest of the declarations an environment was built from
pub const MANIFEST_FILE: &str = "requirements.txt";

/// Step-name prefix for package installs
const INSTALL_PREFIX: &str = "Installing pip package ";

/// Runs the build steps for one environment
pub struct BuildOrchestrator<'a> {
    toolchain: &'a dyn Toolchain,
    runner: &'a ProcessRunner,
    archive: &'a ArchiveCache,
    submodule: Option<&'a Path>,
}

impl<'a> BuildOrchestrator<'a> {
    pub fn new(
        toolchain: &'a dyn Toolchain,
        runner: &'a ProcessRunner,
        archive: &'a ArchiveCache,
        submodule: Option<&'a Path>,
    ) -> Self {
        Self {
            toolchain,
            runner,
            archive,
            submodule,
        }
    }

    /// Number of progress steps a build of `deps` takes
    pub fn total_steps(&self, deps: &DependencySet) -> usize {
        4 + usize::from(self.submodule.is_some()) + deps.len()
    }

    /// Build `env` from `deps` and publish it at its final path
    pub async fn build(
        &self,
        env: &Environment,
        deps: &DependencySet,
        progress: &mut ProgressReporter,
    ) -> AutodepsResult<PublishOutcome> {
        let staging = env.staging_path();
        progress.set_total(self.total_steps(deps));

        recreate_dir(&staging).await?;

        if let Some(repo) = self.submodule {
            let log = LogTarget::File(staging.join("submodules.log"));
            let spec = self.toolchain.update_submodules(repo);
            if let Err(e) = self.runner.run("Updating submodules", &spec, &log, progress).await {
                debug!("Submodule update failed, continuing: {}", e);
            }
        }

        let step = format!("Creating venv {}", staging.display());
        let spec = self.toolchain.create_env(&staging);
        self.runner
            .run(&step, &spec, &LogTarget::File(staging.join("venv.log")), progress)
            .await?;

        let spec = self.toolchain.record_revision();
        let log = LogTarget::File(staging.join("revision"));
        if let Err(e) = self.runner.run("Recording git revision", &spec, &log, progress).await {
            debug!("No revision recorded: {}", e);
        }

        deps.write_manifest(&staging.join(MANIFEST_FILE)).await?;

        progress.set_prefix(INSTALL_PREFIX);
        let installed = self.install_all(&staging, deps, progress).await;
        progress.clear_prefix();
        installed?;

        let spec = self.toolchain.make_relocatable(&staging);
        let log = LogTarget::File(staging.join("relocatable.log"));
        self.runner
            .run("Making venv relocatable", &spec, &log, progress)
            .await?;

        promote(&staging, env.path()).await?;
        info!("Built {}", env.path().display());

        Ok(self
            .archive
            .publish(env.identity(), env.path(), self.toolchain, self.runner, progress)
            .await)
    }

    async fn install_all(
        &self,
        staging: &Path,
        deps: &DependencySet,
        progress: &mut ProgressReporter,
    ) -> AutodepsResult<()> {
        for declaration in deps.iter() {
            let token = package_token(declaration);
            let verbose = staging.join(toolchain::verbose_log_name(&token));
            let log = LogTarget::File(staging.join(format!("{}.out", token)));
            let spec = self.toolchain.install(staging, declaration, &verbose);
            self.runner.run(&token, &spec, &log, progress).await?;
        }
        Ok(())
    }
}

async fn recreate_dir(dir: &Path) -> AutodepsResult<()> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => debug!("Removed stale {}", dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(AutodepsError::io(format!("removing {}", dir.display()), e));
        }
    }
    fs::create_dir_all(dir)
        .await
        .map_err(|e| AutodepsError::io(format!("creating {}", dir.display()), e))
}

/// Replace `target` with `staging`
async fn promote(staging: &Path, target: &Path) -> AutodepsResult<()> {
    match fs::remove_dir_all(target).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(AutodepsError::io(format!("removing {}", target.display()), e));
        }
    }
    fs::rename(staging, target).await.map_err(|e| {
        AutodepsError::io(
            format!("renaming {} to {}", staging.display(), target.display()),
            e,
        )
    })
}
