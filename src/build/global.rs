//! Installing declarations into the system interpreter

use crate::build::toolchain::Toolchain;
use crate::deps::{package_token, DependencySet};
use crate::error::{AutodepsError, AutodepsResult};
use crate::process::{LogTarget, ProcessRunner};
use crate::ui::ProgressReporter;
use tempfile::TempDir;
use tracing::{debug, warn};

/// Whether the process runs with an effective uid of 0
pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

/// Fail with `NotPrivileged` for `user` unless running as root
pub fn require_root(user: &str) -> AutodepsResult<()> {
    if is_root() {
        Ok(())
    } else {
        Err(AutodepsError::NotPrivileged {
            user: user.to_string(),
        })
    }
}

/// Installs every declaration with the system `pip`
pub struct GlobalInstaller<'a> {
    toolchain: &'a dyn Toolchain,
    runner: &'a ProcessRunner,
}

impl<'a> GlobalInstaller<'a> {
    pub fn new(toolchain: &'a dyn Toolchain, runner: &'a ProcessRunner) -> Self {
        Self { toolchain, runner }
    }

    /// Install `deps` system-wide; fails before doing anything unless root
    pub async fn install(
        &self,
        deps: &DependencySet,
        user: &str,
        progress: &mut ProgressReporter,
    ) -> AutodepsResult<()> {
        require_root(user)?;
        self.install_unchecked(deps, progress).await
    }

    pub(crate) async fn install_unchecked(
        &self,
        deps: &DependencySet,
        progress: &mut ProgressReporter,
    ) -> AutodepsResult<()> {
        let logs = TempDir::with_prefix("autodeps-global-")
            .map_err(|e| AutodepsError::io("creating log directory", e))?;
        debug!("Global install logs in {}", logs.path().display());

        progress.set_total(deps.len());
        progress.set_prefix("Installing pip package ");

        let mut result = Ok(());
        for declaration in deps.iter() {
            let token = package_token(declaration);
            let spec = self.toolchain.install_global(declaration);
            let log = LogTarget::File(logs.path().join(format!("{}.out", token)));
            if let Err(e) = self.runner.run(&token, &spec, &log, progress).await {
                result = Err(e);
                break;
            }
            debug!("Installed {} globally", declaration);
        }
        progress.clear_prefix();

        if result.is_err() {
            // Keep the logs the error points at
            #[allow(deprecated)]
            let kept = logs.into_path();
            warn!("Install logs kept in {}", kept.display());
        }
        result
    }
}
