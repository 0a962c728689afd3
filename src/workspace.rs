//! Resolved project state
//!
//! A [`Workspace`] is built once per invocation from the configuration and
//! never changes afterwards. Everything that depends on the selected
//! environment directory (`{venv_dir}`) is derived on demand from an
//! [`Environment`].

use crate::archive::ArchiveCache;
use crate::build::Virtualenv;
use crate::config::Config;
use crate::deps::{DependencySet, Identity};
use crate::env::{Activation, DirectorySelector, Environment, SpaceProbe};
use crate::error::{AutodepsError, AutodepsResult};
use crate::process::ProcessRunner;
use crate::template::{Placeholder, TemplateContext};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

const VERSION_PROBE: &str = "import platform; print(platform.python_version())";

/// Everything derived from the configuration before a directory is chosen
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    config: Config,
    user: String,
    requirements: DependencySet,
    identity: Identity,
    context: TemplateContext,
    candidates: Vec<PathBuf>,
    archive_dir: Option<PathBuf>,
    latest_link: Option<PathBuf>,
    submodule_path: Option<PathBuf>,
}

impl Workspace {
    /// Resolve `config` for the project at `root`
    ///
    /// Probes the runtime version with the configured interpreter unless
    /// `runtime-version` is set.
    pub async fn resolve(root: &Path, config: Config) -> AutodepsResult<Self> {
        let runtime_version = match config.runtime_version.clone() {
            Some(version) => version,
            None => detect_runtime_version(&config.python).await?,
        };
        Self::resolve_with_version(root, config, runtime_version).await
    }

    /// Resolve with an already known runtime version
    pub async fn resolve_with_version(
        root: &Path,
        config: Config,
        runtime_version: String,
    ) -> AutodepsResult<Self> {
        if config.virtualenv.is_empty() {
            return Err(AutodepsError::ConfigInvalid {
                path: root.to_path_buf(),
                reason: "virtualenv must name a command".to_string(),
            });
        }

        let root = std::path::absolute(root)
            .map_err(|e| AutodepsError::io(format!("resolving {}", root.display()), e))?;
        let user = current_user();

        let mut context = TemplateContext::new()
            .with(Placeholder::User, user.clone())
            .with(Placeholder::Root, root.to_string_lossy())
            .with(Placeholder::AutodepsDir, root.to_string_lossy());
        if let Some(home) = dirs::home_dir() {
            context.set(Placeholder::Home, home.to_string_lossy());
        }

        let requirement_files = context
            .expand_all(&config.requirements)?
            .into_iter()
            .map(|p| resolve_against(&root, &p))
            .collect::<Vec<_>>();
        let requirements = DependencySet::load(&requirement_files).await?;
        let identity = Identity::compute(&runtime_version, &requirements);
        debug!(
            "Identity {} from {} declarations (runtime {})",
            identity,
            requirements.len(),
            runtime_version
        );
        context.set(Placeholder::DepsHash, identity.as_str());

        let expand_path = |template: &Option<String>| -> AutodepsResult<Option<PathBuf>> {
            template
                .as_deref()
                .filter(|t| !t.is_empty())
                .map(|t| context.expand(t).map(|p| resolve_against(&root, &p)))
                .transpose()
        };
        let archive_dir = expand_path(&config.archived_venv_dir)?;
        let latest_link = expand_path(&config.venv_latest)?;
        let submodule_path = expand_path(&config.submodule_update)?;

        let candidates = context
            .expand_all(&config.venv_dir_search)?
            .into_iter()
            .map(|p| resolve_against(&root, &p))
            .collect();

        Ok(Self {
            root,
            config,
            user,
            requirements,
            identity,
            context,
            candidates,
            archive_dir,
            latest_link,
            submodule_path,
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn requirements(&self) -> &DependencySet {
        &self.requirements
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Expanded environment directory candidates, highest priority first
    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    pub fn latest_link(&self) -> Option<&Path> {
        self.latest_link.as_deref()
    }

    pub fn submodule_path(&self) -> Option<&Path> {
        self.submodule_path.as_deref()
    }

    pub fn archive(&self) -> ArchiveCache {
        ArchiveCache::new(self.archive_dir.clone(), &self.candidates)
    }

    /// Runner whose commands start in the project root
    pub fn runner(&self) -> ProcessRunner {
        ProcessRunner::new(&self.root)
    }

    /// Pick (and create if needed) the environment directory
    pub fn select_environment(&self, probe: &dyn SpaceProbe) -> AutodepsResult<Environment> {
        let path = DirectorySelector::new(
            self.candidates.clone(),
            self.config.required_gigabytes,
            probe,
        )
        .select()?;
        Ok(Environment::new(path, self.identity.clone()))
    }

    /// Toolchain commands for building `env`
    pub fn toolchain(&self, env: &Environment) -> AutodepsResult<Virtualenv> {
        let context = self.env_context(env);
        Ok(Virtualenv::new(
            context.expand_all(&self.config.virtualenv)?,
            context.expand(&self.config.python)?,
            context.expand_all(&self.config.pip_args)?,
        ))
    }

    /// Toolchain for installs into the system interpreter
    pub fn global_toolchain(&self) -> AutodepsResult<Virtualenv> {
        Ok(Virtualenv::new(
            self.context.expand_all(&self.config.virtualenv)?,
            self.context.expand(&self.config.python)?,
            self.context.expand_all(&self.config.pip_args)?,
        ))
    }

    /// Variables exposing `env` to a command
    pub fn activation(&self, env: &Environment) -> AutodepsResult<Activation> {
        let bin_dir = self.env_context(env).expand(&self.config.bin_dir)?;
        Ok(Activation::new(
            env.path().to_path_buf(),
            resolve_against(&self.root, &bin_dir),
        ))
    }

    fn env_context(&self, env: &Environment) -> TemplateContext {
        self.context
            .clone()
            .with(Placeholder::VenvDir, env.path().to_string_lossy())
    }
}

fn resolve_against(root: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Ask `python` for its version, e.g. `3.11.4`
pub async fn detect_runtime_version(python: &str) -> AutodepsResult<String> {
    let failure = |reason: String| AutodepsError::RuntimeVersion {
        python: python.to_string(),
        reason,
    };

    let output = Command::new(python)
        .args(["-c", VERSION_PROBE])
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| failure(e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(failure(format!("{} ({})", output.status, stderr.trim())));
    }

    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if version.is_empty() {
        return Err(failure("empty output".to_string()));
    }
    debug!("Runtime version {} from {}", version, python);
    Ok(version)
}

/// Login name: `$USER`, then `$LOGNAME`, then the effective uid
pub fn current_user() -> String {
    ["USER", "LOGNAME"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| {
            // SAFETY: geteuid has no preconditions and cannot fail.
            unsafe { libc::geteuid() }.to_string()
        })
}
