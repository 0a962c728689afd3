//! Configuration schema for autodeps
//!
//! Configuration lives next to the project as `autodeps.toml` (or the older
//! `autodeps.json`). Path-like values are templates, see
//! [`crate::template::Placeholder`] for the recognized keys.

use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Requirement files, relative to the project root
    pub requirements: Vec<String>,

    /// Candidate environment directories, highest priority first
    pub venv_dir_search: Vec<String>,

    /// Minimum free space (GiB) a candidate's filesystem must report
    #[serde(rename = "venv-dir-required-gigabytes")]
    pub required_gigabytes: f64,

    /// Environment-creation command (argument list)
    pub virtualenv: Vec<String>,

    /// Interpreter used for the version probe and global installs
    pub python: String,

    /// Runtime version fed into the identity; probed from `python` when unset
    pub runtime_version: Option<String>,

    /// Shared directory for precomputed environment tarballs
    pub archived_venv_dir: Option<String>,

    /// Symlink kept pointing at the selected environment
    pub venv_latest: Option<String>,

    /// Repository whose submodules are updated before building
    pub submodule_update: Option<String>,

    /// Extra arguments passed to every `pip install`
    pub pip_args: Vec<String>,

    /// Directory prepended to PATH on activation
    pub bin_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            requirements: vec!["requirements.txt".to_string()],
            venv_dir_search: vec![
                "{home}/.cache/autodeps/{deps_hash}".to_string(),
                "/tmp/{user}/autodeps/{deps_hash}".to_string(),
            ],
            required_gigabytes: 1.0,
            virtualenv: vec![
                "python3".to_string(),
                "-m".to_string(),
                "virtualenv".to_string(),
            ],
            python: "python3".to_string(),
            runtime_version: None,
            archived_venv_dir: None,
            venv_latest: Some(".venv_latest".to_string()),
            submodule_update: None,
            pip_args: vec![],
            bin_dir: "{venv_dir}/bin".to_string(),
        }
    }
}
