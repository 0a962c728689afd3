//! Exposing a provisioned environment to a command
//!
//! The caller's own environment is never touched; variables are applied to
//! child processes only.

use crate::error::{AutodepsError, AutodepsResult};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Variable naming the environment directory
pub const VENV_DIR_VAR: &str = "VENV_DIR";

/// Variables that activate one environment
#[derive(Debug, Clone)]
pub struct Activation {
    env_dir: PathBuf,
    bin_dir: PathBuf,
}

impl Activation {
    pub fn new(env_dir: PathBuf, bin_dir: PathBuf) -> Self {
        Self { env_dir, bin_dir }
    }

    pub fn env_dir(&self) -> &Path {
        &self.env_dir
    }

    /// Variables to set, given the inherited `PATH`
    pub fn vars(&self, inherited_path: Option<OsString>) -> AutodepsResult<Vec<(String, OsString)>> {
        let mut entries = vec![self.bin_dir.clone()];
        if let Some(path) = inherited_path {
            entries.extend(std::env::split_paths(&path));
        }
        let path = std::env::join_paths(entries)
            .map_err(|e| AutodepsError::User(format!("cannot build PATH: {}", e)))?;

        Ok(vec![
            ("PATH".to_string(), path),
            ("VIRTUAL_ENV".to_string(), self.env_dir.clone().into_os_string()),
            (VENV_DIR_VAR.to_string(), self.env_dir.clone().into_os_string()),
        ])
    }

    /// `export` lines for a POSIX shell
    pub fn shell_exports(&self, inherited_path: Option<OsString>) -> AutodepsResult<String> {
        let mut out = String::new();
        for (key, value) in self.vars(inherited_path)? {
            out.push_str(&format!(
                "export {}={}\n",
                key,
                shell_quote(&value.to_string_lossy())
            ));
        }
        Ok(out)
    }

    /// Run `command` inside the environment and return its exit code
    pub async fn exec(&self, command: &[String]) -> AutodepsResult<i32> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| AutodepsError::User("no command given".to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        for (key, value) in self.vars(std::env::var_os("PATH"))? {
            cmd.env(key, value);
        }

        debug!("Executing in {}: {:?}", self.env_dir.display(), command);
        let status = cmd.status().await.map_err(|e| AutodepsError::CommandSpawn {
            command: command.join(" "),
            source: e,
        })?;

        Ok(status.code().unwrap_or(-1))
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
