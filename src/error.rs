//! Error types for autodeps
//!
//! All modules use `AutodepsResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for autodeps operations
pub type AutodepsResult<T> = Result<T, AutodepsError>;

/// All errors that can occur while provisioning an environment
#[derive(Error, Debug)]
pub enum AutodepsError {
    // Directory selection
    #[error("No viable environment directory among: {}", format_candidates(.candidates))]
    NoViableDirectory { candidates: Vec<PathBuf> },

    // Build steps
    #[error("Failed to update dependencies: {step} (see {})", .log_path.display())]
    CommandFailed { step: String, log_path: PathBuf },

    #[error("Failed to start command: {command}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not determine runtime version using {python}: {reason}")]
    RuntimeVersion { python: String, reason: String },

    // Global install
    #[error("Installing globally requires root, running as {user}")]
    NotPrivileged { user: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Invalid template {template:?}: {reason}")]
    Template { template: String, reason: String },

    #[error("Failed to read requirements file {path}: {source}")]
    RequirementsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No archive directory configured")]
    NoArchiveDir,

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

fn format_candidates(candidates: &[PathBuf]) -> String {
    if candidates.is_empty() {
        return "(none configured)".to_string();
    }
    candidates
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl AutodepsError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a failed build step error
    pub fn command_failed(step: impl Into<String>, log_path: impl Into<PathBuf>) -> Self {
        Self::CommandFailed {
            step: step.into(),
            log_path: log_path.into(),
        }
    }

    /// Create a template error
    pub fn template(template: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Template {
            template: template.into(),
            reason: reason.into(),
        }
    }

    /// Log file the user should inspect, if the error has one
    pub fn log_path(&self) -> Option<&std::path::Path> {
        match self {
            Self::CommandFailed { log_path, .. } => Some(log_path),
            _ => None,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::NoViableDirectory { .. } => Some(
                "Free up disk space or add a writable entry to venv-dir-search (see venv-dir-required-gigabytes)",
            ),
            Self::NotPrivileged { .. } => Some("Run with sudo, or drop install-globally"),
            Self::NoArchiveDir => Some("Set archived-venv-dir in autodeps.toml"),
            Self::RuntimeVersion { .. } => Some("Set runtime-version or python in autodeps.toml"),
            Self::CommandFailed { .. } => {
                Some("The partial build is kept next to the environment with a .build suffix")
            }
            _ => None,
        }
    }
}
