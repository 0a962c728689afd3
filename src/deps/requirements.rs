//! Requirement file parsing
//!
//! Each line has everything from `#` onwards removed and is trimmed; empty
//! results are dropped. Duplicates are kept and order is preserved.

use crate::error::{AutodepsError, AutodepsResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Ordered list of dependency declarations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencySet(Vec<String>);

impl DependencySet {
    /// Build from already-clean declarations
    pub fn new(declarations: Vec<String>) -> Self {
        Self(declarations)
    }

    /// Parse the text of one requirement file
    pub fn parse(text: &str) -> Self {
        Self(text.lines().filter_map(clean_line).collect())
    }

    /// Read and concatenate requirement files in the given order
    pub async fn load(paths: &[PathBuf]) -> AutodepsResult<Self> {
        let mut set = Self::default();
        for path in paths {
            let text = fs::read_to_string(path)
                .await
                .map_err(|e| AutodepsError::RequirementsRead {
                    path: path.clone(),
                    source: e,
                })?;
            let parsed = Self::parse(&text);
            debug!("Read {} declarations from {}", parsed.len(), path.display());
            set.0.extend(parsed.0);
        }
        Ok(set)
    }

    /// Declarations in order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Contents of the manifest copy written into an environment
    pub fn to_manifest(&self) -> String {
        let mut out = self.0.join("\n");
        out.push('\n');
        out
    }

    /// Write the manifest copy to `path`
    pub async fn write_manifest(&self, path: &Path) -> AutodepsResult<()> {
        fs::write(path, self.to_manifest())
            .await
            .map_err(|e| AutodepsError::io(format!("writing {}", path.display()), e))
    }
}

fn clean_line(line: &str) -> Option<String> {
    let without_comment = match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    };
    let trimmed = without_comment.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Short name used for a declaration's log files
///
/// `git+https://host/org/my-pkg.git` gives `my-pkg`, `--pre tensorflow` gives
/// `tensorflow`, anything else is used as-is with `/` replaced.
pub fn package_token(declaration: &str) -> String {
    let after_slash = declaration
        .match_indices('/')
        .rev()
        .map(|(idx, _)| leading_name(&declaration[idx + 1..]))
        .find(|run| !run.is_empty());
    if let Some(run) = after_slash {
        return run.to_string();
    }

    if let Some((_, last)) = declaration.rsplit_once(' ') {
        if !last.is_empty() && last.chars().all(|c| c.is_ascii_alphabetic()) {
            return last.to_string();
        }
    }

    declaration.replace('/', "_")
}

fn leading_name(s: &str) -> &str {
    let end = s
        .find(|c: char| !(c.is_ascii_alphabetic() || c == '-'))
        .unwrap_or(s.len());
    &s[..end]
}
