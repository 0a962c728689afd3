//! Environment identity
//!
//! SHA-224 over the runtime version followed by a quoted list rendering of
//! the declarations (`['foo==1.0', 'bar']`), truncated to 40 hex characters.
//! Each item is quoted the way a Python byte string prints itself: single
//! quotes unless the text holds `'` and no `"`, control and non-ASCII bytes
//! as `\xNN`. Archives on shared storage are keyed by this exact scheme, so
//! changing it orphans every existing tarball.

use crate::deps::requirements::DependencySet;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha224};
use std::fmt;

/// Number of hex characters kept from the digest
pub const IDENTITY_LEN: usize = 40;

/// Stable token addressing one environment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(String);

impl Identity {
    /// Derive the identity of `deps` under `runtime_version`
    pub fn compute(runtime_version: &str, deps: &DependencySet) -> Self {
        let mut hasher = Sha224::new();
        hasher.update(runtime_version.as_bytes());
        hasher.update(render_list(deps).as_bytes());
        let digest = hex::encode(hasher.finalize());
        Self(digest[..IDENTITY_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the archive holding this environment
    pub fn archive_file_name(&self) -> String {
        format!("{}.tar.gz", self.0)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn render_list(deps: &DependencySet) -> String {
    let items: Vec<String> = deps.iter().map(quote_item).collect();
    format!("[{}]", items.join(", "))
}

fn quote_item(item: &str) -> String {
    let quote = if item.contains('\'') && !item.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(item.len() + 2);
    out.push(quote);
    for &byte in item.as_bytes() {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'\t' => out.push_str("\\t"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b if b == quote as u8 => {
                out.push('\\');
                out.push(quote);
            }
            0x20..=0x7e => out.push(byte as char),
            _ => out.push_str(&format!("\\x{:02x}", byte)),
        }
    }
    out.push(quote);
    out
}
