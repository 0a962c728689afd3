//! autodeps - hash-keyed dependency environments
//!
//! Provisions a Python virtualenv for a project's declared requirements,
//! keyed by a hash of the runtime version and the declarations. Concurrent
//! processes asking for the same environment build it once; archived
//! copies on shared storage are restored instead of rebuilt.

pub mod archive;
pub mod build;
pub mod cli;
pub mod config;
pub mod deps;
pub mod env;
pub mod error;
pub mod process;
pub mod provision;
pub mod template;
pub mod ui;
pub mod workspace;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{AutodepsError, AutodepsResult};
