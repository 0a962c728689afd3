//! User-facing output
//!
//! Build progress goes to stderr so that stdout stays clean for the
//! `directory`, `archive`, `identity` and `env` commands.

mod progress;

pub use progress::ProgressReporter;
