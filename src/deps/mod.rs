//! Dependency declarations and the identity derived from them
//!
//! An environment is addressed by the hash of the interpreter version plus
//! the ordered list of declarations read from the requirement files. Same
//! declarations in the same order = same environment.
//!
//! Order matters: reordering two lines yields a new identity.

pub mod identity;
pub mod requirements;

pub use identity::Identity;
pub use requirements::{package_token, DependencySet};
