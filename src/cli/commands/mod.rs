//! CLI command implementations

pub mod activate;
pub mod inspect;
pub mod install;
pub mod provision;

pub use activate::{env, exec};
pub use inspect::{archive, directory, identity};
pub use install::execute as install_globally;
pub use provision::execute as provision;
