//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// autodeps - hash-keyed Python virtualenvs
///
/// Builds the virtualenv for the project's requirement files once, shares it
/// between concurrent invocations, and reuses archived copies when available.
#[derive(Parser, Debug)]
#[command(name = "autodeps")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute (default: provision)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "AUTODEPS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Project root holding the configuration and requirement files
    #[arg(long, global = true, env = "AUTODEPS_ROOT")]
    pub root: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build or restore the environment if it is not ready yet
    Provision,

    /// Print the selected environment directory
    Directory,

    /// Print the path of the archive tarball for this dependency set
    Archive,

    /// Print the identity of the dependency set
    Identity,

    /// Install every requirement into the system interpreter (root only)
    InstallGlobally,

    /// Provision, then print shell exports activating the environment
    Env,

    /// Provision, then run a command inside the environment
    Exec(ExecArgs),
}

/// Arguments for the exec command
#[derive(Parser, Debug)]
pub struct ExecArgs {
    /// Command and its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}
