//! autodeps - provision hash-keyed virtualenvs
//!
//! CLI entry point that dispatches to subcommands.

use autodeps::cli::{commands, Cli, Commands};
use autodeps::config::ConfigManager;
use autodeps::error::{AutodepsError, AutodepsResult};
use autodeps::build::global::require_root;
use autodeps::workspace::{current_user, Workspace};
use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the log filter
const LOG_ENV: &str = "AUTODEPS_LOG";

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> AutodepsResult<ExitCode> {
    let cli = Cli::parse();

    // 0 = warn, 1 = info, 2+ = debug; AUTODEPS_LOG wins
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| match cli.verbose {
        0 => EnvFilter::new("autodeps=warn"),
        1 => EnvFilter::new("autodeps=info"),
        _ => EnvFilter::new("autodeps=debug"),
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    // Nothing, not even the runtime probe, runs before the privilege check
    if matches!(cli.command, Some(Commands::InstallGlobally)) {
        require_root(&current_user())?;
    }

    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir()
            .map_err(|e| AutodepsError::io("getting current directory", e))?,
    };

    let config_manager = match cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::discover(&root),
    };
    let config = config_manager.load().await?;
    if let Some(path) = config_manager.path() {
        debug!("Loaded config from {}", path.display());
    }

    let workspace = Workspace::resolve(&root, config).await?;

    match cli.command.unwrap_or(Commands::Provision) {
        Commands::Provision => commands::provision(&workspace).await?,
        Commands::Directory => commands::directory(&workspace).await?,
        Commands::Archive => commands::archive(&workspace).await?,
        Commands::Identity => commands::identity(&workspace).await?,
        Commands::InstallGlobally => commands::install_globally(&workspace).await?,
        Commands::Env => commands::env(&workspace).await?,
        Commands::Exec(args) => return commands::exec(args, &workspace).await,
    }

    Ok(ExitCode::SUCCESS)
}
