//! Env and exec commands - expose the provisioned environment

use crate::cli::args::ExecArgs;
use crate::cli::commands::provision::provision_environment;
use crate::error::AutodepsResult;
use crate::workspace::Workspace;
use std::process::ExitCode;
use tracing::debug;

/// Provision, then print `export` lines for a POSIX shell
pub async fn env(workspace: &Workspace) -> AutodepsResult<()> {
    let (env, _) = provision_environment(workspace).await?;
    let activation = workspace.activation(&env)?;
    print!("{}", activation.shell_exports(std::env::var_os("PATH"))?);
    Ok(())
}

/// Provision, then run the command with the environment activated
pub async fn exec(args: ExecArgs, workspace: &Workspace) -> AutodepsResult<ExitCode> {
    let (env, _) = provision_environment(workspace).await?;
    let code = workspace.activation(&env)?.exec(&args.command).await?;
    debug!("{:?} exited with {}", args.command, code);

    Ok(match u8::try_from(code) {
        Ok(code) => ExitCode::from(code),
        Err(_) => ExitCode::FAILURE,
    })
}
