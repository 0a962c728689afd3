//! Provision command - build or restore the environment when needed

use crate::env::{Environment, Statvfs};
use crate::error::AutodepsResult;
use crate::provision::{ProvisionOutcome, Provisioner};
use crate::ui::ProgressReporter;
use crate::workspace::Workspace;
use tracing::debug;

/// Execute the provision command
pub async fn execute(workspace: &Workspace) -> AutodepsResult<()> {
    let (env, outcome) = provision_environment(workspace).await?;
    debug!("{} {}", env.path().display(), outcome);
    Ok(())
}

/// Select the environment directory and make it usable
pub async fn provision_environment(
    workspace: &Workspace,
) -> AutodepsResult<(Environment, ProvisionOutcome)> {
    let env = workspace.select_environment(&Statvfs)?;
    let toolchain = workspace.toolchain(&env)?;
    let runner = workspace.runner();
    let archive = workspace.archive();
    let mut progress = ProgressReporter::stderr();

    let outcome = Provisioner::new(&toolchain, &runner, &archive)
        .with_submodule(workspace.submodule_path())
        .with_latest_link(workspace.latest_link())
        .provision(&env, workspace.requirements(), &mut progress)
        .await?;

    Ok((env, outcome))
}
