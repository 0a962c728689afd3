//! Install-globally command - install requirements into the system interpreter

use crate::build::GlobalInstaller;
use crate::error::AutodepsResult;
use crate::ui::ProgressReporter;
use crate::workspace::Workspace;
use console::style;

/// Execute the install-globally command
pub async fn execute(workspace: &Workspace) -> AutodepsResult<()> {
    let toolchain = workspace.global_toolchain()?;
    let runner = workspace.runner();
    let mut progress = ProgressReporter::stderr();

    GlobalInstaller::new(&toolchain, &runner)
        .install(workspace.requirements(), workspace.user(), &mut progress)
        .await?;

    eprintln!(
        "{} Installed {} packages globally",
        style("✓").green(),
        workspace.requirements().len()
    );
    Ok(())
}
