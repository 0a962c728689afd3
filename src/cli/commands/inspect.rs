//! Inspection commands - print derived values without building anything

use crate::env::Statvfs;
use crate::error::{AutodepsError, AutodepsResult};
use crate::workspace::Workspace;

/// Print the selected environment directory
pub async fn directory(workspace: &Workspace) -> AutodepsResult<()> {
    let env = workspace.select_environment(&Statvfs)?;
    println!("{}", env.path().display());
    Ok(())
}

/// Print where the archive for this dependency set lives
pub async fn archive(workspace: &Workspace) -> AutodepsResult<()> {
    let tarball = workspace
        .archive()
        .tarball_path(workspace.identity())
        .ok_or(AutodepsError::NoArchiveDir)?;
    println!("{}", tarball.display());
    Ok(())
}

/// Print the identity token
pub async fn identity(workspace: &Workspace) -> AutodepsResult<()> {
    println!("{}", workspace.identity());
    Ok(())
}
