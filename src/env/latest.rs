//! The "latest" symlink pointing at the selected environment

use std::path::Path;
use tracing::debug;

/// Point `link` at `target` unless it already resolves there
///
/// Every failure is ignored: concurrent runs race on the same link and the
/// loser simply leaves the winner's link in place.
pub fn update_latest_link(link: &Path, target: &Path) {
    if points_to(link, target) {
        return;
    }

    match std::fs::remove_file(link) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            debug!("Cannot replace {}: {}", link.display(), e);
            return;
        }
    }

    match std::os::unix::fs::symlink(target, link) {
        Ok(()) => debug!("Linked {} -> {}", link.display(), target.display()),
        Err(e) => debug!("Cannot link {}: {}", link.display(), e),
    }
}

fn points_to(link: &Path, target: &Path) -> bool {
    match (std::fs::canonicalize(link), std::fs::canonicalize(target)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
