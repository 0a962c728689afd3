//! Helpers shared by unit tests

use crate::build::toolchain::{split_dir, Toolchain};
use crate::process::CommandSpec;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory writer whose contents outlive the reporter that owns it
#[derive(Clone, Default)]
pub struct CaptureBuffer(Arc<Mutex<Vec<u8>>>);

impl CaptureBuffer {
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn sh(script: &str) -> CommandSpec {
    CommandSpec::new("sh").arg("-c").arg(script).arg("sh")
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Toolchain made of small shell snippets, counting what it was asked for
///
/// Environment creation makes `bin/`, installs append the declaration to
/// `<env>/installed`, and packing uses the real `tar`.
#[derive(Default)]
pub struct ScriptToolchain {
    /// Declaration whose install exits non-zero
    pub failing: Mutex<Option<String>>,
    /// Seconds environment creation sleeps for
    pub create_delay: f64,
    pub creates: AtomicUsize,
    pub installs: AtomicUsize,
    pub packs: AtomicUsize,
    pub unpacks: AtomicUsize,
}

impl ScriptToolchain {
    pub fn failing_on(declaration: &str) -> Self {
        Self {
            failing: Mutex::new(Some(declaration.to_string())),
            ..Self::default()
        }
    }

    pub fn slow(create_delay: f64) -> Self {
        Self {
            create_delay,
            ..Self::default()
        }
    }

    pub fn stop_failing(&self) {
        *self.failing.lock().unwrap() = None;
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn installs(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }

    fn fails(&self, declaration: &str) -> bool {
        self.failing.lock().unwrap().as_deref() == Some(declaration)
    }
}

impl Toolchain for ScriptToolchain {
    fn create_env(&self, env_dir: &Path) -> CommandSpec {
        self.creates.fetch_add(1, Ordering::SeqCst);
        sh(&format!(
            "sleep {}; mkdir -p \"$1/bin\" && echo created",
            self.create_delay
        ))
        .arg(path_arg(env_dir))
    }

    fn record_revision(&self) -> CommandSpec {
        sh("echo 'commit 0000000'")
    }

    fn update_submodules(&self, repo: &Path) -> CommandSpec {
        sh("echo updated").current_dir(repo)
    }

    fn install(&self, env_dir: &Path, declaration: &str, verbose_log: &Path) -> CommandSpec {
        self.installs.fetch_add(1, Ordering::SeqCst);
        if self.fails(declaration) {
            return sh("echo \"cannot install $1\"; exit 1").arg(declaration);
        }
        sh("echo \"$2\" >> \"$1/installed\"; echo verbose > \"$3\"; echo done")
            .arg(path_arg(env_dir))
            .arg(declaration)
            .arg(path_arg(verbose_log))
    }

    fn install_global(&self, declaration: &str) -> CommandSpec {
        self.installs.fetch_add(1, Ordering::SeqCst);
        sh("echo \"global $1\"").arg(declaration)
    }

    fn make_relocatable(&self, env_dir: &Path) -> CommandSpec {
        sh("test -d \"$1\"").arg(path_arg(env_dir))
    }

    fn pack(&self, source: &Path, tarball: &Path) -> CommandSpec {
        self.packs.fetch_add(1, Ordering::SeqCst);
        let (parent, name) = split_dir(source);
        CommandSpec::new("tar")
            .arg("-C")
            .arg(parent)
            .arg(format!("--exclude={}/archive.log", name))
            .arg("-czf")
            .arg(path_arg(tarball))
            .arg(name)
    }

    fn unpack(&self, tarball: &Path, target: &Path) -> CommandSpec {
        self.unpacks.fetch_add(1, Ordering::SeqCst);
        CommandSpec::new("tar")
            .arg("-C")
            .arg(path_arg(target))
            .arg("-xzf")
            .arg(path_arg(tarball))
    }
}
