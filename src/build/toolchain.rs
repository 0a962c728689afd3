//! Commands used to build, pack and restore environments
//!
//! The orchestrator only decides *when* a step runs; *what* runs comes from
//! a [`Toolchain`]. [`Virtualenv`] is the production implementation
//! (virtualenv + pip + git + tar).

use crate::archive::ARCHIVE_LOG;
use crate::process::CommandSpec;
use std::path::Path;

/// File written by pip's verbose logger next to the combined output
pub fn verbose_log_name(token: &str) -> String {
    format!("{}.log", token)
}

/// Source of the external commands for each build step
pub trait Toolchain: Send + Sync {
    /// Bootstrap an interpreter into `env_dir`
    fn create_env(&self, env_dir: &Path) -> CommandSpec;

    /// Print a short summary of the current source revision
    fn record_revision(&self) -> CommandSpec;

    /// Update submodules of the repository at `repo`
    fn update_submodules(&self, repo: &Path) -> CommandSpec;

    /// Install one declaration into `env_dir`
    fn install(&self, env_dir: &Path, declaration: &str, verbose_log: &Path) -> CommandSpec;

    /// Install one declaration into the system interpreter
    fn install_global(&self, declaration: &str) -> CommandSpec;

    /// Rewrite absolute paths so the environment can be moved
    fn make_relocatable(&self, env_dir: &Path) -> CommandSpec;

    /// Pack the directory `source` into the gzip tarball `tarball`, with
    /// `source`'s own name as the single top-level entry
    fn pack(&self, source: &Path, tarball: &Path) -> CommandSpec;

    /// Extract `tarball` into the existing directory `target`
    fn unpack(&self, tarball: &Path, target: &Path) -> CommandSpec;
}

/// virtualenv/pip toolchain
#[derive(Debug, Clone)]
pub struct Virtualenv {
    /// Environment-creation command, already expanded
    virtualenv: Vec<String>,
    /// System interpreter used for global installs
    python: String,
    /// Extra `pip install` arguments, already expanded
    pip_args: Vec<String>,
}

impl Virtualenv {
    pub fn new(virtualenv: Vec<String>, python: impl Into<String>, pip_args: Vec<String>) -> Self {
        Self {
            virtualenv,
            python: python.into(),
            pip_args,
        }
    }

    fn virtualenv_command(&self) -> CommandSpec {
        match CommandSpec::from_argv(&self.virtualenv) {
            Ok(spec) => spec,
            // An empty command list still yields a clear failure in venv.log
            Err(_) => CommandSpec::new("virtualenv"),
        }
    }
}

impl Toolchain for Virtualenv {
    fn create_env(&self, env_dir: &Path) -> CommandSpec {
        self.virtualenv_command()
            .arg("--always-copy")
            .arg(path_arg(env_dir))
    }

    fn record_revision(&self) -> CommandSpec {
        CommandSpec::new("git").args([
            "log",
            "-n",
            "1",
            "--format=commit %H%nAuthor: %an <%ae>%nDate:   %ad",
        ])
    }

    fn update_submodules(&self, repo: &Path) -> CommandSpec {
        CommandSpec::new("git")
            .args(["submodule", "update", "--init"])
            .current_dir(repo)
    }

    fn install(&self, env_dir: &Path, declaration: &str, verbose_log: &Path) -> CommandSpec {
        CommandSpec::new(path_arg(&env_dir.join("bin").join("python")))
            .arg(path_arg(&env_dir.join("bin").join("pip")))
            .arg(format!("--log={}", verbose_log.display()))
            .arg("install")
            .args(self.pip_args.iter().cloned())
            .args(installer_args(declaration))
    }

    fn install_global(&self, declaration: &str) -> CommandSpec {
        CommandSpec::new(self.python.clone())
            .args(["-m", "pip", "install"])
            .args(self.pip_args.iter().cloned())
            .arg("--upgrade")
            .args(installer_args(declaration))
    }

    fn make_relocatable(&self, env_dir: &Path) -> CommandSpec {
        self.virtualenv_command()
            .arg("--relocatable")
            .arg("--system-site-packages")
            .arg(path_arg(env_dir))
    }

    fn pack(&self, source: &Path, tarball: &Path) -> CommandSpec {
        let (parent, name) = split_dir(source);
        CommandSpec::new("tar")
            .arg("-C")
            .arg(parent)
            .arg(format!("--exclude={}/{}", name, ARCHIVE_LOG))
            .arg("-czf")
            .arg(path_arg(tarball))
            .arg(name)
    }

    fn unpack(&self, tarball: &Path, target: &Path) -> CommandSpec {
        CommandSpec::new("tar")
            .arg("-C")
            .arg(path_arg(target))
            .arg("-xzf")
            .arg(path_arg(tarball))
    }
}

/// Installer options that consume the following token
const VALUE_OPTIONS: &[&str] = &[
    "-e",
    "--editable",
    "-r",
    "--requirement",
    "-c",
    "--constraint",
    "-i",
    "--index-url",
    "--extra-index-url",
    "-f",
    "--find-links",
    "--trusted-host",
    "--no-binary",
    "--only-binary",
];

/// Split a declaration into installer arguments
///
/// Leading options (`-e ./pkg`, `--pre`) become their own arguments; the
/// requirement after them is passed whole, so `foo >= 1.0` stays one
/// argument.
pub fn installer_args(declaration: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut rest = declaration.trim();

    while rest.starts_with('-') {
        let (option, tail) = next_token(rest);
        args.push(option.to_string());
        rest = tail;
        if VALUE_OPTIONS.contains(&option) && !rest.is_empty() {
            let (value, tail) = next_token(rest);
            args.push(value.to_string());
            rest = tail;
        }
    }

    if !rest.is_empty() {
        args.push(rest.to_string());
    }
    args
}

fn next_token(text: &str) -> (&str, &str) {
    match text.find(char::is_whitespace) {
        Some(end) => (&text[..end], text[end..].trim_start()),
        None => (text, ""),
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Parent directory and final component, as `tar -C parent name` wants them
pub(crate) fn split_dir(dir: &Path) -> (String, String) {
    let parent = match dir.parent() {
        Some(p) if !p.as_os_str().is_empty() => path_arg(p),
        _ => ".".to_string(),
    };
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".".to_string());
    (parent, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toolchain() -> Virtualenv {
        Virtualenv::new(
            vec!["python3".into(), "-m".into(), "virtualenv".into()],
            "python3",
            vec!["--no-cache-dir".into()],
        )
    }

    #[test]
    fn create_env_appends_flags() {
        let spec = toolchain().create_env(Path::new("/envs/abc.build"));
        assert_eq!(spec.program, "python3");
        assert_eq!(
            spec.args,
            ["-m", "virtualenv", "--always-copy", "/envs/abc.build"]
        );
    }

    #[test]
    fn install_uses_env_interpreter() {
        let spec = toolchain().install(
            Path::new("/envs/abc.build"),
            "-e ./vendored",
            Path::new("/envs/abc.build/vendored.log"),
        );
        assert_eq!(spec.program, "/envs/abc.build/bin/python");
        assert_eq!(
            spec.args,
            [
                "/envs/abc.build/bin/pip",
                "--log=/envs/abc.build/vendored.log",
                "install",
                "--no-cache-dir",
                "-e",
                "./vendored",
            ]
        );
    }

    #[test]
    fn requirement_with_spaces_stays_whole() {
        assert_eq!(installer_args("foo >= 1.0"), ["foo >= 1.0"]);
        assert_eq!(
            installer_args("  --pre   bar ; python_version < '3.8' "),
            ["--pre", "bar ; python_version < '3.8'"]
        );
        assert_eq!(
            installer_args("--index-url https://mirror/simple -U baz"),
            ["--index-url", "https://mirror/simple", "-U", "baz"]
        );
        assert_eq!(installer_args("--no-deps=yes"), ["--no-deps=yes"]);
    }

    #[test]
    fn global_install_keeps_requirement_whole() {
        let spec = toolchain().install_global("foo >= 1.0");
        assert_eq!(spec.args.last().map(String::as_str), Some("foo >= 1.0"));
    }

    #[test]
    fn global_install_upgrades() {
        let spec = toolchain().install_global("requests==2.31.0");
        assert_eq!(spec.to_string(), "python3 -m pip install --no-cache-dir --upgrade requests==2.31.0");
    }

    #[test]
    fn relocatable_flags() {
        let spec = toolchain().make_relocatable(Path::new("/envs/abc.build"));
        assert_eq!(
            spec.to_string(),
            "python3 -m virtualenv --relocatable --system-site-packages /envs/abc.build"
        );
    }

    #[test]
    fn submodules_run_in_repo() {
        let spec = toolchain().update_submodules(Path::new("/src/project"));
        assert_eq!(spec.cwd.as_deref(), Some(Path::new("/src/project")));
        assert_eq!(spec.args, ["submodule", "update", "--init"]);
    }

    #[test]
    fn pack_names_the_directory() {
        let tc = toolchain();
        let pack = tc.pack(Path::new("/envs/abc"), Path::new("/archive/abc_1.tar.gz"));
        assert_eq!(
            pack.to_string(),
            "tar -C /envs --exclude=abc/archive.log -czf /archive/abc_1.tar.gz abc"
        );
        let unpack = tc.unpack(Path::new("/archive/abc.tar.gz"), Path::new("/envs/abc"));
        assert_eq!(unpack.to_string(), "tar -C /envs/abc -xzf /archive/abc.tar.gz");
    }

    #[test]
    fn split_dir_handles_relative_names() {
        assert_eq!(split_dir(Path::new("abc")), (".".to_string(), "abc".to_string()));
        assert_eq!(
            split_dir(Path::new("/envs/abc")),
            ("/envs".to_string(), "abc".to_string())
        );
    }

    #[test]
    fn verbose_log_suffix() {
        assert_eq!(verbose_log_name("requests"), "requests.log");
    }
}
