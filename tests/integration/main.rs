//! Integration tests for autodeps

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const FAKE_VIRTUALENV: &str = r#"#!/bin/sh
for d; do :; done
mkdir -p "$d/bin"
cp "$(dirname "$0")/stub-python" "$d/bin/python"
chmod +x "$d/bin/python"
echo "created $d"
"#;

    const STUB_PYTHON: &str = r#"#!/bin/sh
case "$*" in *broken*) echo "cannot install" >&2; exit 1;; esac
echo "ran $*"
"#;

    fn autodeps() -> Command {
        let mut cmd = cargo_bin_cmd!("autodeps");
        cmd.env_remove("AUTODEPS_CONFIG")
            .env_remove("AUTODEPS_ROOT")
            .env_remove("AUTODEPS_LOG");
        cmd
    }

    /// Project with a fake virtualenv and an archive directory
    struct Project {
        dir: TempDir,
    }

    impl Project {
        fn new(requirements: &str) -> Self {
            Self::with_config(requirements, "archived-venv-dir = \"{root}/archive\"\n")
        }

        fn with_config(requirements: &str, extra: &str) -> Self {
            let dir = TempDir::new().unwrap();
            let root = dir.path();
            std::fs::write(root.join("requirements.txt"), requirements).unwrap();
            std::fs::write(root.join("fake-venv.sh"), FAKE_VIRTUALENV).unwrap();
            std::fs::write(root.join("stub-python"), STUB_PYTHON).unwrap();
            std::fs::create_dir(root.join("archive")).unwrap();
            std::fs::write(
                root.join("autodeps.toml"),
                format!(
                    "venv-dir-search = [\"{{root}}/envs/{{deps_hash}}\"]\n\
                     venv-dir-required-gigabytes = 0.0\n\
                     virtualenv = [\"sh\", \"{{root}}/fake-venv.sh\"]\n\
                     runtime-version = \"3.11.4\"\n\
                     {}",
                    extra
                ),
            )
            .unwrap();
            Self { dir }
        }

        fn root(&self) -> &Path {
            self.dir.path()
        }

        fn run(&self) -> Command {
            let mut cmd = autodeps();
            cmd.arg("--root").arg(self.root());
            cmd
        }

        fn identity(&self) -> String {
            let out = self.run().arg("identity").output().unwrap();
            assert!(out.status.success());
            String::from_utf8(out.stdout).unwrap().trim().to_string()
        }

        fn env_dir(&self) -> PathBuf {
            self.root().join("envs").join(self.identity())
        }
    }

    #[test]
    fn help_displays() {
        autodeps()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("hash-keyed"));
    }

    #[test]
    fn version_displays() {
        autodeps()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("autodeps"));
    }

    #[test]
    fn identity_is_stable_and_order_sensitive() {
        let a = Project::new("foo==1.0\n# pinned\n\nbar\n");
        let b = Project::new("foo==1.0\nbar\n");
        let c = Project::new("bar\nfoo==1.0\n");

        let id = a.identity();
        assert_eq!(id.len(), 40);
        assert!(id.chars().all(|ch| ch.is_ascii_hexdigit()));
        assert_eq!(id, a.identity());
        assert_eq!(id, b.identity());
        assert_ne!(id, c.identity());
    }

    #[test]
    fn directory_prints_and_creates_candidate() {
        let project = Project::new("foo\n");
        let expected = project.env_dir();

        project
            .run()
            .arg("directory")
            .assert()
            .success()
            .stdout(predicate::str::contains(expected.to_str().unwrap()));
        assert!(expected.is_dir());
    }

    #[test]
    fn archive_prints_tarball_path() {
        let project = Project::new("foo\n");
        let id = project.identity();

        project
            .run()
            .arg("archive")
            .assert()
            .success()
            .stdout(predicate::str::contains(format!("archive/{}.tar.gz", id)));
    }

    #[test]
    fn archive_without_directory_fails_with_hint() {
        let project = Project::with_config("foo\n", "");

        project
            .run()
            .arg("archive")
            .assert()
            .failure()
            .stderr(predicate::str::contains("No archive directory"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let project = Project::new("foo\n");
        std::fs::write(project.root().join("autodeps.toml"), "no-such-key = 1\n").unwrap();

        project
            .run()
            .arg("identity")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn provision_builds_then_takes_fast_path() {
        let project = Project::new("foo==1.0\nhttps://host/pkgs/bar-baz.tar.gz\n");
        let env_dir = project.env_dir();

        project
            .run()
            .arg("provision")
            .assert()
            .success()
            .stderr(predicate::str::contains("Creating venv"))
            .stderr(predicate::str::contains("Installing pip package bar-baz.."))
            .stderr(predicate::str::contains("Making tar archive"));

        assert!(env_dir.join(".completed").exists());
        assert!(env_dir.join("bar-baz.out").exists());
        assert_eq!(
            std::fs::read_to_string(env_dir.join("requirements.txt")).unwrap(),
            "foo==1.0\nhttps://host/pkgs/bar-baz.tar.gz\n"
        );
        assert!(!project.root().join("envs").join(format!("{}.lock", project.identity())).exists());
        assert_eq!(
            std::fs::read_link(project.root().join(".venv_latest")).unwrap(),
            env_dir
        );
        assert!(project
            .root()
            .join("archive")
            .join(format!("{}.tar.gz", project.identity()))
            .exists());

        project
            .run()
            .assert()
            .success()
            .stderr(predicate::str::contains("Creating venv").not());
    }

    #[test]
    fn deleted_environment_is_restored_from_archive() {
        let project = Project::new("foo\n");
        let env_dir = project.env_dir();

        project.run().arg("provision").assert().success();
        std::fs::remove_dir_all(&env_dir).unwrap();

        project
            .run()
            .arg("provision")
            .assert()
            .success()
            .stderr(predicate::str::contains("Extracting"))
            .stderr(predicate::str::contains("Creating venv").not());

        assert!(env_dir.join(".completed").exists());
        assert!(env_dir.join("bin/python").exists());
    }

    #[test]
    fn failed_install_leaves_staging_only() {
        let project = Project::new("foo\nbroken\n");
        let env_dir = project.env_dir();

        project
            .run()
            .arg("provision")
            .assert()
            .failure()
            .stderr(predicate::str::contains("ERROR (see"))
            .stderr(predicate::str::contains("broken.out"));

        assert!(!env_dir.exists());
        let staging = PathBuf::from(format!("{}.build", env_dir.display()));
        assert!(staging.join("broken.out").exists());
        assert!(!project
            .root()
            .join("archive")
            .join(format!("{}.tar.gz", project.identity()))
            .exists());
    }

    #[test]
    fn exec_runs_inside_environment() {
        let project = Project::new("foo\n");
        let env_dir = project.env_dir();

        project
            .run()
            .args(["exec", "--", "sh", "-c", "echo \"$VENV_DIR\"; exit 3"])
            .assert()
            .code(3)
            .stdout(predicate::str::contains(env_dir.to_str().unwrap()));
    }

    #[test]
    fn env_prints_exports() {
        let project = Project::new("foo\n");

        project
            .run()
            .arg("env")
            .assert()
            .success()
            .stdout(predicate::str::contains("export VENV_DIR="))
            .stdout(predicate::str::contains("export PATH="));
    }

    #[test]
    fn install_globally_requires_root() {
        // SAFETY: geteuid has no preconditions.
        if unsafe { libc::geteuid() } == 0 {
            return;
        }
        let project = Project::new("foo\n");

        project
            .run()
            .arg("install-globally")
            .assert()
            .failure()
            .stderr(predicate::str::contains("requires root"));
    }

    #[test]
    fn install_globally_checks_root_before_probing() {
        // SAFETY: geteuid has no preconditions.
        if unsafe { libc::geteuid() } == 0 {
            return;
        }
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("autodeps.toml"),
            "python = \"autodeps-no-such-python\"\n",
        )
        .unwrap();

        autodeps()
            .arg("--root")
            .arg(dir.path())
            .arg("install-globally")
            .assert()
            .failure()
            .stderr(predicate::str::contains("requires root"))
            .stderr(predicate::str::contains("autodeps-no-such-python").not());
    }
}
