//! External command execution for build steps
//!
//! Every step runs as an argument list (never through a shell) with stdout
//! and stderr sent to the step's log. While the child runs, a 50 ms ticker
//! reports liveness whenever the log file grew.

use crate::error::{AutodepsError, AutodepsResult};
use crate::ui::ProgressReporter;
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

/// Interval between liveness checks
pub const TICK_INTERVAL: Duration = Duration::from_millis(50);

/// A command as program plus arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory, overriding the runner's default
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec![],
            cwd: None,
        }
    }

    /// Build from an argument vector; the first element is the program
    pub fn from_argv(argv: &[String]) -> AutodepsResult<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| AutodepsError::User("empty command line".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            cwd: None,
        })
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Where a step's output goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    /// Truncated and written to this file
    File(PathBuf),
    /// Interleaved with progress on stderr
    Progress,
}

impl LogTarget {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Progress => None,
        }
    }
}

/// Runs build steps to completion, one at a time
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    cwd: Option<PathBuf>,
}

impl ProcessRunner {
    /// Runner whose commands start in `cwd` unless they say otherwise
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: Some(cwd.into()),
        }
    }

    /// Run one step, reporting it on `progress`
    ///
    /// Returns the elapsed time, or `CommandFailed` naming the log when the
    /// command could not start or exited non-zero.
    pub async fn run(
        &self,
        step: &str,
        spec: &CommandSpec,
        log: &LogTarget,
        progress: &mut ProgressReporter,
    ) -> AutodepsResult<Duration> {
        progress.begin(step);
        let start = Instant::now();

        match self.wait(spec, log, progress).await {
            Ok(status) if status.success() => {
                let elapsed = start.elapsed();
                progress.ok(elapsed);
                debug!("{} finished in {:.2}s", spec, elapsed.as_secs_f64());
                Ok(elapsed)
            }
            Ok(status) => {
                debug!("{} exited with {}", spec, status);
                progress.error(log.path());
                Err(self.failure(step, log))
            }
            Err(e) => {
                debug!("{} could not run: {}", spec, e);
                if let LogTarget::File(path) = log {
                    if let Ok(mut file) = std::fs::OpenOptions::new().append(true).create(true).open(path) {
                        let _ = writeln!(file, "autodeps: {}", e);
                    }
                }
                progress.error(log.path());
                match log {
                    LogTarget::File(_) => Err(self.failure(step, log)),
                    LogTarget::Progress => Err(e),
                }
            }
        }
    }

    fn failure(&self, step: &str, log: &LogTarget) -> AutodepsError {
        let log_path = log.path().map(Path::to_path_buf).unwrap_or_default();
        AutodepsError::command_failed(step, log_path)
    }

    async fn wait(
        &self,
        spec: &CommandSpec,
        log: &LogTarget,
        progress: &mut ProgressReporter,
    ) -> AutodepsResult<ExitStatus> {
        let (stdout, stderr) = open_log(log)?;

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true);
        if let Some(dir) = spec.cwd.as_ref().or(self.cwd.as_ref()) {
            command.current_dir(dir);
        }

        debug!("Executing: {}", spec);
        let mut child = command.spawn().map_err(|e| AutodepsError::CommandSpawn {
            command: spec.to_string(),
            source: e,
        })?;

        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.tick().await;
        let mut last_size = log_size(log);
        let mut ticks: u64 = 0;

        loop {
            tokio::select! {
                status = child.wait() => {
                    return status.map_err(|e| AutodepsError::io(format!("waiting for {}", spec), e));
                }
                _ = ticker.tick() => {
                    ticks += 1;
                    let size = log_size(log);
                    progress.tick(ticks, size != last_size);
                    last_size = size;
                }
            }
        }
    }
}

fn open_log(log: &LogTarget) -> AutodepsResult<(Stdio, Stdio)> {
    match log {
        LogTarget::File(path) => {
            let file = File::create(path)
                .map_err(|e| AutodepsError::io(format!("creating log {}", path.display()), e))?;
            let dup = file
                .try_clone()
                .map_err(|e| AutodepsError::io(format!("duplicating log {}", path.display()), e))?;
            Ok((Stdio::from(file), Stdio::from(dup)))
        }
        LogTarget::Progress => {
            let stderr = std::os::fd::AsFd::as_fd(&std::io::stderr())
                .try_clone_to_owned()
                .map_err(|e| AutodepsError::io("duplicating stderr", e))?;
            let dup = stderr
                .try_clone()
                .map_err(|e| AutodepsError::io("duplicating stderr", e))?;
            Ok((Stdio::from(stderr), Stdio::from(dup)))
        }
    }
}

fn log_size(log: &LogTarget) -> u64 {
    log.path()
        .and_then(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .unwrap_or(0)
}
