//! Step-by-step build progress on stderr
//!
//! Output looks like:
//!
//! ```text
//! [autodeps] deps changed, rebuilding virtualenv (this may take a while)
//! [ 1/ 6] Creating venv /tmp/alice/autodeps/1f2e.build.... OK (2.31 sec)
//! [ 2/ 6] Recording git revision.. OK (0.01 sec)
//! [ 3/ 6] Installing pip package requests.... ERROR (see /tmp/.../requests.out)
//! ```
//!
//! Write errors are ignored: progress never changes control flow.

use console::style;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

/// Ticks between spacer characters on long-running steps
const TICKS_PER_SPACE: u64 = 100;

/// Progress printer for one provisioning request
pub struct ProgressReporter {
    out: Box<dyn Write + Send>,
    color: bool,
    current: usize,
    total: usize,
    prefix: String,
}

impl ProgressReporter {
    /// Reporter writing to stderr
    pub fn stderr() -> Self {
        Self::with_writer(Box::new(io::stderr()), console::colors_enabled_stderr())
    }

    /// Reporter writing to an arbitrary sink
    pub fn with_writer(out: Box<dyn Write + Send>, color: bool) -> Self {
        Self {
            out,
            color,
            current: 0,
            total: 1,
            prefix: String::new(),
        }
    }

    /// Set the number of steps the upcoming pipeline will run
    pub fn set_total(&mut self, total: usize) {
        self.total = total;
    }

    /// Text put in front of every following step name
    pub fn set_prefix(&mut self, prefix: impl Into<String>) {
        self.prefix = prefix.into();
    }

    pub fn clear_prefix(&mut self) {
        self.prefix.clear();
    }

    /// Free-form status line
    pub fn info(&mut self, message: &str) {
        let _ = writeln!(self.out, "[autodeps] {}", message);
    }

    /// Start a step; the line stays open until `ok` or `error`
    pub fn begin(&mut self, name: &str) {
        self.current += 1;
        let _ = write!(
            self.out,
            "[{:>2}/{:>2}] {}{}..",
            self.current, self.total, self.prefix, name
        );
        let _ = self.out.flush();
    }

    /// Liveness tick: `grew` when the step's log grew since the last tick
    pub fn tick(&mut self, tick: u64, grew: bool) {
        if grew {
            let _ = write!(self.out, ".");
        }
        if tick > 0 && tick % TICKS_PER_SPACE == 0 {
            let _ = write!(self.out, " ");
        }
        let _ = self.out.flush();
    }

    /// Close the current step as successful
    pub fn ok(&mut self, elapsed: Duration) {
        let label = style("OK").green().force_styling(self.color);
        let _ = writeln!(self.out, " {} ({:.2} sec)", label, elapsed.as_secs_f64());
    }

    /// Close the current step as failed
    pub fn error(&mut self, log: Option<&Path>) {
        let label = style("ERROR").red().bold().force_styling(self.color);
        let target = log
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "output above".to_string());
        let _ = writeln!(self.out, " {} (see {})", label, target);
    }
}
