//! Process-backed execution.
//!
//! Rust closures cannot be sent to another process, so process pools run
//! named tasks: the parent sends `(task name, item, args)` as JSON and the
//! worker looks the name up in its [`Registry`].
//!
//! By default a worker is the current executable started again with
//! [`WORKER_ENV`] set. Such a program must call [`serve_if_worker`] first
//! thing in `main`, before doing anything else. Items, arguments, results and
//! errors of a remote task all cross a pipe, so each must be a serde type;
//! `Infallible` is not one, so remote tasks name a serializable error:
//!
//! ```no_run
//! use concurrent_runner::process::{serve_if_worker, Registry};
//! use concurrent_runner::RemoteFn;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Overflow;
//!
//! fn square(x: u64, _: &()) -> Result<u64, Overflow> {
//!     x.checked_mul(x).ok_or(Overflow)
//! }
//!
//! const SQUARE: RemoteFn<u64, (), u64, Overflow> = RemoteFn::new("square", square);
//!
//! fn main() {
//!     serve_if_worker(&Registry::new().register(SQUARE));
//!
//!     // parent logic from here on
//! }
//! ```
//!
//! Every failure to move a value across the pipe is per-item: an item or
//! argument that cannot be encoded, a value the worker cannot decode, an
//! unknown task name, or a result the parent cannot decode all resolve as
//! [`TaskError::Transfer`](crate::routing::TaskError::Transfer). A worker that
//! dies mid-task resolves that task as
//! [`TaskError::WorkerLost`](crate::routing::TaskError::WorkerLost) and is
//! restarted. Only failing to start the initial workers fails the run.

pub mod pool;
pub mod protocol;
pub mod registry;

pub use pool::ProcessPool;
pub use registry::Registry;

use crate::error::{Error, Result};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

/// Set in the environment of every spawned worker process.
pub const WORKER_ENV: &str = "CONCURRENT_RUNNER_WORKER";

/// How to start a worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    /// Re-execute the running binary.
    pub fn current_exe() -> Result<Self> {
        let program = std::env::current_exe()
            .map_err(|e| Error::spawn(format!("cannot locate current executable: {}", e)))?;
        Ok(Self::new(program))
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub(crate) fn spawn(&self) -> Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .env(WORKER_ENV, "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| Error::spawn(format!("{}: {}", self.program.display(), e)))
    }
}

/// Whether this process was started as a pool worker.
pub fn is_worker() -> bool {
    std::env::var_os(WORKER_ENV).is_some()
}

/// In a worker process, serve requests on stdin/stdout and exit; otherwise
/// return immediately.
pub fn serve_if_worker(registry: &Registry) {
    if !is_worker() {
        return;
    }

    // stdout is locked per frame; tasks may print from any thread
    let stdin = io::stdin();
    let code = match registry.serve(stdin.lock(), io::stdout()) {
        Ok(served) => {
            tracing::debug!(served, pid = std::process::id(), "worker finished");
            0
        }
        Err(err) => {
            tracing::error!(error = %err, pid = std::process::id(), "worker stopped");
            1
        }
    };

    std::process::exit(code);
}
