use crate::error::{Error, Result};
use crate::process::WorkerCommand;

/// Worker count used by thread pools when none is requested.
pub const DEFAULT_THREAD_WORKERS: usize = 10;

/// Upper bound accepted for `max_workers`; larger counts fail validation
/// with [`Error::Config`].
pub const MAX_WORKERS: usize = 1024;

/// Which kind of worker pool executes the tasks of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoolKind {
    /// Threads sharing the caller's address space.
    #[default]
    Thread,
    /// Separate worker processes; function, items and results cross a pipe.
    Process,
}

impl PoolKind {
    /// Worker count used when the caller does not pick one.
    ///
    /// Thread pools default to [`DEFAULT_THREAD_WORKERS`]. Process pools leave
    /// one core to the parent: `available_parallelism - 1`, never below 1.
    pub fn default_workers(self) -> usize {
        match self {
            PoolKind::Thread => DEFAULT_THREAD_WORKERS,
            PoolKind::Process => num_cpus::get().saturating_sub(1).max(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub pool_kind: PoolKind,
    pub max_workers: Option<usize>,
    pub stack_size: Option<usize>,
    pub thread_name_prefix: String,
    pub worker_command: Option<WorkerCommand>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new(PoolKind::default())
    }
}

impl RunConfig {
    pub fn new(pool_kind: PoolKind) -> Self {
        Self {
            pool_kind,
            max_workers: None,
            stack_size: Some(2 * 1024 * 1024),
            thread_name_prefix: "crun-worker".to_string(),
            worker_command: None,
        }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(n) = self.max_workers {
            if n == 0 {
                return Err(Error::config("max_workers must be > 0"));
            }
            if n > MAX_WORKERS {
                return Err(Error::config(format!(
                    "max_workers too large (max {})",
                    MAX_WORKERS
                )));
            }
        }

        if let Some(0) = self.stack_size {
            return Err(Error::config("stack_size must be > 0"));
        }

        if self.thread_name_prefix.is_empty() {
            return Err(Error::config("thread_name_prefix must not be empty"));
        }

        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.max_workers
            .unwrap_or_else(|| self.pool_kind.default_workers())
    }

    /// Command used to start process workers; re-executes the current binary
    /// unless one was configured.
    pub fn worker_command(&self) -> Result<WorkerCommand> {
        match &self.worker_command {
            Some(command) => Ok(command.clone()),
            None => WorkerCommand::current_exe(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: RunConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RunConfig::default(),
        }
    }

    pub fn pool_kind(mut self, kind: PoolKind) -> Self {
        self.config.pool_kind = kind;
        self
    }

    pub fn max_workers(mut self, n: usize) -> Self {
        self.config.max_workers = Some(n);
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    pub fn thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    pub fn worker_command(mut self, command: WorkerCommand) -> Self {
        self.config.worker_command = Some(command);
        self
    }

    pub fn build(self) -> Result<RunConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
