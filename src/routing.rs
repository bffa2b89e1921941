//! Per-item failure routing.
//!
//! A failed task never aborts a run. Its error is classified into a
//! [`FailureClass`], the handler registered for that class is called, and the
//! handler's return value becomes the task's [`Outcome`]. Classes without a
//! handler go to the fallback, which by default logs the failure through
//! `tracing` and yields no value.
//!
//! Routing looks only at the class, never at the error's payload or message:
//! two errors of the same kind always take the same route.

use crate::executor::{PanicInfo, TaskHandle};
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::hash::Hash;

/// Error types that can be routed by kind.
///
/// `Kind` is the routing key. For a fieldless error enum it can be the enum
/// itself; for richer errors it is usually a companion `...Kind` enum.
pub trait Classify: fmt::Debug {
    type Kind: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

impl Classify for std::io::Error {
    type Kind = std::io::ErrorKind;

    fn kind(&self) -> std::io::ErrorKind {
        std::io::Error::kind(self)
    }
}

/// For tasks that cannot fail. Thread runs only: `Infallible` is not a serde
/// type, so it cannot be the error of a remote task.
impl Classify for Infallible {
    type Kind = Infallible;

    fn kind(&self) -> Infallible {
        match *self {}
    }
}

/// Why a task did not produce a value.
#[derive(Debug, thiserror::Error)]
pub enum TaskError<E> {
    /// The function returned `Err`.
    #[error("task failed: {0:?}")]
    Failed(E),

    /// The function panicked.
    #[error("task panicked: {0}")]
    Panicked(PanicInfo),

    /// An item, argument or result could not cross the process boundary.
    #[error("transfer to or from worker process failed: {0}")]
    Transfer(String),

    /// The worker process running the task went away before replying.
    #[error("worker process lost: {0}")]
    WorkerLost(String),
}

impl<E: Classify> TaskError<E> {
    pub fn class(&self) -> FailureClass<E::Kind> {
        match self {
            TaskError::Failed(err) => FailureClass::Error(err.kind()),
            TaskError::Panicked(_) => FailureClass::Panic,
            TaskError::Transfer(_) => FailureClass::Transfer,
            TaskError::WorkerLost(_) => FailureClass::WorkerLost,
        }
    }
}

/// Routing key for a [`TaskError`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FailureClass<K> {
    Error(K),
    Panic,
    Transfer,
    WorkerLost,
}

/// A failed task as seen by a handler.
#[derive(Debug)]
pub struct Failure<'a, I, E> {
    pub handle: TaskHandle,
    pub item: &'a I,
    pub error: TaskError<E>,
}

/// Resolved result of one task, in completion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The function returned this value.
    Success(T),
    /// The function failed; this is what the failure handler returned.
    Handled(Option<T>),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Success(v) => Some(v),
            Outcome::Handled(v) => v.as_ref(),
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Outcome::Success(v) => Some(v),
            Outcome::Handled(v) => v,
        }
    }
}

pub type Handler<I, T, E> = Box<dyn Fn(Failure<'_, I, E>) -> Option<T> + Send + Sync>;

/// Default fallback: log the failure and produce no value.
pub fn log_failure<I, T, E: Classify>(failure: Failure<'_, I, E>) -> Option<T> {
    tracing::error!(
        task = %failure.handle,
        class = ?failure.error.class(),
        error = %failure.error,
        "task failed with no registered route"
    );
    None
}

/// Mapping from failure class to handler, plus a fallback.
///
/// At most one handler exists per class; registering again replaces it.
pub struct ErrorRoutes<I, T, E: Classify> {
    routes: HashMap<FailureClass<E::Kind>, Handler<I, T, E>>,
    fallback: Option<Handler<I, T, E>>,
}

impl<I, T, E: Classify> Default for ErrorRoutes<I, T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I, T, E: Classify> ErrorRoutes<I, T, E> {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            fallback: None,
        }
    }

    /// Route errors of `kind` returned by the function.
    pub fn on<H>(self, kind: E::Kind, handler: H) -> Self
    where
        H: Fn(Failure<'_, I, E>) -> Option<T> + Send + Sync + 'static,
    {
        self.on_class(FailureClass::Error(kind), handler)
    }

    pub fn on_panic<H>(self, handler: H) -> Self
    where
        H: Fn(Failure<'_, I, E>) -> Option<T> + Send + Sync + 'static,
    {
        self.on_class(FailureClass::Panic, handler)
    }

    pub fn on_transfer_failure<H>(self, handler: H) -> Self
    where
        H: Fn(Failure<'_, I, E>) -> Option<T> + Send + Sync + 'static,
    {
        self.on_class(FailureClass::Transfer, handler)
    }

    pub fn on_worker_lost<H>(self, handler: H) -> Self
    where
        H: Fn(Failure<'_, I, E>) -> Option<T> + Send + Sync + 'static,
    {
        self.on_class(FailureClass::WorkerLost, handler)
    }

    pub fn on_class<H>(mut self, class: FailureClass<E::Kind>, handler: H) -> Self
    where
        H: Fn(Failure<'_, I, E>) -> Option<T> + Send + Sync + 'static,
    {
        if self.routes.insert(class.clone(), Box::new(handler)).is_some() {
            tracing::debug!(class = ?class, "replaced existing error route");
        }
        self
    }

    /// Replace [`log_failure`] as the handler for classes with no route.
    pub fn fallback<H>(mut self, handler: H) -> Self
    where
        H: Fn(Failure<'_, I, E>) -> Option<T> + Send + Sync + 'static,
    {
        self.fallback = Some(Box::new(handler));
        self
    }

    pub fn handles(&self, class: &FailureClass<E::Kind>) -> bool {
        self.routes.contains_key(class)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Turn a task result into its outcome.
    pub fn resolve(&self, handle: TaskHandle, item: &I, result: Result<T, TaskError<E>>) -> Outcome<T> {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(error) => {
                let handler = self.routes.get(&error.class()).or(self.fallback.as_ref());
                let failure = Failure {
                    handle,
                    item,
                    error,
                };
                Outcome::Handled(match handler {
                    Some(handler) => handler(failure),
                    None => log_failure(failure),
                })
            }
        }
    }
}

impl<I, T, E: Classify> fmt::Debug for ErrorRoutes<I, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorRoutes")
            .field("classes", &self.routes.keys().collect::<Vec<_>>())
            .field("custom_fallback", &self.fallback.is_some())
            .finish()
    }
}
