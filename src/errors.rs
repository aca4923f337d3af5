use std::io;
use thiserror::Error;


/// Invalid pool parameters. Always raised before any worker is spawned.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("worker count must be at least 1")]
    NoWorkers,
    #[error("chunk size must be at least 1")]
    ZeroChunkSize,
    #[error("max tasks per worker must be at least 1 (use None to disable recycling)")]
    ZeroMaxTasks,
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Failure of a single call of the user function.
#[derive(Debug, Error)]
pub enum InvocationError<E> {
    /// The function returned `Err`. The caller's error is kept as is.
    #[error("{0}")]
    Failed(E),
    #[error("panicked: {0}")]
    Panicked(String),
    /// The task was dropped before it could report, e.g. after the batch was aborted.
    #[error("task was dropped before reporting a result")]
    Lost,
}

impl<E> InvocationError<E> {
    /// Returns the caller's error if the function itself returned one.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Name of the failure's type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Failed(_) => std::any::type_name::<E>(),
            Self::Panicked(_) => "panic",
            Self::Lost => "lost",
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError<E> {
    #[error("invalid pool configuration: {0}")]
    Configuration(#[from] ConfigError),
    #[error("failed to spawn pool worker: {0}")]
    PoolConstruction(#[source] io::Error),
    #[error("work item {index} failed: {source}")]
    WorkerInvocation {
        index: usize,
        source: InvocationError<E>,
    },
}

impl<E> DispatchError<E> {
    /// The caller's own error, when the batch was aborted by one.
    pub fn into_invocation_error(self) -> Option<E> {
        match self {
            Self::WorkerInvocation { source, .. } => source.into_inner(),
            _ => None,
        }
    }
}
