use super::errors::InvocationError;
use std::{
    backtrace::Backtrace,
    fmt,
    str::FromStr,
};


/// Which kind of workers a pool is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PoolKind {
    /// Isolated workers: owned `'static` work only, recycled after
    /// `max_tasks_per_worker` tasks.
    #[default]
    Process,
    /// Scoped threads that may borrow state from the caller.
    Thread,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Process => f.write_str("process"),
            Self::Thread => f.write_str("thread"),
        }
    }
}

impl FromStr for PoolKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "process" => Ok(Self::Process),
            "thread" => Ok(Self::Thread),
            _ => Err(()),
        }
    }
}


/// A work item that did not produce a value.
#[derive(Debug)]
pub struct Failure<E> {
    /// Position of the work item in the submitted batch.
    pub index: usize,
    pub error: InvocationError<E>,
    /// For a panic, the stack at the panic site, always captured. For an
    /// `Err` return, captured on the worker after the call and only when
    /// `RUST_BACKTRACE` enables it.
    pub backtrace: Backtrace,
}

impl<E> Failure<E> {
    pub(crate) fn new(index: usize, error: InvocationError<E>) -> Self {
        Self::with_backtrace(index, error, Backtrace::capture())
    }

    pub(crate) fn with_backtrace(index: usize, error: InvocationError<E>, backtrace: Backtrace) -> Self {
        Self {
            index,
            error,
            backtrace,
        }
    }
}

impl<E: fmt::Display> fmt::Display for Failure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "work item {} failed: {}: {}",
            self.index,
            self.error.type_name(),
            self.error
        )
    }
}

/// Per-item result of a failsafe run, in input order.
pub type Outcome<R, E> = Result<R, Failure<E>>;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchSummary {
    pub submitted: usize,
    pub completed: usize,
    pub failed: usize,
}

impl DispatchSummary {
    pub fn from_outcomes<R, E>(outcomes: &[Outcome<R, E>]) -> Self {
        let failed = outcomes.iter().filter(|o| o.is_err()).count();
        Self {
            submitted: outcomes.len(),
            completed: outcomes.len() - failed,
            failed,
        }
    }

    pub fn success_rate(&self) -> f64 {
        let finished = self.completed + self.failed;
        if finished == 0 {
            return 1.0;
        }
        self.completed as f64 / finished as f64
    }
}
