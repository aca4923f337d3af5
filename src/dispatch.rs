//! Dispatching a function over a batch of work items.
//!
//! Two failure policies are offered, each on a configurable pool or
//! restricted to scoped threads:
//!
//! | | any pool kind | thread kind only |
//! |---|---|---|
//! | fail-fast | [`dispatch`] | [`dispatch_threadsafe`] |
//! | failsafe | [`dispatch_failsafe`] | [`dispatch_failsafe_threadsafe`] |
//!
//! Every call builds a fresh pool and tears it down before returning, on
//! success and on error alike.
//!
//! Process-kind pools only accept owned `'static` work: workers must not
//! share borrowed state with the caller. Use the `_threadsafe` variants when
//! the work function borrows shared state, e.g. a `&Mutex<_>`.

use super::{
    errors::DispatchError,
    handle::JoinHandle,
    invoke::Invoke,
    model::{DispatchSummary, Failure, Outcome, PoolKind},
    pool::{PoolConfig, ScopedPool},
};
use std::fmt::Display;
use tracing::{debug, error};


/// Calls `f` on every work item and returns the results in input order.
///
/// Items are handed to workers in chunks of `config.chunk_size`. The first
/// failure aborts the batch and is returned as
/// [`DispatchError::WorkerInvocation`]; no partial results are returned.
///
/// ```
/// use starpool::{dispatch, PoolConfig};
/// use std::convert::Infallible;
///
/// fn square(x: i64) -> Result<i64, Infallible> {
///     Ok(x * x)
/// }
///
/// let items: Vec<(i64,)> = vec![(1,), (2,), (3,)];
/// let squares = dispatch(square, items, &PoolConfig::default()).unwrap();
/// assert_eq!(squares, vec![1, 4, 9]);
/// ```
pub fn dispatch<F, A, R, E>(
    f: F,
    work_items: Vec<A>,
    config: &PoolConfig,
) -> Result<Vec<R>, DispatchError<E>>
where
    F: Invoke<A, Output = Result<R, E>> + 'static,
    A: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    let pool = ScopedPool::from_config(config)?;
    let chunk = config.chunk()?;
    if work_items.is_empty() {
        return Ok(Vec::new());
    }
    pool.distribute(f, work_items, chunk.get())
}

/// [`dispatch`] on scoped threads. `f` and the work items may borrow from
/// the caller; `pool_kind` and `max_tasks_per_worker` are ignored.
pub fn dispatch_threadsafe<'env, F, A, R, E>(
    f: F,
    work_items: Vec<A>,
    config: &PoolConfig,
) -> Result<Vec<R>, DispatchError<E>>
where
    F: Invoke<A, Output = Result<R, E>> + 'env,
    A: Send + 'env,
    R: Send + 'env,
    E: Send + 'env,
{
    let pool = ScopedPool::construct(PoolKind::Thread, config.worker_count, None)?;
    let chunk = config.chunk()?;
    if work_items.is_empty() {
        return Ok(Vec::new());
    }
    pool.distribute_scoped(f, work_items, chunk.get())
}

/// Calls `f` on every work item, one task per item, and returns the results
/// of the calls that succeeded, in submission order.
///
/// Failed items are dropped from the output with no placeholder, and logged
/// when `config.verbose` is set. `chunk_size` and `max_tasks_per_worker` are
/// not used. Only configuration and worker spawn errors are returned.
pub fn dispatch_failsafe<F, A, R, E>(
    f: F,
    work_items: Vec<A>,
    config: &PoolConfig,
) -> Result<Vec<R>, DispatchError<E>>
where
    F: Invoke<A, Output = Result<R, E>> + 'static,
    A: Send + 'static,
    R: Send + 'static,
    E: Display + Send + 'static,
{
    dispatch_outcomes(f, work_items, config).map(survivors)
}

/// [`dispatch_failsafe`] on scoped threads.
pub fn dispatch_failsafe_threadsafe<'env, F, A, R, E>(
    f: F,
    work_items: Vec<A>,
    config: &PoolConfig,
) -> Result<Vec<R>, DispatchError<E>>
where
    F: Invoke<A, Output = Result<R, E>> + 'env,
    A: Send + 'env,
    R: Send + 'env,
    E: Display + Send + 'env,
{
    dispatch_outcomes_threadsafe(f, work_items, config).map(survivors)
}

/// Failsafe dispatch that keeps one [`Outcome`] per work item, in input
/// order, so failures can be matched back to their inputs.
pub fn dispatch_outcomes<F, A, R, E>(
    f: F,
    work_items: Vec<A>,
    config: &PoolConfig,
) -> Result<Vec<Outcome<R, E>>, DispatchError<E>>
where
    F: Invoke<A, Output = Result<R, E>> + 'static,
    A: Send + 'static,
    R: Send + 'static,
    E: Display + Send + 'static,
{
    // Failsafe pools keep their workers for the whole batch.
    let pool = ScopedPool::construct(config.pool_kind, config.worker_count, None)?;
    if work_items.is_empty() {
        return Ok(Vec::new());
    }
    let verbose = config.verbose;
    let outcomes = pool.submit_each(f, work_items, |handles| collect_outcomes(handles, verbose))?;
    summarize(pool.kind(), &outcomes);
    Ok(outcomes)
}

/// [`dispatch_outcomes`] on scoped threads.
pub fn dispatch_outcomes_threadsafe<'env, F, A, R, E>(
    f: F,
    work_items: Vec<A>,
    config: &PoolConfig,
) -> Result<Vec<Outcome<R, E>>, DispatchError<E>>
where
    F: Invoke<A, Output = Result<R, E>> + 'env,
    A: Send + 'env,
    R: Send + 'env,
    E: Display + Send + 'env,
{
    let pool = ScopedPool::construct(PoolKind::Thread, config.worker_count, None)?;
    if work_items.is_empty() {
        return Ok(Vec::new());
    }
    let verbose = config.verbose;
    let outcomes =
        pool.submit_each_scoped(f, work_items, |handles| collect_outcomes(handles, verbose))?;
    summarize(pool.kind(), &outcomes);
    Ok(outcomes)
}


/// Waits on each handle in submission order. A slow early item holds back
/// the items behind it.
fn collect_outcomes<R, E: Display>(handles: Vec<JoinHandle<R, E>>, verbose: bool) -> Vec<Outcome<R, E>> {
    handles
        .into_iter()
        .map(|handle| {
            let outcome = handle.wait();
            if let Err(failure) = &outcome {
                if verbose {
                    log_failure(failure);
                }
            }
            outcome
        })
        .collect()
}

fn log_failure<E: Display>(failure: &Failure<E>) {
    error!(
        index = failure.index,
        error_type = failure.error.type_name(),
        "######BEGIN TRACEBACK######\n{failure}\n{}\n######END TRACEBACK######",
        failure.backtrace
    );
}

fn summarize<R, E>(kind: PoolKind, outcomes: &[Outcome<R, E>]) {
    let summary = DispatchSummary::from_outcomes(outcomes);
    debug!(
        %kind,
        submitted = summary.submitted,
        completed = summary.completed,
        failed = summary.failed,
        success_rate = summary.success_rate(),
        "failsafe dispatch finished"
    );
}

fn survivors<R, E>(outcomes: Vec<Outcome<R, E>>) -> Vec<R> {
    outcomes.into_iter().filter_map(Result::ok).collect()
}
