use super::{
    errors::{ConfigError, DispatchError, InvocationError},
    handle::{JoinHandle, Task},
    invoke::Invoke,
    model::{Failure, PoolKind},
};
use std::{
    any::Any,
    backtrace::Backtrace,
    cell::{Cell, RefCell},
    io,
    num::NonZeroUsize,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, Once, PoisonError,
    },
    thread,
};
use crossbeam::{
    channel,
    deque::{Injector, Steal},
};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};


pub const WORKERS_ENV: &str = "STARPOOL_WORKERS";
pub const CHUNK_SIZE_ENV: &str = "STARPOOL_CHUNK_SIZE";
pub const MAX_TASKS_ENV: &str = "STARPOOL_MAX_TASKS";
pub const VERBOSE_ENV: &str = "STARPOOL_VERBOSE";
pub const KIND_ENV: &str = "STARPOOL_KIND";

/// Конфигурация пула для одного вызова dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub worker_count: usize,
    pub pool_kind: PoolKind,
    /// Tasks a process-kind worker runs before it is replaced. `None` keeps
    /// workers for the whole batch. Ignored by thread-kind pools.
    pub max_tasks_per_worker: Option<usize>,
    /// Work items handed to a worker per task. Fail-fast modes only.
    pub chunk_size: usize,
    /// Log every failure swallowed by failsafe modes. Panics inside work
    /// items never reach the process panic hook, whatever this is set to.
    pub verbose: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get(),
            pool_kind: PoolKind::Process,
            max_tasks_per_worker: Some(1),
            chunk_size: 1,
            verbose: true,
        }
    }
}

impl PoolConfig {
    /// Пул потоков, по воркеру на логическое ядро
    pub fn threads() -> Self {
        Self {
            pool_kind: PoolKind::Thread,
            max_tasks_per_worker: None,
            ..Default::default()
        }
    }

    /// Значения по умолчанию, переопределённые переменными `STARPOOL_*`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub(crate) fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&'static str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(WORKERS_ENV) {
            config.worker_count = parse_count(WORKERS_ENV, &value)?;
        }
        if let Some(value) = lookup(CHUNK_SIZE_ENV) {
            config.chunk_size = parse_count(CHUNK_SIZE_ENV, &value)?;
        }
        if let Some(value) = lookup(MAX_TASKS_ENV) {
            config.max_tasks_per_worker = match value.trim().to_ascii_lowercase().as_str() {
                "0" | "none" => None,
                _ => Some(parse_count(MAX_TASKS_ENV, &value)?),
            };
        }
        if let Some(value) = lookup(VERBOSE_ENV) {
            config.verbose = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(invalid_env(VERBOSE_ENV, &value)),
            };
        }
        if let Some(value) = lookup(KIND_ENV) {
            config.pool_kind = value.parse().map_err(|_| invalid_env(KIND_ENV, &value))?;
        }

        Ok(config)
    }

    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_kind(mut self, pool_kind: PoolKind) -> Self {
        self.pool_kind = pool_kind;
        self
    }

    pub fn with_max_tasks_per_worker(mut self, max_tasks: Option<usize>) -> Self {
        self.max_tasks_per_worker = max_tasks;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub(crate) fn chunk(&self) -> Result<NonZeroUsize, ConfigError> {
        NonZeroUsize::new(self.chunk_size).ok_or(ConfigError::ZeroChunkSize)
    }
}

fn parse_count(var: &'static str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse().map_err(|_| invalid_env(var, value))
}

fn invalid_env(var: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidEnv {
        var,
        value: value.to_string(),
    }
}


static LIVE_WORKERS: AtomicUsize = AtomicUsize::new(0);

/// Число живых потоков-воркеров в процессе
pub fn live_workers() -> usize {
    LIVE_WORKERS.load(Ordering::SeqCst)
}

/// Counts a worker thread as live until dropped.
struct LiveWorker;

impl LiveWorker {
    fn enter() -> Self {
        LIVE_WORKERS.fetch_add(1, Ordering::SeqCst);
        LiveWorker
    }
}

impl Drop for LiveWorker {
    fn drop(&mut self) {
        LIVE_WORKERS.fetch_sub(1, Ordering::SeqCst);
    }
}


enum WorkerExit {
    Drained,
    Retired,
    Cancelled,
}

/// Очередь задач одного вызова, общая для его воркеров
struct Batch<'env> {
    queue: Injector<Task<'env>>,
    cancel: CancellationToken,
}

impl<'env> Batch<'env> {
    fn new(tasks: Vec<Task<'env>>) -> Self {
        let queue = Injector::new();
        for task in tasks {
            queue.push(task);
        }
        Self {
            queue,
            cancel: CancellationToken::new(),
        }
    }

    fn next_task(&self) -> Option<Task<'env>> {
        loop {
            match self.queue.steal() {
                Steal::Success(task) => return Some(task),
                Steal::Empty => return None,
                Steal::Retry => continue,
            }
        }
    }

    /// Runs tasks until the queue is empty, the batch is cancelled or
    /// `budget` tasks have run.
    fn work(&self, budget: Option<NonZeroUsize>) -> WorkerExit {
        let mut done = 0;
        while !self.cancel.is_cancelled() {
            if budget.is_some_and(|b| done >= b.get()) {
                return if self.queue.is_empty() {
                    WorkerExit::Drained
                } else {
                    WorkerExit::Retired
                };
            }
            let Some(task) = self.next_task() else {
                return WorkerExit::Drained;
            };
            task();
            done += 1;
        }
        WorkerExit::Cancelled
    }
}

fn worker_name(slot: usize) -> String {
    format!("starpool-worker-{slot}")
}


/// Workers spawned on scoped threads. They may borrow from `'env`.
///
/// Every worker is joined before this returns, including when spawning fails.
fn run_scoped<'env, T>(
    workers: usize,
    tasks: Vec<Task<'env>>,
    collect: impl FnOnce() -> T,
) -> io::Result<T> {
    let batch = Batch::new(tasks);
    debug!(kind = %PoolKind::Thread, workers, "pool constructed");

    let out = thread::scope(|s| {
        for slot in 0..workers {
            let batch = &batch;
            let spawned = thread::Builder::new()
                .name(worker_name(slot))
                .spawn_scoped(s, move || {
                    let _live = LiveWorker::enter();
                    batch.work(None);
                });
            if let Err(err) = spawned {
                batch.cancel.cancel();
                return Err(err);
            }
        }
        let out = collect();
        batch.cancel.cancel();
        Ok(out)
    });

    debug!(kind = %PoolKind::Thread, "pool torn down");
    out
}


type WorkerHandles = Arc<Mutex<Vec<thread::JoinHandle<()>>>>;

/// Owns the detached workers of a process-kind pool. Dropping it cancels the
/// batch and joins every worker, replacements included.
struct RecyclingPool {
    batch: Arc<Batch<'static>>,
    handles: WorkerHandles,
    budget: Option<NonZeroUsize>,
}

impl RecyclingPool {
    fn new(tasks: Vec<Task<'static>>, budget: Option<NonZeroUsize>) -> Self {
        Self {
            batch: Arc::new(Batch::new(tasks)),
            handles: Arc::new(Mutex::new(Vec::new())),
            budget,
        }
    }

    fn spawn(&self, slot: usize) -> io::Result<()> {
        spawn_recycled(slot, 0, self.batch.clone(), self.handles.clone(), self.budget)
    }
}

impl Drop for RecyclingPool {
    fn drop(&mut self) {
        self.batch.cancel.cancel();
        // A retiring worker registers its replacement before it exits, so
        // popping until empty also catches replacements.
        loop {
            let next = self.handles.lock().unwrap_or_else(PoisonError::into_inner).pop();
            match next {
                Some(handle) => {
                    if handle.join().is_err() {
                        warn!("pool worker panicked outside of a work item");
                    }
                }
                None => break,
            }
        }
        debug!(kind = %PoolKind::Process, "pool torn down");
    }
}

fn spawn_recycled(
    slot: usize,
    generation: usize,
    batch: Arc<Batch<'static>>,
    handles: WorkerHandles,
    budget: Option<NonZeroUsize>,
) -> io::Result<()> {
    let registry = handles.clone();
    let handle = thread::Builder::new()
        .name(worker_name(slot))
        .spawn(move || {
            let _live = LiveWorker::enter();
            let mut generation = generation;
            while let WorkerExit::Retired = batch.work(budget) {
                match spawn_recycled(slot, generation + 1, batch.clone(), registry.clone(), budget) {
                    Ok(()) => {
                        debug!(slot, generation, "worker retired");
                        return;
                    }
                    Err(err) => {
                        warn!(slot, %err, "failed to spawn replacement worker, keeping the current one");
                        generation += 1;
                    }
                }
            }
        })?;
    handles.lock().unwrap_or_else(PoisonError::into_inner).push(handle);
    Ok(())
}

fn run_recycled<T>(
    workers: usize,
    budget: Option<NonZeroUsize>,
    tasks: Vec<Task<'static>>,
    collect: impl FnOnce() -> T,
) -> io::Result<T> {
    let pool = RecyclingPool::new(tasks, budget);
    for slot in 0..workers {
        pool.spawn(slot)?;
    }
    debug!(kind = %PoolKind::Process, workers, max_tasks = ?budget, "pool constructed");
    Ok(collect())
}


thread_local! {
    static IN_CALL: Cell<bool> = const { Cell::new(false) };
    static PANIC_TRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chains a hook in front of the current one. While a work item runs on this
/// thread, a panic only records its backtrace; any other panic goes to the
/// previous hook.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if IN_CALL.try_with(Cell::get).unwrap_or(false) {
                let _ = PANIC_TRACE.try_with(|slot| *slot.borrow_mut() = Some(Backtrace::force_capture()));
            } else {
                previous(info);
            }
        }));
    });
}

/// Calls `f`, turning both an `Err` and a panic into an [`InvocationError`].
fn call<F, A, R, E>(f: &F, args: A) -> Result<R, InvocationError<E>>
where
    F: Invoke<A, Output = Result<R, E>>,
{
    call_traced(f, args).map_err(|(error, _)| error)
}

/// [`call`], also returning the stack recorded at the panic site.
fn call_traced<F, A, R, E>(f: &F, args: A) -> Result<R, (InvocationError<E>, Option<Backtrace>)>
where
    F: Invoke<A, Output = Result<R, E>>,
{
    install_panic_hook();
    let outer = IN_CALL.with(|flag| flag.replace(true));
    let caught = panic::catch_unwind(AssertUnwindSafe(|| f.invoke(args)));
    IN_CALL.with(|flag| flag.set(outer));
    let trace = PANIC_TRACE.with(|slot| slot.borrow_mut().take());

    match caught {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err((InvocationError::Failed(err), None)),
        Err(payload) => Err((InvocationError::Panicked(panic_message(payload)), trace)),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

type Event<R, E> = (usize, Result<R, InvocationError<E>>);

/// One task per `chunk` consecutive items. A chunk stops at its first failure.
fn chunk_tasks<'env, F, A, R, E>(
    f: Arc<F>,
    items: Vec<A>,
    chunk: NonZeroUsize,
    events: &channel::Sender<Event<R, E>>,
) -> Vec<Task<'env>>
where
    F: Invoke<A, Output = Result<R, E>> + 'env,
    A: Send + 'env,
    R: Send + 'env,
    E: Send + 'env,
{
    let mut tasks: Vec<Task<'env>> = Vec::with_capacity(items.len().div_ceil(chunk.get()));
    let mut items = items.into_iter().enumerate().peekable();
    while items.peek().is_some() {
        let chunk_items: Vec<(usize, A)> = items.by_ref().take(chunk.get()).collect();
        let f = Arc::clone(&f);
        let events = events.clone();
        tasks.push(Box::new(move || {
            for (index, args) in chunk_items {
                let result = call(&*f, args);
                let failed = result.is_err();
                trace!(index, failed, "work item finished");
                if events.send((index, result)).is_err() || failed {
                    return;
                }
            }
        }));
    }
    tasks
}

/// Waits for one event per item and restores input order. Returns on the
/// first failure.
fn collect_ordered<R, E>(
    len: usize,
    events: channel::Receiver<Event<R, E>>,
) -> Result<Vec<R>, DispatchError<E>> {
    let mut slots: Vec<Option<R>> = (0..len).map(|_| None).collect();
    for _ in 0..len {
        match events.recv() {
            Ok((index, Ok(value))) => slots[index] = Some(value),
            Ok((index, Err(source))) => {
                return Err(DispatchError::WorkerInvocation { index, source });
            }
            // Every sender is gone but results are missing; report the first gap.
            Err(_) => break,
        }
    }
    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or(DispatchError::WorkerInvocation {
                index,
                source: InvocationError::Lost,
            })
        })
        .collect()
}

/// One task and one [`JoinHandle`] per item.
fn item_tasks<'env, F, A, R, E>(f: Arc<F>, items: Vec<A>) -> (Vec<Task<'env>>, Vec<JoinHandle<R, E>>)
where
    F: Invoke<A, Output = Result<R, E>> + 'env,
    A: Send + 'env,
    R: Send + 'env,
    E: Send + 'env,
{
    items
        .into_iter()
        .enumerate()
        .map(|(index, args)| {
            let (tx, rx) = oneshot::channel();
            let f = Arc::clone(&f);
            let task: Task<'env> = Box::new(move || {
                let result = call_traced(&*f, args).map_err(|(error, trace)| match trace {
                    Some(trace) => Failure::with_backtrace(index, error, trace),
                    None => Failure::new(index, error),
                });
                trace!(index, failed = result.is_err(), "work item finished");
                let _ = tx.send(result);
            });
            (task, JoinHandle::new(index, rx))
        })
        .unzip()
}


/// Проверенный рецепт пула. Воркеры живут только пока работает один из его методов
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopedPool {
    kind: PoolKind,
    workers: NonZeroUsize,
    max_tasks_per_worker: Option<NonZeroUsize>,
}

impl ScopedPool {
    /// Validates the pool parameters. No worker is spawned here.
    ///
    /// The recycling threshold is kept for process-kind pools and dropped for
    /// thread-kind ones.
    pub fn construct(
        kind: PoolKind,
        worker_count: usize,
        max_tasks_per_worker: Option<usize>,
    ) -> Result<Self, ConfigError> {
        let workers = NonZeroUsize::new(worker_count).ok_or(ConfigError::NoWorkers)?;
        let max_tasks_per_worker = match kind {
            PoolKind::Process => match max_tasks_per_worker {
                Some(n) => Some(NonZeroUsize::new(n).ok_or(ConfigError::ZeroMaxTasks)?),
                None => None,
            },
            PoolKind::Thread => None,
        };
        Ok(Self {
            kind,
            workers,
            max_tasks_per_worker,
        })
    }

    pub fn from_config(config: &PoolConfig) -> Result<Self, ConfigError> {
        Self::construct(config.pool_kind, config.worker_count, config.max_tasks_per_worker)
    }

    #[inline]
    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    #[inline]
    pub fn worker_count(&self) -> usize {
        self.workers.get()
    }

    #[inline]
    pub fn max_tasks_per_worker(&self) -> Option<usize> {
        self.max_tasks_per_worker.map(NonZeroUsize::get)
    }

    fn workers_for(&self, tasks: usize) -> usize {
        self.workers.get().min(tasks)
    }

    fn execute<T>(&self, tasks: Vec<Task<'static>>, collect: impl FnOnce() -> T) -> io::Result<T> {
        let workers = self.workers_for(tasks.len());
        match self.kind {
            PoolKind::Process => run_recycled(workers, self.max_tasks_per_worker, tasks, collect),
            PoolKind::Thread => run_scoped(workers, tasks, collect),
        }
    }

    /// Applies `f` to every item in chunks of `chunk_size` and returns the
    /// results in input order. Blocks until every item has finished or the
    /// first failure is observed.
    pub fn distribute<F, A, R, E>(
        &self,
        f: F,
        items: Vec<A>,
        chunk_size: usize,
    ) -> Result<Vec<R>, DispatchError<E>>
    where
        F: Invoke<A, Output = Result<R, E>> + 'static,
        A: Send + 'static,
        R: Send + 'static,
        E: Send + 'static,
    {
        let chunk = NonZeroUsize::new(chunk_size).ok_or(ConfigError::ZeroChunkSize)?;
        let len = items.len();
        let (tx, rx) = channel::unbounded();
        let tasks = chunk_tasks(Arc::new(f), items, chunk, &tx);
        drop(tx);
        self.execute(tasks, || collect_ordered(len, rx))
            .map_err(DispatchError::PoolConstruction)?
    }

    /// Like [`distribute`](Self::distribute), but always on scoped threads so
    /// `f` and the items may borrow from the caller.
    pub fn distribute_scoped<'env, F, A, R, E>(
        &self,
        f: F,
        items: Vec<A>,
        chunk_size: usize,
    ) -> Result<Vec<R>, DispatchError<E>>
    where
        F: Invoke<A, Output = Result<R, E>> + 'env,
        A: Send + 'env,
        R: Send + 'env,
        E: Send + 'env,
    {
        let chunk = NonZeroUsize::new(chunk_size).ok_or(ConfigError::ZeroChunkSize)?;
        let len = items.len();
        let (tx, rx) = channel::unbounded();
        let tasks = chunk_tasks(Arc::new(f), items, chunk, &tx);
        drop(tx);
        run_scoped(self.workers_for(tasks.len()), tasks, || collect_ordered(len, rx))
            .map_err(DispatchError::PoolConstruction)?
    }

    /// Submits every item as its own task, then hands the handles, in
    /// submission order, to `collect` on the calling thread while the
    /// workers run.
    pub fn submit_each<F, A, R, E, T>(
        &self,
        f: F,
        items: Vec<A>,
        collect: impl FnOnce(Vec<JoinHandle<R, E>>) -> T,
    ) -> Result<T, DispatchError<E>>
    where
        F: Invoke<A, Output = Result<R, E>> + 'static,
        A: Send + 'static,
        R: Send + 'static,
        E: Send + 'static,
    {
        let (tasks, handles) = item_tasks(Arc::new(f), items);
        self.execute(tasks, || collect(handles))
            .map_err(DispatchError::PoolConstruction)
    }

    /// Like [`submit_each`](Self::submit_each), but always on scoped threads.
    pub fn submit_each_scoped<'env, F, A, R, E, T>(
        &self,
        f: F,
        items: Vec<A>,
        collect: impl FnOnce(Vec<JoinHandle<R, E>>) -> T,
    ) -> Result<T, DispatchError<E>>
    where
        F: Invoke<A, Output = Result<R, E>> + 'env,
        A: Send + 'env,
        R: Send + 'env,
        E: Send + 'env,
    {
        let (tasks, handles) = item_tasks(Arc::new(f), items);
        run_scoped(self.workers_for(tasks.len()), tasks, || collect(handles))
            .map_err(DispatchError::PoolConstruction)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let vars: HashMap<&'static str, String> =
            vars.iter().map(|(k, v)| (*k, v.to_string())).collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn default_uses_every_core() {
        let config = PoolConfig::default();
        assert_eq!(config.worker_count, num_cpus::get());
        assert_eq!(config.pool_kind, PoolKind::Process);
        assert_eq!(config.max_tasks_per_worker, Some(1));
        assert_eq!(config.chunk_size, 1);
        assert!(config.verbose);
    }

    #[test]
    fn env_overrides_defaults() {
        let config = PoolConfig::from_lookup(lookup(&[
            (WORKERS_ENV, "3"),
            (CHUNK_SIZE_ENV, " 16 "),
            (MAX_TASKS_ENV, "none"),
            (VERBOSE_ENV, "off"),
            (KIND_ENV, "thread"),
        ]))
        .unwrap();
        assert_eq!(
            config,
            PoolConfig {
                worker_count: 3,
                pool_kind: PoolKind::Thread,
                max_tasks_per_worker: None,
                chunk_size: 16,
                verbose: false,
            }
        );
    }

    #[test]
    fn env_rejects_garbage() {
        let err = PoolConfig::from_lookup(lookup(&[(WORKERS_ENV, "many")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidEnv {
                var: WORKERS_ENV,
                value: "many".into()
            }
        );
        assert!(PoolConfig::from_lookup(lookup(&[(VERBOSE_ENV, "maybe")])).is_err());
        assert!(PoolConfig::from_lookup(lookup(&[(KIND_ENV, "fork")])).is_err());
    }

    #[test]
    fn construct_rejects_zero_workers() {
        assert_eq!(
            ScopedPool::construct(PoolKind::Process, 0, Some(1)),
            Err(ConfigError::NoWorkers)
        );
        assert_eq!(
            ScopedPool::construct(PoolKind::Thread, 0, None),
            Err(ConfigError::NoWorkers)
        );
    }

    #[test]
    fn thread_kind_drops_recycling_threshold() {
        let pool = ScopedPool::construct(PoolKind::Thread, 2, Some(0)).unwrap();
        assert_eq!(pool.max_tasks_per_worker(), None);

        let pool = ScopedPool::construct(PoolKind::Process, 2, Some(5)).unwrap();
        assert_eq!(pool.max_tasks_per_worker(), Some(5));

        assert_eq!(
            ScopedPool::construct(PoolKind::Process, 2, Some(0)),
            Err(ConfigError::ZeroMaxTasks)
        );
    }

    #[test]
    fn chunks_keep_input_order() {
        let pool = ScopedPool::construct(PoolKind::Process, 3, Some(2)).unwrap();
        let items: Vec<(usize,)> = (0..50).map(|i| (i,)).collect();
        let out = pool
            .distribute(|x: usize| Ok::<_, String>(x * 10), items, 4)
            .unwrap();
        assert_eq!(out, (0..50).map(|x| x * 10).collect::<Vec<_>>());
    }

    #[test]
    fn recycled_workers_finish_the_batch() {
        let pool = ScopedPool::construct(PoolKind::Process, 2, Some(1)).unwrap();
        let items: Vec<(u64,)> = (0..20).map(|i| (i,)).collect();
        let names = pool
            .distribute(
                |_: u64| Ok::<_, String>(thread::current().name().map(str::to_string)),
                items,
                1,
            )
            .unwrap();
        assert_eq!(names.len(), 20);
        assert!(names
            .iter()
            .all(|n| n.as_deref().is_some_and(|n| n.starts_with("starpool-worker-"))));
    }

    #[test]
    fn zero_chunk_size_is_a_configuration_error() {
        let pool = ScopedPool::construct(PoolKind::Thread, 1, None).unwrap();
        let err = pool
            .distribute_scoped(|x: u8| Ok::<_, String>(x), vec![(1u8,)], 0)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Configuration(ConfigError::ZeroChunkSize)));
    }

    #[test]
    fn panics_become_invocation_errors() {
        let pool = ScopedPool::construct(PoolKind::Thread, 2, None).unwrap();
        let err = pool
            .distribute_scoped(
                |x: u8| -> Result<u8, String> {
                    if x == 3 {
                        panic!("three is not allowed");
                    }
                    Ok(x)
                },
                vec![(1u8,), (2,), (3,)],
                1,
            )
            .unwrap_err();
        match err {
            DispatchError::WorkerInvocation {
                index: 2,
                source: InvocationError::Panicked(msg),
            } => assert_eq!(msg, "three is not allowed"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[inline(never)]
    fn refuse_odd(x: u8) -> Result<u8, String> {
        if x % 2 == 1 {
            panic!("odd input {x}");
        }
        Err(format!("even input {x}"))
    }

    #[test]
    fn panic_trace_is_taken_at_the_panic_site() {
        let (error, trace) = call_traced(&refuse_odd, (3u8,)).unwrap_err();
        assert!(matches!(error, InvocationError::Panicked(ref msg) if msg == "odd input 3"));
        let trace = trace.expect("panic inside a call records a backtrace");
        assert_eq!(trace.status(), std::backtrace::BacktraceStatus::Captured);

        // An Err return records nothing and the slot does not leak into it.
        let (error, trace) = call_traced(&refuse_odd, (4u8,)).unwrap_err();
        assert!(matches!(error, InvocationError::Failed(ref msg) if msg == "even input 4"));
        assert!(trace.is_none());
        assert!(!IN_CALL.with(Cell::get));
    }

    #[test]
    fn submit_each_hands_back_handles_in_order() {
        let pool = ScopedPool::construct(PoolKind::Process, 4, None).unwrap();
        let items: Vec<(u32,)> = (0..10).map(|i| (i,)).collect();
        let indices = pool
            .submit_each(|x: u32| Ok::<_, String>(x), items, |handles| {
                handles.iter().map(JoinHandle::index).collect::<Vec<_>>()
            })
            .unwrap();
        assert_eq!(indices, (0..10).collect::<Vec<_>>());
    }
}
