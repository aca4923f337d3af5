//! Параллельный `starmap` на свежем пуле воркеров
//!
//! # Features
//! - Fail-fast режим: порядок входа сохраняется, возвращается первая ошибка
//! - Failsafe режим: ошибки элементов изолируются и логируются
//! - Process-пулы с владеющими задачами и пересозданием воркеров
//! - Scoped пулы потоков, задачи могут заимствовать состояние вызывающего
//! - Гарантированное завершение воркеров на любом пути выхода

pub mod dispatch;
pub mod errors;
pub mod handle;
pub mod invoke;
pub mod model;
pub mod pool;

pub use dispatch::{
    dispatch,
    dispatch_failsafe,
    dispatch_failsafe_threadsafe,
    dispatch_outcomes,
    dispatch_outcomes_threadsafe,
    dispatch_threadsafe,
};
pub use errors::{ConfigError, DispatchError, InvocationError};
pub use invoke::Invoke;
pub use model::{DispatchSummary, Failure, Outcome, PoolKind};
pub use pool::{live_workers, PoolConfig, ScopedPool};
