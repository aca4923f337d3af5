use super::{
    errors::InvocationError,
    model::Failure,
};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::oneshot;


/// A unit of work queued on a pool. `'env` is the lifetime of anything the
/// work borrows; process-kind pools only accept `'static` tasks.
pub type Task<'env> = Box<dyn FnOnce() + Send + 'env>;

pub type TaskResult<R, E> = Result<R, Failure<E>>;


/// Handle на один асинхронно отправленный элемент
///
/// Resolves to the item's outcome. If the task is dropped without running
/// (the pool was torn down first) it resolves to [`InvocationError::Lost`].
pub struct JoinHandle<R, E> {
    index: usize,
    receiver: oneshot::Receiver<TaskResult<R, E>>,
}

impl<R, E> JoinHandle<R, E> {

    pub fn new(index: usize, receiver: oneshot::Receiver<TaskResult<R, E>>) -> Self {
        Self {
            index,
            receiver,
        }
    }

    /// Position of the work item in the submitted batch.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Blocks the current thread until the work item finishes.
    ///
    /// Must not be called from inside an async task.
    pub fn wait(self) -> TaskResult<R, E> {
        futures::executor::block_on(self)
    }
}

impl<R, E> Future for JoinHandle<R, E> {
    type Output = TaskResult<R, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(res) => Poll::Ready(
                res.unwrap_or_else(|_| Err(Failure::new(this.index, InvocationError::Lost))),
            ),
            Poll::Pending => Poll::Pending,
        }
    }
}
