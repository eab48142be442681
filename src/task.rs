//! Asynchronous green-threads.
//!
//! *Tasks* are lightweight threads that are scheduled and executed
//! concurrently by [the runtime](crate::Runtime). You can spawn a
//! task with the [`spawn`] function, which returns a [`JoinHandle`].
//! Awaiting the handle waits for the task to complete and returns its
//! output:
//!
//! ```
//! turnstile::block_on(async {
//!     let handle = turnstile::spawn(async { 1 });
//!     assert_eq!(handle.await, 1);
//! });
//! ```
//!
//! If you do not need the result of a task, you can drop the handle; the
//! task keeps running in the background. All spawned tasks are dropped when
//! the runtime is dropped (i.e: at the end of [`block_on`](crate::block_on)).
use crate::runtime::executor::Task;
use crate::{util, Runtime};

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Spawns a new asynchronous task onto the current runtime.
///
/// # Panics
///
/// Panics if called outside of a runtime.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + 'static,
    F::Output: 'static,
{
    Runtime::unwrap_current().spawn(future)
}

/// An handle to an asynchronous task.
///
/// See the [module documentation](crate::task) for more details.
///
/// # Panics
///
/// Awaiting the handle panics if the task's runtime was dropped before the
/// task completed.
pub struct JoinHandle<T> {
    task: Task,
    _t: PhantomData<T>,
}

impl<T: 'static> JoinHandle<T> {
    /// `T` must be the output type of the task's future.
    pub(crate) fn new(task: Task) -> JoinHandle<T> {
        JoinHandle {
            task,
            _t: PhantomData,
        }
    }

    /// Cancel the task.
    ///
    /// The task's output will be returned if it had already completed,
    /// otherwise its future is dropped without being polled again.
    pub fn cancel(self) -> Option<T> {
        self.task.cancel::<T>()
    }
}

impl<T> Unpin for JoinHandle<T> {}

impl<T: 'static> Future for JoinHandle<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.task.poll::<T>(cx)
    }
}

/// Yields execution back to the runtime.
///
/// The current task is scheduled at the back of the runtime's queue,
/// allowing other tasks to run in the meantime.
pub async fn yield_now() {
    let mut yielded = false;

    util::poll_fn(|cx| {
        if yielded {
            Poll::Ready(())
        } else {
            yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    })
    .await
}
