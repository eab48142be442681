use crate::sync::oneshot;
use crate::util::{self, CatchUnwind};
use crate::Runtime;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::thread;

use log::{error, trace};

type Job = Box<dyn FnOnce() -> JobFuture>;

type JobFuture = Pin<Box<dyn Future<Output = ()>>>;

type Observer = Rc<dyn Fn(bool)>;

/// Runs submitted tasks one at a time, in the order they were submitted.
///
/// Instead of handing out a guard, the mutex owns a queue of pending tasks.
/// [`submit`](Mutex::submit) appends a task to the queue and returns a
/// [`Handle`] that resolves to the task's result once it has run. The first
/// submission on an idle mutex locks it and spawns a drain loop onto the
/// current [runtime](crate::Runtime), which runs queued tasks to completion
/// until the queue is empty and then unlocks.
///
/// Cloning a `Mutex` yields another handle to the same lock.
///
/// ```
/// use turnstile::sync::Mutex;
///
/// # turnstile::block_on(async {
/// let mutex = Mutex::new();
///
/// let first = mutex.submit(|| async { Ok::<_, ()>(1) });
/// let second = mutex.submit(|| async { Err::<i32, _>("no") });
///
/// // nothing can jump the queue while it is draining
/// assert!(mutex.submit_if_free(|| async { Ok::<_, ()>(3) }).is_none());
///
/// assert_eq!(first.await, Ok(1));
/// assert_eq!(second.await, Err("no"));
/// assert!(!mutex.is_locked());
/// # });
/// ```
#[derive(Clone, Default)]
pub struct Mutex {
    shared: Rc<Shared>,
}

#[derive(Default)]
struct Shared {
    locked: Cell<bool>,
    queue: RefCell<VecDeque<Job>>,
    observer: RefCell<Option<Observer>>,
}

impl Mutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `observer` and returns the mutex.
    ///
    /// See [`set_observer`](Mutex::set_observer).
    pub fn with_observer<F>(self, observer: F) -> Self
    where
        F: Fn(bool) + 'static,
    {
        self.set_observer(observer);
        self
    }

    /// Returns true while a drain cycle is running.
    pub fn is_locked(&self) -> bool {
        self.shared.locked.get()
    }

    /// Number of tasks waiting in the queue, not counting the one running.
    pub fn queued(&self) -> usize {
        self.shared.queue.borrow().len()
    }

    /// Replaces the callback notified whenever the lock state changes.
    ///
    /// The observer is called synchronously with the new state, once when the
    /// mutex locks and once when it unlocks. It is not called for the state
    /// the mutex is in when it is attached. The mutex holds no internal
    /// borrows while calling it, so the observer may use the mutex, including
    /// submitting to it. A panicking observer is logged and otherwise
    /// ignored.
    pub fn set_observer<F>(&self, observer: F)
    where
        F: Fn(bool) + 'static,
    {
        self.replace_observer(Some(Rc::new(observer)));
    }

    /// Detaches the current observer, if any.
    pub fn clear_observer(&self) {
        self.replace_observer(None);
    }

    fn replace_observer(&self, observer: Option<Observer>) {
        let old = mem::replace(&mut *self.shared.observer.borrow_mut(), observer);
        drop(old);
    }

    /// Queues `task` to run once every previously submitted task has run.
    ///
    /// The task is always accepted. If the mutex is idle it becomes locked
    /// immediately and a drain loop is spawned onto the current runtime;
    /// the task itself runs once the runtime gets to it. The returned handle
    /// resolves to the task's result. Dropping the handle does not withdraw
    /// the task.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is idle and there is no current runtime to spawn
    /// the drain loop onto.
    pub fn submit<F, Fut, T, E>(&self, task: F) -> Handle<T, E>
    where
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = Result<T, E>> + 'static,
        T: 'static,
        E: 'static,
    {
        let (tx, rx) = oneshot::channel();

        let job: Job = Box::new(move || -> JobFuture {
            Box::pin(async move {
                let outcome = CatchUnwind::new(async move { task().await }).await;
                // the caller is free to drop its handle
                let _ = tx.send(outcome);
            })
        });

        self.enqueue(job);

        Handle { rx }
    }

    /// Like [`submit`](Mutex::submit), but returns `None` without queueing
    /// anything if the mutex is currently locked.
    ///
    /// # Panics
    ///
    /// Panics if there is no current runtime.
    pub fn submit_if_free<F, Fut, T, E>(&self, task: F) -> Option<Handle<T, E>>
    where
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = Result<T, E>> + 'static,
        T: 'static,
        E: 'static,
    {
        if self.is_locked() {
            None
        } else {
            Some(self.submit(task))
        }
    }

    // Starting a drain cycle is a check of `locked` followed by a spawn, with
    // no suspension point in between, so at most one drain loop exists.
    fn enqueue(&self, job: Job) {
        if self.is_locked() {
            self.shared.queue.borrow_mut().push_back(job);
            return;
        }

        let runtime = Runtime::unwrap_current();
        self.shared.queue.borrow_mut().push_back(job);

        self.set_locked(true);
        trace!("mutex locked, draining {} queued task(s)", self.queued());

        // the runtime owns the drain loop from here on
        drop(runtime.spawn(self.clone().drain()));
    }

    // The guard is created before the first poll, so even a drain loop that
    // never gets to run unlocks the mutex when it is dropped.
    fn drain(self) -> impl Future<Output = ()> {
        let release = Release(self);

        async move {
            let result = CatchUnwind::new(release.0.run_queue()).await;
            if let Err(payload) = result {
                error!(
                    "invariant violation: panic escaped the mutex drain loop: {}",
                    util::panic_message(&*payload)
                );
            }
            drop(release);
        }
    }

    async fn run_queue(&self) {
        loop {
            let job = self.shared.queue.borrow_mut().pop_front();

            match job {
                Some(job) => job().await,
                None => break,
            }
        }
    }

    fn set_locked(&self, locked: bool) {
        if self.shared.locked.replace(locked) == locked {
            return;
        }

        let observer = self.shared.observer.borrow().clone();
        if let Some(observer) = observer {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| observer(locked))) {
                error!(
                    "invariant violation: mutex observer panicked on locked = {}: {}",
                    locked,
                    util::panic_message(&*payload)
                );
            }
        }
    }
}

// Draining -> Idle, on every way out of the drain loop. If the runtime is
// torn down mid-cycle, tasks still queued stay queued for the next cycle.
struct Release(Mutex);

impl Drop for Release {
    fn drop(&mut self) {
        self.0.set_locked(false);
        trace!("mutex unlocked, {} task(s) left queued", self.0.queued());
    }
}

impl fmt::Debug for Mutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex")
            .field("locked", &self.is_locked())
            .field("queued", &self.queued())
            .finish_non_exhaustive()
    }
}

/// Resolves to the result of a task submitted to a [`Mutex`].
///
/// If the task panicked, awaiting the handle resumes that panic.
///
/// # Panics
///
/// Awaiting a handle panics if the runtime running the drain loop was
/// dropped before the task completed.
pub struct Handle<T, E> {
    rx: oneshot::Receiver<thread::Result<Result<T, E>>>,
}

impl<T, E> Future for Handle<T, E> {
    type Output = Result<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(Ok(outcome))) => Poll::Ready(outcome),
            Poll::Ready(Ok(Err(payload))) => panic::resume_unwind(payload),
            Poll::Ready(Err(oneshot::Closed)) => {
                panic!("mutex task was dropped before completing, its runtime was shut down")
            }
        }
    }
}

impl<T, E> fmt::Debug for Handle<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_states_are_not_reported() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mutex = Mutex::new().with_observer({
            let calls = calls.clone();
            move |locked| calls.borrow_mut().push(locked)
        });

        mutex.set_locked(false);
        mutex.set_locked(true);
        mutex.set_locked(true);
        mutex.set_locked(false);

        assert_eq!(*calls.borrow(), vec![true, false]);
    }

    #[test]
    fn drain_is_spawned_once_per_cycle() {
        crate::block_on(async {
            let mutex = Mutex::new();

            let a = mutex.submit(|| async { Ok::<_, ()>(()) });
            let b = mutex.submit(|| async { Ok::<_, ()>(()) });

            // both queued behind a single drain loop that has not run yet
            assert!(mutex.is_locked());
            assert_eq!(mutex.queued(), 2);
            // the mutex, its clone in the drain loop, and nothing else
            assert_eq!(Rc::strong_count(&mutex.shared), 2);

            a.await.unwrap();
            b.await.unwrap();
            assert_eq!(Rc::strong_count(&mutex.shared), 1);
        });
    }

    #[test]
    fn submitting_on_a_locked_mutex_needs_no_runtime() {
        let mutex = Mutex::new();
        mutex.shared.locked.set(true);

        let _handle = mutex.submit(|| async { Ok::<_, ()>(()) });
        assert_eq!(mutex.queued(), 1);
    }

    #[test]
    fn debug_shows_state() {
        let mutex = Mutex::new();
        assert_eq!(format!("{:?}", mutex), "Mutex { locked: false, queued: 0, .. }");
    }
}
