//! The single-threaded executor that mutexes spawn their drain loops onto.
//!
//! A [`Runtime`] is cheap to clone; clones share the same run queue. Tasks
//! spawned onto a runtime only make progress while some thread is inside
//! [`Runtime::block_on`]. Any task that has not completed when the last
//! clone of the runtime is dropped is dropped with it, whether it was
//! queued or waiting to be woken.
pub(crate) mod executor;

use self::executor::Executor;
use crate::task::JoinHandle;

use std::cell::RefCell;
use std::future::Future;

thread_local! {
    static RUNTIME: RefCell<Option<Runtime>> = const { RefCell::new(None) };
}

pub(crate) const NO_RUNTIME: &str =
    "there is no runtime running, must be called from the context of `turnstile::block_on`";

const POLLS_PER_TICK: usize = 61;
const INITIAL_TASKS: usize = 64;

#[derive(Clone)]
pub struct Runtime {
    executor: Executor,
}

impl Runtime {
    /// Creates a runtime with the default configuration.
    pub fn new() -> Self {
        Self {
            executor: Executor::new(POLLS_PER_TICK, INITIAL_TASKS),
        }
    }

    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Makes this the current runtime until the returned guard is dropped.
    #[must_use = "Creating and immediately dropping an enter guard does nothing"]
    pub fn enter(&self) -> impl Drop + '_ {
        struct EnterGuard(Option<Runtime>);

        impl Drop for EnterGuard {
            fn drop(&mut self) {
                RUNTIME.with(|rt| {
                    *rt.borrow_mut() = self.0.take();
                });
            }
        }

        let old = RUNTIME.with(|rt| rt.borrow_mut().replace(self.clone()));

        EnterGuard(old)
    }

    pub fn current() -> Option<Self> {
        RUNTIME.with(|rt| rt.borrow().clone())
    }

    pub(crate) fn unwrap_current() -> Self {
        match Self::current() {
            Some(rt) => rt,
            None => panic!("{}", NO_RUNTIME),
        }
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        JoinHandle::new(self.executor.spawn(future))
    }

    /// Runs `future` to completion on the current thread, driving every task
    /// spawned onto this runtime in the meantime.
    ///
    /// # Panics
    ///
    /// Panics if the future is left waiting with no runnable task that
    /// could ever wake it.
    pub fn block_on<F>(&self, future: F) -> F::Output
    where
        F: Future,
    {
        let _enter = self.enter();
        self.executor.block_on(future)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Configures and creates a [`Runtime`].
///
/// ```
/// let rt = turnstile::Runtime::builder()
///     .polls_per_tick(16)
///     .task_capacity(8)
///     .build()
///     .unwrap();
///
/// assert_eq!(rt.block_on(async { 1 }), 1);
/// ```
#[derive(Debug, Clone)]
pub struct Builder {
    polls_per_tick: usize,
    task_capacity: usize,
}

impl Builder {
    pub fn new() -> Self {
        Self {
            polls_per_tick: POLLS_PER_TICK,
            task_capacity: INITIAL_TASKS,
        }
    }

    /// How many spawned tasks are polled before the `block_on` future is
    /// checked again. Defaults to 61.
    pub fn polls_per_tick(mut self, n: usize) -> Self {
        self.polls_per_tick = n;
        self
    }

    /// The initial capacity of the run queue. Defaults to 64.
    pub fn task_capacity(mut self, n: usize) -> Self {
        self.task_capacity = n;
        self
    }

    pub fn build(self) -> Result<Runtime, BuildError> {
        if self.polls_per_tick == 0 {
            return Err(BuildError::ZeroPollsPerTick);
        }

        Ok(Runtime {
            executor: Executor::new(self.polls_per_tick, self.task_capacity),
        })
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

/// Error returned by [`Builder::build`] for an unusable configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("`polls_per_tick` must be greater than zero")]
    ZeroPollsPerTick,
}
