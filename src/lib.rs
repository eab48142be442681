//! A FIFO task mutex for single-threaded cooperative async code.
//!
//! [`sync::Mutex`] runs the tasks submitted to it one at a time, in
//! submission order, on a small single-threaded [`Runtime`]. Callers either
//! queue up and await their turn, or skip the work when the mutex is busy.
//!
//! ```
//! use turnstile::sync::Mutex;
//!
//! turnstile::block_on(async {
//!     let mutex = Mutex::new().with_observer(|busy| println!("busy: {}", busy));
//!
//!     let handles: Vec<_> = (0..3)
//!         .map(|i| mutex.submit(move || async move { Ok::<_, ()>(i * 2) }))
//!         .collect();
//!
//!     for (i, handle) in handles.into_iter().enumerate() {
//!         assert_eq!(handle.await, Ok(i * 2));
//!     }
//! });
//! ```
pub mod runtime;
pub mod sync;
pub mod task;

mod util;

pub use runtime::Runtime;
pub use task::spawn;

use std::future::Future;

/// Runs `future` to completion on a fresh [`Runtime`].
pub fn block_on<F>(future: F) -> F::Output
where
    F: Future,
{
    Runtime::new().block_on(future)
}
