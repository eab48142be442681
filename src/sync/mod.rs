//! Synchronization primitives.
//!
//! Concurrent [tasks](crate::task) often need to take turns with some shared
//! resource, such as a file with a single writer or an endpoint that allows
//! one request in flight. [`Mutex`] serializes whole tasks for that purpose,
//! and [`oneshot`] carries each task's result back to whoever submitted it.
//!
//! Note that all the types in this module are `!Send`, and as such do not
//! have any multi-threaded synchronization overhead.
pub mod oneshot;

mod mutex;

pub use mutex::{Handle, Mutex};
