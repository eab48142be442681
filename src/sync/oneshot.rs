//! A channel for sending a single message between tasks.
//!
//! This is the completion signal behind every mutex [`Handle`]: the drain
//! loop holds the [`Sender`] for each queued task and fulfils it exactly
//! once, after the task has run.
//!
//! # Examples
//!
//! ```
//! use turnstile::sync::oneshot;
//!
//! # turnstile::block_on(async {
//! let (tx, rx) = oneshot::channel();
//!
//! turnstile::spawn(async move {
//!     if let Err(_) = tx.send("hello") {
//!         panic!("receiver dropped");
//!     }
//! });
//!
//! match rx.await {
//!     Ok(msg) => println!("{}", msg),
//!     Err(_) => panic!("sender dropped"),
//! }
//! # });
//! ```
//!
//! [`Handle`]: crate::sync::Handle
use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// Creates a new oneshot channel.
pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
    let inner = Rc::new(Shared {
        complete: Cell::new(false),
        message: Cell::new(None),
        receiver: Cell::new(None),
    });

    (Sender(inner.clone()), Receiver(inner))
}

/// The sender half of a oneshot channel.
pub struct Sender<T>(Rc<Shared<T>>);

/// The receiver half of a oneshot channel.
pub struct Receiver<T>(Rc<Shared<T>>);

struct Shared<T> {
    complete: Cell<bool>,
    message: Cell<Option<T>>,
    receiver: Cell<Option<Waker>>,
}

impl<T> Sender<T> {
    /// Send a message on this channel.
    ///
    /// If the receiver was already dropped or closed, the message is
    /// returned as an error.
    pub fn send(self, message: T) -> Result<(), T> {
        if self.0.complete.get() {
            Err(message)
        } else {
            self.0.message.set(Some(message));
            // dropping `self` completes the channel and wakes the receiver
            Ok(())
        }
    }

    /// Returns true if the associated [`Receiver`] has been dropped or closed.
    pub fn is_closed(&self) -> bool {
        self.0.complete.get()
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        self.0.complete.set(true);
        if let Some(waker) = self.0.receiver.take() {
            waker.wake();
        }
    }
}

impl<T> Receiver<T> {
    /// Close this oneshot channel.
    ///
    /// After this method is called any attempts to [`send`](Sender::send)
    /// a message on this channel will fail.
    pub fn close(&mut self) {
        self.0.complete.set(true);
    }

    /// Attempts to receive a message.
    ///
    /// The current task is *not* scheduled to be woken up
    /// if no message is available.
    pub fn try_recv(&mut self) -> Result<Option<T>, Closed> {
        if self.0.complete.get() {
            match self.0.message.take() {
                Some(message) => Ok(Some(message)),
                None => Err(Closed),
            }
        } else {
            Ok(None)
        }
    }
}

impl<T> Future for Receiver<T> {
    type Output = Result<T, Closed>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<T, Closed>> {
        if self.0.complete.get() {
            match self.0.message.take() {
                Some(message) => Poll::Ready(Ok(message)),
                None => Poll::Ready(Err(Closed)),
            }
        } else {
            self.0.receiver.set(Some(cx.waker().clone()));
            Poll::Pending
        }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        self.0.complete.set(true);
        self.0.receiver.take();
        self.0.message.take();
    }
}

/// Error returned by a [`Receiver`] if the channel has been closed
/// (i.e: the associated sender was dropped without sending).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("oneshot channel closed")]
pub struct Closed;
