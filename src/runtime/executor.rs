use crate::util;

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::mem::{self, ManuallyDrop};
use std::pin::{pin, Pin};
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};
use std::thread::{self, ThreadId};

use slab::Slab;

pub(crate) struct Executor {
    shared: Rc<Shared>,
}

impl Clone for Executor {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

struct Shared {
    queue: RefCell<VecDeque<Task>>,
    // every task that has not completed yet, runnable or not
    tasks: RefCell<Slab<Rc<dyn RawTask>>>,
    woke: Cell<bool>,
    created_on: ThreadId,
    polls_per_tick: usize,
}

impl Executor {
    pub fn new(polls_per_tick: usize, capacity: usize) -> Self {
        Executor {
            shared: Rc::new(Shared {
                queue: RefCell::new(VecDeque::with_capacity(capacity)),
                tasks: RefCell::new(Slab::with_capacity(capacity)),
                woke: Cell::new(false),
                created_on: thread::current().id(),
                polls_per_tick,
            }),
        }
    }

    pub fn spawn<F>(&self, future: F) -> Task
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let mut tasks = self.shared.tasks.borrow_mut();
        let entry = tasks.vacant_entry();

        let raw = Rc::new(TaskRepr {
            executor: Rc::downgrade(&self.shared),
            key: entry.key(),
            created_on: self.shared.created_on,
            awaiter: Cell::new(None),
            state: Cell::new(State::Scheduled),
            payload: RefCell::new(Payload::Future(Box::pin(future))),
        });

        entry.insert(raw.clone());
        drop(tasks);

        let task = Task { raw };
        self.shared.queue.borrow_mut().push_back(task.clone());

        task
    }

    pub fn block_on<F>(&self, future: F) -> F::Output
    where
        F: Future,
    {
        let waker = self.shared.clone().into_waker();
        let mut future = pin!(future);
        let mut cx = Context::from_waker(&waker);

        // make sure the main future is polled
        // on the first iteration
        self.shared.woke.set(true);

        loop {
            if self.shared.woke.replace(false) {
                if let Poll::Ready(val) = future.as_mut().poll(&mut cx) {
                    return val;
                }
            }

            // the main future woke itself, so it waits behind a full tick
            let yielded = self.shared.woke.get();

            let mut ran = 0;
            for _ in 0..self.shared.polls_per_tick {
                let task = self.shared.queue.borrow_mut().pop_front();

                match task {
                    Some(task) => task.raw.run(),
                    None => break,
                }
                ran += 1;

                // polling this task woke up the main future
                if !yielded && self.shared.woke.get() {
                    break;
                }
            }

            // there is no reactor to park on: with nothing runnable
            // and the main future asleep, nothing can ever wake it
            if ran == 0 && !self.shared.woke.get() {
                panic!("`block_on` future can never complete: no tasks are runnable");
            }
        }
    }
}

// Tasks parked on a waker held somewhere else are not in the run queue, so
// they are found through the registry. Wakers only hold a `Weak` reference
// to the executor, which is already dead here, so nothing dropped below can
// reschedule itself.
impl Drop for Shared {
    fn drop(&mut self) {
        self.queue.get_mut().clear();

        for task in self.tasks.get_mut().drain() {
            task.shutdown();
        }
    }
}

unsafe impl RcWake for Shared {
    fn wake(self: Rc<Self>) {
        self.woke.set(true)
    }

    fn created_on(&self) -> ThreadId {
        self.created_on
    }
}

trait RawTask {
    fn run(self: Rc<Self>);
    fn poll_output(&self, cx: &mut Context<'_>, out: &mut dyn Any);
    fn cancel(&self, out: &mut dyn Any);
    fn shutdown(&self);
}

#[derive(Clone)]
pub(crate) struct Task {
    raw: Rc<dyn RawTask>,
}

impl Task {
    /// `T` must be the output type of the spawned future.
    pub fn poll<T: 'static>(&self, cx: &mut Context<'_>) -> Poll<T> {
        let mut out = Poll::Pending;
        self.raw.poll_output(cx, &mut out as _);
        out
    }

    /// `T` must be the output type of the spawned future.
    pub fn cancel<T: 'static>(self) -> Option<T> {
        let mut out = None;
        self.raw.cancel(&mut out as _);
        out
    }
}

struct TaskRepr<F: Future> {
    executor: Weak<Shared>,
    key: usize,
    created_on: ThreadId,
    awaiter: Cell<Option<Waker>>,
    state: Cell<State>,
    payload: RefCell<Payload<F>>,
}

enum Payload<F: Future> {
    Future(Pin<Box<F>>),
    Output(F::Output),
    Taken,
    Shutdown,
}

impl<F: Future> Payload<F> {
    fn take(&mut self) -> Self {
        mem::replace(self, Payload::Taken)
    }
}

#[derive(Copy, Clone)]
enum State {
    Scheduled,
    Idle,
    Done,
}

impl<F> RawTask for TaskRepr<F>
where
    F: Future + 'static,
{
    fn poll_output(&self, cx: &mut Context<'_>, out: &mut dyn Any) {
        let mut payload = self.payload.borrow_mut();
        match *payload {
            Payload::Output(_) => {
                if let (Payload::Output(val), Some(out)) =
                    (payload.take(), out.downcast_mut::<Poll<F::Output>>())
                {
                    *out = Poll::Ready(val);
                }
            }
            Payload::Taken => panic!("`JoinHandle` polled after completion"),
            Payload::Shutdown => {
                panic!("task was dropped before completing, its runtime was shut down")
            }
            Payload::Future(_) => self.awaiter.set(Some(cx.waker().clone())),
        }
    }

    fn run(self: Rc<Self>) {
        if let State::Done = self.state.get() {
            return;
        }

        let waker = self.clone().into_waker();
        let mut cx = Context::from_waker(&waker);

        self.state.set(State::Idle);

        let done = {
            let mut payload = self.payload.borrow_mut();
            match *payload {
                Payload::Future(ref mut future) => match future.as_mut().poll(&mut cx) {
                    Poll::Ready(val) => {
                        *payload = Payload::Output(val);
                        true
                    }
                    Poll::Pending => false,
                },
                _ => false,
            }
        };

        if done {
            self.state.set(State::Done);
            self.deregister();
            if let Some(waker) = self.awaiter.take() {
                util::wake(waker);
            }
        }
    }

    fn cancel(&self, out: &mut dyn Any) {
        self.state.set(State::Done);
        self.deregister();
        let payload = self.payload.borrow_mut().take();

        if let (Payload::Output(val), Some(out)) = (payload, out.downcast_mut::<Option<F::Output>>())
        {
            *out = Some(val);
        }
    }

    fn shutdown(&self) {
        self.state.set(State::Done);

        // dropping the future runs arbitrary code, so no borrow is held
        let payload = mem::replace(&mut *self.payload.borrow_mut(), Payload::Shutdown);
        drop(payload);

        if let Some(waker) = self.awaiter.take() {
            util::wake(waker);
        }
    }
}

impl<F: Future> TaskRepr<F> {
    fn deregister(&self) {
        if let Some(executor) = self.executor.upgrade() {
            let task = executor.tasks.borrow_mut().try_remove(self.key);
            drop(task);
        }
    }
}

unsafe impl<F> RcWake for TaskRepr<F>
where
    F: Future + 'static,
{
    fn wake(self: Rc<Self>) {
        let executor = match self.executor.upgrade() {
            Some(executor) => executor,
            // the runtime is gone, along with everything it would have run
            None => return,
        };

        match self.state.get() {
            State::Idle => {
                self.state.set(State::Scheduled);
                executor
                    .queue
                    .borrow_mut()
                    .push_back(Task { raw: self.clone() });
            }
            State::Scheduled | State::Done => {}
        }
    }

    fn created_on(&self) -> ThreadId {
        self.created_on
    }
}

/// # Safety
///
/// `created_on` must return the id of thread that the waker was created on.
unsafe trait RcWake {
    fn wake(self: Rc<Self>);
    fn created_on(&self) -> ThreadId;

    fn into_waker(self: Rc<Self>) -> Waker
    where
        Self: Sized + 'static,
    {
        fn assert_not_sent(waker: &Rc<impl RcWake>) {
            if thread::current().id() != waker.created_on() {
                panic!("cannot use waker from outside the thread it was created on");
            }
        }

        unsafe fn clone<W: RcWake>(waker: *const ()) -> RawWaker {
            let waker = unsafe { ManuallyDrop::new(Rc::from_raw(waker as *const W)) };
            assert_not_sent(&waker);

            RawWaker::new(
                Rc::into_raw(Rc::clone(&waker)) as *const (),
                &RawWakerVTable::new(clone::<W>, wake::<W>, wake_by_ref::<W>, drop::<W>),
            )
        }

        unsafe fn wake<W: RcWake>(waker: *const ()) {
            let waker = unsafe { Rc::from_raw(waker as *const W) };
            assert_not_sent(&waker);
            W::wake(waker);
        }

        unsafe fn wake_by_ref<W: RcWake>(waker: *const ()) {
            let waker = unsafe { ManuallyDrop::new(Rc::from_raw(waker as *const W)) };
            assert_not_sent(&waker);
            W::wake(Rc::clone(&waker));
        }

        unsafe fn drop<W: RcWake>(waker: *const ()) {
            let waker = unsafe { Rc::from_raw(waker as *const W) };
            assert_not_sent(&waker);
            mem::drop(waker);
        }

        let raw = RawWaker::new(
            Rc::into_raw(self) as *const (),
            &RawWakerVTable::new(
                clone::<Self>,
                wake::<Self>,
                wake_by_ref::<Self>,
                drop::<Self>,
            ),
        );

        unsafe { Waker::from_raw(raw) }
    }
}
