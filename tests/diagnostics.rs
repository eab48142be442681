use turnstile::sync::Mutex;
use turnstile::task::yield_now;

use std::cell::RefCell;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use log::{Level, LevelFilter, Log, Metadata, Record};

// Records are kept per thread; every test drives its runtime on its own
// test thread.
struct Capture;

thread_local! {
    static RECORDS: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
}

impl Log for Capture {
    fn enabled(&self, _: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        RECORDS.with(|records| {
            records
                .borrow_mut()
                .push((record.level(), record.args().to_string()))
        });
    }

    fn flush(&self) {}
}

static LOGGER: Capture = Capture;

fn capture() {
    // only the first test to get here installs it
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(LevelFilter::Trace);
    RECORDS.with(|records| records.borrow_mut().clear());
}

fn errors() -> Vec<String> {
    RECORDS.with(|records| {
        records
            .borrow()
            .iter()
            .filter(|(level, _)| *level == Level::Error)
            .map(|(_, message)| message.clone())
            .collect()
    })
}

#[test]
fn task_failures_are_not_invariant_violations() {
    capture();

    turnstile::block_on(async {
        let mutex = Mutex::new();

        let failed = mutex.submit(|| async {
            yield_now().await;
            Err::<(), _>("failed")
        });
        let panicked = mutex.submit(|| async {
            if true {
                panic!("panicked");
            }
            Ok::<(), &str>(())
        });
        let fine = mutex.submit(|| async { Ok::<_, &str>(()) });

        assert_eq!(failed.await, Err("failed"));
        assert!(AssertUnwindSafe(panicked).catch_unwind().await.is_err());
        assert_eq!(fine.await, Ok(()));
    });

    assert!(errors().is_empty(), "unexpected errors: {:?}", errors());
}

#[test]
fn drain_cycles_are_traced() {
    capture();

    turnstile::block_on(async {
        let mutex = Mutex::new();
        mutex.submit(|| async { Ok::<_, ()>(()) }).await.unwrap();
    });

    let traces = RECORDS.with(|records| {
        records
            .borrow()
            .iter()
            .filter(|(level, _)| *level == Level::Trace)
            .count()
    });
    assert_eq!(traces, 2);
}

#[test]
fn panicking_observer_is_reported() {
    capture();

    turnstile::block_on(async {
        let mutex = Mutex::new().with_observer(|locked| {
            if locked {
                panic!("observer exploded");
            }
        });

        let handle = mutex.submit(|| async { Ok::<_, ()>(5) });
        assert!(mutex.is_locked());
        assert_eq!(handle.await, Ok(5));

        // the lock was still released
        assert!(!mutex.is_locked());
        assert_eq!(mutex.submit(|| async { Ok::<_, ()>(6) }).await, Ok(6));
    });

    let errors = errors();
    assert_eq!(errors.len(), 2);
    assert!(errors
        .iter()
        .all(|e| e.contains("observer panicked on locked = true: observer exploded")));
}

#[test]
fn observer_panicking_on_unlock_does_not_wedge_the_mutex() {
    capture();

    turnstile::block_on(async {
        let mutex = Mutex::new().with_observer(|locked| {
            if !locked {
                panic!("unlock exploded");
            }
        });

        assert_eq!(mutex.submit(|| async { Ok::<_, ()>(1) }).await, Ok(1));
        assert!(!mutex.is_locked());
        assert!(mutex
            .submit_if_free(|| async { Ok::<_, ()>(2) })
            .is_some());
    });

    assert!(errors()[0].contains("observer panicked on locked = false: unlock exploded"));
}
