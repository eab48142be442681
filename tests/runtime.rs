use turnstile::runtime::BuildError;
use turnstile::task::yield_now;
use turnstile::Runtime;

use std::cell::Cell;
use std::panic::AssertUnwindSafe;
use std::rc::Rc;

#[test]
fn it_works() {
    turnstile::block_on(async move {
        let mut handles = Vec::with_capacity(100);

        let x = Rc::new(Cell::new(0));

        for _ in 0..100 {
            let x = x.clone();
            let h = turnstile::spawn(async move {
                yield_now().await;
                let val = x.get();
                x.set(x.get() + 1);
                val
            });
            handles.push(h);
        }

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await, i);
        }
    });
}

#[test]
fn spawn_from_a_spawned_task() {
    turnstile::block_on(async {
        let outer = turnstile::spawn(async {
            let inner = turnstile::spawn(async { 2 });
            inner.await * 3
        });

        assert_eq!(outer.await, 6);
    });
}

#[test]
fn cancel() {
    turnstile::block_on(async {
        let ran = Rc::new(Cell::new(false));

        let task = turnstile::spawn({
            let ran = ran.clone();
            async move { ran.set(true) }
        });

        // we haven't had a chance to start running tasks yet
        assert_eq!(task.cancel(), None);

        let task = turnstile::spawn(async { 1 });

        // let the runtime execute tasks
        yield_now().await;

        // the task had completed
        assert_eq!(task.cancel(), Some(1));
        assert!(!ran.get());
    });
}

#[test]
fn builder() {
    let rt = Runtime::builder()
        .polls_per_tick(1)
        .task_capacity(4)
        .build()
        .unwrap();

    let total = rt.block_on(async {
        let handles: Vec<_> = (0..10).map(|i| turnstile::spawn(async move { i })).collect();

        let mut total = 0;
        for handle in handles {
            total += handle.await;
        }
        total
    });

    assert_eq!(total, 45);
}

#[test]
fn builder_rejects_zero_polls_per_tick() {
    let err = Runtime::builder().polls_per_tick(0).build().err();
    assert_eq!(err, Some(BuildError::ZeroPollsPerTick));
    assert_eq!(
        BuildError::ZeroPollsPerTick.to_string(),
        "`polls_per_tick` must be greater than zero"
    );
}

#[test]
fn runtime_is_reusable() {
    let rt = Runtime::new();

    assert_eq!(rt.block_on(async { 1 }), 1);

    let handle = rt.spawn(async { 2 });
    assert_eq!(rt.block_on(handle), 2);
}

#[test]
fn dropping_the_runtime_drops_waiting_tasks() {
    let marker = Rc::new(());

    let handle = turnstile::block_on({
        let marker = marker.clone();
        async move {
            let handle = turnstile::spawn(async move {
                let _marker = marker;
                std::future::pending::<()>().await;
            });
            yield_now().await;
            handle
        }
    });

    assert_eq!(Rc::strong_count(&marker), 1);

    let result = std::panic::catch_unwind(AssertUnwindSafe(|| turnstile::block_on(handle)));
    assert!(result.is_err());
}

#[test]
#[should_panic(expected = "there is no runtime running")]
fn spawn_outside_runtime() {
    let _ = turnstile::spawn(async {});
}

#[test]
#[should_panic(expected = "no tasks are runnable")]
fn block_on_a_future_nothing_can_wake() {
    turnstile::block_on(std::future::pending::<()>());
}
