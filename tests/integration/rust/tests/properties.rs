//! Scheduling and marshaling properties under concurrent load

use integration_tests::pool_with_workers;
use parking_lot::Mutex;
use script_context::{Callback, RoundOutcome, Task};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Test: Tasks posted before the first round run in posting order
#[test]
fn test_fifo_order_before_first_round() {
    let pool = pool_with_workers(2);
    let order = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&order);
    let context = pool
        .new_context(Duration::from_millis(500), move |isolate| {
            isolate.bind_fn("mark", move |n: i64| sink.lock().push(n))?;
            Ok(())
        })
        .expect("context should spawn");

    for i in 0..50 {
        context
            .post_script(format!("mark({});", i))
            .expect("post should succeed");
    }
    pool.update_all().expect("tick should complete");

    assert_eq!(*order.lock(), (0..50).collect::<Vec<i64>>());
}

/// Test: Rounds of one context never overlap, even with many workers
/// and tasks posted from several threads
#[test]
fn test_rounds_never_overlap() {
    let pool = pool_with_workers(4);
    let spans: Arc<Mutex<Vec<(Instant, Instant)>>> = Arc::default();
    let active = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));

    let contexts: Vec<_> = (0..6)
        .map(|_| {
            pool.new_context(Duration::from_millis(20), |_| Ok(()))
                .expect("context should spawn")
        })
        .collect();
    let watched = contexts[0].clone();

    let posters: Vec<_> = (0..3)
        .map(|_| {
            let target = watched.clone();
            let spans = Arc::clone(&spans);
            let active = Arc::clone(&active);
            let overlaps = Arc::clone(&overlaps);
            thread::spawn(move || {
                for _ in 0..20 {
                    let spans = Arc::clone(&spans);
                    let active = Arc::clone(&active);
                    let overlaps = Arc::clone(&overlaps);
                    let _ = target.post(Task::new(move |_| {
                        if active.fetch_add(1, Ordering::SeqCst) != 0 {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        let start = Instant::now();
                        thread::sleep(Duration::from_millis(1));
                        spans.lock().push((start, Instant::now()));
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    }));
                    thread::sleep(Duration::from_millis(1));
                }
            })
        })
        .collect();

    let mut ticks = 0;
    while ticks < 200 && (watched.pending_tasks() > 0 || spans.lock().len() < 60) {
        let tick = pool.update_all().expect("tick should complete");
        assert!(tick.rounds.iter().filter(|r| r.context == watched.id()).count() <= 1);
        ticks += 1;
    }
    for poster in posters {
        poster.join().expect("poster finished");
    }

    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    let mut spans = spans.lock().clone();
    spans.sort();
    for pair in spans.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "task spans overlap");
    }
    drop(contexts);
}

/// Test: Update latency stays within a small multiple of the budget
#[test]
fn test_tick_latency_is_bounded_by_budget() {
    let pool = pool_with_workers(2);
    let budget = Duration::from_millis(30);
    let contexts: Vec<_> = (0..4)
        .map(|_| pool.new_context(budget, |_| Ok(())).expect("context should spawn"))
        .collect();
    for context in &contexts {
        context
            .post_script("let spin = 0; loop { spin += 1; }")
            .expect("post should succeed");
    }

    let started = Instant::now();
    let tick = pool.update_all().expect("tick should complete");
    let elapsed = started.elapsed();

    assert_eq!(tick.interrupted().count(), 4);
    // ceil(4 / 2) rounds per worker, each cut at the budget
    assert!(elapsed < budget * 2 + Duration::from_millis(500), "tick took {:?}", elapsed);
}

/// Test: World writes made by a round are all visible once update_all
/// returns, even when a native call overruns the budget
#[test]
fn test_update_all_waits_for_overrunning_native_call() {
    let pool = pool_with_workers(1);
    let writes = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&writes);
    let ship = pool
        .new_context(Duration::from_millis(20), move |isolate| {
            isolate.bind_fn("slow_thrust", move || {
                thread::sleep(Duration::from_millis(300));
                sink.fetch_add(1, Ordering::SeqCst);
            })?;
            Ok(())
        })
        .expect("context should spawn");
    ship.post_script("slow_thrust(); slow_thrust();")
        .expect("post should succeed");

    let tick = pool.update_all().expect("tick should complete");
    let at_return = writes.load(Ordering::SeqCst);
    assert_eq!(
        tick.round_for(ship.id()).expect("ship ran").outcome,
        RoundOutcome::Interrupted
    );
    assert!(tick.stalled.is_empty());
    assert_eq!(at_return, 1);

    thread::sleep(Duration::from_millis(400));
    assert_eq!(writes.load(Ordering::SeqCst), at_return);

    // The next round starts fresh rather than inheriting the spent budget
    ship.post_script("let after = 1;").expect("post should succeed");
    let next = pool.update_all().expect("tick should complete");
    let round = next.round_for(ship.id()).expect("ship ran again");
    assert_eq!(round.outcome, RoundOutcome::Finished);
    assert_eq!(round.tasks_run, 1);
}

/// Test: Script functions invoked from native threads run on the context
/// thread
#[test]
fn test_callbacks_run_on_owning_thread() {
    let pool = pool_with_workers(2);
    let threads = Arc::new(Mutex::new(Vec::new()));
    let listener: Arc<Mutex<Option<Callback>>> = Arc::default();

    let seen = Arc::clone(&threads);
    let slot = Arc::clone(&listener);
    let context = pool
        .new_context(Duration::from_millis(100), move |isolate| {
            isolate.bind_fn("whoami", move || {
                let name = thread::current().name().unwrap_or("").to_string();
                seen.lock().push(name);
            })?;
            isolate.bind_fn("listen", move |f: Callback| {
                *slot.lock() = Some(f);
            })?;
            isolate.run("listen(|| whoami());")
        })
        .expect("context should spawn");
    pool.update_all().expect("tick should complete");

    let callback = listener.lock().clone().expect("script registered a listener");
    let callers: Vec<_> = (0..3)
        .map(|_| {
            let callback = callback.clone();
            thread::Builder::new()
                .name("native-caller".into())
                .spawn(move || callback.call(()).expect("context is alive"))
                .expect("thread spawns")
        })
        .collect();
    for caller in callers {
        caller.join().expect("caller finished");
    }
    pool.update_all().expect("tick should complete");

    let names = threads.lock().clone();
    assert_eq!(names.len(), 3);
    let expected = context.name().to_string();
    assert!(names.iter().all(|n| *n == expected), "ran on {:?}", names);
    assert!(expected.starts_with("ctx-"));
}

/// Test: A type mismatch on one argument aborts the call before native code
/// runs and leaves later conversions intact
#[test]
fn test_type_mismatch_skips_native_call() {
    let pool = pool_with_workers(1);
    let calls = Arc::new(AtomicUsize::new(0));
    let results = Arc::new(Mutex::new(Vec::new()));

    let counter = Arc::clone(&calls);
    let sink = Arc::clone(&results);
    let context = pool
        .new_context(Duration::from_millis(100), move |isolate| {
            isolate.bind_fn("add", move |a: i64, b: i64| {
                counter.fetch_add(1, Ordering::SeqCst);
                a + b
            })?;
            isolate.bind_fn("emit", move |n: i64| sink.lock().push(n))?;
            Ok(())
        })
        .expect("context should spawn");

    context
        .post_script(r#"try { emit(add("x", 1)); } catch (e) { emit(-1); }"#)
        .expect("post should succeed");
    context
        .post_script(r#"add(1, "y");"#)
        .expect("post should succeed");
    context
        .post_script("emit(add(20, 22));")
        .expect("post should succeed");

    let tick = pool.update_all().expect("tick should complete");
    let round = tick.round_for(context.id()).expect("context got a round");
    assert_eq!(round.outcome, RoundOutcome::Finished);
    assert_eq!(round.script_errors, 1);
    assert_eq!(*results.lock(), vec![-1, 42]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
