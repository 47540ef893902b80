//! Unit tests for Context rounds and lifecycle

use super::support::ready_context;
use crossbeam::channel;
use parking_lot::Mutex;
use script_context::{Context, ContextConfig, ContextError, RoundOutcome, Task};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn tasks_do_not_run_outside_rounds() {
    let context = ready_context(100, |isolate| isolate.run("let counter = 0;"));
    context.post_script("counter += 1;").unwrap();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(context.pending_tasks(), 1);

    let report = context.run_round().unwrap();
    assert_eq!(report.outcome, RoundOutcome::Finished);
    assert_eq!(report.tasks_run, 1);
    assert_eq!(context.pending_tasks(), 0);
}

#[test]
fn tasks_run_in_fifo_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let context = ready_context(500, |_| Ok(()));
    for i in 0..20 {
        let order = Arc::clone(&order);
        context
            .post(Task::new(move |_| {
                order.lock().push(i);
                Ok(())
            }))
            .unwrap();
    }
    context.run_round().unwrap();
    assert_eq!(*order.lock(), (0..20).collect::<Vec<_>>());
}

#[test]
fn tasks_posted_during_a_round_wait_for_the_next() {
    let context = ready_context(500, |isolate| isolate.run("let hits = 0;"));
    let handle = context.context_ref();
    context
        .post(Task::new(move |isolate| {
            handle.post(Task::script("hits += 10;")).unwrap();
            isolate.run("hits += 1;")
        }))
        .unwrap();

    let first = context.run_round().unwrap();
    assert_eq!(first.tasks_run, 1);
    assert_eq!(context.pending_tasks(), 1);

    let second = context.run_round().unwrap();
    assert_eq!(second.tasks_run, 1);
}

#[test]
fn runaway_script_is_interrupted_at_budget() {
    let context = ready_context(50, |_| Ok(()));
    context.post_script("let x = 0; loop { x += 1; }").unwrap();
    context.post_script("let after = true;").unwrap();

    let started = Instant::now();
    let report = context.run_round().unwrap();
    assert_eq!(report.outcome, RoundOutcome::Interrupted);
    assert!(started.elapsed() < Duration::from_secs(2));

    // The task after the runaway one is still queued and runs next round
    thread::sleep(Duration::from_millis(20));
    assert_eq!(context.pending_tasks(), 1);
    let next = context.run_round().unwrap();
    assert_eq!(next.outcome, RoundOutcome::Finished);
    assert_eq!(next.tasks_run, 1);
}

#[test]
fn overrunning_native_call_ends_the_round_when_it_returns() {
    let writes = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&writes);
    let context = ready_context(20, move |isolate| {
        isolate.bind_fn("slow_thrust", move || {
            thread::sleep(Duration::from_millis(300));
            sink.fetch_add(1, Ordering::SeqCst);
        })?;
        Ok(())
    });
    context.post_script("slow_thrust(); slow_thrust();").unwrap();

    let started = Instant::now();
    let report = context.run_round().unwrap();
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(report.outcome, RoundOutcome::Interrupted);
    assert_eq!(writes.load(Ordering::SeqCst), 1);

    // Nothing from the cut-off task runs after its round was reported
    thread::sleep(Duration::from_millis(400));
    assert_eq!(writes.load(Ordering::SeqCst), 1);

    context.post_script("let after = 1;").unwrap();
    let next = context.run_round().unwrap();
    assert_eq!(next.outcome, RoundOutcome::Finished);
    assert_eq!(next.tasks_run, 1);
}

#[test]
fn errors_do_not_stop_the_round() {
    let context = ready_context(200, |_| Ok(()));
    context.post_script("throw 1;").unwrap();
    context.post_script("let = ;").unwrap();
    context.post_script("let fine = 1;").unwrap();
    let report = context.run_round().unwrap();
    assert_eq!(report.tasks_run, 3);
    assert_eq!(report.script_errors, 2);
}

#[test]
fn init_failure_is_reported_and_closes_context() {
    let (context, init) =
        Context::spawn(ContextConfig::new(), |isolate| isolate.run("this is not a script"))
            .unwrap();
    assert!(matches!(init.wait(), Err(ContextError::Initialization { .. })));
    assert!(context.is_closed());
    assert!(matches!(
        context.post_script("1"),
        Err(ContextError::Closed(_))
    ));
    let (tx, _rx) = channel::bounded(1);
    assert!(matches!(context.start_round(tx), Err(ContextError::Closed(_))));
}

#[test]
fn dropping_context_stops_runaway_script() {
    let context = ready_context(10_000, |_| Ok(()));
    context.post_script("let spin = 0; loop { spin += 1; }").unwrap();
    let (tx, rx) = channel::bounded(1);
    context.start_round(tx).unwrap();
    thread::sleep(Duration::from_millis(30));

    let weak = context.downgrade();
    let started = Instant::now();
    drop(context);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(weak.upgrade().is_none());

    let report = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(report.outcome, RoundOutcome::Interrupted);
}

#[test]
fn context_ref_does_not_keep_context_alive() {
    let context = ready_context(100, |_| Ok(()));
    let reference = context.context_ref();
    assert!(reference.is_alive());
    drop(context);
    assert!(!reference.is_alive());
    assert!(matches!(
        reference.post(Task::script("1")),
        Err(ContextError::Closed(_))
    ));
}

#[test]
fn contexts_compare_by_identity() {
    let a = ready_context(100, |_| Ok(()));
    let b = ready_context(100, |_| Ok(()));
    assert_eq!(a, a.clone());
    assert_ne!(a, b);
    assert_ne!(a.id(), b.id());
}
