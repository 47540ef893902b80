//! Unit tests for Callback

use super::support::ready_context;
use parking_lot::Mutex;
use script_context::{Callback, Task};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

type Slot = Arc<Mutex<Option<Callback<(i64,)>>>>;

fn context_with_listener(slot: &Slot, seen: &Arc<Mutex<Vec<i64>>>) -> script_context::Context {
    let slot = Arc::clone(slot);
    let seen = Arc::clone(seen);
    ready_context(200, move |isolate| {
        isolate.bind_fn("listen", move |f: Callback<(i64,)>| {
            *slot.lock() = Some(f);
        })?;
        isolate.bind_fn("record", move |n: i64| seen.lock().push(n))?;
        isolate.run("listen(|v| record(v * 2));")
    })
}

#[test]
fn callback_invoked_from_another_thread_runs_next_round() {
    let slot: Slot = Arc::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let context = context_with_listener(&slot, &seen);

    let callback = slot.lock().clone().unwrap();
    thread::spawn(move || callback.call((21,)).unwrap())
        .join()
        .unwrap();

    thread::sleep(Duration::from_millis(20));
    assert!(seen.lock().is_empty());

    context.run_round().unwrap();
    assert_eq!(*seen.lock(), vec![42]);
}

#[test]
fn dropping_last_handle_releases_function() {
    let slot: Slot = Arc::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let context = context_with_listener(&slot, &seen);

    let count = |context: &script_context::Context| {
        let (tx, rx) = crossbeam::channel::bounded(1);
        context
            .post(Task::new(move |isolate| {
                let _ = tx.send(isolate.retained_callbacks());
                Ok(())
            }))
            .unwrap();
        context.run_round().unwrap();
        rx.recv().unwrap()
    };

    assert_eq!(count(&context), 1);
    slot.lock().take();
    // The release task runs in the same round as the counting task, ahead of it.
    assert_eq!(count(&context), 0);
}

#[test]
fn callback_outliving_context_fails_cleanly() {
    let slot: Slot = Arc::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let context = context_with_listener(&slot, &seen);
    let callback = slot.lock().take().unwrap();
    drop(context);
    assert!(callback.call((1,)).is_err());
}

#[test]
fn releasing_a_callback_is_not_counted_as_a_task() {
    let slot: Slot = Arc::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let context = context_with_listener(&slot, &seen);

    slot.lock().take();
    assert_eq!(context.pending_tasks(), 1);
    let report = context.run_round().unwrap();
    assert_eq!(report.tasks_run, 0);
    assert_eq!(context.pending_tasks(), 0);
}
