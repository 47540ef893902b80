//! Unit tests for Isolate

use super::support::{on_isolate, ready_context};
use parking_lot::Mutex;
use script_context::{Dynamic, ErrorKind, MicroTask, ScriptError, Task};
use std::sync::Arc;

#[test]
fn globals_persist_between_runs() {
    let value = on_isolate(|isolate| {
        isolate.run("let a = 40;")?;
        isolate.eval::<i64>("a + 2")
    });
    assert_eq!(value, Ok(42));
}

#[test]
fn script_functions_persist_between_runs() {
    let value = on_isolate(|isolate| {
        isolate.run("fn double(x) { x * 2 }")?;
        isolate.call_fn::<i64>("double", vec![Dynamic::from_int(21)])
    });
    assert_eq!(value, Ok(42));
}

#[test]
fn syntax_error_carries_position() {
    let err = on_isolate(|isolate| isolate.run("let = ;")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::SyntaxError);
    assert!(err.position.is_some());
}

#[test]
fn thrown_value_is_runtime_error() {
    let err = on_isolate(|isolate| isolate.run(r#"throw "no fuel";"#)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ScriptRuntimeError);
    assert!(err.message.contains("no fuel"));
}

#[test]
fn eval_result_is_converted() {
    let err = on_isolate(|isolate| isolate.eval::<i64>(r#""seven""#)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeMismatch);
}

#[test]
fn reset_forgets_script_state() {
    let result: Result<i64, ScriptError> = on_isolate(|isolate| {
        isolate.run("let a = 1; fn f() { 2 }")?;
        isolate.reset();
        isolate.eval::<i64>("a")
    });
    assert_eq!(result.unwrap_err().kind, ErrorKind::ScriptRuntimeError);
}

#[test]
fn reset_keeps_native_bindings() {
    let value = on_isolate(|isolate| {
        isolate.bind_fn("seven", || 7i64)?;
        isolate.reset();
        isolate.eval::<i64>("seven()")
    });
    assert_eq!(value, Ok(7));
}

#[test]
fn deferred_functions_run_after_the_task() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    on_isolate(move |isolate| {
        isolate.bind_fn("record", move |n: i64| sink.lock().push(n))?;
        isolate.run("defer(|| record(2)); record(1);")
    })
    .unwrap();
    // The round that ran the task has ended, so its microtasks have drained.
    assert_eq!(*log.lock(), vec![1, 2]);
}

#[test]
fn native_microtasks_run_before_the_next_task() {
    let context = ready_context(1_000, |_| Ok(()));
    let log = Arc::new(Mutex::new(Vec::new()));

    let first = Arc::clone(&log);
    context
        .post(Task::new(move |isolate| {
            let later = Arc::clone(&first);
            isolate.enqueue_microtask(MicroTask::new(move |_| {
                later.lock().push("microtask");
                Ok(())
            }));
            first.lock().push("task 1");
            Ok(())
        }))
        .unwrap();
    let second = Arc::clone(&log);
    context
        .post(Task::new(move |_| {
            second.lock().push("task 2");
            Ok(())
        }))
        .unwrap();

    let report = context.run_round().unwrap();
    assert_eq!(*log.lock(), vec!["task 1", "microtask", "task 2"]);
    assert_eq!(report.tasks_run, 3);
}
