//! Unit tests for native bindings

use super::support::on_isolate;
use parking_lot::Mutex;
use script_context::ErrorKind;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn bound_function_returns_to_script() {
    let value = on_isolate(|isolate| {
        isolate.bind_fn("add", |a: i64, b: i64| a + b)?;
        isolate.eval::<i64>("add(2, 3)")
    });
    assert_eq!(value, Ok(5));
}

#[test]
fn mismatched_argument_is_catchable_and_skips_native_call() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let value = on_isolate(move |isolate| {
        isolate.bind_fn("add", move |a: i64, b: i64| {
            counter.fetch_add(1, Ordering::SeqCst);
            a + b
        })?;
        isolate.eval::<i64>(
            r#"
            let r = 0;
            try { r = add("x", 1); } catch (e) { r = -1; }
            r
            "#,
        )
    });
    assert_eq!(value, Ok(-1));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn uncaught_mismatch_surfaces_as_type_mismatch() {
    let err = on_isolate(|isolate| {
        isolate.bind_fn("add", |a: i64, b: i64| a + b)?;
        isolate.run(r#"add(1, "2");"#)
    })
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeMismatch);
    assert!(err.message.contains("argument 1 of `add`"));
}

#[test]
fn out_of_range_argument_is_rejected() {
    let err = on_isolate(|isolate| {
        isolate.bind_fn("slot", |n: u8| n)?;
        isolate.run("slot(1000);")
    })
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeMismatch);
}

#[test]
fn native_error_becomes_script_error() {
    let err = on_isolate(|isolate| {
        isolate.bind_fn("withdraw", |n: i64| -> Result<i64, String> {
            if n > 10 {
                Err(format!("insufficient funds for {}", n))
            } else {
                Ok(10 - n)
            }
        })?;
        isolate.run("withdraw(50);")
    })
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ScriptRuntimeError);
    assert!(err.message.contains("insufficient funds for 50"));
}

#[test]
fn native_error_points_at_the_call() {
    let err = on_isolate(|isolate| {
        isolate.bind_fn("eject", || -> Result<(), String> { Err("hatch jammed".into()) })?;
        isolate.run("let fuel = 3;\nfuel -= 1;\neject();")
    })
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ScriptRuntimeError);
    assert_eq!(err.position.map(|p| p.line), Some(3));
}

#[test]
fn method_binding_mutates_shared_receiver() {
    struct Ledger {
        entries: Vec<String>,
    }

    let ledger = Arc::new(Mutex::new(Ledger { entries: Vec::new() }));
    let receiver = Arc::clone(&ledger);
    let count = on_isolate(move |isolate| {
        isolate.bind_method("note", receiver, |l: &mut Ledger, text: String| {
            l.entries.push(text);
            l.entries.len()
        })?;
        isolate.eval::<i64>(r#"note("mined"); note("moved")"#)
    });
    assert_eq!(count, Ok(2));
    assert_eq!(ledger.lock().entries, vec!["mined", "moved"]);
}

#[test]
fn optional_and_vector_arguments() {
    let value = on_isolate(|isolate| {
        isolate.bind_fn("sum", |xs: Vec<i64>, bonus: Option<i64>| {
            xs.iter().sum::<i64>() + bonus.unwrap_or(0)
        })?;
        isolate.eval::<i64>("sum([1, 2, 3], ()) + sum([4], 10)")
    });
    assert_eq!(value, Ok(20));
}
