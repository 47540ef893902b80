//! Unit tests for ScriptError and ErrorKind

use script_types::{ErrorKind, ScriptError, SourcePosition};

#[test]
fn error_kind_display_names() {
    assert_eq!(ErrorKind::SyntaxError.to_string(), "SyntaxError");
    assert_eq!(ErrorKind::TypeMismatch.to_string(), "TypeMismatch");
    assert_eq!(ErrorKind::ScriptRuntimeError.to_string(), "ScriptRuntimeError");
    assert_eq!(ErrorKind::RoundInterrupted.to_string(), "RoundInterrupted");
    assert_eq!(ErrorKind::ContextClosed.to_string(), "ContextClosed");
}

#[test]
fn script_error_keeps_position() {
    let error = ScriptError::new(ErrorKind::SyntaxError, "unexpected token")
        .with_position(SourcePosition::new(1, 4));
    assert_eq!(error.position, Some(SourcePosition::new(1, 4)));
    assert_eq!(
        error.to_string(),
        "SyntaxError: unexpected token (line 1, column 4)"
    );
}

#[test]
fn script_error_is_std_error() {
    let error: Box<dyn std::error::Error> = Box::new(ScriptError::runtime("boom"));
    assert_eq!(error.to_string(), "ScriptRuntimeError: boom");
}
