//! Unit tests for script_context

mod binding_test;
mod callback_test;
mod context_test;
mod isolate_test;
mod support;
