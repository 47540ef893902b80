//! The script engine instance owned by one context.
//!
//! An [`Isolate`] lives on its context's thread for its entire life and is
//! only reachable through closures that run there: the init function, posted
//! [`Task`](crate::Task)s and microtasks. Nothing in it is `Send`.

use crate::binding::{self, source_position, ScriptFn, ScriptMethod};
use crate::callback::{CallbackHost, CallbackId};
use crate::config::ContextConfig;
use crate::context::ContextRef;
use crate::convert::FromScript;
use crate::round::InterruptHandle;
use crate::task_queue::{MicroTask, MicrotaskQueue};
use parking_lot::Mutex;
use rhai::{Dynamic, Engine, EvalAltResult, FnPtr, Position, Scope, AST};
use script_types::{ContextId, ErrorKind, ScriptError};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, info};

const INTERRUPT_TOKEN: &str = "round interrupted";
const TEARDOWN_TOKEN: &str = "context closed";

/// An isolated script environment: engine, globals and script-defined
/// functions.
pub struct Isolate {
    id: ContextId,
    engine: Engine,
    scope: Scope<'static>,
    functions: AST,
    host: CallbackHost,
    microtasks: Rc<RefCell<MicrotaskQueue>>,
}

impl Isolate {
    pub(crate) fn new(
        id: ContextId,
        config: &ContextConfig,
        interrupt: Arc<InterruptHandle>,
        owner: ContextRef,
    ) -> Self {
        let mut engine = Engine::new();
        if let Some(levels) = config.max_call_levels {
            engine.set_max_call_levels(levels);
        }
        if let Some(size) = config.max_string_size {
            engine.set_max_string_size(size);
        }
        engine.on_progress(move |_| {
            if interrupt.is_aborted() {
                Some(Dynamic::from(TEARDOWN_TOKEN.to_string()))
            } else if interrupt.should_stop() {
                Some(Dynamic::from(INTERRUPT_TOKEN.to_string()))
            } else {
                None
            }
        });
        engine.on_print(move |text| info!(context = %id, "{}", text));
        engine.on_debug(move |text, source, position| {
            debug!(context = %id, source = source.unwrap_or(""), ?position, "{}", text)
        });

        let mut isolate = Self {
            id,
            engine,
            scope: Scope::new(),
            functions: AST::empty(),
            host: CallbackHost::new(owner),
            microtasks: Rc::new(RefCell::new(MicrotaskQueue::new())),
        };
        isolate.install_builtins();
        isolate
    }

    fn install_builtins(&mut self) {
        let queue = Rc::clone(&self.microtasks);
        self.engine.register_fn("defer", move |function: FnPtr| {
            queue.borrow_mut().enqueue(MicroTask::new(move |isolate: &mut Isolate| {
                isolate.call_fn_ptr(&function, Vec::new()).map(|_| ())
            }));
        });
    }

    /// Id of the owning context.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Direct access to the engine, for registrations the typed binding
    /// layer does not cover.
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Global variables of the isolate.
    pub fn scope(&self) -> &Scope<'static> {
        &self.scope
    }

    /// Mutable access to the global variables.
    pub fn scope_mut(&mut self) -> &mut Scope<'static> {
        &mut self.scope
    }

    /// A weak, thread-safe reference to the owning context.
    pub fn context_ref(&self) -> ContextRef {
        self.host.owner().clone()
    }

    /// Exposes a native function to scripts under `name`.
    ///
    /// Arguments are converted with [`FromScript`] before `f` runs; a
    /// conversion failure raises a catchable type mismatch in the script.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// isolate.bind_fn("add", |a: i64, b: i64| a + b)?;
    /// ```
    pub fn bind_fn<Args, F>(&mut self, name: &str, f: F) -> Result<&mut Self, ScriptError>
    where
        F: ScriptFn<Args>,
    {
        let (arity, call) = binding::native_fn(f);
        binding::register_native(&mut self.engine, &self.host, name, arity, call)?;
        Ok(self)
    }

    /// Exposes a method of a shared native object under `name`.
    ///
    /// The receiver is locked for the duration of each call.
    pub fn bind_method<T, Args, M>(
        &mut self,
        name: &str,
        receiver: Arc<Mutex<T>>,
        method: M,
    ) -> Result<&mut Self, ScriptError>
    where
        T: 'static,
        M: ScriptMethod<T, Args>,
    {
        let (arity, call) = binding::native_method(receiver, method);
        binding::register_native(&mut self.engine, &self.host, name, arity, call)?;
        Ok(self)
    }

    /// Parses `source` without running it.
    pub fn compile(&self, source: &str) -> Result<AST, ScriptError> {
        self.engine.compile(source).map_err(|err| {
            let position = source_position(err.position());
            let error = ScriptError::new(ErrorKind::SyntaxError, err.to_string());
            match position {
                Some(position) => error.with_position(position),
                None => error,
            }
        })
    }

    /// Runs `source`, keeping its global variables and function definitions.
    pub fn run(&mut self, source: &str) -> Result<(), ScriptError> {
        self.eval::<Dynamic>(source).map(|_| ())
    }

    /// Runs `source` and converts the value of its last expression.
    pub fn eval<T: FromScript>(&mut self, source: &str) -> Result<T, ScriptError> {
        let ast = self.compile(source)?;
        let program = self.functions.merge(&ast);
        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut self.scope, &program);
        self.functions = program.clone_functions_only();
        let value = result.map_err(script_error)?;
        let site = binding::CallSite::new("eval", Position::NONE, &self.host);
        T::from_script(value, &site).map_err(ScriptError::from)
    }

    /// Calls a script-defined function by name.
    pub fn call_fn<T: FromScript>(
        &mut self,
        name: &str,
        args: Vec<Dynamic>,
    ) -> Result<T, ScriptError> {
        let value = self
            .engine
            .call_fn::<Dynamic>(&mut self.scope, &self.functions, name, args)
            .map_err(script_error)?;
        let site = binding::CallSite::new(name, Position::NONE, &self.host);
        T::from_script(value, &site).map_err(ScriptError::from)
    }

    /// Invokes a retained script function.
    pub fn invoke_callback(&mut self, id: CallbackId, args: Vec<Dynamic>) -> Result<(), ScriptError> {
        let function = self
            .host
            .get(id)
            .ok_or_else(|| ScriptError::runtime(format!("{} has been released", id)))?;
        self.call_fn_ptr(&function, args).map(|_| ())
    }

    /// Drops a retained script function. Returns whether it was retained.
    pub fn release_callback(&mut self, id: CallbackId) -> bool {
        self.host.release(id)
    }

    /// Number of script functions currently retained for native code.
    pub fn retained_callbacks(&self) -> usize {
        self.host.retained()
    }

    /// Queues work to run after the current task, within the same round.
    pub fn enqueue_microtask(&mut self, microtask: MicroTask) {
        self.microtasks.borrow_mut().enqueue(microtask);
    }

    pub(crate) fn next_microtask(&self) -> Option<MicroTask> {
        self.microtasks.borrow_mut().dequeue()
    }

    /// Forgets all script state: globals, script-defined functions, retained
    /// callbacks and pending microtasks. Native bindings stay registered.
    pub fn reset(&mut self) {
        self.scope = Scope::new();
        self.functions = AST::empty();
        self.host.clear();
        self.microtasks.borrow_mut().clear();
        debug!(context = %self.id, "isolate reset");
    }

    fn call_fn_ptr(&self, function: &FnPtr, args: Vec<Dynamic>) -> Result<Dynamic, ScriptError> {
        function
            .call::<Dynamic>(&self.engine, &self.functions, args)
            .map_err(script_error)
    }
}

impl std::fmt::Debug for Isolate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Isolate")
            .field("id", &self.id)
            .field("globals", &self.scope.len())
            .field("retained_callbacks", &self.host.retained())
            .finish()
    }
}

/// Classifies an engine error.
pub(crate) fn script_error(err: Box<EvalAltResult>) -> ScriptError {
    let message = err.to_string();
    let position = source_position(err.position());
    let kind = match *err {
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => return script_error(inner),
        EvalAltResult::ErrorTerminated(ref token, _) if is_teardown(token) => ErrorKind::ContextClosed,
        EvalAltResult::ErrorTerminated(..) => ErrorKind::RoundInterrupted,
        EvalAltResult::ErrorMismatchDataType(..) | EvalAltResult::ErrorMismatchOutputType(..) => {
            ErrorKind::TypeMismatch
        }
        EvalAltResult::ErrorParsing(..) => ErrorKind::SyntaxError,
        _ => ErrorKind::ScriptRuntimeError,
    };
    let error = ScriptError::new(kind, message);
    match position {
        Some(position) => error.with_position(position),
        None => error,
    }
}

fn is_teardown(token: &Dynamic) -> bool {
    token
        .clone()
        .into_string()
        .map_or(false, |token| token == TEARDOWN_TOKEN)
}
