//! Exposing native functions and methods to scripts.
//!
//! A native function is wrapped so that every script argument is converted
//! with [`FromScript`] before the function runs. If any conversion fails the
//! call raises a catchable type mismatch at the call site and the native
//! function is never entered. Return values go back through
//! [`IntoScriptReturn`]; a native `Err` becomes a script runtime error.

use crate::callback::CallbackHost;
use crate::convert::{FromScript, ToScript};
use crate::error::ConversionError;
use parking_lot::Mutex;
use rhai::{Dynamic, Engine, EvalAltResult, NativeCallContext, Position};
use script_types::{ScriptError, SourcePosition};
use std::fmt::Display;
use std::rc::Rc;
use std::sync::Arc;

/// Highest number of script arguments a bound function may take.
pub const MAX_ARITY: usize = 6;

/// Where a native call originated.
pub struct CallSite<'a> {
    function: &'a str,
    position: Position,
    host: &'a CallbackHost,
}

impl<'a> CallSite<'a> {
    pub(crate) fn new(function: &'a str, position: Position, host: &'a CallbackHost) -> Self {
        Self {
            function,
            position,
            host,
        }
    }

    #[cfg(test)]
    pub(crate) fn detached(function: &'a str, host: &'a CallbackHost) -> Self {
        Self::new(function, Position::NONE, host)
    }

    /// Name the script used to call the function.
    pub fn function(&self) -> &str {
        self.function
    }

    /// Script position of the call, if known.
    pub fn position(&self) -> Option<SourcePosition> {
        source_position(self.position)
    }

    pub(crate) fn host(&self) -> &CallbackHost {
        self.host
    }

    fn type_error(&self, err: &ConversionError) -> Box<EvalAltResult> {
        let (expected, found) = err.expected_found();
        let expected = match err {
            ConversionError::Argument {
                index, function, ..
            } => format!("{} for argument {} of `{}`", expected, index, function),
            _ => expected,
        };
        Box::new(EvalAltResult::ErrorMismatchDataType(
            expected,
            found,
            self.position,
        ))
    }

    fn runtime_error(&self, message: String) -> Box<EvalAltResult> {
        Box::new(EvalAltResult::ErrorRuntime(
            Dynamic::from(message),
            self.position,
        ))
    }
}

/// Converts an engine position into a [`SourcePosition`].
pub(crate) fn source_position(position: Position) -> Option<SourcePosition> {
    let line = position.line()?;
    let column = position.position().unwrap_or(0);
    Some(SourcePosition::new(
        u32::try_from(line).unwrap_or(u32::MAX),
        u32::try_from(column).unwrap_or(u32::MAX),
    ))
}

/// Native return values that can be handed back to a script.
pub trait IntoScriptReturn {
    /// Converts the return value, or yields the message of a native failure.
    fn into_script_return(self) -> Result<Dynamic, String>;
}

impl<T: ToScript> IntoScriptReturn for T {
    fn into_script_return(self) -> Result<Dynamic, String> {
        Ok(self.to_script())
    }
}

impl<T: ToScript, E: Display> IntoScriptReturn for Result<T, E> {
    fn into_script_return(self) -> Result<Dynamic, String> {
        self.map(ToScript::to_script).map_err(|e| e.to_string())
    }
}

/// A native function callable from scripts.
///
/// Implemented for closures of up to [`MAX_ARITY`] arguments whose argument
/// types implement [`FromScript`].
pub trait ScriptFn<Args>: 'static {
    /// Number of script arguments.
    const ARITY: usize;

    /// Converts `args` and calls the function.
    fn call(&self, site: &CallSite<'_>, args: Vec<Dynamic>) -> Result<Dynamic, Box<EvalAltResult>>;
}

/// A native method callable from scripts on a shared receiver.
pub trait ScriptMethod<T, Args>: 'static {
    /// Number of script arguments, not counting the receiver.
    const ARITY: usize;

    /// Converts `args` and calls the method on `receiver`.
    fn call(
        &self,
        receiver: &mut T,
        site: &CallSite<'_>,
        args: Vec<Dynamic>,
    ) -> Result<Dynamic, Box<EvalAltResult>>;
}

fn convert_arg<A: FromScript>(
    args: &mut std::vec::IntoIter<Dynamic>,
    index: &mut usize,
    site: &CallSite<'_>,
) -> Result<A, Box<EvalAltResult>> {
    let position = *index;
    *index += 1;
    let value = args.next().unwrap_or(Dynamic::UNIT);
    A::from_script(value, site)
        .map_err(|err| site.type_error(&err.at_argument(position, site.function())))
}

fn finish<R: IntoScriptReturn>(site: &CallSite<'_>, ret: R) -> Result<Dynamic, Box<EvalAltResult>> {
    ret.into_script_return()
        .map_err(|message| site.runtime_error(message))
}

macro_rules! impl_script_fn {
    ($count:expr; $($arg:ident),*) => {
        impl<F, R, $($arg,)*> ScriptFn<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> R + 'static,
            R: IntoScriptReturn,
            $($arg: FromScript,)*
        {
            const ARITY: usize = $count;

            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn call(
                &self,
                site: &CallSite<'_>,
                args: Vec<Dynamic>,
            ) -> Result<Dynamic, Box<EvalAltResult>> {
                let mut args = args.into_iter();
                let mut index = 0usize;
                $(let $arg = convert_arg::<$arg>(&mut args, &mut index, site)?;)*
                finish(site, (self)($($arg),*))
            }
        }

        impl<T, F, R, $($arg,)*> ScriptMethod<T, ($($arg,)*)> for F
        where
            F: Fn(&mut T, $($arg),*) -> R + 'static,
            R: IntoScriptReturn,
            $($arg: FromScript,)*
        {
            const ARITY: usize = $count;

            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn call(
                &self,
                receiver: &mut T,
                site: &CallSite<'_>,
                args: Vec<Dynamic>,
            ) -> Result<Dynamic, Box<EvalAltResult>> {
                let mut args = args.into_iter();
                let mut index = 0usize;
                $(let $arg = convert_arg::<$arg>(&mut args, &mut index, site)?;)*
                finish(site, (self)(receiver, $($arg),*))
            }
        }
    };
}

impl_script_fn!(0;);
impl_script_fn!(1; A1);
impl_script_fn!(2; A1, A2);
impl_script_fn!(3; A1, A2, A3);
impl_script_fn!(4; A1, A2, A3, A4);
impl_script_fn!(5; A1, A2, A3, A4, A5);
impl_script_fn!(6; A1, A2, A3, A4, A5, A6);

type NativeCall = Rc<dyn Fn(&CallSite<'_>, Vec<Dynamic>) -> Result<Dynamic, Box<EvalAltResult>>>;

/// Wraps a native function for registration.
pub(crate) fn native_fn<Args, F: ScriptFn<Args>>(f: F) -> (usize, NativeCall) {
    let call: NativeCall = Rc::new(move |site: &CallSite<'_>, args: Vec<Dynamic>| f.call(site, args));
    (F::ARITY, call)
}

/// Wraps a native method and its shared receiver for registration.
///
/// The receiver stays locked for the duration of the call.
pub(crate) fn native_method<T, Args, M>(receiver: Arc<Mutex<T>>, method: M) -> (usize, NativeCall)
where
    T: 'static,
    M: ScriptMethod<T, Args>,
{
    let call: NativeCall = Rc::new(move |site: &CallSite<'_>, args: Vec<Dynamic>| {
        let mut guard = receiver.lock();
        method.call(&mut *guard, site, args)
    });
    (M::ARITY, call)
}

fn dispatch(
    call: &NativeCall,
    host: &CallbackHost,
    ctx: &NativeCallContext,
    args: Vec<Dynamic>,
) -> Result<Dynamic, Box<EvalAltResult>> {
    let site = CallSite::new(ctx.fn_name(), ctx.call_position(), host);
    call(&site, args)
}

/// Registers a wrapped native call under `name`.
pub(crate) fn register_native(
    engine: &mut Engine,
    host: &CallbackHost,
    name: &str,
    arity: usize,
    call: NativeCall,
) -> Result<(), ScriptError> {
    let host = host.clone();
    match arity {
        0 => {
            engine.register_fn(name, move |ctx: NativeCallContext| {
                dispatch(&call, &host, &ctx, Vec::new())
            });
        }
        1 => {
            engine.register_fn(name, move |ctx: NativeCallContext, a: Dynamic| {
                dispatch(&call, &host, &ctx, vec![a])
            });
        }
        2 => {
            engine.register_fn(name, move |ctx: NativeCallContext, a: Dynamic, b: Dynamic| {
                dispatch(&call, &host, &ctx, vec![a, b])
            });
        }
        3 => {
            engine.register_fn(
                name,
                move |ctx: NativeCallContext, a: Dynamic, b: Dynamic, c: Dynamic| {
                    dispatch(&call, &host, &ctx, vec![a, b, c])
                },
            );
        }
        4 => {
            engine.register_fn(
                name,
                move |ctx: NativeCallContext, a: Dynamic, b: Dynamic, c: Dynamic, d: Dynamic| {
                    dispatch(&call, &host, &ctx, vec![a, b, c, d])
                },
            );
        }
        5 => {
            engine.register_fn(
                name,
                move |ctx: NativeCallContext,
                      a: Dynamic,
                      b: Dynamic,
                      c: Dynamic,
                      d: Dynamic,
                      e: Dynamic| {
                    dispatch(&call, &host, &ctx, vec![a, b, c, d, e])
                },
            );
        }
        6 => {
            engine.register_fn(
                name,
                move |ctx: NativeCallContext,
                      a: Dynamic,
                      b: Dynamic,
                      c: Dynamic,
                      d: Dynamic,
                      e: Dynamic,
                      f: Dynamic| {
                    dispatch(&call, &host, &ctx, vec![a, b, c, d, e, f])
                },
            );
        }
        _ => {
            return Err(ScriptError::runtime(format!(
                "`{}` takes {} arguments; at most {} are supported",
                name, arity, MAX_ARITY
            )))
        }
    }
    Ok(())
}
