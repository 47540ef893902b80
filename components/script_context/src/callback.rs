//! Script functions held by native code.
//!
//! When a script passes a function to a native binding, the function is
//! retained in its context's [`CallbackRegistry`] and native code receives a
//! [`Callback`]: a thread-safe handle holding only the registry id and a weak
//! reference to the context. Invoking the handle posts a task, so the script
//! function always runs on its own context's thread during a later round.

use crate::binding::CallSite;
use crate::context::ContextRef;
use crate::convert::{FromScript, ToScript};
use crate::error::{ContextError, ConversionError};
use crate::task_queue::Task;
use rhai::{Dynamic, FnPtr};
use script_types::ContextId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;
use tracing::trace;

/// Identifier of a retained script function within one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "callback#{}", self.0)
    }
}

/// Script functions retained on behalf of native code.
#[derive(Debug, Default)]
pub(crate) struct CallbackRegistry {
    next_id: u64,
    functions: HashMap<CallbackId, FnPtr>,
}

impl CallbackRegistry {
    pub(crate) fn retain(&mut self, function: FnPtr) -> CallbackId {
        self.next_id += 1;
        let id = CallbackId(self.next_id);
        self.functions.insert(id, function);
        id
    }

    pub(crate) fn get(&self, id: CallbackId) -> Option<FnPtr> {
        self.functions.get(&id).cloned()
    }

    pub(crate) fn release(&mut self, id: CallbackId) -> bool {
        self.functions.remove(&id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.functions.len()
    }

    pub(crate) fn clear(&mut self) {
        self.functions.clear();
    }
}

/// Context-thread state shared with native bindings.
#[derive(Clone)]
pub(crate) struct CallbackHost {
    registry: Rc<RefCell<CallbackRegistry>>,
    owner: ContextRef,
}

impl CallbackHost {
    pub(crate) fn new(owner: ContextRef) -> Self {
        Self {
            registry: Rc::new(RefCell::new(CallbackRegistry::default())),
            owner,
        }
    }

    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self::new(ContextRef::detached())
    }

    pub(crate) fn retain(&self, function: FnPtr) -> CallbackId {
        self.registry.borrow_mut().retain(function)
    }

    pub(crate) fn get(&self, id: CallbackId) -> Option<FnPtr> {
        self.registry.borrow().get(id)
    }

    pub(crate) fn release(&self, id: CallbackId) -> bool {
        self.registry.borrow_mut().release(id)
    }

    pub(crate) fn retained(&self) -> usize {
        self.registry.borrow().len()
    }

    pub(crate) fn clear(&self) {
        self.registry.borrow_mut().clear();
    }

    pub(crate) fn owner(&self) -> &ContextRef {
        &self.owner
    }
}

/// Argument tuples a [`Callback`] can be invoked with.
///
/// Values are converted on the context thread when the call runs.
pub trait ScriptArgs: Send + 'static {
    /// Converts the tuple into script arguments.
    fn into_script_args(self) -> Vec<Dynamic>;
}

macro_rules! impl_script_args {
    ($($arg:ident),*) => {
        impl<$($arg,)*> ScriptArgs for ($($arg,)*)
        where
            $($arg: ToScript + Send + 'static,)*
        {
            #[allow(non_snake_case)]
            fn into_script_args(self) -> Vec<Dynamic> {
                let ($($arg,)*) = self;
                vec![$($arg.to_script()),*]
            }
        }
    };
}

impl_script_args!();
impl_script_args!(A1);
impl_script_args!(A1, A2);
impl_script_args!(A1, A2, A3);
impl_script_args!(A1, A2, A3, A4);
impl_script_args!(A1, A2, A3, A4, A5);
impl_script_args!(A1, A2, A3, A4, A5, A6);

struct CallbackInner {
    id: CallbackId,
    owner: ContextRef,
}

impl Drop for CallbackInner {
    fn drop(&mut self) {
        let id = self.id;
        let released = self
            .owner
            .post(Task::housekeeping(move |isolate| {
                isolate.release_callback(id);
                Ok(())
            }));
        if released.is_err() {
            trace!(context = %self.owner.id(), %id, "context gone, callback dropped with it");
        }
    }
}

/// A handle to a script function, callable from any thread.
///
/// `Args` is the tuple of native values the function is called with. The
/// function stays alive until the last clone of the handle is dropped or its
/// context is destroyed, whichever comes first.
pub struct Callback<Args = ()> {
    inner: Arc<CallbackInner>,
    _args: PhantomData<fn(Args)>,
}

impl<Args> Clone for Callback<Args> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _args: PhantomData,
        }
    }
}

impl<Args> fmt::Debug for Callback<Args> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("id", &self.inner.id)
            .field("context", &self.inner.owner.id())
            .finish()
    }
}

impl<Args: ScriptArgs> Callback<Args> {
    /// Schedules the function to run with `args` during a later round of its
    /// context.
    ///
    /// Errors raised by the function are logged by the context. Fails with
    /// [`ContextError::Closed`] if the context no longer exists.
    pub fn call(&self, args: Args) -> Result<(), ContextError> {
        let id = self.inner.id;
        self.inner.owner.post(Task::new(move |isolate| {
            isolate.invoke_callback(id, args.into_script_args())
        }))
    }

    /// Context that owns the function.
    pub fn context(&self) -> ContextId {
        self.inner.owner.id()
    }

    /// Registry id of the function within its context.
    pub fn id(&self) -> CallbackId {
        self.inner.id
    }
}

impl<Args: ScriptArgs> FromScript for Callback<Args> {
    fn from_script(value: Dynamic, site: &CallSite<'_>) -> Result<Self, ConversionError> {
        let found = value.type_name();
        let function = value
            .try_cast::<FnPtr>()
            .ok_or_else(|| ConversionError::TypeMismatch {
                expected: "function",
                found: found.to_string(),
            })?;
        let host = site.host();
        Ok(Self {
            inner: Arc::new(CallbackInner {
                id: host.retain(function),
                owner: host.owner().clone(),
            }),
            _args: PhantomData,
        })
    }
}
