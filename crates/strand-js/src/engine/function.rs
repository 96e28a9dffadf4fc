//! JavaScript Functions
//!
//! Native callables invokable from the embedding. Each function carries one
//! opaque native-data slot, retrievable without consuming it.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::isolate::Isolate;
use super::value::{JsValue, NativeHandle};
use crate::JsError;

type Callable = Box<dyn Fn(&Isolate, &[JsValue]) -> Result<JsValue, JsError>>;

/// JavaScript function backed by a native callable
pub struct JsFunction {
    callable: Callable,
    native: RefCell<Option<NativeHandle>>,
}

impl JsFunction {
    pub fn new<F>(f: F) -> Rc<Self>
    where
        F: Fn(&Isolate, &[JsValue]) -> Result<JsValue, JsError> + 'static,
    {
        Rc::new(Self {
            callable: Box::new(f),
            native: RefCell::new(None),
        })
    }

    /// Invoke the function. An `Err` return is a script-level exception
    /// crossing the engine boundary.
    pub fn call(&self, isolate: &Isolate, args: &[JsValue]) -> Result<JsValue, JsError> {
        (self.callable)(isolate, args)
    }

    /// Attach the opaque native payload. The slot holds at most one payload.
    pub fn attach_native(&self, handle: NativeHandle) -> Result<(), JsError> {
        let mut slot = self.native.borrow_mut();
        if slot.is_some() {
            return Err(JsError::Internal(
                "native data slot already occupied".into(),
            ));
        }
        *slot = Some(handle);
        Ok(())
    }

    /// Read the native payload without consuming it.
    pub fn native_handle(&self) -> Option<NativeHandle> {
        self.native.borrow().clone()
    }
}

impl fmt::Debug for JsFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsFunction")
            .field("tagged", &self.native.borrow().is_some())
            .finish_non_exhaustive()
    }
}
