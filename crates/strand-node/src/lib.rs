//! strand Node.js Compatibility
//!
//! Implements a subset of the Node.js `async_hooks` surface on top of the
//! strand async context tracking: `AsyncLocalStorage` and `AsyncResource`.

use std::rc::Rc;

use strand_js::{
    AsyncContextFrame, Isolate, JsError, JsFunction, JsValue, StorageKey, StorageScope,
};

/// Async-local storage cell, a subset of the Node.js `AsyncLocalStorage` API.
///
/// Each instance owns one storage key; dropping the instance kills the key,
/// and contexts still holding entries for it purge them lazily.
pub struct AsyncLocalStorage {
    key: Rc<StorageKey>,
}

impl Default for AsyncLocalStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncLocalStorage {
    pub fn new() -> Self {
        Self {
            key: StorageKey::new(),
        }
    }

    /// Run `callback` with `store` as this cell's value. The store is
    /// visible from the callback and from every async operation it spawns.
    pub fn run(
        &self,
        isolate: &Isolate,
        store: JsValue,
        callback: &Rc<JsFunction>,
        args: &[JsValue],
    ) -> Result<JsValue, JsError> {
        let _scope = StorageScope::enter(isolate, &self.key, store);
        callback.call(isolate, args)
    }

    /// Run `callback` outside of any store. Node.js defines `exit` as
    /// running a function synchronously outside of a context; running with
    /// an undefined store propagates the same observable behavior.
    pub fn exit(
        &self,
        isolate: &Isolate,
        callback: &Rc<JsFunction>,
        args: &[JsValue],
    ) -> Result<JsValue, JsError> {
        self.run(isolate, JsValue::Undefined, callback, args)
    }

    /// The store for the current async context, `Undefined` when absent.
    pub fn get_store(&self, isolate: &Isolate) -> JsValue {
        AsyncContextFrame::current(isolate)
            .get(&self.key)
            .unwrap_or(JsValue::Undefined)
    }
}

impl Drop for AsyncLocalStorage {
    fn drop(&mut self) {
        self.key.reset();
    }
}

/// Captures an async context for later callback binding, a subset of the
/// Node.js `AsyncResource` API.
pub struct AsyncResource {
    frame: Rc<AsyncContextFrame>,
}

impl AsyncResource {
    /// Capture the current async context.
    pub fn new(isolate: &Isolate) -> Self {
        Self {
            frame: AsyncContextFrame::current(isolate),
        }
    }

    pub fn frame(&self) -> &Rc<AsyncContextFrame> {
        &self.frame
    }

    /// Bind `callback` to the captured context: the returned function runs
    /// under it no matter where it is eventually invoked from.
    pub fn bind(
        &self,
        isolate: &Isolate,
        callback: &Rc<JsFunction>,
    ) -> Result<Rc<JsFunction>, JsError> {
        AsyncContextFrame::wrap(isolate, callback, Some(&self.frame))
    }
}
