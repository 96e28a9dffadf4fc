//! Async Context Frames
//!
//! A frame is one async execution context: a reference-counted node owning a
//! snapshot of its parent's storage, taken at creation time. Promises,
//! wrapped functions, and the context stack all share ownership; the frame
//! lives as long as its longest holder.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::bridge;
use super::key::StorageKey;
use super::storage::ContextStorage;
use crate::JsError;
use crate::engine::{GcVisitor, Isolate, JsFunction, JsValue, NativeHandle};

/// One async execution context
pub struct AsyncContextFrame {
    id: u64,
    parent_id: Option<u64>,
    storage: RefCell<ContextStorage>,
}

impl AsyncContextFrame {
    pub(crate) fn root() -> Rc<Self> {
        Rc::new(Self {
            id: 0,
            parent_id: None,
            storage: RefCell::new(ContextStorage::new()),
        })
    }

    /// The frame continuations currently run under.
    pub fn current(isolate: &Isolate) -> Rc<Self> {
        isolate.contexts.current()
    }

    /// Create a frame inheriting a snapshot of the parent's storage (the
    /// current frame when no parent is given). The optional entry is applied
    /// after the inherited copy, so it wins over an inherited value for the
    /// same key.
    pub fn create(
        isolate: &Isolate,
        parent: Option<&Rc<Self>>,
        entry: Option<(&Rc<StorageKey>, JsValue)>,
    ) -> Rc<Self> {
        let parent = match parent {
            Some(parent) => parent.clone(),
            None => Self::current(isolate),
        };
        let frame = Rc::new(Self {
            id: isolate.contexts.next_frame_id(),
            parent_id: Some(parent.id),
            storage: RefCell::new(ContextStorage::new()),
        });
        parent
            .storage
            .borrow()
            .propagate_to(&mut frame.storage.borrow_mut());
        if let Some((key, value)) = entry {
            frame.storage.borrow_mut().exchange(key, Some(value));
        }
        frame
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn parent_id(&self) -> Option<u64> {
        self.parent_id
    }

    pub fn is_root(&self) -> bool {
        self.id == 0
    }

    /// Value stored under `key` in this frame.
    pub fn get(&self, key: &Rc<StorageKey>) -> Option<JsValue> {
        self.storage.borrow_mut().get(key)
    }

    pub(crate) fn exchange(
        &self,
        key: &Rc<StorageKey>,
        value: Option<JsValue>,
    ) -> Option<JsValue> {
        self.storage.borrow_mut().exchange(key, value)
    }

    /// Walk stored values for a GC pass.
    pub fn trace(&self, visitor: &mut dyn GcVisitor) {
        self.storage.borrow().trace(visitor);
    }

    /// Bind `func` to a new frame (child of `parent`, or of the current
    /// frame) and return a wrapper that runs it under that frame. Wrapping
    /// an already-bound function is misuse, reported as a catchable type
    /// error; the context stack is untouched.
    pub fn wrap(
        isolate: &Isolate,
        func: &Rc<JsFunction>,
        parent: Option<&Rc<Self>>,
    ) -> Result<Rc<JsFunction>, JsError> {
        bridge::install_promise_hook(isolate);

        if func.native_handle().is_some() {
            return Err(JsError::Type(
                "function is already associated with an async context".into(),
            ));
        }
        let frame = Self::create(isolate, parent, None);
        func.attach_native(NativeHandle::AsyncContext(frame))?;

        let inner = func.clone();
        Ok(JsFunction::new(move |isolate, args| {
            let handle = inner.native_handle();
            let frame = handle.as_ref().and_then(NativeHandle::as_async_context);
            let _scope = Scope::enter(isolate, frame);
            inner.call(isolate, args)
        }))
    }
}

impl fmt::Debug for AsyncContextFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncContextFrame")
            .field("id", &self.id)
            .field("parent_id", &self.parent_id)
            .finish_non_exhaustive()
    }
}

/// Makes a frame current for the guard's lifetime: pushed on construction,
/// popped unconditionally on drop, including during unwind out of the
/// guarded region.
pub struct Scope<'i> {
    isolate: &'i Isolate,
}

impl<'i> Scope<'i> {
    /// Push `frame` (the root frame when `None`) onto the context stack.
    pub fn enter(isolate: &'i Isolate, frame: Option<&Rc<AsyncContextFrame>>) -> Self {
        let frame = match frame {
            Some(frame) => frame.clone(),
            None => isolate.contexts.root(),
        };
        isolate.contexts.push(frame);
        Self { isolate }
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        self.isolate.contexts.pop();
    }
}

/// Creates and activates a frame carrying one storage entry: child of the
/// current frame with `key` set to `store`. Leaving the scope restores the
/// previous current frame; the new frame stays alive only while something
/// else (a promise tag, a wrapped function) retains it.
pub struct StorageScope<'i> {
    frame: Rc<AsyncContextFrame>,
    _scope: Scope<'i>,
}

impl<'i> StorageScope<'i> {
    pub fn enter(isolate: &'i Isolate, key: &Rc<StorageKey>, store: JsValue) -> Self {
        assert!(!key.is_dead(), "storage key used after reset");
        bridge::install_promise_hook(isolate);

        let frame = AsyncContextFrame::create(isolate, None, Some((key, store)));
        let scope = Scope::enter(isolate, Some(&frame));
        Self {
            frame,
            _scope: scope,
        }
    }

    pub fn frame(&self) -> &Rc<AsyncContextFrame> {
        &self.frame
    }
}
