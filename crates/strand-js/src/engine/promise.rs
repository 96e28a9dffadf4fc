//! Promise Implementation
//!
//! Promise state machine with reaction jobs. Every lifecycle transition is
//! reported to the isolate's promise hook: creation (Init), settlement
//! (Resolve), and continuation dispatch (Before/After, from the microtask
//! runner).

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::function::JsFunction;
use super::isolate::{Isolate, PromiseHookType, ReactionJob};
use super::value::{GcVisitor, JsValue, NativeHandle};
use crate::JsError;

/// Promise state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
}

/// JavaScript Promise
pub struct JsPromise {
    id: u32,
    state: Cell<PromiseState>,
    result: RefCell<Option<JsValue>>,
    reactions: RefCell<Vec<Reaction>>,
    native: RefCell<Option<NativeHandle>>,
}

#[derive(Debug)]
struct Reaction {
    on_fulfilled: Option<Rc<JsFunction>>,
    on_rejected: Option<Rc<JsFunction>>,
    derived: Rc<JsPromise>,
}

impl JsPromise {
    pub(crate) fn pending(id: u32) -> Rc<Self> {
        Rc::new(Self {
            id,
            state: Cell::new(PromiseState::Pending),
            result: RefCell::new(None),
            reactions: RefCell::new(Vec::new()),
            native: RefCell::new(None),
        })
    }

    /// Promise fulfilled at creation. The engine fast-path skips the Init
    /// hook for these and fires only Resolve.
    pub fn resolved(isolate: &Isolate, value: JsValue) -> Rc<Self> {
        let promise = Self::pending(isolate.next_promise_id());
        promise.state.set(PromiseState::Fulfilled);
        *promise.result.borrow_mut() = Some(value);
        isolate.fire_promise_hook(PromiseHookType::Resolve, &promise);
        promise
    }

    /// Promise rejected at creation; fires only Resolve, as `resolved` does.
    pub fn rejected(isolate: &Isolate, reason: JsValue) -> Rc<Self> {
        let promise = Self::pending(isolate.next_promise_id());
        promise.state.set(PromiseState::Rejected);
        *promise.result.borrow_mut() = Some(reason);
        isolate.fire_promise_hook(PromiseHookType::Resolve, &promise);
        promise
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn state(&self) -> PromiseState {
        self.state.get()
    }

    /// Settled value or rejection reason.
    pub fn result(&self) -> Option<JsValue> {
        self.result.borrow().clone()
    }

    /// Register continuations, returning the derived promise.
    pub fn then(
        self: &Rc<Self>,
        isolate: &Isolate,
        on_fulfilled: Option<Rc<JsFunction>>,
        on_rejected: Option<Rc<JsFunction>>,
    ) -> Rc<JsPromise> {
        let derived = isolate.create_promise();
        match self.state.get() {
            PromiseState::Pending => {
                self.reactions.borrow_mut().push(Reaction {
                    on_fulfilled,
                    on_rejected,
                    derived: derived.clone(),
                });
            }
            settled => {
                let argument = self.result.borrow().clone().unwrap_or(JsValue::Undefined);
                let handler = match settled {
                    PromiseState::Fulfilled => on_fulfilled,
                    _ => on_rejected,
                };
                isolate.enqueue_reaction(ReactionJob {
                    promise: derived.clone(),
                    handler,
                    argument,
                    settled,
                });
            }
        }
        derived
    }

    /// Sugar for `then(None, Some(handler))`.
    pub fn catch(
        self: &Rc<Self>,
        isolate: &Isolate,
        on_rejected: Rc<JsFunction>,
    ) -> Rc<JsPromise> {
        self.then(isolate, None, Some(on_rejected))
    }

    pub fn resolve(self: &Rc<Self>, isolate: &Isolate, value: JsValue) {
        self.settle(isolate, PromiseState::Fulfilled, value);
    }

    pub fn reject(self: &Rc<Self>, isolate: &Isolate, reason: JsValue) {
        self.settle(isolate, PromiseState::Rejected, reason);
    }

    fn settle(self: &Rc<Self>, isolate: &Isolate, state: PromiseState, value: JsValue) {
        if self.state.get() != PromiseState::Pending {
            return;
        }
        self.state.set(state);
        *self.result.borrow_mut() = Some(value.clone());
        isolate.fire_promise_hook(PromiseHookType::Resolve, self);

        for reaction in self.reactions.borrow_mut().drain(..) {
            let handler = match state {
                PromiseState::Fulfilled => reaction.on_fulfilled,
                _ => reaction.on_rejected,
            };
            isolate.enqueue_reaction(ReactionJob {
                promise: reaction.derived,
                handler,
                argument: value.clone(),
                settled: state,
            });
        }
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

    pub(crate) fn clear_native(&self) {
        *self.native.borrow_mut() = None;
    }

    /// Walk values held alive by this promise for a GC pass.
    pub fn trace(&self, visitor: &mut dyn GcVisitor) {
        if let Some(value) = self.result.borrow().as_ref() {
            visitor.visit_value(value);
        }
        if let Some(NativeHandle::AsyncContext(frame)) = self.native.borrow().as_ref() {
            frame.trace(visitor);
        }
    }
}

impl fmt::Debug for JsPromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsPromise")
            .field("id", &self.id)
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}
