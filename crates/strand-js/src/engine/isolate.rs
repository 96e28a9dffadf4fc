//! Isolate
//!
//! Single-threaded engine state: the microtask queue, the promise lifecycle
//! hook registration, teardown flags, and the async context stack.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use super::function::JsFunction;
use super::promise::{JsPromise, PromiseState};
use super::value::JsValue;
use crate::context::AsyncContextStack;

/// Promise lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseHookType {
    /// Promise object created
    Init,
    /// A continuation of this promise is about to run
    Before,
    /// The continuation finished
    After,
    /// The promise settled
    Resolve,
}

/// Callback fired on every promise lifecycle event
pub type PromiseHook = fn(&Isolate, PromiseHookType, &Rc<JsPromise>);

/// Continuation of a settled promise, queued for the next microtask
/// checkpoint. `promise` is the derived promise; Before/After bracket it.
#[derive(Debug)]
pub(crate) struct ReactionJob {
    pub promise: Rc<JsPromise>,
    pub handler: Option<Rc<JsFunction>>,
    pub argument: JsValue,
    pub settled: PromiseState,
}

#[derive(Debug)]
enum Microtask {
    Reaction(ReactionJob),
    Callback(Rc<JsFunction>),
}

/// JavaScript isolate
pub struct Isolate {
    microtasks: RefCell<VecDeque<Microtask>>,
    promise_hook: Cell<Option<PromiseHook>>,
    pub(crate) contexts: AsyncContextStack,
    next_promise_id: Cell<u32>,
    terminating: Cell<bool>,
    disposed: Cell<bool>,
    pending_exception: RefCell<Option<JsValue>>,
}

impl Default for Isolate {
    fn default() -> Self {
        Self::new()
    }
}

impl Isolate {
    pub fn new() -> Self {
        Self {
            microtasks: RefCell::new(VecDeque::new()),
            promise_hook: Cell::new(None),
            contexts: AsyncContextStack::new(),
            next_promise_id: Cell::new(0),
            terminating: Cell::new(false),
            disposed: Cell::new(false),
            pending_exception: RefCell::new(None),
        }
    }

    /// Create a pending promise, firing the Init lifecycle hook.
    pub fn create_promise(&self) -> Rc<JsPromise> {
        let promise = JsPromise::pending(self.next_promise_id());
        self.fire_promise_hook(PromiseHookType::Init, &promise);
        promise
    }

    pub(crate) fn next_promise_id(&self) -> u32 {
        let id = self.next_promise_id.get();
        self.next_promise_id.set(id + 1);
        id
    }

    /// Install the promise lifecycle hook. One registration per isolate;
    /// the hook observes every promise from then on.
    pub fn set_promise_hook(&self, hook: PromiseHook) {
        debug_assert!(
            self.promise_hook.get().is_none(),
            "promise hook already installed"
        );
        self.promise_hook.set(Some(hook));
    }

    pub fn has_promise_hook(&self) -> bool {
        self.promise_hook.get().is_some()
    }

    pub(crate) fn fire_promise_hook(&self, ty: PromiseHookType, promise: &Rc<JsPromise>) {
        if let Some(hook) = self.promise_hook.get() {
            hook(self, ty, promise);
        }
    }

    pub(crate) fn enqueue_reaction(&self, job: ReactionJob) {
        self.microtasks
            .borrow_mut()
            .push_back(Microtask::Reaction(job));
    }

    /// Queue a bare microtask callback (`queueMicrotask`). No lifecycle
    /// hooks fire for these.
    pub fn queue_microtask(&self, callback: Rc<JsFunction>) {
        self.microtasks
            .borrow_mut()
            .push_back(Microtask::Callback(callback));
    }

    pub fn has_pending_microtasks(&self) -> bool {
        !self.microtasks.borrow().is_empty()
    }

    /// Drain the microtask queue, running each continuation bracketed by the
    /// Before/After lifecycle events.
    pub fn run_microtasks(&self) {
        while !self.terminating.get() {
            let next = self.microtasks.borrow_mut().pop_front();
            match next {
                Some(Microtask::Reaction(job)) => self.run_reaction(job),
                Some(Microtask::Callback(callback)) => {
                    if let Err(err) = callback.call(self, &[]) {
                        tracing::debug!("microtask callback threw: {}", err);
                    }
                }
                None => break,
            }
        }
    }

    fn run_reaction(&self, job: ReactionJob) {
        // Read the hook once: Before and After must pair up even when a hook
        // gets installed while this continuation runs.
        let hook = self.promise_hook.get();
        if let Some(hook) = hook {
            hook(self, PromiseHookType::Before, &job.promise);
        }
        match job.handler {
            Some(handler) => match handler.call(self, &[job.argument]) {
                Ok(value) => job.promise.resolve(self, value),
                Err(err) => {
                    // The error becomes the rejection reason; it counts as a
                    // scheduled script-level exception while it settles.
                    let reason = err.to_value();
                    self.set_pending_exception(reason.clone());
                    job.promise.reject(self, reason);
                    self.clear_pending_exception();
                }
            },
            None => match job.settled {
                PromiseState::Rejected => job.promise.reject(self, job.argument),
                _ => job.promise.resolve(self, job.argument),
            },
        }
        if let Some(hook) = hook {
            hook(self, PromiseHookType::After, &job.promise);
        }
    }

    pub fn set_pending_exception(&self, value: JsValue) {
        *self.pending_exception.borrow_mut() = Some(value);
    }

    pub fn clear_pending_exception(&self) {
        *self.pending_exception.borrow_mut() = None;
    }

    pub fn has_pending_exception(&self) -> bool {
        self.pending_exception.borrow().is_some()
    }

    /// Request cooperative termination. Pending microtasks stop draining and
    /// lifecycle bookkeeping becomes a no-op.
    pub fn terminate_execution(&self) {
        self.terminating.set(true);
    }

    pub fn is_terminating(&self) -> bool {
        self.terminating.get()
    }

    /// Tear the isolate down. Queued work is discarded.
    pub fn dispose(&self) {
        self.disposed.set(true);
        self.microtasks.borrow_mut().clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }
}
