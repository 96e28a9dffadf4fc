//! Promise Lifecycle Bridge
//!
//! The promise-hook callback keeping the context stack consistent with
//! engine-driven continuation nesting. Installed lazily, once per isolate,
//! on first use of the storage-scoping API: the hook adds tracking metadata
//! to every promise in the isolate, so it is not installed until something
//! actually tracks context.

use std::rc::Rc;

use super::frame::AsyncContextFrame;
use crate::JsError;
use crate::engine::{Isolate, JsPromise, NativeHandle, PromiseHookType, PromiseState};

pub(crate) fn install_promise_hook(isolate: &Isolate) {
    if isolate.has_promise_hook() {
        return;
    }
    tracing::debug!("installing promise lifecycle hook");
    isolate.set_promise_hook(promise_hook);
}

/// Hook entry point. Runs with a local error boundary: an error while a
/// script-level exception is scheduled propagates silently (the engine
/// already knows); anything else is reported and swallowed, never thrown
/// into engine call sites that cannot unwind.
fn promise_hook(isolate: &Isolate, ty: PromiseHookType, promise: &Rc<JsPromise>) {
    if isolate.is_terminating() || isolate.is_disposed() {
        return;
    }
    if let Err(err) = dispatch(isolate, ty, promise) {
        if isolate.has_pending_exception() {
            return;
        }
        tracing::error!(
            "promise lifecycle hook failed (promise {}): {}",
            promise.id(),
            err
        );
    }
}

fn dispatch(
    isolate: &Isolate,
    ty: PromiseHookType,
    promise: &Rc<JsPromise>,
) -> Result<(), JsError> {
    match ty {
        PromiseHookType::Init => on_init(isolate, promise),
        PromiseHookType::Before => on_before(isolate, promise),
        PromiseHookType::After => on_after(isolate, promise),
        PromiseHookType::Resolve => on_resolve(isolate, promise),
    }
}

fn context_of(promise: &JsPromise) -> Option<Rc<AsyncContextFrame>> {
    promise
        .native_handle()
        .as_ref()
        .and_then(NativeHandle::as_async_context)
        .cloned()
}

/// Promise created. Promises created under the root frame stay untagged:
/// Before/After assume root when no tag is present, which saves a
/// per-promise allocation in the common untracked case.
fn on_init(isolate: &Isolate, promise: &Rc<JsPromise>) -> Result<(), JsError> {
    let current = AsyncContextFrame::current(isolate);
    if !current.is_root() {
        debug_assert!(
            promise.native_handle().is_none(),
            "promise created already tagged"
        );
        promise.attach_native(NativeHandle::AsyncContext(current))?;
    }
    Ok(())
}

/// Continuation about to run: push the promise's frame, or root when
/// untagged. Exactly one push, so After can pop unconditionally.
fn on_before(isolate: &Isolate, promise: &Rc<JsPromise>) -> Result<(), JsError> {
    let frame = context_of(promise).unwrap_or_else(|| isolate.contexts.root());
    isolate.contexts.push(frame);
    Ok(())
}

/// Continuation finished: pop. A rejected promise keeps its tag, so an
/// unhandled-rejection report run later can still name the originating
/// context; a fulfilled one sheds it for prompt reclamation.
fn on_after(isolate: &Isolate, promise: &Rc<JsPromise>) -> Result<(), JsError> {
    let popped = isolate.contexts.pop();
    if cfg!(debug_assertions) {
        let expected = context_of(promise).unwrap_or_else(|| isolate.contexts.root());
        assert!(
            Rc::ptr_eq(&popped, &expected),
            "async context stack out of sync with continuation nesting"
        );
    }
    if promise.state() != PromiseState::Rejected {
        promise.clear_native();
    }
    Ok(())
}

/// Settlement. The engine fast-path skips Init for promises settled at
/// creation; a rejected, untagged promise gets its tag backfilled here so
/// rejection context survives.
fn on_resolve(isolate: &Isolate, promise: &Rc<JsPromise>) -> Result<(), JsError> {
    if promise.state() == PromiseState::Rejected && promise.native_handle().is_none() {
        let current = AsyncContextFrame::current(isolate);
        if !current.is_root() {
            promise.attach_native(NativeHandle::AsyncContext(current))?;
        }
    }
    Ok(())
}
