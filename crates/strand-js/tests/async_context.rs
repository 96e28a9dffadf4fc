//! Async context tracking tests for strand-js
//!
//! Covers scope nesting, storage inheritance, promise tagging across
//! microtask boundaries, and misuse handling.

use std::cell::RefCell;
use std::rc::Rc;

use strand_js::*;

fn init() -> Isolate {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    Isolate::new()
}

fn tag_of(promise: &JsPromise) -> Option<Rc<AsyncContextFrame>> {
    match promise.native_handle() {
        Some(NativeHandle::AsyncContext(frame)) => Some(frame),
        None => None,
    }
}

// ============================================================================
// SCOPE NESTING
// ============================================================================

#[test]
fn test_nested_scopes_restore_in_lifo_order() {
    let isolate = init();
    let root = AsyncContextFrame::current(&isolate);
    assert!(root.is_root());

    let outer = AsyncContextFrame::create(&isolate, None, None);
    let inner = AsyncContextFrame::create(&isolate, None, None);

    {
        let _a = Scope::enter(&isolate, Some(&outer));
        assert!(Rc::ptr_eq(&AsyncContextFrame::current(&isolate), &outer));
        {
            let _b = Scope::enter(&isolate, Some(&inner));
            assert!(Rc::ptr_eq(&AsyncContextFrame::current(&isolate), &inner));
        }
        assert!(Rc::ptr_eq(&AsyncContextFrame::current(&isolate), &outer));
    }
    assert!(Rc::ptr_eq(&AsyncContextFrame::current(&isolate), &root));
}

#[test]
fn test_scope_with_no_target_activates_root() {
    let isolate = init();
    let frame = AsyncContextFrame::create(&isolate, None, None);

    let _outer = Scope::enter(&isolate, Some(&frame));
    {
        let _inner = Scope::enter(&isolate, None);
        assert!(AsyncContextFrame::current(&isolate).is_root());
    }
    assert!(Rc::ptr_eq(&AsyncContextFrame::current(&isolate), &frame));
}

#[test]
fn test_scope_unwinds_on_callback_error() {
    let isolate = init();
    let key = StorageKey::new();

    let failing = JsFunction::new(|_, _| Err(JsError::Runtime("script threw".into())));
    let result = {
        let _scope = StorageScope::enter(&isolate, &key, JsValue::Number(1.0));
        failing.call(&isolate, &[])
    };
    assert!(result.is_err());
    assert!(AsyncContextFrame::current(&isolate).is_root());
}

// ============================================================================
// STORAGE INHERITANCE
// ============================================================================

#[test]
fn test_child_inherits_snapshot_not_live_link() {
    let isolate = init();
    let key = StorageKey::new();

    let scope = StorageScope::enter(&isolate, &key, JsValue::Number(1.0));
    let child = AsyncContextFrame::create(&isolate, None, None);
    assert_eq!(child.get(&key).unwrap().as_number(), Some(1.0));

    // A sibling created later with a different value does not affect it.
    let other = AsyncContextFrame::create(&isolate, None, Some((&key, JsValue::Number(2.0))));
    assert_eq!(child.get(&key).unwrap().as_number(), Some(1.0));
    assert_eq!(other.get(&key).unwrap().as_number(), Some(2.0));
    assert_eq!(scope.frame().get(&key).unwrap().as_number(), Some(1.0));
}

#[test]
fn test_override_wins_over_inherited_value() {
    let isolate = init();
    let key = StorageKey::new();

    let parent = AsyncContextFrame::create(&isolate, None, Some((&key, JsValue::from("v1"))));
    let child =
        AsyncContextFrame::create(&isolate, Some(&parent), Some((&key, JsValue::from("v2"))));
    assert_eq!(child.get(&key).unwrap().as_str(), Some("v2"));
    assert_eq!(parent.get(&key).unwrap().as_str(), Some("v1"));
}

#[test]
fn test_siblings_do_not_observe_each_other() {
    let isolate = init();
    let key = StorageKey::new();

    let parent = AsyncContextFrame::create(&isolate, None, Some((&key, JsValue::from("base"))));
    let a = AsyncContextFrame::create(&isolate, Some(&parent), Some((&key, JsValue::from("A"))));
    let b = AsyncContextFrame::create(&isolate, Some(&parent), Some((&key, JsValue::from("B"))));

    assert_eq!(a.get(&key).unwrap().as_str(), Some("A"));
    assert_eq!(b.get(&key).unwrap().as_str(), Some("B"));
    assert_eq!(parent.get(&key).unwrap().as_str(), Some("base"));
}

#[test]
fn test_dead_key_reads_absent_everywhere() {
    let isolate = init();
    let key = StorageKey::new();

    let frame = AsyncContextFrame::create(&isolate, None, Some((&key, JsValue::Number(7.0))));
    let child = AsyncContextFrame::create(&isolate, Some(&frame), None);
    assert_eq!(child.get(&key).unwrap().as_number(), Some(7.0));

    key.reset();
    assert!(frame.get(&key).is_none());
    assert!(child.get(&key).is_none());
}

// ============================================================================
// PROMISE TAGGING
// ============================================================================

#[test]
fn test_promise_created_in_scope_carries_its_frame() {
    let isolate = init();
    let key = StorageKey::new();

    let scope = StorageScope::enter(&isolate, &key, JsValue::Number(1.0));
    let promise = isolate.create_promise();
    let tag = tag_of(&promise).expect("tagged at creation");
    assert!(Rc::ptr_eq(&tag, scope.frame()));
}

#[test]
fn test_promise_created_at_root_is_untagged() {
    let isolate = init();
    let key = StorageKey::new();

    // Install the hook, then leave the scope before creating the promise.
    {
        let _scope = StorageScope::enter(&isolate, &key, JsValue::Number(1.0));
    }
    let promise = isolate.create_promise();
    assert!(tag_of(&promise).is_none());
}

#[test]
fn test_rejected_promise_retains_tag_after_continuation() {
    let isolate = init();
    let key = StorageKey::new();

    let (fulfilled, rejected, frame) = {
        let scope = StorageScope::enter(&isolate, &key, JsValue::Number(1.0));
        let p_ok = isolate.create_promise();
        let p_err = isolate.create_promise();
        let fulfilled = p_ok.then(&isolate, None, None);
        let rejected = p_err.then(&isolate, None, None);
        p_ok.resolve(&isolate, JsValue::Number(2.0));
        p_err.reject(&isolate, JsValue::from("boom"));
        (fulfilled, rejected, scope.frame().clone())
    };

    isolate.run_microtasks();

    // Rejection context survives settlement; fulfillment sheds it.
    assert_eq!(rejected.state(), PromiseState::Rejected);
    let tag = tag_of(&rejected).expect("rejected promise keeps its context");
    assert!(Rc::ptr_eq(&tag, &frame));
    assert_eq!(tag.get(&key).unwrap().as_number(), Some(1.0));

    assert_eq!(fulfilled.state(), PromiseState::Fulfilled);
    assert!(tag_of(&fulfilled).is_none());
}

#[test]
fn test_sync_rejected_promise_gets_tag_backfilled() {
    let isolate = init();
    let key = StorageKey::new();

    let scope = StorageScope::enter(&isolate, &key, JsValue::Number(1.0));
    // Settled at creation: the engine skips Init and fires only Resolve.
    let rejected = JsPromise::rejected(&isolate, JsValue::from("early"));
    let resolved = JsPromise::resolved(&isolate, JsValue::Number(0.0));

    let tag = tag_of(&rejected).expect("rejection tagged at Resolve");
    assert!(Rc::ptr_eq(&tag, scope.frame()));
    assert!(tag_of(&resolved).is_none());
}

// ============================================================================
// END TO END
// ============================================================================

#[test]
fn test_storage_visible_across_three_level_then_chain() {
    let isolate = init();
    let key = StorageKey::new();
    let observed = Rc::new(RefCell::new(Vec::new()));

    let p = isolate.create_promise();
    {
        let _scope = StorageScope::enter(&isolate, &key, JsValue::Number(1.0));

        let mut chain = p.clone();
        for _ in 0..3 {
            let key = key.clone();
            let observed = observed.clone();
            chain = chain.then(
                &isolate,
                Some(JsFunction::new(move |isolate, args| {
                    let current = AsyncContextFrame::current(isolate);
                    let value = current.get(&key).and_then(|v| v.as_number());
                    observed.borrow_mut().push(value);
                    Ok(args[0].clone())
                })),
                None,
            );
        }
    }

    // The scope is gone before any continuation has run.
    assert!(AsyncContextFrame::current(&isolate).get(&key).is_none());
    p.resolve(&isolate, JsValue::Number(0.0));
    isolate.run_microtasks();

    assert_eq!(*observed.borrow(), vec![Some(1.0), Some(1.0), Some(1.0)]);
    assert!(AsyncContextFrame::current(&isolate).is_root());
    assert!(AsyncContextFrame::current(&isolate).get(&key).is_none());
}

#[test]
fn test_continuations_restore_root_between_jobs() {
    let isolate = init();
    let key = StorageKey::new();
    let depths = Rc::new(RefCell::new(Vec::new()));

    let p = isolate.create_promise();
    let inside = {
        let _scope = StorageScope::enter(&isolate, &key, JsValue::Number(1.0));
        let depths = depths.clone();
        p.then(
            &isolate,
            Some(JsFunction::new(move |isolate, args| {
                depths
                    .borrow_mut()
                    .push(AsyncContextFrame::current(isolate).is_root());
                Ok(args[0].clone())
            })),
            None,
        )
    };
    let outside = {
        let depths = depths.clone();
        inside.then(
            &isolate,
            Some(JsFunction::new(move |isolate, args| {
                depths
                    .borrow_mut()
                    .push(AsyncContextFrame::current(isolate).is_root());
                Ok(args[0].clone())
            })),
            None,
        )
    };

    p.resolve(&isolate, JsValue::Undefined);
    isolate.run_microtasks();
    assert_eq!(outside.state(), PromiseState::Fulfilled);

    // First continuation ran under the scope frame, second under root:
    // `outside` was registered after the scope had already been left.
    assert_eq!(*depths.borrow(), vec![false, true]);
}

// ============================================================================
// FUNCTION WRAPPING
// ============================================================================

#[test]
fn test_wrapped_function_runs_under_captured_context() {
    let isolate = init();
    let key = StorageKey::new();
    let seen = Rc::new(RefCell::new(None));

    let wrapped = {
        let _scope = StorageScope::enter(&isolate, &key, JsValue::Number(42.0));
        let key = key.clone();
        let seen = seen.clone();
        let callback = JsFunction::new(move |isolate, _| {
            let current = AsyncContextFrame::current(isolate);
            *seen.borrow_mut() = current.get(&key).and_then(|v| v.as_number());
            Ok(JsValue::Undefined)
        });
        AsyncContextFrame::wrap(&isolate, &callback, None).unwrap()
    };

    // Invoked long after the scope is gone.
    wrapped.call(&isolate, &[]).unwrap();
    assert_eq!(*seen.borrow(), Some(42.0));
    assert!(AsyncContextFrame::current(&isolate).is_root());
}

#[test]
fn test_double_wrap_is_rejected_without_stack_damage() {
    let isolate = init();
    let callback = JsFunction::new(|_, _| Ok(JsValue::Undefined));

    let wrapped = AsyncContextFrame::wrap(&isolate, &callback, None).unwrap();
    let err = AsyncContextFrame::wrap(&isolate, &callback, None).unwrap_err();
    match err {
        JsError::Type(msg) => assert!(msg.contains("already associated")),
        other => panic!("Expected type error, got {other:?}"),
    }

    assert!(AsyncContextFrame::current(&isolate).is_root());
    wrapped.call(&isolate, &[]).unwrap();
    assert!(AsyncContextFrame::current(&isolate).is_root());
}

#[test]
fn test_wrap_propagates_context_across_timer() {
    let isolate = init();
    let mut event_loop = EventLoop::new();
    let key = StorageKey::new();
    let seen = Rc::new(RefCell::new(None));

    {
        let _scope = StorageScope::enter(&isolate, &key, JsValue::Number(7.0));
        let key = key.clone();
        let seen = seen.clone();
        let callback = JsFunction::new(move |isolate, _| {
            let current = AsyncContextFrame::current(isolate);
            *seen.borrow_mut() = current.get(&key).and_then(|v| v.as_number());
            Ok(JsValue::Undefined)
        });
        let wrapped = AsyncContextFrame::wrap(&isolate, &callback, None).unwrap();
        event_loop.set_timeout(wrapped, 10);
    }

    event_loop.tick(&isolate, 10);
    assert_eq!(*seen.borrow(), Some(7.0));
}
