//! strand JavaScript Embedding
//!
//! Single-isolate JavaScript engine embedding with async execution-context
//! tracking.
//!
//! Features:
//! - Isolate with microtask queue and promise lifecycle hooks
//! - Promise state machine (pending/fulfilled/rejected) with reaction jobs
//! - Async context frames with snapshot-inherited key/value storage
//! - Scope guards and storage scopes for AsyncLocalStorage-style APIs
//! - Timer/macrotask event loop with microtask checkpoints

pub mod context;
pub mod engine;

pub use context::{AsyncContextFrame, Scope, StorageKey, StorageScope};
pub use engine::{
    EventLoop, GcVisitor, Isolate, JsFunction, JsPromise, JsValue, NativeHandle, PromiseHookType,
    PromiseState,
};

/// JavaScript error
#[derive(Debug, thiserror::Error)]
pub enum JsError {
    #[error("JavaScript error: {0}")]
    Runtime(String),

    #[error("Type error: {0}")]
    Type(String),

    #[error("engine error: {0}")]
    Internal(String),
}

impl JsError {
    /// Rejection reason carried by a promise settled from this error.
    pub fn to_value(&self) -> JsValue {
        JsValue::from(self.to_string().as_str())
    }
}
