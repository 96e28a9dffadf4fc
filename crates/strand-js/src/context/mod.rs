//! Async Context Tracking
//!
//! Determines which logical task is active at every point where callbacks
//! and promise continuations run, and propagates per-task key/value storage
//! across async boundaries. The substrate for AsyncLocalStorage-style APIs.

mod bridge;
mod frame;
mod key;
mod stack;
mod storage;

pub use frame::{AsyncContextFrame, Scope, StorageScope};
pub use key::StorageKey;
pub(crate) use stack::AsyncContextStack;
pub use storage::ContextStorage;
