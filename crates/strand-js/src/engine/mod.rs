//! Engine Embedding
//!
//! Single-threaded JavaScript engine embedding model: reference-counted value
//! handles, promises with lifecycle hooks, a microtask queue, and a
//! timer/macrotask event loop.

mod event_loop;
mod function;
mod isolate;
mod promise;
mod value;

pub use event_loop::{EventLoop, Timer};
pub use function::JsFunction;
pub use isolate::{Isolate, PromiseHook, PromiseHookType};
pub use promise::{JsPromise, PromiseState};
pub use value::{GcVisitor, JsValue, NativeHandle};
