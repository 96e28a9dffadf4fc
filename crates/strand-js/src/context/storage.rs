//! Context Storage
//!
//! Per-frame key/value cells. At most one entry per live key; entries under
//! dead keys are purged lazily on the next access rather than eagerly, so a
//! long-lived frame may outlive the owners of keys it once stored.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use super::key::StorageKey;
use crate::engine::{GcVisitor, JsValue};

/// Key handle hashing/comparing by key identity
#[derive(Debug, Clone)]
struct KeyRef(Rc<StorageKey>);

impl PartialEq for KeyRef {
    fn eq(&self, other: &Self) -> bool {
        *self.0 == *other.0
    }
}

impl Eq for KeyRef {}

impl Hash for KeyRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

/// Storage cells owned by one async context frame
#[derive(Debug, Default)]
pub struct ContextStorage {
    cells: HashMap<KeyRef, JsValue>,
}

impl ContextStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, replace, or remove (`None`) the entry for `key`, returning
    /// the previous value.
    pub fn exchange(&mut self, key: &Rc<StorageKey>, value: Option<JsValue>) -> Option<JsValue> {
        self.purge_dead();
        debug_assert!(!key.is_dead(), "storage key used after reset");
        match value {
            Some(value) => self.cells.insert(KeyRef(key.clone()), value),
            None => self.cells.remove(&KeyRef(key.clone())),
        }
    }

    /// Current value for `key`, as a shared handle.
    pub fn get(&mut self, key: &Rc<StorageKey>) -> Option<JsValue> {
        self.purge_dead();
        self.cells.get(&KeyRef(key.clone())).cloned()
    }

    /// Clone every live entry into `other`. Inheritance happens only at
    /// frame creation, never as a merge: `other` must be empty.
    pub fn propagate_to(&self, other: &mut ContextStorage) {
        debug_assert!(other.cells.is_empty(), "storage propagation target not empty");
        for (key, value) in &self.cells {
            if key.0.is_dead() {
                continue;
            }
            other.cells.insert(key.clone(), value.clone());
        }
    }

    /// Walk stored values for a GC pass.
    pub fn trace(&self, visitor: &mut dyn GcVisitor) {
        for value in self.cells.values() {
            visitor.visit_value(value);
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn purge_dead(&mut self) {
        self.cells.retain(|key, _| !key.0.is_dead());
    }
}
