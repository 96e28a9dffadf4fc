//! Storage Keys
//!
//! Opaque identity tokens naming one async-local storage slot. Keys compare
//! by identity, never by value, and carry a precomputed hash.

use std::cell::Cell;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

thread_local! {
    static NEXT_KEY_ID: Cell<u64> = const { Cell::new(0) };
}

/// Identity token for one async-local storage slot
#[derive(Debug)]
pub struct StorageKey {
    id: u64,
    hash: u64,
    dead: Cell<bool>,
}

impl StorageKey {
    pub fn new() -> Rc<Self> {
        let id = NEXT_KEY_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            id
        });
        Rc::new(Self {
            id,
            // Fibonacci multiplier spreads sequential ids across the hash space.
            hash: id.wrapping_mul(0x9E37_79B9_7F4A_7C15),
            dead: Cell::new(false),
        })
    }

    /// True once the owning storage slot has been discarded. Storage entries
    /// under a dead key are garbage and get purged lazily on next access.
    pub fn is_dead(&self) -> bool {
        self.dead.get()
    }

    /// Kill the key. Called exactly once by the slot owner when it goes away.
    pub fn reset(&self) {
        debug_assert!(!self.dead.get(), "storage key reset twice");
        self.dead.set(true);
    }

    pub fn hash_code(&self) -> u64 {
        self.hash
    }
}

impl PartialEq for StorageKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for StorageKey {}

impl Hash for StorageKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}
