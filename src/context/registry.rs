//! Registry of context slices keyed by logical task.
//!
//! The registry is the only structure shared between tasks. Lookups take the
//! read lock; creating or tearing down a slice takes the write lock.

use crate::context::slice::{Slice, SliceRef};
use crate::types::TaskKey;
use parking_lot::RwLock;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::thread::ThreadId;
use tracing::trace;

#[derive(Default)]
pub(crate) struct Registry {
    slices: RwLock<HashMap<TaskKey, SliceRef>>,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Slice of `key` if one exists. Never allocates.
    pub fn lookup(&self, key: &TaskKey) -> Option<SliceRef> {
        self.slices.read().get(key).cloned()
    }

    /// Slice of `key`, created on first access.
    pub fn get_or_create(self: &Arc<Self>, key: TaskKey) -> SliceRef {
        if let Some(slice) = self.lookup(&key) {
            return slice;
        }

        let mut slices = self.slices.write();
        if let Some(slice) = slices.get(&key) {
            return slice.clone();
        }
        let slice = Slice::shared();
        slices.insert(key, slice.clone());
        drop(slices);

        trace!(task = %key, "Created context slice");
        if let TaskKey::Thread(thread_id) = key {
            watch_thread_exit(thread_id, Arc::downgrade(self));
        }
        slice
    }

    pub fn remove(&self, key: &TaskKey) -> Option<SliceRef> {
        let removed = self.slices.write().remove(key);
        if removed.is_some() {
            trace!(task = %key, "Released context slice");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.slices.read().len()
    }
}

/// Removes the thread's slices from every registry that created one for it,
/// when the thread-local itself is destroyed at thread exit.
struct ThreadReaper {
    thread_id: ThreadId,
    registries: Vec<Weak<Registry>>,
}

impl Drop for ThreadReaper {
    fn drop(&mut self) {
        let key = TaskKey::Thread(self.thread_id);
        for registry in self.registries.drain(..) {
            if let Some(registry) = registry.upgrade() {
                registry.remove(&key);
            }
        }
    }
}

thread_local! {
    static REAPER: RefCell<Option<ThreadReaper>> = const { RefCell::new(None) };
}

fn watch_thread_exit(thread_id: ThreadId, registry: Weak<Registry>) {
    // Slices are only created for the current thread's own key, so the
    // reaper always belongs to the thread it runs on. `try_with` fails only
    // while this thread is already tearing down its locals; the slice then
    // leaks until the registry itself is dropped.
    let _ = REAPER.try_with(|cell| {
        let mut reaper = cell.borrow_mut();
        let reaper = reaper.get_or_insert_with(|| ThreadReaper {
            thread_id,
            registries: Vec::new(),
        });
        reaper.registries.retain(|r| r.strong_count() > 0);
        reaper.registries.push(registry);
    });
}
