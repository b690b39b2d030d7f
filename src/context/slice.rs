//! Per-task context state: the attribute map and one frame stack per slot.

use crate::error::ScopeViolation;
use crate::types::{FrameId, Slot, Value};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

pub(crate) type SliceRef = Arc<Mutex<Slice>>;

#[derive(Clone, Debug)]
pub(crate) struct Frame {
    pub id: FrameId,
    pub value: Value,
}

#[derive(Default)]
pub(crate) struct Slice {
    attributes: HashMap<String, Value>,
    tenants: Vec<Frame>,
    users: Vec<Frame>,
    claimed: bool,
}

impl Slice {
    pub fn shared() -> SliceRef {
        Arc::new(Mutex::new(Slice::default()))
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.attributes.get(key).cloned()
    }

    pub fn set(&mut self, key: String, value: Value) -> Option<Value> {
        self.attributes.insert(key, value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.attributes.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.attributes.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Marks the slice as owned by a task wrapper. Returns `false` if an
    /// outer wrapper already owns it.
    pub fn claim(&mut self) -> bool {
        !std::mem::replace(&mut self.claimed, true)
    }

    pub fn clear_attributes(&mut self) -> usize {
        let count = self.attributes.len();
        self.attributes.clear();
        count
    }

    fn stack(&self, slot: Slot) -> &Vec<Frame> {
        match slot {
            Slot::Tenant => &self.tenants,
            Slot::User => &self.users,
        }
    }

    fn stack_mut(&mut self, slot: Slot) -> &mut Vec<Frame> {
        match slot {
            Slot::Tenant => &mut self.tenants,
            Slot::User => &mut self.users,
        }
    }

    pub fn top(&self, slot: Slot) -> Option<&Frame> {
        self.stack(slot).last()
    }

    pub fn depth(&self, slot: Slot) -> usize {
        self.stack(slot).len()
    }

    pub fn open_scopes(&self) -> usize {
        self.tenants.len() + self.users.len()
    }

    /// Pushes a frame and returns the new depth.
    pub fn push(&mut self, slot: Slot, frame: Frame) -> usize {
        let stack = self.stack_mut(slot);
        stack.push(frame);
        stack.len()
    }

    /// Pops `frame`, which must be the innermost frame of `slot`.
    ///
    /// An out-of-order frame is still removed so the stack stays consistent
    /// with the guards that remain alive, but the breach is reported.
    pub fn pop(&mut self, slot: Slot, frame: FrameId) -> Result<Frame, ScopeViolation> {
        let stack = self.stack_mut(slot);
        let innermost = match stack.last().map(|top| top.id) {
            None => return Err(ScopeViolation::EmptyStack { slot, frame }),
            Some(id) if id == frame => return Ok(stack.remove(stack.len() - 1)),
            Some(id) => id,
        };
        match stack.iter().position(|f| f.id == frame) {
            Some(pos) => {
                stack.remove(pos);
                Err(ScopeViolation::OutOfOrder {
                    slot,
                    frame,
                    innermost,
                })
            }
            None => Err(ScopeViolation::MissingFrame { slot, frame }),
        }
    }
}
