//! Scoped acquisition of the tenant and user slots.

use crate::config::ViolationPolicy;
use crate::context::slice::SliceRef;
use crate::error::{ContextError, ScopeViolation};
use crate::types::{FrameId, Slot, TaskKey};
use tracing::{error, trace};

/// Keeps a scope frame pushed for as long as it lives.
///
/// Dropping the guard pops the frame on every exit path: normal return, `?`,
/// panic unwinding and cancellation of the future holding it. Guards must be
/// dropped innermost-first; an unbalanced exit is logged and, under
/// [`ViolationPolicy::Panic`], panics.
#[must_use = "the scope ends as soon as the guard is dropped"]
pub struct ScopeGuard {
    slice: SliceRef,
    owner: TaskKey,
    slot: Slot,
    frame: FrameId,
    policy: ViolationPolicy,
    active: bool,
}

impl ScopeGuard {
    pub(crate) fn new(
        slice: SliceRef,
        owner: TaskKey,
        slot: Slot,
        frame: FrameId,
        policy: ViolationPolicy,
    ) -> Self {
        Self {
            slice,
            owner,
            slot,
            frame,
            policy,
            active: true,
        }
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn frame(&self) -> FrameId {
        self.frame
    }

    /// Task that entered the scope.
    pub fn owner(&self) -> TaskKey {
        self.owner
    }

    /// Leaves the scope now and reports breaches instead of panicking.
    ///
    /// Besides out-of-order exits this also rejects exiting from a task other
    /// than the one that entered the scope. The frame is removed from its
    /// owner's stack in every case where it is still present.
    pub fn exit(mut self) -> Result<(), ContextError> {
        self.active = false;
        let current = TaskKey::current();
        let popped = self.pop();
        if current != self.owner {
            return Err(ScopeViolation::ForeignTask {
                slot: self.slot,
                frame: self.frame,
                owner: self.owner,
                current,
            }
            .into());
        }
        popped.map_err(ContextError::from)
    }

    fn pop(&self) -> Result<(), ScopeViolation> {
        let depth = {
            let mut slice = self.slice.lock();
            slice.pop(self.slot, self.frame)?;
            slice.depth(self.slot)
        };
        trace!(slot = %self.slot, frame = %self.frame, depth, "Exited scope");
        Ok(())
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        // No owner check here: a cancelled task may drop its future outside
        // of its own task context, and the guard already pops from the
        // owner's slice.
        if let Err(violation) = self.pop() {
            error!(owner = %self.owner, %violation, "Unbalanced scope exit");
            if self.policy == ViolationPolicy::Panic && !std::thread::panicking() {
                panic!("{}", ContextError::InvariantViolation(violation));
            }
        }
    }
}

impl std::fmt::Debug for ScopeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeGuard")
            .field("owner", &self.owner)
            .field("slot", &self.slot)
            .field("frame", &self.frame)
            .finish()
    }
}
