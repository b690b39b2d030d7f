//! Shared identifiers and value types.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;

/// Type-erased value stored in a context slice or a scope frame.
pub type Value = Arc<dyn Any + Send + Sync>;

/// Identity of the logical task a context slice belongs to.
///
/// Inside a spawned tokio task the task id is used, so cooperative tasks that
/// share one worker thread still get separate slices. Everywhere else
/// (plain threads, `Runtime::block_on`) the current thread id is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKey {
    Thread(ThreadId),
    Task(tokio::task::Id),
}

impl TaskKey {
    /// Key of the currently executing logical task.
    pub fn current() -> Self {
        match tokio::task::try_id() {
            Some(id) => TaskKey::Task(id),
            None => TaskKey::Thread(std::thread::current().id()),
        }
    }

    pub fn is_task(&self) -> bool {
        matches!(self, TaskKey::Task(_))
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKey::Thread(id) => write!(f, "thread {:?}", id),
            TaskKey::Task(id) => write!(f, "task {}", id),
        }
    }
}

/// Process-unique identifier of a pushed scope frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameId(u64);

impl FrameId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        FrameId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Scoped slots with their own frame stack per task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Tenant,
    User,
}

impl Slot {
    pub fn as_str(self) -> &'static str {
        match self {
            Slot::Tenant => "tenant",
            Slot::User => "user",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
