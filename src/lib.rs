//! Ambient: task-local request context
//!
//! A process-wide context whose state is isolated per logical task (thread or
//! tokio task), with scoped tenant and user slots, plus once-only wrappers for
//! idempotent initialisation.

pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod once;
pub mod types;

pub use crate::config::{AmbientConfig, ConfigLoader, ScopeConfig, ViolationPolicy};
pub use context::{context, init, Context, ScopeGuard, Scoped};
pub use error::{ContextError, ScopeViolation};
pub use logging::{init_logging, LoggingConfig};
pub use once::{AsyncRunOnce, RunOnce, TryRunOnce};
pub use types::{FrameId, Slot, TaskKey, Value};
