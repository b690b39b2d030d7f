//! Error types for the ambient context store.

use crate::types::{FrameId, Slot, TaskKey};
use thiserror::Error;

/// Breaches of the scoped acquisition protocol.
///
/// These are programming errors in the caller. They are reported, never
/// repaired silently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeViolation {
    #[error("{slot} scope {frame} exited while the stack was empty")]
    EmptyStack { slot: Slot, frame: FrameId },

    #[error("{slot} scope {frame} exited out of order (innermost frame is {innermost})")]
    OutOfOrder {
        slot: Slot,
        frame: FrameId,
        innermost: FrameId,
    },

    #[error("{slot} scope {frame} is not on the stack")]
    MissingFrame { slot: Slot, frame: FrameId },

    #[error("{slot} scope {frame} entered by {owner} but exited from {current}")]
    ForeignTask {
        slot: Slot,
        frame: FrameId,
        owner: TaskKey,
        current: TaskKey,
    },

    #[error("context slice for {key} released with {depth} open scope(s)")]
    OpenScopes { key: TaskKey, depth: usize },
}

/// Errors surfaced by the context store and its ambient setup.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Invariant violation: {0}")]
    InvariantViolation(#[from] ScopeViolation),

    #[error("Type mismatch for key '{key}': value is not a {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<config::ConfigError> for ContextError {
    fn from(err: config::ConfigError) -> Self {
        ContextError::ConfigError(err.to_string())
    }
}

impl ContextError {
    /// The violation behind an `InvariantViolation`, if that is what this is.
    pub fn violation(&self) -> Option<&ScopeViolation> {
        match self {
            ContextError::InvariantViolation(v) => Some(v),
            _ => None,
        }
    }
}
