//! Slice teardown for tokio tasks.
//!
//! Threads release their slice from a thread-local destructor. Tasks have no
//! such hook, so a task's slice is released when the outermost future driving
//! it, wrapped in [`Scoped`], completes or is dropped (including on abort).

use crate::context::registry::Registry;
use crate::types::TaskKey;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use tracing::warn;

/// Future wrapper that releases the task's context slice when it finishes.
///
/// Only the first `Scoped` polled in a task claims the slice; wrappers nested
/// inside it leave the slice alone. Slices keyed by a thread (a `Scoped`
/// driven by `Runtime::block_on`) are never released here.
#[must_use = "futures do nothing unless polled"]
pub struct Scoped<F> {
    future: Option<Pin<Box<F>>>,
    registry: Arc<Registry>,
    key: Option<TaskKey>,
    owner: bool,
}

impl<F> Scoped<F> {
    pub(crate) fn new(registry: Arc<Registry>, future: F) -> Self {
        Self {
            future: Some(Box::pin(future)),
            registry,
            key: None,
            owner: false,
        }
    }

    fn claim(&mut self) {
        let key = TaskKey::current();
        self.key = Some(key);
        if key.is_task() {
            self.owner = self.registry.get_or_create(key).lock().claim();
        }
    }

    fn release(&mut self) {
        if !std::mem::take(&mut self.owner) {
            return;
        }
        let Some(key) = self.key else {
            return;
        };
        let Some(slice) = self.registry.lookup(&key) else {
            return;
        };
        let open = slice.lock().open_scopes();
        if open > 0 {
            warn!(task = %key, open, "Task finished with open scopes; keeping its context slice");
            return;
        }
        self.registry.remove(&key);
    }
}

impl<F: Future> Future for Scoped<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.key.is_none() {
            this.claim();
        }
        let Some(future) = this.future.as_mut() else {
            panic!("`Scoped` polled after completion");
        };
        match future.as_mut().poll(cx) {
            Poll::Ready(output) => {
                this.future = None;
                this.release();
                Poll::Ready(output)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<F> Drop for Scoped<F> {
    fn drop(&mut self) {
        // Guards held by the inner future pop their frames first.
        self.future = None;
        self.release();
    }
}
