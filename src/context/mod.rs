//! Ambient Context Store
//!
//! A process-wide facade over per-task state. Every logical task (a thread, or
//! a tokio task) sees its own attribute map and its own tenant and user
//! stacks; nothing written in one task is visible from another.
//!
//! ```
//! use std::sync::Arc;
//!
//! struct Tenant {
//!     mark: &'static str,
//! }
//!
//! let ctx = ambient::context();
//! ctx.set("name", String::from("Alvin"));
//! assert_eq!(ctx.get_cloned::<String>("name").as_deref(), Some("Alvin"));
//!
//! {
//!     let _scope = ctx.with_tenant_context(Arc::new(Tenant { mark: "Fake Tenant" }));
//!     assert_eq!(ctx.get_current_tenant::<Tenant>().unwrap().mark, "Fake Tenant");
//! }
//! assert!(ctx.get_current_tenant::<Tenant>().is_none());
//! ```

mod registry;
mod scope;
mod slice;
mod task;

pub use scope::ScopeGuard;
pub use task::Scoped;

use crate::config::{AmbientConfig, ScopeConfig};
use crate::error::{ContextError, ScopeViolation};
use crate::types::{FrameId, Slot, TaskKey, Value};
use registry::Registry;
use slice::{Frame, SliceRef};
use std::any::{type_name, Any};
use std::future::Future;
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace, warn};

static GLOBAL: OnceLock<Context> = OnceLock::new();

/// The process-wide context, created with default settings on first use.
pub fn context() -> &'static Context {
    GLOBAL.get_or_init(Context::new)
}

/// Installs the process-wide context with `config`.
///
/// Must run before the first call to [`context`]; afterwards the settings are
/// fixed and this returns a `ConfigError`.
pub fn init(config: AmbientConfig) -> Result<&'static Context, ContextError> {
    config.ensure_valid()?;
    let mut installed = false;
    let ctx = GLOBAL.get_or_init(|| {
        installed = true;
        Context::with_config(config)
    });
    if !installed {
        return Err(ContextError::ConfigError(
            "ambient context already initialized".to_string(),
        ));
    }
    debug!(scope = ?ctx.scope, "Ambient context initialized");
    Ok(ctx)
}

/// Handle to a context store. Clones share the same per-task state.
#[derive(Clone)]
pub struct Context {
    registry: Arc<Registry>,
    scope: ScopeConfig,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("active_slices", &self.registry.len())
            .field("scope", &self.scope)
            .finish()
    }
}

impl Context {
    pub fn new() -> Self {
        Self::with_config(AmbientConfig::default())
    }

    pub fn with_config(config: AmbientConfig) -> Self {
        Self {
            registry: Registry::new(),
            scope: config.scope,
        }
    }

    pub fn scope_config(&self) -> &ScopeConfig {
        &self.scope
    }

    fn current_slice(&self) -> Option<SliceRef> {
        self.registry.lookup(&TaskKey::current())
    }

    fn current_slice_or_create(&self) -> (TaskKey, SliceRef) {
        let key = TaskKey::current();
        (key, self.registry.get_or_create(key))
    }

    // ---- attributes ----

    /// Binds `key` to `value` for the current task.
    pub fn set<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.set_value(key, Arc::new(value));
    }

    /// Binds `key` to an already type-erased value.
    pub fn set_value(&self, key: impl Into<String>, value: Value) {
        let (_, slice) = self.current_slice_or_create();
        slice.lock().set(key.into(), value);
    }

    /// Value bound to `key` in the current task, if any.
    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.current_slice()?.lock().get(key)
    }

    /// Value bound to `key` as a `T`. Unbound keys and values of another type
    /// both read as `None`.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.get_value(key)?.downcast::<T>().ok()
    }

    pub fn get_cloned<T: Any + Send + Sync + Clone>(&self, key: &str) -> Option<T> {
        self.get::<T>(key).map(|v| (*v).clone())
    }

    /// Like [`get`](Self::get), but a value of another type is an error.
    pub fn try_get<T: Any + Send + Sync>(&self, key: &str) -> Result<Option<Arc<T>>, ContextError> {
        match self.get_value(key) {
            None => Ok(None),
            Some(value) => value
                .downcast::<T>()
                .map(Some)
                .map_err(|_| ContextError::TypeMismatch {
                    key: key.to_string(),
                    expected: type_name::<T>(),
                }),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.current_slice()
            .map(|slice| slice.lock().contains(key))
            .unwrap_or(false)
    }

    /// Removes `key` from the current task. Returns whether it was bound.
    pub fn delete(&self, key: &str) -> bool {
        self.current_slice()
            .map(|slice| slice.lock().remove(key).is_some())
            .unwrap_or(false)
    }

    /// Attribute keys of the current task, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.current_slice()
            .map(|slice| slice.lock().keys())
            .unwrap_or_default()
    }

    /// Drops every attribute of the current task. Open scopes are kept.
    pub fn clear(&self) {
        if let Some(slice) = self.current_slice() {
            let removed = slice.lock().clear_attributes();
            trace!(removed, "Cleared context attributes");
        }
    }

    /// Removes the current task's slice from the store.
    ///
    /// Returns `false` if the task had no slice. Fails without releasing
    /// anything while a tenant or user scope is still open.
    pub fn release(&self) -> Result<bool, ContextError> {
        let key = TaskKey::current();
        let Some(slice) = self.registry.lookup(&key) else {
            return Ok(false);
        };
        let depth = slice.lock().open_scopes();
        if depth > 0 {
            return Err(ScopeViolation::OpenScopes { key, depth }.into());
        }
        Ok(self.registry.remove(&key).is_some())
    }

    /// Number of tasks that currently own a slice.
    pub fn active_slices(&self) -> usize {
        self.registry.len()
    }

    // ---- scoped slots ----

    /// Pushes `value` onto `slot` for the current task until the guard drops.
    pub fn enter(&self, slot: Slot, value: Value) -> ScopeGuard {
        let (key, slice) = self.current_slice_or_create();
        let frame = FrameId::next();
        let depth = slice.lock().push(slot, Frame { id: frame, value });
        trace!(task = %key, %slot, %frame, depth, "Entered scope");
        if depth > self.scope.depth_warning {
            warn!(
                task = %key,
                %slot,
                depth,
                threshold = self.scope.depth_warning,
                "Scope nesting exceeds warning threshold; is a guard being leaked?"
            );
        }
        ScopeGuard::new(slice, key, slot, frame, self.scope.on_violation)
    }

    /// Innermost value of `slot` for the current task.
    pub fn current(&self, slot: Slot) -> Option<Value> {
        self.current_slice()?
            .lock()
            .top(slot)
            .map(|frame| frame.value.clone())
    }

    pub fn depth(&self, slot: Slot) -> usize {
        self.current_slice()
            .map(|slice| slice.lock().depth(slot))
            .unwrap_or(0)
    }

    pub fn with_tenant_context<T: Any + Send + Sync>(&self, tenant: Arc<T>) -> ScopeGuard {
        self.enter(Slot::Tenant, tenant)
    }

    pub fn get_current_tenant<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.current(Slot::Tenant)?.downcast::<T>().ok()
    }

    /// Whether `tenant` is, by identity, the current tenant.
    pub fn is_current_tenant<T: Any + Send + Sync>(&self, tenant: &Arc<T>) -> bool {
        self.get_current_tenant::<T>()
            .map(|current| Arc::ptr_eq(&current, tenant))
            .unwrap_or(false)
    }

    pub fn tenant_depth(&self) -> usize {
        self.depth(Slot::Tenant)
    }

    /// Runs `f` with `tenant` as the current tenant.
    pub fn in_tenant_context<T, R>(&self, tenant: Arc<T>, f: impl FnOnce() -> R) -> R
    where
        T: Any + Send + Sync,
    {
        let _scope = self.with_tenant_context(tenant);
        f()
    }

    pub fn with_current_user<U: Any + Send + Sync>(&self, user: Arc<U>) -> ScopeGuard {
        self.enter(Slot::User, user)
    }

    pub fn get_current_user<U: Any + Send + Sync>(&self) -> Option<Arc<U>> {
        self.current(Slot::User)?.downcast::<U>().ok()
    }

    // ---- task lifecycle ----

    /// Wraps `future` so the slice of the task polling it is released when
    /// it completes or is dropped. Nested wrappers in the same task defer to
    /// the outermost one.
    pub fn scoped<F: Future>(&self, future: F) -> Scoped<F> {
        Scoped::new(self.registry.clone(), future)
    }

    /// Spawns `future` on the current tokio runtime inside [`scoped`](Self::scoped).
    pub fn spawn<F>(&self, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        tokio::spawn(self.scoped(future))
    }
}
