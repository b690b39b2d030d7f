//! Once-Only Memoizer
//!
//! Wrappers that run a parameterless computation at most once and hand out
//! the cached result afterwards. Meant for one-time initialisation such as
//! creating tables or ensuring indexes, not as a general cache.
//!
//! Concurrency policy: wait-for-completion. An in-flight lock is held while
//! the computation runs, so concurrent callers block (or await) until the
//! first call finishes and then read its result. Once a value is cached,
//! calls read it without locking. A computation that fails (returns
//! `Err` or panics) leaves the cell empty and the next call runs it again.
//! The computation must not call its own wrapper; that deadlocks.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::OnceLock;
use tracing::debug;

/// Runs `func` once and caches its return value.
///
/// `new` is `const`, so a `RunOnce` can live in a `static`:
///
/// ```
/// use ambient::RunOnce;
/// use std::sync::atomic::{AtomicU32, Ordering};
///
/// static CALLS: AtomicU32 = AtomicU32::new(0);
///
/// fn init() -> u32 {
///     CALLS.fetch_add(1, Ordering::SeqCst) + 1
/// }
///
/// static INIT: RunOnce<u32> = RunOnce::new(init as fn() -> u32);
///
/// assert_eq!(INIT.call(), 1);
/// assert_eq!(INIT.call(), 1);
/// assert_eq!(CALLS.load(Ordering::SeqCst), 1);
/// ```
pub struct RunOnce<T, F = fn() -> T> {
    func: F,
    value: OnceLock<T>,
    in_flight: Mutex<()>,
}

impl<T, F> RunOnce<T, F> {
    pub const fn new(func: F) -> Self {
        Self {
            func,
            value: OnceLock::new(),
            in_flight: parking_lot::const_mutex(()),
        }
    }

    /// Whether a call has completed successfully. Does not wait for a call
    /// that is in flight.
    pub fn has_run(&self) -> bool {
        self.value.get().is_some()
    }
}

impl<T: Clone, F> RunOnce<T, F> {
    /// Cached result, if the computation has completed.
    pub fn get(&self) -> Option<T> {
        self.value.get().cloned()
    }
}

impl<T: Clone, F: Fn() -> T> RunOnce<T, F> {
    /// Returns the cached result, running the computation first if needed.
    ///
    /// If the computation panics the panic propagates and nothing is cached;
    /// `parking_lot` locks are not poisoned.
    pub fn call(&self) -> T {
        if let Some(value) = self.value.get() {
            return value.clone();
        }
        let _running = self.in_flight.lock();
        if let Some(value) = self.value.get() {
            return value.clone();
        }
        debug!(computation = std::any::type_name::<F>(), "Running once-only computation");
        self.value.get_or_init(|| (self.func)()).clone()
    }
}

/// Like [`RunOnce`], for computations that can fail. Errors are returned to
/// the caller unchanged and are not cached.
pub struct TryRunOnce<T, E, F = fn() -> Result<T, E>> {
    func: F,
    value: OnceLock<T>,
    in_flight: Mutex<()>,
    _error: std::marker::PhantomData<fn() -> E>,
}

impl<T, E, F> TryRunOnce<T, E, F> {
    pub const fn new(func: F) -> Self {
        Self {
            func,
            value: OnceLock::new(),
            in_flight: parking_lot::const_mutex(()),
            _error: std::marker::PhantomData,
        }
    }

    pub fn has_run(&self) -> bool {
        self.value.get().is_some()
    }
}

impl<T: Clone, E, F: Fn() -> Result<T, E>> TryRunOnce<T, E, F> {
    pub fn call(&self) -> Result<T, E> {
        if let Some(value) = self.value.get() {
            return Ok(value.clone());
        }
        let _running = self.in_flight.lock();
        if let Some(value) = self.value.get() {
            return Ok(value.clone());
        }
        debug!(computation = std::any::type_name::<F>(), "Running once-only computation");
        match (self.func)() {
            Ok(value) => Ok(self.value.get_or_init(|| value).clone()),
            Err(err) => {
                debug!("Once-only computation failed; will retry on next call");
                Err(err)
            }
        }
    }

    pub fn get(&self) -> Option<T> {
        self.value.get().cloned()
    }
}

/// Async counterpart of [`TryRunOnce`].
///
/// Concurrent callers await the in-flight computation. If it fails, or the
/// calling future is dropped before it finishes, the cell stays empty and the
/// next caller runs the computation.
pub struct AsyncRunOnce<T, F> {
    func: F,
    cell: tokio::sync::OnceCell<T>,
}

impl<T, F> AsyncRunOnce<T, F> {
    pub fn new(func: F) -> Self {
        Self {
            func,
            cell: tokio::sync::OnceCell::new(),
        }
    }

    pub fn has_run(&self) -> bool {
        self.cell.initialized()
    }

    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }
}

impl<T, F, Fut, E> AsyncRunOnce<T, F>
where
    T: Clone,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    pub async fn call(&self) -> Result<T, E> {
        self.cell
            .get_or_try_init(|| {
                debug!(computation = std::any::type_name::<F>(), "Running once-only computation");
                (self.func)()
            })
            .await
            .cloned()
    }
}

/// Defines a function whose body runs at most once; later calls return a
/// clone of the first result.
///
/// ```
/// ambient::run_once! {
///     /// Creates the tables exactly once.
///     pub fn initialize_tables() -> usize {
///         4
///     }
/// }
///
/// assert_eq!(initialize_tables(), 4);
/// assert_eq!(initialize_tables(), 4);
/// ```
#[macro_export]
macro_rules! run_once {
    ($(#[$meta:meta])* $vis:vis fn $name:ident() -> $ret:ty $body:block) => {
        $(#[$meta])*
        $vis fn $name() -> $ret {
            fn body() -> $ret $body
            static CELL: $crate::RunOnce<$ret> = $crate::RunOnce::new(body as fn() -> $ret);
            CELL.call()
        }
    };
    ($(#[$meta:meta])* $vis:vis fn $name:ident() $body:block) => {
        $crate::run_once! { $(#[$meta])* $vis fn $name() -> () $body }
    };
}
