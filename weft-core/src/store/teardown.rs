//! Teardown Registration
//!
//! Owners of subscriptions (a component instance, a controller, a test
//! fixture) accumulate disposers over their lifetime and owe each of them
//! exactly one `dispose` call at a single, well-defined teardown point.
//! [`TeardownScope`] is that point: hooks registered with
//! [`on_teardown`](TeardownScope::on_teardown) run exactly once, in
//! registration order, when the scope is torn down or dropped.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::subscription::Disposer;

/// An owner-scoped teardown list.
///
/// # Example
///
/// ```rust,ignore
/// use weft_core::store::{Store, TeardownScope, Writable};
///
/// let scope = TeardownScope::new();
/// let store = Writable::new(0);
///
/// scope.add(store.subscribe(|n| println!("{n}")));
/// scope.on_teardown(|| println!("component destroyed"));
///
/// // ... later, or implicitly when `scope` drops:
/// scope.teardown();
/// ```
pub struct TeardownScope {
    hooks: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    torn_down: AtomicBool,
}

impl TeardownScope {
    /// Create an empty scope.
    pub fn new() -> Self {
        Self {
            hooks: Mutex::new(Vec::new()),
            torn_down: AtomicBool::new(false),
        }
    }

    /// Register a hook to run at teardown.
    ///
    /// A hook registered after teardown runs immediately: the owner is
    /// already gone, and every hook still runs exactly once.
    pub fn on_teardown<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.torn_down.load(Ordering::Acquire) {
            hook();
            return;
        }
        self.hooks.lock().push(Box::new(hook));
    }

    /// Adopt a subscription disposer: it is disposed at teardown.
    pub fn add(&self, disposer: Disposer) {
        self.on_teardown(move || disposer.dispose());
    }

    /// Run every registered hook, in registration order. Idempotent.
    pub fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let hooks = std::mem::take(&mut *self.hooks.lock());
        for hook in hooks {
            hook();
        }
    }

    /// Whether the scope has been torn down.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }
}

impl Drop for TeardownScope {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl Default for TeardownScope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TeardownScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeardownScope")
            .field("pending_hooks", &self.hooks.lock().len())
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}
