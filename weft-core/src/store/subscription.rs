//! Subscription bookkeeping for the store primitives.
//!
//! Every call to `subscribe` registers a callback under a fresh
//! [`SubscriptionId`] and hands back a [`Disposer`]. The disposer is the
//! only supported way to release a subscription, and it is idempotent:
//! after the first invocation it is permanently inert, no matter how many
//! times it is called or by whom.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Unique identifier for a subscription.
///
/// Each subscriber callback registered on a store gets a unique ID when
/// created. Stores notify in ascending registration order, which the ID
/// never encodes directly; it is only a removal key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Generate a new unique subscription ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Idempotent handle that releases one subscription.
///
/// The release action is stored as a one-shot closure; the first call to
/// [`dispose`](Disposer::dispose) takes and runs it, every later call is a
/// no-op. The closure holds only a weak reference to its store, so a
/// disposer never keeps a store alive and disposing after the store is gone
/// is harmless.
///
/// Dropping a disposer does **not** unsubscribe. Pair disposers with a
/// [`TeardownScope`](super::TeardownScope) when release must be guaranteed.
pub struct Disposer {
    release: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Disposer {
    /// Wrap a one-shot release action.
    pub(crate) fn new<F>(release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            release: Mutex::new(Some(Box::new(release))),
        }
    }

    /// A disposer that releases nothing. Useful as a placeholder.
    pub fn noop() -> Self {
        Self {
            release: Mutex::new(None),
        }
    }

    /// Release the subscription. Safe to call any number of times; only the
    /// first call has an effect.
    pub fn dispose(&self) {
        let release = self.release.lock().take();
        if let Some(release) = release {
            release();
        }
    }

    /// Whether [`dispose`](Disposer::dispose) has already run.
    pub fn is_disposed(&self) -> bool {
        self.release.lock().is_none()
    }
}

impl std::fmt::Debug for Disposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposer")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
