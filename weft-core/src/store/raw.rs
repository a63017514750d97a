//! Shared store internals.
//!
//! Every store variant (writable, readable, derived) is a thin handle over
//! a [`RawStore`]: a value slot, an insertion-ordered subscriber registry,
//! and a lazy activation lifecycle driven by the subscriber count crossing
//! 0 <-> 1.
//!
//! # Notification
//!
//! A mutation stores the new value first, then invokes every registered
//! callback once, synchronously, in subscription order, before returning to
//! the mutator. The registry lock is released before any callback runs, so
//! callbacks may freely subscribe, dispose, or read. The one thing a
//! callback may not do is mutate the store that is currently notifying it;
//! that is rejected with [`Error::ReentrantMutation`] instead of recursing.
//!
//! # Activation
//!
//! A store constructed with a `start` function invokes it fresh on every
//! Stopped -> Active transition and runs the returned `stop` closure exactly
//! once on the way back down. `start` runs *before* the first subscriber is
//! appended, so a value it pushes through its [`Setter`] is the value the
//! initial delivery observes.
//!
//! # Threads
//!
//! State is behind per-store locks, the "one exclusive lock per store"
//! serialization point. The model stays cooperative and synchronous: no
//! internal lock is held across a subscriber callback except the shared
//! read guard on the value slot, which callbacks may re-acquire.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use super::subscription::{Disposer, SubscriptionId};
use crate::error::Error;

/// A subscriber callback, invoked with a reference to the current value.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Producer closure run on every Stopped -> Active transition.
pub(crate) type StartFn<T> = Box<dyn Fn(Setter<T>) -> StopFn + Send + Sync>;

/// Teardown closure returned by a [`StartFn`], run exactly once on
/// Active -> Stopped.
pub(crate) type StopFn = Box<dyn FnOnce() + Send>;

/// The state shared by all handles to one store.
pub(crate) struct RawStore<T> {
    /// Current value. `None` only for a setter-form derived store whose
    /// producer has not pushed yet.
    value: RwLock<Option<T>>,

    /// Subscribers in registration order; insertion order is notification
    /// order.
    subscribers: RwLock<IndexMap<SubscriptionId, Callback<T>>>,

    /// Set while this store runs its own notification pass.
    notifying: AtomicBool,

    /// Producer invoked on each activation. `None` for writable stores.
    start: Option<StartFn<T>>,

    /// Stop returned by the most recent `start`. Present iff the store is
    /// active and has a producer.
    stop: Mutex<Option<StopFn>>,

    /// Whether the store currently has subscribers.
    active: AtomicBool,
}

/// Resets the notifying flag when the pass ends, including by unwind.
struct NotifyGuard<'a>(&'a AtomicBool);

impl<'a> NotifyGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for NotifyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<T> RawStore<T>
where
    T: Send + Sync + 'static,
{
    /// Create a store with an optional initial value and optional producer.
    pub(crate) fn new(initial: Option<T>, start: Option<StartFn<T>>) -> Arc<Self> {
        Arc::new(Self {
            value: RwLock::new(initial),
            subscribers: RwLock::new(IndexMap::new()),
            notifying: AtomicBool::new(false),
            start,
            stop: Mutex::new(None),
            active: AtomicBool::new(false),
        })
    }

    /// Store `value` and notify, unless it equals the current value.
    ///
    /// Fails with [`Error::ReentrantMutation`] when called from inside this
    /// store's own notification pass, before any state changes.
    pub(crate) fn set(&self, value: T) -> Result<(), Error>
    where
        T: PartialEq,
    {
        if self.notifying.load(Ordering::Acquire) {
            return Err(Error::ReentrantMutation);
        }

        {
            let current = self.value.read();
            if current.as_ref() == Some(&value) {
                return Ok(());
            }
        }

        *self.value.write() = Some(value);
        self.notify();
        Ok(())
    }

    /// Invoke every registered subscriber with the current value, in
    /// subscription order.
    fn notify(&self) {
        // Snapshot the registry, then release its lock before any callback
        // runs. Subscribers added mid-pass are not in the snapshot;
        // subscribers disposed mid-pass are skipped by the liveness check.
        let snapshot: Vec<(SubscriptionId, Callback<T>)> = {
            let subscribers = self.subscribers.read();
            subscribers
                .iter()
                .map(|(id, callback)| (*id, callback.clone()))
                .collect()
        };

        if snapshot.is_empty() {
            return;
        }

        let _guard = NotifyGuard::enter(&self.notifying);

        for (id, callback) in snapshot {
            if !self.subscribers.read().contains_key(&id) {
                continue;
            }
            let value = self.value.read();
            if let Some(value) = value.as_ref() {
                callback(value);
            }
        }
    }

    /// Register a subscriber and deliver the current value to it.
    ///
    /// If this is the first subscriber, activation runs before the initial
    /// delivery, so the value delivered reflects anything the producer
    /// pushed. The subscriber is appended after its initial delivery; a
    /// notification pass triggered from inside that delivery does not reach
    /// it.
    pub(crate) fn subscribe_with(this: &Arc<Self>, callback: Callback<T>) -> Disposer {
        if !this.is_active() {
            Self::activate(this);
        }

        {
            let value = this.value.read();
            if let Some(value) = value.as_ref() {
                callback(value);
            }
        }

        let id = SubscriptionId::new();
        this.subscribers.write().insert(id, callback);
        tracing::trace!(
            subscribers = this.subscriber_count(),
            "store subscriber added"
        );

        let store = Arc::downgrade(this);
        Disposer::new(move || {
            if let Some(store) = store.upgrade() {
                store.unsubscribe(id);
            }
        })
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let became_empty = {
            let mut subscribers = self.subscribers.write();
            subscribers.shift_remove(&id).is_some() && subscribers.is_empty()
        };
        tracing::trace!(
            subscribers = self.subscriber_count(),
            "store subscriber removed"
        );
        if became_empty {
            self.deactivate();
        }
    }

    /// Stopped -> Active. Runs the producer, if any, with a fresh setter.
    fn activate(this: &Arc<Self>) {
        this.active.store(true, Ordering::Release);
        if let Some(start) = &this.start {
            let setter = Setter {
                store: Arc::downgrade(this),
            };
            let stop = start(setter);
            *this.stop.lock() = Some(stop);
        }
        tracing::trace!("store activated");
    }

    /// Active -> Stopped. Runs the stop from the most recent activation
    /// exactly once.
    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
        let stop = self.stop.lock().take();
        if let Some(stop) = stop {
            stop();
        }
        tracing::trace!("store deactivated");
    }

    /// Clone of the current value, if one has been produced.
    pub(crate) fn snapshot(&self) -> Option<T>
    where
        T: Clone,
    {
        self.value.read().clone()
    }

    /// Number of registered subscribers.
    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Whether the store currently has subscribers.
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl<T> Drop for RawStore<T> {
    fn drop(&mut self) {
        // A store dropped while active still owes its producer a stop.
        if let Some(stop) = self.stop.get_mut().take() {
            stop();
        }
    }
}

/// Clonable push handle held by producers.
///
/// The only way a `start` function or a derived-store combinator feeds
/// values into its store. Each push goes through the full mutation rules:
/// equal values are dropped, subscribers are notified synchronously in
/// order. Holds only a weak reference; pushing after the store is gone is a
/// no-op.
pub struct Setter<T> {
    store: Weak<RawStore<T>>,
}

impl<T> Setter<T>
where
    T: PartialEq + Send + Sync + 'static,
{
    /// Push a new value into the store.
    pub fn set(&self, value: T) -> Result<(), Error> {
        match self.store.upgrade() {
            Some(store) => store.set(value),
            None => Ok(()),
        }
    }
}

impl<T> Clone for Setter<T> {
    fn clone(&self) -> Self {
        Self {
            store: Weak::clone(&self.store),
        }
    }
}

impl<T> std::fmt::Debug for Setter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Setter")
            .field("live", &(self.store.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn collect<T: Clone + Send + Sync + 'static>(log: &Arc<Mutex<Vec<T>>>) -> Callback<T> {
        let log = log.clone();
        Arc::new(move |value: &T| log.lock().push(value.clone()))
    }

    #[test]
    fn subscribe_delivers_current_value_immediately() {
        let store = RawStore::new(Some(7), None);
        let log = Arc::new(Mutex::new(Vec::new()));

        let _d = RawStore::subscribe_with(&store, collect(&log));
        assert_eq!(*log.lock(), vec![7]);
    }

    #[test]
    fn set_notifies_in_subscription_order() {
        let store = RawStore::new(Some(0), None);
        let order = Arc::new(Mutex::new(Vec::new()));

        let order_a = order.clone();
        let _a = RawStore::subscribe_with(&store, Arc::new(move |v: &i32| order_a.lock().push(("a", *v))));
        let order_b = order.clone();
        let _b = RawStore::subscribe_with(&store, Arc::new(move |v: &i32| order_b.lock().push(("b", *v))));

        store.set(1).unwrap();
        assert_eq!(
            *order.lock(),
            vec![("a", 0), ("b", 0), ("a", 1), ("b", 1)]
        );
    }

    #[test]
    fn equal_value_produces_no_notification() {
        let store = RawStore::new(Some(5), None);
        let log = Arc::new(Mutex::new(Vec::new()));
        let _d = RawStore::subscribe_with(&store, collect(&log));

        store.set(5).unwrap();
        assert_eq!(*log.lock(), vec![5]);
    }

    #[test]
    fn reentrant_set_is_rejected() {
        let store = RawStore::new(Some(0), None);
        let errors = Arc::new(AtomicI32::new(0));

        let inner = store.clone();
        let errors_clone = errors.clone();
        let _d = RawStore::subscribe_with(&store, Arc::new(move |v: &i32| {
            if *v == 1 {
                match inner.set(2) {
                    Err(Error::ReentrantMutation) => {
                        errors_clone.fetch_add(1, Ordering::SeqCst);
                    }
                    other => panic!("expected ReentrantMutation, got {:?}", other.err()),
                }
            }
        }));

        store.set(1).unwrap();
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        // The rejected mutation left the value alone.
        assert_eq!(store.snapshot(), Some(1));
    }

    #[test]
    fn activation_runs_start_before_initial_delivery() {
        let start: StartFn<i32> = Box::new(|setter: Setter<i32>| {
            setter.set(42).unwrap();
            Box::new(|| {})
        });
        let store = RawStore::new(Some(0), Some(start));
        let log = Arc::new(Mutex::new(Vec::new()));

        let _d = RawStore::subscribe_with(&store, collect(&log));
        // The initial delivery observes the value the producer pushed.
        assert_eq!(*log.lock(), vec![42]);
    }

    #[test]
    fn stop_runs_once_when_last_subscriber_leaves() {
        let stops = Arc::new(AtomicI32::new(0));
        let stops_clone = stops.clone();
        let start: StartFn<i32> = Box::new(move |_setter| {
            let stops = stops_clone.clone();
            Box::new(move || {
                stops.fetch_add(1, Ordering::SeqCst);
            }) as StopFn
        });
        let store = RawStore::new(Some(0), Some(start));

        let a = RawStore::subscribe_with(&store, Arc::new(|_: &i32| {}));
        let b = RawStore::subscribe_with(&store, Arc::new(|_: &i32| {}));
        assert!(store.is_active());

        a.dispose();
        assert_eq!(stops.load(Ordering::SeqCst), 0);

        b.dispose();
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert!(!store.is_active());

        // Disposing again changes nothing.
        b.dispose();
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_while_active_runs_stop() {
        let stops = Arc::new(AtomicI32::new(0));
        let stops_clone = stops.clone();
        let start: StartFn<i32> = Box::new(move |_setter| {
            let stops = stops_clone.clone();
            Box::new(move || {
                stops.fetch_add(1, Ordering::SeqCst);
            }) as StopFn
        });
        let store = RawStore::new(Some(0), Some(start));

        let _d = RawStore::subscribe_with(&store, Arc::new(|_: &i32| {}));
        drop(store);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disposed_mid_pass_subscriber_is_skipped() {
        let store = RawStore::new(Some(0), None);
        let log = Arc::new(Mutex::new(Vec::new()));

        // First subscriber disposes the second during the pass.
        let slot: Arc<Mutex<Option<Disposer>>> = Arc::new(Mutex::new(None));
        let slot_clone = slot.clone();
        let _a = RawStore::subscribe_with(&store, Arc::new(move |v: &i32| {
            if *v == 1 {
                if let Some(d) = slot_clone.lock().take() {
                    d.dispose();
                }
            }
        }));
        let log_b = log.clone();
        let b = RawStore::subscribe_with(&store, Arc::new(move |v: &i32| log_b.lock().push(*v)));
        *slot.lock() = Some(b);

        store.set(1).unwrap();
        // b saw the initial 0 but not the 1 it was disposed ahead of.
        assert_eq!(*log.lock(), vec![0]);
    }
}
