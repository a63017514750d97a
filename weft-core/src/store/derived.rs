//! Derived Store
//!
//! A store whose value is a function of one or more upstream stores.
//!
//! # Laziness
//!
//! A derived store with zero subscribers holds zero upstream subscriptions.
//! The first subscriber triggers activation: the store subscribes to every
//! upstream in declared order (their immediate-delivery contract fills the
//! value snapshot) and runs the combinator once for the initial value.
//! When the last subscriber leaves, every upstream subscription is
//! released, which propagates deactivation up chains of derived stores.
//!
//! # Recomputation
//!
//! Any single upstream notification triggers one immediate, synchronous
//! recomputation. Recomputations are not coalesced: if one external
//! mutation reaches this store along two upstream paths, the combinator
//! runs twice. Consumers that need glitch-free evaluation belong on the
//! statement scheduler, which runs each statement once per tick.
//!
//! # Setter form
//!
//! The setter form hands the combinator a [`Setter`] instead of using its
//! return value, for producers that resolve asynchronously. No in-flight
//! tracking is done: a second trigger before the producer pushes simply
//! invokes the combinator again, and the ordering of the resulting pushes
//! is whatever the producer does.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::raw::{Callback, RawStore, Setter, StartFn, StopFn};
use super::subscription::Disposer;
use super::Store;

/// A store computed from upstream stores.
///
/// # Example
///
/// ```rust,ignore
/// use weft_core::store::{Derived, Store, Writable};
///
/// let count = Writable::new(2);
/// let doubled = Derived::map(&count, |n| n * 2);
///
/// let disposer = doubled.subscribe(|n| println!("doubled: {n}"));
/// count.set(3)?; // prints "doubled: 6"
/// ```
pub struct Derived<T> {
    raw: Arc<RawStore<T>>,
}

impl<T> Derived<T>
where
    T: PartialEq + Send + Sync + 'static,
{
    /// Derive from upstreams with a combinator over their current values.
    ///
    /// The result passes through the equal-value rule: a recomputation that
    /// produces an equal value notifies nobody.
    pub fn new<U, F>(upstreams: Vec<Arc<dyn Store<U>>>, combine: F) -> Self
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(&[U]) -> T + Send + Sync + 'static,
    {
        Self::with_setter(upstreams, move |values, setter| {
            // A push can only fail as re-entrant, which would require this
            // store to be its own (transitive) upstream. There is no caller
            // to hand the error to from inside an upstream notification.
            if let Err(err) = setter.set(combine(values)) {
                tracing::error!(error = %err, "derived store dropped an update");
            }
        })
    }

    /// Derive with a combinator that pushes through a [`Setter`], possibly
    /// later, possibly never.
    ///
    /// Until the first push the store holds no value: subscribers receive
    /// no immediate delivery and [`get`](super::get) panics.
    pub fn with_setter<U, F>(upstreams: Vec<Arc<dyn Store<U>>>, combine: F) -> Self
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(&[U], &Setter<T>) + Send + Sync + 'static,
    {
        let combine = Arc::new(combine);
        let upstreams = Arc::new(upstreams);

        let start: StartFn<T> = Box::new(move |setter: Setter<T>| {
            // Fresh snapshot per activation; nothing survives a stop.
            let values: Arc<Mutex<Vec<Option<U>>>> =
                Arc::new(Mutex::new(vec![None; upstreams.len()]));
            let ready = Arc::new(AtomicBool::new(false));

            let mut disposers: SmallVec<[Disposer; 2]> = SmallVec::new();
            for (index, upstream) in upstreams.iter().enumerate() {
                let values = values.clone();
                let ready = ready.clone();
                let combine = combine.clone();
                let setter = setter.clone();
                disposers.push(upstream.subscribe_with(Arc::new(move |value: &U| {
                    values.lock()[index] = Some(value.clone());
                    if !ready.load(Ordering::Acquire) {
                        // Initial fill while subscriptions are being set up;
                        // the activation runs the combinator once afterwards.
                        return;
                    }
                    let current: Option<Vec<U>> = values.lock().iter().cloned().collect();
                    if let Some(current) = current {
                        combine(&current, &setter);
                    }
                })));
            }
            ready.store(true, Ordering::Release);

            let initial: Option<Vec<U>> = values.lock().iter().cloned().collect();
            if let Some(current) = initial {
                combine(&current, &setter);
            }

            Box::new(move || {
                for disposer in disposers {
                    disposer.dispose();
                }
            }) as StopFn
        });

        Self {
            raw: RawStore::new(None, Some(start)),
        }
    }

    /// Derive from a single upstream.
    pub fn map<U, S, F>(upstream: &S, f: F) -> Self
    where
        U: Clone + Send + Sync + 'static,
        S: Store<U> + Clone + 'static,
        F: Fn(&U) -> T + Send + Sync + 'static,
    {
        let upstream: Arc<dyn Store<U>> = Arc::new(upstream.clone());
        Self::new(vec![upstream], move |values| f(&values[0]))
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.raw.subscriber_count()
    }

    /// Whether the store currently holds upstream subscriptions.
    pub fn is_active(&self) -> bool {
        self.raw.is_active()
    }
}

impl<T> Store<T> for Derived<T>
where
    T: PartialEq + Send + Sync + 'static,
{
    fn subscribe_with(&self, subscriber: Callback<T>) -> Disposer {
        RawStore::subscribe_with(&self.raw, subscriber)
    }
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            raw: Arc::clone(&self.raw),
        }
    }
}

impl<T> Debug for Derived<T>
where
    T: PartialEq + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Derived")
            .field("active", &self.is_active())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::super::{get, Writable};
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn single_upstream_tracks_changes() {
        let count = Writable::new(2);
        let doubled = Derived::map(&count, |n: &i32| n * 2);

        let log: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let _d = doubled.subscribe(move |v| log_clone.lock().push(*v));
        assert_eq!(*log.lock(), vec![4]);

        count.set(3).unwrap();
        assert_eq!(*log.lock(), vec![4, 6]);
    }

    #[test]
    fn lazy_until_first_subscriber() {
        let count = Writable::new(1);
        let doubled = Derived::map(&count, |n: &i32| n * 2);

        assert_eq!(count.subscriber_count(), 0);
        assert!(!doubled.is_active());

        let d = doubled.subscribe(|_| {});
        assert_eq!(count.subscriber_count(), 1);
        assert!(doubled.is_active());

        d.dispose();
        assert_eq!(count.subscriber_count(), 0);
        assert!(!doubled.is_active());
    }

    #[test]
    fn deactivation_propagates_through_chains() {
        let base = Writable::new(1);
        let doubled = Derived::map(&base, |n: &i32| n * 2);
        let quadrupled = Derived::map(&doubled, |n: &i32| n * 2);

        let d = quadrupled.subscribe(|_| {});
        assert_eq!(base.subscriber_count(), 1);
        assert!(doubled.is_active());

        d.dispose();
        assert_eq!(base.subscriber_count(), 0);
        assert!(!doubled.is_active());
        assert!(!quadrupled.is_active());
    }

    #[test]
    fn multiple_upstreams_combine_in_declared_order() {
        let left = Writable::new(1);
        let right = Writable::new(10);
        let sum = Derived::new(
            vec![
                Arc::new(left.clone()) as Arc<dyn Store<i32>>,
                Arc::new(right.clone()) as Arc<dyn Store<i32>>,
            ],
            |values: &[i32]| values[0] + values[1],
        );

        let log: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let _d = sum.subscribe(move |v| log_clone.lock().push(*v));
        assert_eq!(*log.lock(), vec![11]);

        left.set(2).unwrap();
        right.set(20).unwrap();
        assert_eq!(*log.lock(), vec![11, 12, 22]);
    }

    #[test]
    fn equal_result_notifies_nobody() {
        let count = Writable::new(1);
        let parity = Derived::map(&count, |n: &i32| n % 2);

        let log: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let _d = parity.subscribe(move |v| log_clone.lock().push(*v));
        assert_eq!(*log.lock(), vec![1]);

        count.set(3).unwrap(); // parity unchanged
        assert_eq!(*log.lock(), vec![1]);

        count.set(4).unwrap();
        assert_eq!(*log.lock(), vec![1, 0]);
    }

    #[test]
    fn reactivation_recomputes_fresh() {
        let count = Writable::new(1);
        let doubled = Derived::map(&count, |n: &i32| n * 2);

        let d = doubled.subscribe(|_| {});
        d.dispose();

        // Changes while stopped are not observed...
        count.set(5).unwrap();

        // ...but re-activation computes from current upstream values.
        let log: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let _d2 = doubled.subscribe(move |v| log_clone.lock().push(*v));
        assert_eq!(*log.lock(), vec![10]);
    }

    #[test]
    fn setter_form_delivers_nothing_until_pushed() {
        let trigger = Writable::new(0);
        let pushed: Arc<Mutex<Vec<Setter<i32>>>> = Arc::new(Mutex::new(Vec::new()));

        let pushed_clone = pushed.clone();
        let deferred = Derived::with_setter(
            vec![Arc::new(trigger.clone()) as Arc<dyn Store<i32>>],
            move |_values: &[i32], setter: &Setter<i32>| {
                // Producer defers: stash the setter instead of pushing.
                pushed_clone.lock().push(setter.clone());
            },
        );

        let log: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let _d = deferred.subscribe(move |v| log_clone.lock().push(*v));

        // No value yet: no immediate delivery.
        assert!(log.lock().is_empty());

        // The producer resolves later.
        let setter = pushed.lock()[0].clone();
        setter.set(7).unwrap();
        assert_eq!(*log.lock(), vec![7]);
    }

    #[test]
    fn get_reads_through_a_one_shot_subscription() {
        let count = Writable::new(21);
        let doubled = Derived::map(&count, |n: &i32| n * 2);

        // No standing subscribers; get() activates, reads, releases.
        assert_eq!(get(&doubled), 42);
        assert_eq!(count.subscriber_count(), 0);
        assert!(!doubled.is_active());
    }
}
