//! Readable Store
//!
//! A store whose value is driven by an external producer rather than by
//! direct mutation. The producer is a `start` function supplied at
//! construction: it runs on every Stopped -> Active transition, receives a
//! [`Setter`] as its only write path, and returns a `stop` closure that
//! runs exactly once on the way back to Stopped.
//!
//! Re-activation after a full stop calls `start` again, fresh; nothing from
//! a previous activation is reused. Typical producers register a timer or
//! an event-source listener in `start` and unregister it in `stop`.

use std::fmt::Debug;
use std::sync::Arc;

use super::raw::{Callback, RawStore, Setter, StartFn, StopFn};
use super::subscription::Disposer;
use super::Store;

/// A store fed by a `start`/`stop` producer pair.
///
/// # Example
///
/// ```rust,ignore
/// use weft_core::store::{Readable, Store};
///
/// let ticks = Readable::new(0u64, |setter| {
///     let timer = host::interval(1_000, move |n| {
///         let _ = setter.set(n);
///     });
///     move || timer.cancel()
/// });
///
/// // `start` runs when the first subscriber arrives, `stop` when the
/// // last one leaves.
/// let disposer = ticks.subscribe(|n| println!("tick {n}"));
/// ```
pub struct Readable<T> {
    raw: Arc<RawStore<T>>,
}

impl<T> Readable<T>
where
    T: PartialEq + Send + Sync + 'static,
{
    /// Create a readable store with an initial value and a producer.
    ///
    /// `start` is invoked fresh on every Stopped -> Active transition; the
    /// closure it returns is invoked exactly once on every Active ->
    /// Stopped transition.
    pub fn new<F, S>(initial: T, start: F) -> Self
    where
        F: Fn(Setter<T>) -> S + Send + Sync + 'static,
        S: FnOnce() + Send + 'static,
    {
        let start: StartFn<T> = Box::new(move |setter| Box::new(start(setter)) as StopFn);
        Self {
            raw: RawStore::new(Some(initial), Some(start)),
        }
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.raw.subscriber_count()
    }

    /// Whether the producer is currently running.
    pub fn is_active(&self) -> bool {
        self.raw.is_active()
    }
}

impl<T> Store<T> for Readable<T>
where
    T: PartialEq + Send + Sync + 'static,
{
    fn subscribe_with(&self, subscriber: Callback<T>) -> Disposer {
        RawStore::subscribe_with(&self.raw, subscriber)
    }
}

impl<T> Clone for Readable<T> {
    fn clone(&self) -> Self {
        Self {
            raw: Arc::clone(&self.raw),
        }
    }
}

impl<T> Debug for Readable<T>
where
    T: PartialEq + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Readable")
            .field("active", &self.is_active())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
