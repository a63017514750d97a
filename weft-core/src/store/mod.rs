//! Store Primitives
//!
//! This module implements the observable-state core: writable, readable,
//! and derived stores, all speaking one subscription contract.
//!
//! # Concepts
//!
//! ## The store contract
//!
//! A store is anything with a single operation: `subscribe` a callback,
//! get the current value delivered immediately, receive every subsequent
//! change synchronously and in subscription order, and get back an
//! idempotent [`Disposer`]. The [`Store`] trait captures exactly that and
//! nothing else, so user-defined stores interoperate with the built-in
//! ones everywhere, including as upstreams of [`Derived`].
//!
//! ## Lazy activation
//!
//! Stores start and stop their machinery with demand: the subscriber count
//! crossing 0 -> 1 activates a store (a [`Readable`]'s producer starts, a
//! [`Derived`] subscribes to its upstreams), crossing 1 -> 0 deactivates
//! it. Activation is always balanced; no stop runs without a matching
//! prior start.
//!
//! ## Ownership
//!
//! `subscribe` returns a [`Disposer`] rather than registering into any
//! global state; whoever owns the disposer owns the subscription. A
//! [`TeardownScope`] collects disposers and teardown hooks so an owner can
//! release everything at one well-defined point.

mod derived;
mod raw;
mod readable;
mod subscription;
mod teardown;
mod writable;

use std::sync::Arc;

use parking_lot::Mutex;

pub use derived::Derived;
pub use raw::{Callback, Setter};
pub use readable::Readable;
pub use subscription::{Disposer, SubscriptionId};
pub use teardown::TeardownScope;
pub use writable::Writable;

#[cfg(feature = "python")]
pub use writable::{PyDisposer, PyWritable};

/// The store capability contract.
///
/// One required, object-safe operation. Implementing it makes any type a
/// full participant: consumer layers and [`Derived`] upstream lists accept
/// `dyn Store<T>` uniformly.
pub trait Store<T>: Send + Sync {
    /// Register a subscriber callback.
    ///
    /// The callback is invoked synchronously with the current value before
    /// this returns, then once per subsequent change, in subscription
    /// order. The returned disposer releases the subscription and is safe
    /// to call any number of times.
    fn subscribe_with(&self, subscriber: Callback<T>) -> Disposer;

    /// [`subscribe_with`](Store::subscribe_with) taking a plain closure.
    fn subscribe<F>(&self, f: F) -> Disposer
    where
        F: Fn(&T) + Send + Sync + 'static,
        Self: Sized,
    {
        self.subscribe_with(Arc::new(f))
    }
}

impl<T, S> Store<T> for Arc<S>
where
    S: Store<T> + ?Sized,
{
    fn subscribe_with(&self, subscriber: Callback<T>) -> Disposer {
        (**self).subscribe_with(subscriber)
    }
}

/// Read a store's current value through a one-shot subscription.
///
/// Subscribing forces activation, so a lazy [`Derived`] store computes a
/// fresh value even when it has no standing subscribers; the subscription
/// is released before this returns.
///
/// # Panics
///
/// Panics if the store holds no value yet, which only a setter-form
/// derived store whose producer has never pushed can exhibit.
pub fn get<T, S>(store: &S) -> T
where
    T: Clone + Send + Sync + 'static,
    S: Store<T> + ?Sized,
{
    let captured: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
    let slot = captured.clone();
    let disposer = store.subscribe_with(Arc::new(move |value: &T| {
        *slot.lock() = Some(value.clone());
    }));
    disposer.dispose();
    let value = captured.lock().take();
    value.expect("store holds no value yet")
}
