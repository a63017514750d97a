//! Writable Store
//!
//! The fundamental mutable store. It holds a value and pushes every change
//! to its subscribers.
//!
//! # Mutation rules
//!
//! 1. Setting a value equal to the current one is a no-op: zero
//!    notifications.
//!
//! 2. Otherwise the value is stored first, then every subscriber runs once,
//!    synchronously, in subscription order, before `set` returns.
//!
//! 3. `set` on a store that is mid-way through its own notification pass is
//!    rejected with [`Error::ReentrantMutation`].
//!
//! `set`, `update`, and `try_update` are the only mutation entry points.

use std::fmt::Debug;
use std::sync::Arc;

use super::raw::{Callback, RawStore};
use super::subscription::Disposer;
use super::Store;
use crate::error::{BoxError, Error};

/// A store whose value is driven by direct mutation.
///
/// Handles are cheap to clone and share one underlying store.
///
/// # Example
///
/// ```rust,ignore
/// use weft_core::store::{Store, Writable};
///
/// let count = Writable::new(0);
///
/// let disposer = count.subscribe(|n| println!("count: {n}"));
/// count.set(5)?;               // prints "count: 5"
/// count.update(|n| n + 1)?;    // prints "count: 6"
/// disposer.dispose();
/// ```
pub struct Writable<T> {
    raw: Arc<RawStore<T>>,
}

impl<T> Writable<T>
where
    T: PartialEq + Send + Sync + 'static,
{
    /// Create a writable store with the given initial value.
    pub fn new(initial: T) -> Self {
        Self {
            raw: RawStore::new(Some(initial), None),
        }
    }

    /// Store a new value and notify subscribers.
    ///
    /// A value equal to the current one produces no notifications.
    pub fn set(&self, value: T) -> Result<(), Error> {
        self.raw.set(value)
    }

    /// Compute a new value from the current one, then apply `set`'s rules
    /// to the result.
    pub fn update<F>(&self, f: F) -> Result<(), Error>
    where
        T: Clone,
        F: FnOnce(&T) -> T,
    {
        let current = self.get();
        self.raw.set(f(&current))
    }

    /// Fallible [`update`](Writable::update). The candidate is computed
    /// before any mutation; on failure the store is untouched and the error
    /// surfaces as [`Error::ComputationFailure`].
    pub fn try_update<F>(&self, f: F) -> Result<(), Error>
    where
        T: Clone,
        F: FnOnce(&T) -> Result<T, BoxError>,
    {
        let current = self.get();
        let candidate = f(&current).map_err(Error::ComputationFailure)?;
        self.raw.set(candidate)
    }

    /// Clone of the current value.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.raw
            .snapshot()
            .expect("writable store always holds a value")
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.raw.subscriber_count()
    }

    /// Whether the store currently has subscribers.
    pub fn is_active(&self) -> bool {
        self.raw.is_active()
    }
}

impl<T> Store<T> for Writable<T>
where
    T: PartialEq + Send + Sync + 'static,
{
    fn subscribe_with(&self, subscriber: Callback<T>) -> Disposer {
        RawStore::subscribe_with(&self.raw, subscriber)
    }
}

impl<T> Clone for Writable<T> {
    fn clone(&self) -> Self {
        Self {
            raw: Arc::clone(&self.raw),
        }
    }
}

impl<T> Debug for Writable<T>
where
    T: PartialEq + Clone + Debug + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writable")
            .field("value", &self.get())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Python Bindings
// ----------------------------------------------------------------------------

#[cfg(feature = "python")]
mod python {
    //! Thin Python surface over the writable-store contract.
    //!
    //! Python values compare by object identity here (the reference-type arm
    //! of the equality rule); value-equality semantics belong to the native
    //! typed API.

    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::{Arc, Weak};

    use indexmap::IndexMap;
    use parking_lot::RwLock;
    use pyo3::exceptions::{PyRuntimeError, PyTypeError};
    use pyo3::prelude::*;
    use pyo3::types::PyAny;

    use crate::error::Error;

    fn store_err(err: Error) -> PyErr {
        match err {
            Error::InvalidCallback => PyTypeError::new_err(err.to_string()),
            other => PyRuntimeError::new_err(other.to_string()),
        }
    }

    struct PyStoreInner {
        value: RwLock<Py<PyAny>>,
        subscribers: RwLock<IndexMap<u64, Py<PyAny>>>,
        notifying: AtomicBool,
        next_id: AtomicU64,
    }

    /// Python-exposed writable store.
    #[pyclass(name = "Writable")]
    pub struct PyWritable {
        inner: Arc<PyStoreInner>,
    }

    impl PyWritable {
        fn notify(&self, py: Python<'_>) -> PyResult<()> {
            let snapshot: Vec<(u64, Py<PyAny>)> = {
                let subscribers = self.inner.subscribers.read();
                subscribers
                    .iter()
                    .map(|(id, cb)| (*id, cb.clone_ref(py)))
                    .collect()
            };
            if snapshot.is_empty() {
                return Ok(());
            }

            self.inner.notifying.store(true, Ordering::Release);
            let result = (|| {
                for (id, callback) in snapshot {
                    if !self.inner.subscribers.read().contains_key(&id) {
                        continue;
                    }
                    let value = self.inner.value.read().clone_ref(py);
                    callback.call1(py, (value,))?;
                }
                Ok(())
            })();
            self.inner.notifying.store(false, Ordering::Release);
            result
        }
    }

    #[pymethods]
    impl PyWritable {
        /// Create a new writable store with the given initial value.
        #[new]
        fn new(value: PyObject) -> Self {
            Self {
                inner: Arc::new(PyStoreInner {
                    value: RwLock::new(value),
                    subscribers: RwLock::new(IndexMap::new()),
                    notifying: AtomicBool::new(false),
                    next_id: AtomicU64::new(0),
                }),
            }
        }

        /// Get the current value.
        #[getter]
        fn value(&self, py: Python<'_>) -> PyObject {
            self.inner.value.read().clone_ref(py).into()
        }

        /// Store a new value and notify subscribers.
        ///
        /// Setting the same object (by identity) is a no-op.
        fn set(&self, py: Python<'_>, value: PyObject) -> PyResult<()> {
            if self.inner.notifying.load(Ordering::Acquire) {
                return Err(store_err(Error::ReentrantMutation));
            }
            {
                let current = self.inner.value.read();
                if current.as_ptr() == value.as_ptr() {
                    return Ok(());
                }
            }
            *self.inner.value.write() = value;
            self.notify(py)
        }

        /// Register a callback and deliver the current value to it.
        ///
        /// Raises `TypeError` if the argument is not callable.
        fn subscribe(&self, py: Python<'_>, callback: PyObject) -> PyResult<PyDisposer> {
            if !callback.bind(py).is_callable() {
                return Err(store_err(Error::InvalidCallback));
            }

            let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
            self.inner
                .subscribers
                .write()
                .insert(id, callback.clone_ref(py));

            let value = self.inner.value.read().clone_ref(py);
            callback.call1(py, (value,))?;

            Ok(PyDisposer {
                inner: Arc::downgrade(&self.inner),
                id,
                disposed: AtomicBool::new(false),
            })
        }

        /// Get the number of subscribers.
        fn subscriber_count(&self) -> usize {
            self.inner.subscribers.read().len()
        }

        fn __repr__(&self, py: Python<'_>) -> String {
            let value = self.inner.value.read();
            let repr = value
                .bind(py)
                .repr()
                .map(|r| r.to_string())
                .unwrap_or_else(|_| "?".to_string());
            format!(
                "Writable(value={}, subscribers={})",
                repr,
                self.subscriber_count()
            )
        }
    }

    /// Idempotent release handle returned by `Writable.subscribe`.
    #[pyclass(name = "Disposer")]
    pub struct PyDisposer {
        inner: Weak<PyStoreInner>,
        id: u64,
        disposed: AtomicBool,
    }

    #[pymethods]
    impl PyDisposer {
        /// Release the subscription. Calling more than once has no further
        /// effect.
        fn dispose(&self, py: Python<'_>) {
            if self.disposed.swap(true, Ordering::AcqRel) {
                return;
            }
            if let Some(inner) = self.inner.upgrade() {
                // Removed callback is dropped here, under the GIL.
                let removed = inner.subscribers.write().shift_remove(&self.id);
                drop(removed);
            }
            let _ = py;
        }

        fn __call__(&self, py: Python<'_>) {
            self.dispose(py);
        }
    }
}

#[cfg(feature = "python")]
pub use python::{PyDisposer, PyWritable};

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
