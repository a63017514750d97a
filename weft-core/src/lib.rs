//! Weft Core
//!
//! This crate provides the store and reactivity core for the Weft UI
//! framework. It implements:
//!
//! - Store primitives (writable, readable, derived) with one structural
//!   subscription contract
//! - Subscriber-count-driven lazy activation with balanced start/stop
//! - Owner-scoped subscription teardown
//! - A dependency-ordered reactive statement scheduler
//!
//! The crate is designed to be used both as a native Rust library and,
//! behind the `python` feature, as a Python extension module via PyO3.
//!
//! # Architecture
//!
//! The crate is organized into a few modules:
//!
//! - `store`: the store primitives and subscription lifecycle
//! - `scheduler`: cells, statements, and the tick flush
//! - `error`: the error taxonomy shared by both
//!
//! Rendering, templating, and event dispatch live in the framework layers
//! on top; they consume this crate only through the `Store` contract, the
//! mutation entry points, and teardown registration.
//!
//! # Example
//!
//! ```rust,ignore
//! use weft_core::store::{Derived, Store, Writable};
//!
//! // Create a writable store
//! let count = Writable::new(0);
//!
//! // Create a derived value
//! let doubled = Derived::map(&count, |n| n * 2);
//!
//! // Subscribe; the callback runs immediately with the current value
//! let disposer = doubled.subscribe(|n| {
//!     println!("doubled: {n}");
//! });
//!
//! // Update the store
//! count.set(5)?; // prints: "doubled: 10"
//!
//! disposer.dispose();
//! ```

pub mod error;
pub mod scheduler;
pub mod store;

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// Python module definition.
///
/// This function is called by Python when importing the module.
/// It registers all Python-exposed types.
#[cfg(feature = "python")]
#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Register store primitives
    m.add_class::<store::PyWritable>()?;
    m.add_class::<store::PyDisposer>()?;

    // Add version info
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}
