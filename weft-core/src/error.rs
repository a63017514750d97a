//! Error Types
//!
//! All fallible operations in the crate surface one of the conditions in
//! [`Error`], synchronously, to the immediate caller. Nothing is queued or
//! deferred to a later tick: a failed `set` returns before any subscriber
//! has been notified, and a failed statement body aborts the remainder of
//! its flush on the spot.

use thiserror::Error;

/// Boxed error carried out of user-supplied computations (`try_update`
/// closures and statement bodies).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by the store primitives and the statement scheduler.
#[derive(Debug, Error)]
pub enum Error {
    /// A subscriber argument was not callable.
    ///
    /// The typed `subscribe` API makes this unrepresentable; it is produced
    /// by the dynamically-typed Python binding when handed a non-callable
    /// object.
    #[error("subscriber is not callable")]
    InvalidCallback,

    /// A store was mutated from within its own notification pass.
    ///
    /// Subscriber callbacks run synchronously; a callback that calls `set`
    /// on the store currently notifying it would recurse without bound.
    /// The mutation is rejected before any state changes. Mutating *other*
    /// stores from a callback is fine.
    #[error("store mutated from within its own notification pass")]
    ReentrantMutation,

    /// Registering the named statement would close a dependency cycle
    /// through two or more statements.
    ///
    /// Detected at registration time so a tick can never loop. A statement
    /// that reads a cell it also writes is not a cycle; it simply does not
    /// re-trigger itself within a flush.
    #[error("statement `{label}` closes a dependency cycle")]
    CyclicDependency {
        /// Label of the statement whose registration was rejected.
        label: String,
    },

    /// A user-supplied computation (`try_update` closure or statement body)
    /// failed. The store value is untouched; a flush is aborted after the
    /// failing statement.
    #[error("reactive computation failed: {0}")]
    ComputationFailure(BoxError),
}
