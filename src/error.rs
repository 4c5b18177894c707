//! Error type shared by the crate.
//!
//! Most operations on indicators are deliberately infallible: updating or closing an
//! indicator that is already gone is a no-op. Errors are reserved for caller mistakes
//! and for resource exhaustion when starting a render thread.

use std::io;

/// Errors reported by `livebar`.
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    /// An absolute position would move the completed count backwards.
    #[error("completed count cannot decrease (current {current}, requested {requested})")]
    Regression {
        /// The count currently recorded.
        current: u64,
        /// The count the caller asked for.
        requested: u64,
    },

    /// The background render thread could not be spawned.
    #[error("failed to spawn the render thread")]
    Spawn(#[source] io::Error),
}
