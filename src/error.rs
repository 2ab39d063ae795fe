//! Error types surfaced by the dispatch path.
//!
//! Configuration problems never become errors here: duplicate names,
//! unknown slices, and reads without a mounted provider all degrade to
//! inert or empty results (logged at warn level). The only fallible
//! operation from the caller's point of view is dispatching through a
//! middleware chain that rejects the action.

use thiserror::Error;

/// Errors that can occur while dispatching an action.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A middleware failed or rejected the action. Delivery was aborted
    /// before the reducer ran; slice state is unchanged.
    #[error("middleware aborted action '{kind}'")]
    Middleware {
        /// Kind of the action that was aborted.
        kind: String,
        #[source]
        source: anyhow::Error,
    },
}
