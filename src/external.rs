//! Delegation to an external global-store implementation.
//!
//! Some applications keep part of their state in a store that lives
//! outside this crate. Such slices declare an external backend instead of
//! a reducer; the unified accessor then reads and dispatches through the
//! same surface as local slices, never branching on where the state
//! actually lives.

use std::sync::Arc;

use crate::action::Action;
use crate::SliceValue;

/// Listener invoked by a backend every time its state changes.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Uniform read/dispatch capability over an external store.
///
/// The crate calls `snapshot` for reads, forwards actions to `dispatch`
/// unchanged (per-slice middleware does not apply; the backend owns its
/// own dispatch pipeline), and holds one subscription per mount to keep
/// the slice's state channel in step with the store.
pub trait StoreBackend: Send + Sync {
    /// Current state owned by the backend.
    fn snapshot(&self) -> SliceValue;

    /// Deliver an action to the backend's own update pipeline.
    fn dispatch(&self, action: Action);

    /// Register a change listener. The listener may be called from any
    /// thread. Dropping the returned guard must unregister it.
    fn subscribe(&self, listener: Listener) -> Box<dyn StoreSubscription>;
}

/// Guard for one backend subscription; drop to unsubscribe.
pub trait StoreSubscription: Send {}
