//! Named state slices behind one provider and one accessor.
//!
//! Applications declare independent pieces of state as slices: plain
//! boxed values updated by setters, reducer-driven values updated by
//! actions, or delegates to an external store. A [`SliceSet`] composes
//! into a single provider; mounting it yields a [`ProviderScope`] whose
//! [`Accessor`] serves every slice through the same call, returning the
//! current value and a stable [`Dispatcher`].
//!
//! Slices can hydrate from persistent storage at mount, either
//! synchronously before the first read or deferred onto the async
//! runtime, and each slice can wrap its dispatches in middleware.
//!
//! ```
//! use serde_json::json;
//! use slicekit::{compose, Action, SliceConfig, SliceSet, Storage};
//!
//! let slices = SliceSet::new()
//!     .with(SliceConfig::boxed("count", json!(0)))
//!     .with(SliceConfig::with_reducer(
//!         "clicks",
//!         json!(0),
//!         |state, action| match action.kind.as_str() {
//!             "click" => json!(state.as_i64().unwrap_or(0) + 1),
//!             _ => state.clone(),
//!         },
//!     ));
//!
//! let scope = compose(slices, Storage::Disabled).mount();
//! let accessor = scope.accessor();
//!
//! accessor.dispatcher("count").set(json!(10))?;
//! accessor.dispatcher("clicks").dispatch(Action::new("click"))?;
//!
//! assert_eq!(accessor.value("count"), json!(10));
//! assert_eq!(accessor.value("clicks"), json!(1));
//! # Ok::<(), slicekit::DispatchError>(())
//! ```

mod accessor;
mod action;
mod compose;
mod error;
mod external;
mod hydration;
mod middleware;
mod reducer;
mod slice;
mod storage;
mod unit;

pub use crate::accessor::{Accessor, Subscription};
pub use crate::action::{Action, Payload, UpdateFn, HYDRATION_KIND, SET_KIND};
pub use crate::compose::{compose, Composition, ProviderScope};
pub use crate::error::DispatchError;
pub use crate::external::{Listener, StoreBackend, StoreSubscription};
pub use crate::hydration::{HydrationPhase, Persistence};
pub use crate::middleware::{LogMiddleware, Middleware, MiddlewareCtx, Next};
pub use crate::reducer::ReducerFn;
pub use crate::slice::{SliceConfig, SliceSet};
pub use crate::storage::{AsyncStorage, MemoryStorage, Storage, SyncStorage};
pub use crate::unit::{DispatchForm, Dispatcher};

/// JSON value type used for all slice state and action payloads.
pub type SliceValue = serde_json::Value;
