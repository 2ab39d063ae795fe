//! Actions: tagged messages describing intended state transitions.
//!
//! Every update to a slice travels as an [`Action`] through that slice's
//! middleware chain and reducer. Payloads are either plain JSON values or
//! updater closures (the `set(prev -> next)` convenience of boxed slices).

use std::fmt;
use std::sync::Arc;

use crate::SliceValue;

/// Action kind recognized by the default box reducer.
///
/// A payload value replaces the slice state; an updater payload maps the
/// previous state to the next one. Custom reducers are free to handle or
/// ignore this kind like any other.
pub const SET_KIND: &str = "SET";

/// Reserved action kind carrying a resolved hydration payload.
///
/// The crate dispatches exactly one action of this kind per mounted slice
/// when persisted values finish loading. Caller contract: user-defined
/// action kinds must never equal this value. A collision is undefined
/// behavior, since the update path treats the payload as storage data and
/// merges it before the reducer runs.
pub const HYDRATION_KIND: &str = "__SLICE_HYDRATE__";

/// Updater closure applied to the previous slice value.
pub type UpdateFn = dyn Fn(&SliceValue) -> SliceValue + Send + Sync;

/// Payload carried by an [`Action`].
#[derive(Clone)]
pub enum Payload {
    /// A literal JSON value.
    Json(SliceValue),
    /// A closure mapping the previous value to the next one. Applied
    /// atomically against current state inside the raw update step.
    Update(Arc<UpdateFn>),
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Payload::Update(_) => f.write_str("Update(<closure>)"),
        }
    }
}

/// A tagged message describing an intended state transition.
#[derive(Clone, Debug)]
pub struct Action {
    /// Discriminates how the reducer interprets this action.
    pub kind: String,
    /// Optional payload; interpretation is up to the reducer.
    pub payload: Option<Payload>,
}

impl Action {
    /// Build an action with no payload.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: None,
        }
    }

    /// Build an action carrying a JSON payload.
    pub fn with_payload(kind: impl Into<String>, payload: impl Into<SliceValue>) -> Self {
        Self {
            kind: kind.into(),
            payload: Some(Payload::Json(payload.into())),
        }
    }

    /// `SET` action replacing the slice value with a literal.
    pub fn set(value: impl Into<SliceValue>) -> Self {
        Self::with_payload(SET_KIND, value)
    }

    /// `SET` action mapping the previous value through `update`.
    pub fn set_with<F>(update: F) -> Self
    where
        F: Fn(&SliceValue) -> SliceValue + Send + Sync + 'static,
    {
        Self {
            kind: SET_KIND.to_string(),
            payload: Some(Payload::Update(Arc::new(update))),
        }
    }

    /// Internal hydration action carrying the collected persisted values.
    pub(crate) fn hydrate(payload: SliceValue) -> Self {
        Self::with_payload(HYDRATION_KIND, payload)
    }

    /// True for the reserved hydration action.
    ///
    /// Custom reducers may use this to post-process restored state; the
    /// default behavior of ignoring unknown kinds already handles it.
    pub fn is_hydration(&self) -> bool {
        self.kind == HYDRATION_KIND
    }
}
