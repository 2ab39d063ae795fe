//! Reducers: pure functions computing the next slice state.
//!
//! Each slice resolves to exactly one reducer kind at registration time.
//! Boxed slices get the synthesized `SET` reducer, custom slices run a
//! caller-supplied closure, and external slices delegate reduction to
//! their store backend entirely.

use std::sync::Arc;

use crate::action::{Action, Payload, SET_KIND};
use crate::external::StoreBackend;
use crate::SliceValue;

/// Pure reducer closure: `(current state, action) -> next state`.
///
/// Must handle unknown action kinds by returning the state unchanged and
/// must not produce observable side effects. Reducers also see the
/// internal hydration action; the restored payload is merged before the
/// reducer runs, so treating it as unknown is the correct default.
pub type ReducerFn = dyn Fn(&SliceValue, &Action) -> SliceValue + Send + Sync;

/// How a slice computes state transitions. Resolved once when the slice
/// definition is built, never re-detected at dispatch time.
#[derive(Clone)]
pub(crate) enum ReducerKind {
    /// Default box reducer: `SET` replaces or maps the value.
    Boxed,
    /// Caller-supplied pure reducer.
    Custom(Arc<ReducerFn>),
    /// State lives in an external store; local reduction never runs.
    External(Arc<dyn StoreBackend>),
}

impl ReducerKind {
    pub(crate) fn backend(&self) -> Option<&Arc<dyn StoreBackend>> {
        match self {
            ReducerKind::External(backend) => Some(backend),
            _ => None,
        }
    }

    pub(crate) fn reduce(&self, state: &SliceValue, action: &Action) -> SliceValue {
        match self {
            ReducerKind::Boxed => box_reduce(state, action),
            ReducerKind::Custom(reducer) => reducer(state, action),
            // Delegated state is owned by the backend; identity here.
            ReducerKind::External(_) => state.clone(),
        }
    }
}

/// The synthesized reducer for boxed slices.
///
/// Recognizes exactly the `SET` kind: a JSON payload replaces the value,
/// an updater payload maps the previous value. Anything else, including a
/// `SET` with no payload, is a no-op.
pub(crate) fn box_reduce(state: &SliceValue, action: &Action) -> SliceValue {
    if action.kind != SET_KIND {
        return state.clone();
    }
    match &action.payload {
        Some(Payload::Json(value)) => value.clone(),
        Some(Payload::Update(update)) => update(state),
        None => state.clone(),
    }
}
