//! The single read/dispatch surface over a mounted scope.
//!
//! An [`Accessor`] answers every query by slice name, never by slice
//! flavor: box-reduced, custom-reduced, and external slices all come
//! back as a value plus a [`Dispatcher`]. Unknown names and accessors
//! that outlive their scope degrade to an empty value and an inert
//! dispatcher instead of failing.

use std::sync::{Arc, Weak};

use serde::de::DeserializeOwned;
use tokio::sync::watch;

use crate::compose::ScopeRuntime;
use crate::hydration::HydrationPhase;
use crate::unit::{Dispatcher, MountedSlice};
use crate::SliceValue;

fn empty_object() -> SliceValue {
    SliceValue::Object(serde_json::Map::new())
}

/// Cloneable handle for reading and dispatching into a scope's slices.
#[derive(Clone, Debug)]
pub struct Accessor {
    runtime: Weak<ScopeRuntime>,
}

impl Accessor {
    pub(crate) fn new(runtime: Weak<ScopeRuntime>) -> Self {
        Self { runtime }
    }

    fn mounted(&self, name: &str) -> Option<Arc<MountedSlice>> {
        self.runtime.upgrade().and_then(|runtime| runtime.get(name).cloned())
    }

    /// Current value and dispatcher for `name`.
    ///
    /// The dispatcher is the same handle on every call for the lifetime
    /// of the mount. An unknown name, or a scope that is already gone,
    /// yields an empty object and an inert dispatcher.
    pub fn use_slice(&self, name: &str) -> (SliceValue, Dispatcher) {
        match self.mounted(name) {
            Some(mounted) => (mounted.value(), mounted.dispatcher()),
            None => {
                tracing::debug!(slice = %name, "slice not mounted, serving inert handle");
                (empty_object(), Dispatcher::inert(name))
            }
        }
    }

    /// [`Accessor::use_slice`] with a projection applied to the value.
    pub fn use_slice_with<T>(
        &self,
        name: &str,
        select: impl FnOnce(&SliceValue) -> T,
    ) -> (T, Dispatcher) {
        let (value, dispatcher) = self.use_slice(name);
        (select(&value), dispatcher)
    }

    /// Current value of `name`, or an empty object when not mounted.
    pub fn value(&self, name: &str) -> SliceValue {
        match self.mounted(name) {
            Some(mounted) => mounted.value(),
            None => empty_object(),
        }
    }

    /// Dispatcher for `name` without reading the value.
    pub fn dispatcher(&self, name: &str) -> Dispatcher {
        match self.mounted(name) {
            Some(mounted) => mounted.dispatcher(),
            None => Dispatcher::inert(name),
        }
    }

    /// Subscribe to value changes of `name`.
    pub fn subscribe(&self, name: &str) -> Subscription {
        Subscription {
            rx: self.mounted(name).map(|mounted| mounted.watch()),
        }
    }

    /// Hydration phase of `name` for the current mount.
    /// [`HydrationPhase::Uninitialized`] when the slice is not mounted.
    pub fn hydration_phase(&self, name: &str) -> HydrationPhase {
        match self.mounted(name) {
            Some(mounted) => mounted.phase(),
            None => HydrationPhase::Uninitialized,
        }
    }

    /// Wait until hydration of `name` reaches a terminal phase.
    ///
    /// Returns immediately for slices that are already settled, which
    /// includes every slice without persistence. If the scope unmounts
    /// while waiting, the last observed phase is returned.
    pub async fn hydration_settled(&self, name: &str) -> HydrationPhase {
        let mut rx = match self.mounted(name) {
            Some(mounted) => mounted.phase_watch(),
            None => return HydrationPhase::Uninitialized,
        };
        loop {
            let phase = *rx.borrow_and_update();
            if phase.is_settled() {
                return phase;
            }
            if rx.changed().await.is_err() {
                return *rx.borrow();
            }
        }
    }
}

/// Change feed for one slice's value.
///
/// Backed by a watch channel: only the latest value is retained, and a
/// dispatch that leaves the value unchanged does not wake the feed.
#[derive(Debug)]
pub struct Subscription {
    rx: Option<watch::Receiver<SliceValue>>,
}

impl Subscription {
    /// Latest published value, or an empty object for a detached feed.
    pub fn current(&self) -> SliceValue {
        match &self.rx {
            Some(rx) => rx.borrow().clone(),
            None => empty_object(),
        }
    }

    /// Latest published value deserialized into `T`.
    pub fn current_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.current())
    }

    /// Wait for the next change. Returns `false` once no further change
    /// can arrive, because the slice unmounted or the feed is detached.
    pub async fn changed(&mut self) -> bool {
        match &mut self.rx {
            Some(rx) => rx.changed().await.is_ok(),
            None => false,
        }
    }

    /// True when a change was published since this feed last observed
    /// one. Does not consume the change.
    pub fn has_changed(&self) -> bool {
        match &self.rx {
            Some(rx) => rx.has_changed().unwrap_or(false),
            None => false,
        }
    }
}
