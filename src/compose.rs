//! Turning a slice set into one mountable provider.
//!
//! Composition happens once: every declaration becomes a [`SliceUnit`]
//! and the units are folded, last to first, into a single provider
//! closure. Mounting that provider walks the fold outermost first, so
//! slices come up in registration order, and the resulting
//! [`ProviderScope`] tears them down in reverse order when dropped.

use std::collections::HashMap;
use std::sync::Arc;

use crate::accessor::Accessor;
use crate::slice::SliceSet;
use crate::storage::Storage;
use crate::unit::{HydrationJob, MountedSlice, SliceUnit};

type Wrapper = Arc<dyn Fn(&mut MountCx) + Send + Sync>;

/// Accumulator threaded through the provider fold during a mount.
pub(crate) struct MountCx {
    storage: Storage,
    slices: HashMap<String, Arc<MountedSlice>>,
    order: Vec<String>,
    jobs: Vec<HydrationJob>,
}

impl MountCx {
    fn new(storage: Storage) -> Self {
        Self {
            storage,
            slices: HashMap::new(),
            order: Vec::new(),
            jobs: Vec::new(),
        }
    }

    fn storage(&self) -> &Storage {
        &self.storage
    }

    fn install(&mut self, name: &str, mounted: Arc<MountedSlice>, job: Option<HydrationJob>) {
        self.order.push(name.to_string());
        self.slices.insert(name.to_string(), mounted);
        if let Some(job) = job {
            self.jobs.push(job);
        }
    }
}

fn wrap_unit(unit: &Arc<SliceUnit>, inner: Wrapper) -> Wrapper {
    let unit = Arc::clone(unit);
    Arc::new(move |cx: &mut MountCx| {
        let (mounted, job) = unit.mount(cx.storage());
        cx.install(unit.name(), mounted, job);
        inner(cx);
    })
}

/// Build a [`Composition`] from a set of declarations.
///
/// This never fails; misconfigured declarations were already downgraded
/// with a warning when the set was built. An empty set composes into a
/// provider that mounts nothing.
pub fn compose(slices: SliceSet, storage: Storage) -> Composition {
    let units: Vec<Arc<SliceUnit>> = slices
        .into_entries()
        .into_iter()
        .map(SliceUnit::from_config)
        .collect();

    let neutral: Wrapper = Arc::new(|_cx: &mut MountCx| {});
    let provider = units
        .iter()
        .rfold(neutral, |inner, unit| wrap_unit(unit, inner));

    tracing::debug!(slices = units.len(), storage = ?storage, "composition built");
    Composition {
        units,
        provider,
        storage,
    }
}

/// All registered slices folded into a single mountable provider.
///
/// Cloning is cheap and mounts from clones are fully independent, each
/// with its own state.
#[derive(Clone)]
pub struct Composition {
    units: Vec<Arc<SliceUnit>>,
    provider: Wrapper,
    storage: Storage,
}

impl Composition {
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.units.iter().any(|unit| unit.name() == name)
    }

    /// Slice names in registration order.
    pub fn slice_names(&self) -> impl Iterator<Item = &str> {
        self.units.iter().map(|unit| unit.name())
    }

    /// Mount every slice and return the scope that keeps them alive.
    ///
    /// Deferred hydration jobs are spawned here, in registration order,
    /// on the current tokio runtime. Without a runtime context the jobs
    /// are abandoned with a warning and the affected slices settle as
    /// skipped; nothing else requires a runtime.
    pub fn mount(&self) -> ProviderScope {
        let mut cx = MountCx::new(self.storage.clone());
        (self.provider)(&mut cx);
        let MountCx {
            slices,
            order,
            jobs,
            ..
        } = cx;

        let runtime = Arc::new(ScopeRuntime { slices, order });

        if !jobs.is_empty() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    for job in jobs {
                        handle.spawn(job.run());
                    }
                }
                Err(_) => {
                    for job in jobs {
                        job.abandon();
                    }
                }
            }
        }

        ProviderScope { runtime }
    }
}

impl std::fmt::Debug for Composition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composition")
            .field("slices", &self.units.len())
            .field("storage", &self.storage)
            .finish()
    }
}

/// Mounted slices of one scope, keyed by name.
pub(crate) struct ScopeRuntime {
    slices: HashMap<String, Arc<MountedSlice>>,
    order: Vec<String>,
}

impl ScopeRuntime {
    pub(crate) fn get(&self, name: &str) -> Option<&Arc<MountedSlice>> {
        self.slices.get(name)
    }
}

impl Drop for ScopeRuntime {
    fn drop(&mut self) {
        // Teardown mirrors mount: last-mounted goes first.
        for name in self.order.iter().rev() {
            if let Some(mounted) = self.slices.remove(name) {
                mounted.detach();
            }
        }
    }
}

/// Live provider tree. Dropping it unmounts every slice.
///
/// Accessors handed out by the scope hold only a weak reference, so an
/// accessor outliving its scope degrades to inert reads and dispatches
/// instead of keeping the state alive.
pub struct ProviderScope {
    runtime: Arc<ScopeRuntime>,
}

impl ProviderScope {
    pub fn accessor(&self) -> Accessor {
        Accessor::new(Arc::downgrade(&self.runtime))
    }
}

impl std::fmt::Debug for ProviderScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderScope")
            .field("slices", &self.runtime.order)
            .finish()
    }
}
