//! Per-slice runtime: mounts, state channels, and dispatchers.
//!
//! A [`SliceUnit`] is the long-lived description of one slice inside a
//! composition. Mounting it produces a [`MountedSlice`] that owns the
//! live state in a watch channel; unmounting is dropping that handle.
//! Deferred work (hydration in particular) holds only a weak handle to
//! its mount and rechecks it on completion, so a result landing after
//! teardown is discarded instead of written into dead state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::action::{Action, Payload};
use crate::error::DispatchError;
use crate::external::{Listener, StoreSubscription};
use crate::hydration::{self, HydrationPhase, Persistence};
use crate::middleware::{Middleware, MiddlewareCtx, Next};
use crate::reducer::ReducerKind;
use crate::slice::{InitialState, SliceConfig};
use crate::storage::{AsyncStorage, Storage};
use crate::SliceValue;

/// One slice's registration inside a composition.
pub(crate) struct SliceUnit {
    name: String,
    kind: ReducerKind,
    middleware: Vec<Arc<dyn Middleware>>,
    initial: InitialState,
    persistence: Persistence,
    /// Issues the id each mount logs under.
    generation: AtomicU64,
}

impl SliceUnit {
    pub(crate) fn from_config(config: SliceConfig) -> Arc<Self> {
        let SliceConfig {
            name,
            kind,
            initial,
            mut persistence,
            mut middleware,
        } = config;

        if matches!(kind, ReducerKind::External(_)) {
            // The backend owns reduction and storage for these slices.
            if !persistence.is_disabled() {
                tracing::warn!(slice = %name, "persistence on an external slice is ignored");
                persistence = Persistence::Disabled;
            }
            if !middleware.is_empty() {
                tracing::warn!(slice = %name, "middleware on an external slice is ignored");
                middleware.clear();
            }
        }

        Arc::new(Self {
            name,
            kind,
            middleware,
            initial,
            persistence,
            generation: AtomicU64::new(0),
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Bring the slice up for one provider scope.
    ///
    /// Synchronous persistence is folded into the seed value here, before
    /// the state channel exists, so no subscriber can observe the
    /// pre-hydration value. Deferred persistence returns a job for the
    /// caller to spawn once the whole tree is mounted.
    pub(crate) fn mount(
        self: &Arc<Self>,
        storage: &Storage,
    ) -> (Arc<MountedSlice>, Option<HydrationJob>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let seed = match &self.kind {
            ReducerKind::External(backend) => backend.snapshot(),
            _ => self.initial.resolve(),
        };

        let (seed, phase, deferred) = match (&self.persistence, storage) {
            (Persistence::Disabled, _) => (seed, HydrationPhase::Skipped, None),
            (_, Storage::Disabled) => {
                tracing::warn!(
                    slice = %self.name,
                    "slice declares persistence but no storage is configured"
                );
                (seed, HydrationPhase::Skipped, None)
            }
            (spec, Storage::Sync(sync)) => {
                match hydration::collect_sync(spec, &self.name, sync.as_ref()) {
                    Some(found) => (
                        hydration::merge_into(&seed, &found, spec),
                        HydrationPhase::Hydrated,
                        None,
                    ),
                    None => (seed, HydrationPhase::Skipped, None),
                }
            }
            (spec, Storage::Async(storage)) => (
                seed,
                HydrationPhase::LoadPending,
                Some((spec.clone(), Arc::clone(storage))),
            ),
        };

        let (tx, _) = watch::channel(seed);
        let (phase_tx, _) = watch::channel(phase);
        let mounted = Arc::new(MountedSlice {
            unit: Arc::clone(self),
            generation,
            detached: AtomicBool::new(false),
            tx,
            phase_tx,
            external_sub: Mutex::new(None),
            dispatcher: OnceLock::new(),
        });

        if let ReducerKind::External(backend) = &self.kind {
            let weak = Arc::downgrade(&mounted);
            let listener: Listener = Arc::new(move || {
                if let Some(mounted) = weak.upgrade() {
                    mounted.republish_external();
                }
            });
            *mounted.external_sub.lock() = Some(backend.subscribe(listener));
        }

        tracing::debug!(slice = %self.name, generation, phase = ?phase, "slice mounted");

        let job = deferred.map(|(spec, storage)| HydrationJob {
            name: self.name.clone(),
            slice: Arc::downgrade(&mounted),
            spec,
            storage,
        });
        (mounted, job)
    }
}

/// Live state of one slice for the duration of a mount.
///
/// Dropping the handle is the unmount: the state channel closes, the
/// external subscription (if any) is released, and dispatchers created
/// from this mount turn inert.
pub(crate) struct MountedSlice {
    unit: Arc<SliceUnit>,
    generation: u64,
    detached: AtomicBool,
    tx: watch::Sender<SliceValue>,
    phase_tx: watch::Sender<HydrationPhase>,
    external_sub: Mutex<Option<Box<dyn StoreSubscription>>>,
    dispatcher: OnceLock<Dispatcher>,
}

impl MountedSlice {
    /// Current value as the accessor reports it. External slices read
    /// the backend directly so dispatch-then-read never lags behind a
    /// listener notification.
    pub(crate) fn value(&self) -> SliceValue {
        match self.unit.kind.backend() {
            Some(backend) => backend.snapshot(),
            None => self.tx.borrow().clone(),
        }
    }

    pub(crate) fn watch(&self) -> watch::Receiver<SliceValue> {
        self.tx.subscribe()
    }

    pub(crate) fn phase(&self) -> HydrationPhase {
        *self.phase_tx.borrow()
    }

    pub(crate) fn phase_watch(&self) -> watch::Receiver<HydrationPhase> {
        self.phase_tx.subscribe()
    }

    /// Tear the mount out of its scope and release the external
    /// subscription. Deferred work that upgraded its handle while the
    /// scope was mid-drop sees the flag and discards its result.
    pub(crate) fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
        self.external_sub.lock().take();
    }

    fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    /// The one dispatcher handle for this mount. Every call returns a
    /// clone of the same handle, so callers can use handle identity to
    /// tell whether two dispatchers drive the same mount.
    pub(crate) fn dispatcher(self: &Arc<Self>) -> Dispatcher {
        self.dispatcher
            .get_or_init(|| {
                Dispatcher::new(
                    self.unit.name.clone(),
                    DispatchForm::for_kind(&self.unit.kind),
                    Target::Mounted(Arc::downgrade(self)),
                )
            })
            .clone()
    }

    /// Route one action. External slices forward to their backend;
    /// hydration deliveries skip the middleware chain; everything else
    /// walks the chain into the reducer.
    pub(crate) fn dispatch(&self, action: Action) -> Result<(), DispatchError> {
        if let Some(backend) = self.unit.kind.backend() {
            backend.dispatch(action);
            return Ok(());
        }
        if action.is_hydration() {
            self.apply_raw(action);
            self.settle(HydrationPhase::Hydrated);
            return Ok(());
        }
        dispatch_local(self, action)
    }

    /// Reduce and publish. Subscribers are only woken when the reduced
    /// value actually differs from the current one.
    fn apply_raw(&self, action: Action) {
        self.tx.send_if_modified(|state| {
            let next = if action.is_hydration() {
                match &action.payload {
                    Some(Payload::Json(found)) => {
                        let merged =
                            hydration::merge_into(state, found, &self.unit.persistence);
                        self.unit.kind.reduce(&merged, &action)
                    }
                    _ => return false,
                }
            } else {
                self.unit.kind.reduce(state, &action)
            };
            if next == *state {
                false
            } else {
                *state = next;
                true
            }
        });
    }

    /// Record the hydration outcome. Settled phases are terminal for the
    /// mount, so a late second outcome never flips the phase back.
    pub(crate) fn settle(&self, phase: HydrationPhase) {
        self.phase_tx.send_if_modified(|current| {
            if current.is_settled() || *current == phase {
                false
            } else {
                *current = phase;
                true
            }
        });
    }

    fn republish_external(&self) {
        let Some(backend) = self.unit.kind.backend() else {
            return;
        };
        let snapshot = backend.snapshot();
        self.tx.send_if_modified(|state| {
            if snapshot == *state {
                false
            } else {
                *state = snapshot.clone();
                true
            }
        });
    }
}

impl Drop for MountedSlice {
    fn drop(&mut self) {
        tracing::debug!(
            slice = %self.unit.name,
            generation = self.generation,
            "slice unmounted"
        );
    }
}

/// Walk the middleware chain front to back, ending at the reducer.
///
/// A middleware that redispatches re-enters the full chain, exactly as
/// an outside caller would.
fn dispatch_local(mounted: &MountedSlice, action: Action) -> Result<(), DispatchError> {
    let chain = mounted.unit.middleware.as_slice();
    if chain.is_empty() {
        mounted.apply_raw(action);
        return Ok(());
    }

    let kind = action.kind.clone();
    let peek = || mounted.tx.borrow().clone();
    let redispatch = |action: Action| mounted.dispatch(action);
    let raw = |action: Action| mounted.apply_raw(action);
    let ctx = MiddlewareCtx::new(mounted.unit.name.as_str(), &peek, &redispatch);
    Next::new(chain, &raw)
        .run(&ctx, action)
        .map_err(|source| DispatchError::Middleware { kind, source })
}

/// Deferred hydration for one mount, run on the async runtime after the
/// provider tree is up.
pub(crate) struct HydrationJob {
    name: String,
    slice: Weak<MountedSlice>,
    spec: Persistence,
    storage: Arc<dyn AsyncStorage>,
}

impl HydrationJob {
    pub(crate) async fn run(self) {
        let found = hydration::collect_async(&self.spec, &self.name, &self.storage).await;

        let mounted = match self.slice.upgrade() {
            Some(mounted) if !mounted.is_detached() => mounted,
            _ => {
                tracing::debug!(slice = %self.name, "hydration finished after unmount, discarding");
                return;
            }
        };

        match found {
            Some(found) => {
                let _ = mounted.dispatch(Action::hydrate(found));
            }
            None => mounted.settle(HydrationPhase::Skipped),
        }
    }

    /// Give up without reading storage and settle the mount as skipped.
    /// Used when no async runtime is available to run the job on.
    pub(crate) fn abandon(self) {
        tracing::warn!(
            slice = %self.name,
            "deferred storage requires an async runtime, skipping hydration"
        );
        if let Some(mounted) = self.slice.upgrade() {
            mounted.settle(HydrationPhase::Skipped);
        }
    }
}

/// What calling a dispatcher actually does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchForm {
    /// Boxed slice: `set` and `set_with` are the natural calls.
    Setter,
    /// Custom-reduced slice: actions go through the declared reducer.
    Reducer,
    /// Actions are forwarded to the external backend unchanged.
    External,
    /// Detached from any live slice; every dispatch is a no-op.
    Inert,
}

impl DispatchForm {
    fn for_kind(kind: &ReducerKind) -> Self {
        match kind {
            ReducerKind::Boxed => DispatchForm::Setter,
            ReducerKind::Custom(_) => DispatchForm::Reducer,
            ReducerKind::External(_) => DispatchForm::External,
        }
    }
}

#[derive(Debug)]
enum Target {
    Mounted(Weak<MountedSlice>),
    Inert,
}

#[derive(Debug)]
struct DispatcherInner {
    slice: String,
    form: DispatchForm,
    target: Target,
}

/// Handle for sending actions into one slice.
///
/// Cheap to clone and safe to hold across unmounts: once the mount it
/// came from is gone, dispatches are silently dropped rather than
/// failing. Only a middleware abort surfaces as an error.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    fn new(slice: String, form: DispatchForm, target: Target) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                slice,
                form,
                target,
            }),
        }
    }

    pub(crate) fn inert(slice: impl Into<String>) -> Self {
        Self::new(slice.into(), DispatchForm::Inert, Target::Inert)
    }

    /// Name of the slice this dispatcher addresses.
    pub fn slice(&self) -> &str {
        &self.inner.slice
    }

    pub fn form(&self) -> DispatchForm {
        self.inner.form
    }

    /// True when dispatching currently goes nowhere, either because the
    /// dispatcher was created detached or because its mount is gone.
    pub fn is_inert(&self) -> bool {
        match &self.inner.target {
            Target::Inert => true,
            Target::Mounted(weak) => weak.strong_count() == 0,
        }
    }

    /// Two handles driving the same mount compare equal here even after
    /// cloning.
    pub fn same_handle(&self, other: &Dispatcher) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Send an action into the slice.
    pub fn dispatch(&self, action: Action) -> Result<(), DispatchError> {
        let weak = match &self.inner.target {
            Target::Inert => {
                tracing::trace!(
                    slice = %self.inner.slice,
                    kind = %action.kind,
                    "dispatch on detached slice ignored"
                );
                return Ok(());
            }
            Target::Mounted(weak) => weak,
        };
        match weak.upgrade() {
            Some(mounted) => mounted.dispatch(action),
            None => {
                tracing::trace!(
                    slice = %self.inner.slice,
                    kind = %action.kind,
                    "dispatch after unmount ignored"
                );
                Ok(())
            }
        }
    }

    /// Replace the slice value.
    pub fn set(&self, value: impl Into<SliceValue>) -> Result<(), DispatchError> {
        self.dispatch(Action::set(value))
    }

    /// Update the slice value from its current one.
    pub fn set_with<F>(&self, update: F) -> Result<(), DispatchError>
    where
        F: Fn(&SliceValue) -> SliceValue + Send + Sync + 'static,
    {
        self.dispatch(Action::set_with(update))
    }
}
