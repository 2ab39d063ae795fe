//! Slice declarations and the set that feeds composition.
//!
//! A [`SliceConfig`] fixes a slice's reduction strategy at declaration
//! time: box-reduced (plain set-style updates), custom-reduced, or
//! delegated to an external store. Persistence and middleware are layered
//! on through the builder. A [`SliceSet`] collects configs by name with
//! last-declaration-wins semantics.

use std::fmt;
use std::sync::Arc;

use crate::action::Action;
use crate::external::StoreBackend;
use crate::hydration::Persistence;
use crate::middleware::Middleware;
use crate::reducer::ReducerKind;
use crate::SliceValue;

/// Where a freshly mounted slice gets its starting value.
pub(crate) enum InitialState {
    Value(SliceValue),
    /// Evaluated once per mount, so remounts restart from a fresh value.
    Init(Arc<dyn Fn() -> SliceValue + Send + Sync>),
}

impl InitialState {
    pub(crate) fn resolve(&self) -> SliceValue {
        match self {
            InitialState::Value(value) => value.clone(),
            InitialState::Init(init) => init(),
        }
    }
}

/// Declaration of one named slice.
pub struct SliceConfig {
    pub(crate) name: String,
    pub(crate) kind: ReducerKind,
    pub(crate) initial: InitialState,
    pub(crate) persistence: Persistence,
    pub(crate) middleware: Vec<Arc<dyn Middleware>>,
}

impl SliceConfig {
    fn new(name: impl Into<String>, kind: ReducerKind, initial: InitialState) -> Self {
        Self {
            name: name.into(),
            kind,
            initial,
            persistence: Persistence::Disabled,
            middleware: Vec::new(),
        }
    }

    /// A slice without a reducer of its own: dispatches carry the next
    /// value (or an update closure) directly.
    pub fn boxed(name: impl Into<String>, initial: SliceValue) -> Self {
        Self::new(name, ReducerKind::Boxed, InitialState::Value(initial))
    }

    /// Like [`SliceConfig::boxed`], but the initial value is produced by
    /// a closure evaluated on every mount.
    pub fn boxed_with(
        name: impl Into<String>,
        init: impl Fn() -> SliceValue + Send + Sync + 'static,
    ) -> Self {
        Self::new(
            name,
            ReducerKind::Boxed,
            InitialState::Init(Arc::new(init)),
        )
    }

    /// A slice whose transitions are computed by `reducer`.
    pub fn with_reducer(
        name: impl Into<String>,
        initial: SliceValue,
        reducer: impl Fn(&SliceValue, &Action) -> SliceValue + Send + Sync + 'static,
    ) -> Self {
        Self::new(
            name,
            ReducerKind::Custom(Arc::new(reducer)),
            InitialState::Value(initial),
        )
    }

    /// A slice backed by an external store. State and reduction live in
    /// the backend; this library only routes actions and republishes the
    /// backend's snapshots.
    pub fn external(name: impl Into<String>, backend: Arc<dyn StoreBackend>) -> Self {
        Self::new(
            name,
            ReducerKind::External(backend),
            InitialState::Value(SliceValue::Null),
        )
    }

    /// Persist the whole slice value under a key named after the slice.
    pub fn persist_whole(mut self) -> Self {
        self.persistence = Persistence::WholeValue;
        self
    }

    /// Persist the listed object fields, one storage key each.
    pub fn persist_keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.persistence = Persistence::Keys(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Append a middleware. Middleware run in the order they were added,
    /// first added outermost.
    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn kind_label(&self) -> &'static str {
        match self.kind {
            ReducerKind::Boxed => "boxed",
            ReducerKind::Custom(_) => "custom",
            ReducerKind::External(_) => "external",
        }
    }
}

impl fmt::Debug for SliceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SliceConfig")
            .field("name", &self.name)
            .field("kind", &self.kind_label())
            .field("persistence", &self.persistence)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

/// Ordered collection of slice declarations.
///
/// Order is registration order and decides provider nesting and
/// hydration order later. Redeclaring a name keeps the original
/// position but swaps in the newer config.
#[derive(Debug, Default)]
pub struct SliceSet {
    entries: Vec<SliceConfig>,
}

impl SliceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`SliceSet::insert`].
    pub fn with(mut self, config: SliceConfig) -> Self {
        self.insert(config);
        self
    }

    pub fn insert(&mut self, config: SliceConfig) {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|entry| entry.name == config.name)
        {
            tracing::warn!(
                slice = %config.name,
                "slice declared twice, later declaration wins"
            );
            *existing = config;
        } else {
            self.entries.push(config);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn into_entries(self) -> Vec<SliceConfig> {
        self.entries
    }
}
