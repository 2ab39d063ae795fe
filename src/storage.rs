//! Key-value persistence backends, seen from the hydrator's side.
//!
//! The crate never writes to storage and never implements a durable
//! backend. It only reads persisted values at mount time, through one of
//! two host-provided accessors: a synchronous one (consulted while the
//! provider mounts, blocking until the read completes) or an asynchronous
//! one (consulted after the subtree has mounted). Values are JSON text;
//! absent and malformed entries both mean "no persisted value".

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::SliceValue;

/// Synchronous key-value accessor.
///
/// `get_item` must return quickly; it runs inline while the provider
/// mounts and delays the first render of every inner slice.
pub trait SyncStorage: Send + Sync {
    /// Fetch the JSON text stored under `key`, if any.
    fn get_item(&self, key: &str) -> Option<String>;
}

/// Asynchronous key-value accessor.
///
/// Reads start once the provider subtree is fully mounted. A returned
/// error is treated exactly like an absent key (logged at warn level,
/// never fatal), so hosts can surface transient backend failures without
/// breaking hydration of other keys.
#[async_trait]
pub trait AsyncStorage: Send + Sync {
    /// Fetch the JSON text stored under `key`, if any.
    async fn get_item(&self, key: &str) -> anyhow::Result<Option<String>>;
}

/// Which persistence accessor a composition reads from.
#[derive(Clone, Default)]
pub enum Storage {
    /// No storage configured; persisted slices settle as skipped.
    #[default]
    Disabled,
    /// Blocking reads at mount time. Hydrated values are visible at the
    /// very first read of the slice.
    Sync(Arc<dyn SyncStorage>),
    /// Deferred reads after mount. State holds the declared initial value
    /// until the read resolves. Mounting a composition with this mode
    /// requires a running tokio runtime context.
    Async(Arc<dyn AsyncStorage>),
}

impl Storage {
    /// Wrap a synchronous accessor.
    pub fn sync(storage: impl SyncStorage + 'static) -> Self {
        Storage::Sync(Arc::new(storage))
    }

    /// Wrap an asynchronous accessor.
    pub fn deferred(storage: impl AsyncStorage + 'static) -> Self {
        Storage::Async(Arc::new(storage))
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Storage::Disabled => f.write_str("Storage::Disabled"),
            Storage::Sync(_) => f.write_str("Storage::Sync"),
            Storage::Async(_) => f.write_str("Storage::Async"),
        }
    }
}

/// In-memory storage for tests, examples, and ephemeral hosts.
///
/// Implements both accessor traits over the same map, so the same
/// fixture can exercise sync and deferred hydration.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw JSON text under `key`.
    pub fn insert(&self, key: impl Into<String>, raw: impl Into<String>) {
        self.entries.write().insert(key.into(), raw.into());
    }

    /// Serialize `value` and store it under `key`.
    pub fn insert_json(&self, key: impl Into<String>, value: &SliceValue) {
        self.entries.write().insert(key.into(), value.to_string());
    }
}

impl SyncStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }
}

#[async_trait]
impl AsyncStorage for MemoryStorage {
    async fn get_item(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }
}
