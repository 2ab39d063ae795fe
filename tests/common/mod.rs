//! Shared fixtures for integration tests: recording middleware,
//! controllable storage backends, and a mock external store.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use slicekit::{
    Action, AsyncStorage, Listener, Middleware, MiddlewareCtx, Next, Payload, SliceValue,
    StoreBackend, StoreSubscription, SyncStorage,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Middleware that records every action it sees, then passes it on.
pub struct RecordingMiddleware {
    tag: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

impl RecordingMiddleware {
    pub fn new(tag: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            tag,
            log: Arc::clone(log),
        }
    }
}

impl Middleware for RecordingMiddleware {
    fn name(&self) -> &'static str {
        self.tag
    }

    fn around(
        &self,
        action: Action,
        ctx: &MiddlewareCtx<'_>,
        next: Next<'_>,
    ) -> anyhow::Result<()> {
        self.log.lock().push(format!("{}:{}", self.tag, action.kind));
        next.run(ctx, action)
    }
}

/// Middleware that drops actions of one kind without erroring.
pub struct SwallowMiddleware {
    pub kind: &'static str,
}

impl Middleware for SwallowMiddleware {
    fn name(&self) -> &'static str {
        "swallow"
    }

    fn around(
        &self,
        action: Action,
        ctx: &MiddlewareCtx<'_>,
        next: Next<'_>,
    ) -> anyhow::Result<()> {
        if action.kind == self.kind {
            return Ok(());
        }
        next.run(ctx, action)
    }
}

/// Middleware that fails actions of one kind.
pub struct AbortMiddleware {
    pub kind: &'static str,
}

impl Middleware for AbortMiddleware {
    fn name(&self) -> &'static str {
        "abort"
    }

    fn around(
        &self,
        action: Action,
        ctx: &MiddlewareCtx<'_>,
        next: Next<'_>,
    ) -> anyhow::Result<()> {
        if action.kind == self.kind {
            anyhow::bail!("kind '{}' is not allowed", self.kind);
        }
        next.run(ctx, action)
    }
}

/// Sync storage reading one JSON file per key from a directory.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn write(&self, key: &str, raw: &str) {
        std::fs::write(self.root.join(format!("{key}.json")), raw).unwrap();
    }
}

impl SyncStorage for FileStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.root.join(format!("{key}.json"))).ok()
    }
}

/// Async storage whose reads complete only after the test opens the gate.
pub struct GatedStorage {
    entries: HashMap<String, String>,
    gate: tokio::sync::watch::Receiver<bool>,
}

impl GatedStorage {
    pub fn new<const N: usize>(
        entries: [(&str, &str); N],
    ) -> (tokio::sync::watch::Sender<bool>, Self) {
        let (tx, rx) = tokio::sync::watch::channel(false);
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        (tx, Self { entries, gate: rx })
    }
}

#[async_trait]
impl AsyncStorage for GatedStorage {
    async fn get_item(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut gate = self.gate.clone();
        while !*gate.borrow_and_update() {
            if gate.changed().await.is_err() {
                break;
            }
        }
        Ok(self.entries.get(key).cloned())
    }
}

/// Async storage that fails every read.
pub struct FailingStorage;

#[async_trait]
impl AsyncStorage for FailingStorage {
    async fn get_item(&self, _key: &str) -> anyhow::Result<Option<String>> {
        anyhow::bail!("storage backend unavailable")
    }
}

type ListenerTable = Arc<Mutex<Vec<(u64, Listener)>>>;

/// Minimal external store: holds one value, applies `SET` dispatches,
/// and notifies listeners synchronously on every change.
pub struct MockStore {
    state: RwLock<SliceValue>,
    listeners: ListenerTable,
    next_listener: Mutex<u64>,
    dispatched: Mutex<Vec<String>>,
}

impl MockStore {
    pub fn new(initial: SliceValue) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(initial),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener: Mutex::new(0),
            dispatched: Mutex::new(Vec::new()),
        })
    }

    /// Change the store from outside any dispatch, as another part of
    /// the host application would.
    pub fn set_state(&self, value: SliceValue) {
        *self.state.write() = value;
        self.notify();
    }

    pub fn dispatched_kinds(&self) -> Vec<String> {
        self.dispatched.lock().clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    fn notify(&self) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener();
        }
    }
}

impl StoreBackend for MockStore {
    fn snapshot(&self) -> SliceValue {
        self.state.read().clone()
    }

    fn dispatch(&self, action: Action) {
        self.dispatched.lock().push(action.kind.clone());
        match &action.payload {
            Some(Payload::Json(value)) if action.kind == slicekit::SET_KIND => {
                *self.state.write() = value.clone();
            }
            Some(Payload::Update(update)) if action.kind == slicekit::SET_KIND => {
                let next = update(&self.state.read());
                *self.state.write() = next;
            }
            _ => return,
        }
        self.notify();
    }

    fn subscribe(&self, listener: Listener) -> Box<dyn StoreSubscription> {
        let id = {
            let mut next = self.next_listener.lock();
            *next += 1;
            *next
        };
        self.listeners.lock().push((id, listener));
        Box::new(MockSubscription {
            listeners: Arc::clone(&self.listeners),
            id,
        })
    }
}

/// Subscription guard removing its listener on drop.
pub struct MockSubscription {
    listeners: ListenerTable,
    id: u64,
}

impl StoreSubscription for MockSubscription {}

impl Drop for MockSubscription {
    fn drop(&mut self) {
        self.listeners.lock().retain(|(id, _)| *id != self.id);
    }
}
