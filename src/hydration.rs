//! Loading persisted values and merging them into live state.
//!
//! Hydration runs once per mount. All keys of one slice are collected
//! first and delivered as a single state transition, so subscribers never
//! observe a partially hydrated slice. Unreadable or unparseable entries
//! are skipped with a warning; a slice with nothing usable in storage
//! settles as skipped and keeps its declared initial value.

use std::sync::Arc;

use serde_json::Map;

use crate::storage::{AsyncStorage, SyncStorage};
use crate::SliceValue;

/// How a slice maps onto storage keys.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Persistence {
    /// The slice is not persisted.
    #[default]
    Disabled,
    /// One storage key named after the slice; the parsed value replaces
    /// the whole slice state on hydration.
    WholeValue,
    /// One storage key per listed sub-key; collected values shallow-merge
    /// over the slice's object state on hydration.
    Keys(Vec<String>),
}

impl Persistence {
    pub(crate) fn is_disabled(&self) -> bool {
        matches!(self, Persistence::Disabled)
    }
}

/// Hydration progress for one mounted slice.
///
/// `Skipped` covers every way a mount ends up without applied storage
/// data: persistence disabled, no storage configured, or nothing usable
/// under the slice's keys. Terminal states (`Hydrated`, `Skipped`) never
/// transition again for that mount.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HydrationPhase {
    #[default]
    Uninitialized,
    /// Async read in flight; state still holds the initial value.
    LoadPending,
    /// At least one persisted value was applied.
    Hydrated,
    /// No persisted data was applied for this mount.
    Skipped,
}

impl HydrationPhase {
    /// True once hydration can no longer change this mount's state.
    pub fn is_settled(&self) -> bool {
        matches!(self, HydrationPhase::Hydrated | HydrationPhase::Skipped)
    }
}

/// Parse one stored entry, treating malformed JSON as absent.
fn parse_entry(slice: &str, key: &str, raw: &str) -> Option<SliceValue> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::warn!(
                slice = %slice,
                key = %key,
                %error,
                "skipping malformed persisted value"
            );
            None
        }
    }
}

/// Read every configured key through the blocking accessor.
///
/// Returns the collected payload, or `None` when nothing usable was
/// found (the mount then settles as skipped).
pub(crate) fn collect_sync(
    spec: &Persistence,
    slice: &str,
    storage: &dyn SyncStorage,
) -> Option<SliceValue> {
    match spec {
        Persistence::Disabled => None,
        Persistence::WholeValue => {
            let raw = storage.get_item(slice)?;
            parse_entry(slice, slice, &raw)
        }
        Persistence::Keys(keys) => {
            let mut found = Map::new();
            for key in keys {
                if let Some(raw) = storage.get_item(key) {
                    if let Some(value) = parse_entry(slice, key, &raw) {
                        found.insert(key.clone(), value);
                    }
                }
            }
            if found.is_empty() {
                None
            } else {
                Some(SliceValue::Object(found))
            }
        }
    }
}

/// Read every configured key through the deferred accessor.
///
/// Backend errors are logged and treated as absent keys, so one failing
/// read never poisons the rest of the slice's hydration.
pub(crate) async fn collect_async(
    spec: &Persistence,
    slice: &str,
    storage: &Arc<dyn AsyncStorage>,
) -> Option<SliceValue> {
    let fetch = |key: String| {
        let storage = Arc::clone(storage);
        let slice = slice.to_string();
        async move {
            match storage.get_item(&key).await {
                Ok(raw) => raw,
                Err(error) => {
                    tracing::warn!(slice = %slice, key = %key, %error, "persisted read failed");
                    None
                }
            }
        }
    };
    match spec {
        Persistence::Disabled => None,
        Persistence::WholeValue => {
            let raw = fetch(slice.to_string()).await?;
            parse_entry(slice, slice, &raw)
        }
        Persistence::Keys(keys) => {
            let mut found = Map::new();
            for key in keys {
                if let Some(raw) = fetch(key.clone()).await {
                    if let Some(value) = parse_entry(slice, key, &raw) {
                        found.insert(key.clone(), value);
                    }
                }
            }
            if found.is_empty() {
                None
            } else {
                Some(SliceValue::Object(found))
            }
        }
    }
}

/// Fold a collected payload into the state it lands on.
///
/// Whole-value persistence replaces the state outright. Listed keys merge
/// field by field over the current state, so values the host changed
/// while an async read was in flight survive unless the same field was
/// persisted. A non-object state under key merging is replaced by the
/// collected object, mirroring spreading over a scalar.
pub(crate) fn merge_into(
    state: &SliceValue,
    found: &SliceValue,
    spec: &Persistence,
) -> SliceValue {
    match spec {
        Persistence::Disabled => state.clone(),
        Persistence::WholeValue => found.clone(),
        Persistence::Keys(_) => match (state, found) {
            (SliceValue::Object(base), SliceValue::Object(hydrated)) => {
                let mut merged = base.clone();
                for (key, value) in hydrated {
                    merged.insert(key.clone(), value.clone());
                }
                SliceValue::Object(merged)
            }
            _ => found.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    #[test]
    fn keys_merge_only_present_entries() {
        let storage = MemoryStorage::new();
        storage.insert("b", "2");

        let spec = Persistence::Keys(vec!["a".into(), "b".into()]);
        let found = collect_sync(&spec, "s", &storage).expect("b is stored");
        let merged = merge_into(&json!({"a": 0, "b": 0}), &found, &spec);
        assert_eq!(merged, json!({"a": 0, "b": 2}));
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let storage = MemoryStorage::new();
        storage.insert("a", "{not json");
        storage.insert("b", "7");

        let spec = Persistence::Keys(vec!["a".into(), "b".into()]);
        let found = collect_sync(&spec, "s", &storage).expect("b still parses");
        assert_eq!(found, json!({"b": 7}));
    }

    #[test]
    fn nothing_usable_collects_none() {
        let storage = MemoryStorage::new();
        storage.insert("a", "not json either");

        let spec = Persistence::Keys(vec!["a".into()]);
        assert!(collect_sync(&spec, "s", &storage).is_none());
        assert!(collect_sync(&Persistence::WholeValue, "s", &storage).is_none());
        assert!(collect_sync(&Persistence::Disabled, "s", &storage).is_none());
    }

    #[test]
    fn whole_value_replaces_state() {
        let merged = merge_into(
            &json!({"kept": true}),
            &json!(42),
            &Persistence::WholeValue,
        );
        assert_eq!(merged, json!(42));
    }

    #[test]
    fn merging_over_scalar_state_takes_the_object() {
        let spec = Persistence::Keys(vec!["x".into()]);
        let merged = merge_into(&json!(5), &json!({"x": 1}), &spec);
        assert_eq!(merged, json!({"x": 1}));
    }

    #[test]
    fn settled_phases() {
        assert!(!HydrationPhase::Uninitialized.is_settled());
        assert!(!HydrationPhase::LoadPending.is_settled());
        assert!(HydrationPhase::Hydrated.is_settled());
        assert!(HydrationPhase::Skipped.is_settled());
    }
}
