mod common;

use serde_json::json;
use slicekit::{compose, Action, DispatchForm, Payload, SliceConfig, SliceSet, Storage};

/// Reducer used across these tests: appends dispatched kinds to an
/// array, adds numeric payloads into a running total.
fn journal_reducer(
    state: &slicekit::SliceValue,
    action: &Action,
) -> slicekit::SliceValue {
    match action.kind.as_str() {
        "note" => {
            let mut entries = state["entries"].as_array().cloned().unwrap_or_default();
            if let Some(Payload::Json(value)) = &action.payload {
                entries.push(value.clone());
            }
            json!({"entries": entries, "total": state["total"]})
        }
        "add" => {
            let amount = match &action.payload {
                Some(Payload::Json(value)) => value.as_i64().unwrap_or(0),
                _ => 0,
            };
            json!({
                "entries": state["entries"],
                "total": state["total"].as_i64().unwrap_or(0) + amount,
            })
        }
        _ => state.clone(),
    }
}

fn journal_initial() -> slicekit::SliceValue {
    json!({"entries": [], "total": 0})
}

#[test]
fn boxed_slice_setter_roundtrip() {
    common::init_tracing();
    let scope = compose(
        SliceSet::new().with(SliceConfig::boxed("theme", json!("light"))),
        Storage::Disabled,
    )
    .mount();
    let accessor = scope.accessor();

    let (value, setter) = accessor.use_slice("theme");
    assert_eq!(value, json!("light"));
    assert_eq!(setter.form(), DispatchForm::Setter);

    setter.set(json!("dark")).unwrap();
    assert_eq!(accessor.value("theme"), json!("dark"));

    setter
        .set_with(|current| json!(format!("{}-contrast", current.as_str().unwrap())))
        .unwrap();
    assert_eq!(accessor.value("theme"), json!("dark-contrast"));
}

#[test]
fn custom_reducer_folds_dispatched_actions() {
    let scope = compose(
        SliceSet::new().with(SliceConfig::with_reducer(
            "journal",
            journal_initial(),
            journal_reducer,
        )),
        Storage::Disabled,
    )
    .mount();
    let accessor = scope.accessor();
    let dispatcher = accessor.dispatcher("journal");
    assert_eq!(dispatcher.form(), DispatchForm::Reducer);

    let actions = vec![
        Action::with_payload("note", json!("opened")),
        Action::with_payload("add", json!(5)),
        Action::with_payload("add", json!(7)),
        Action::with_payload("note", json!("closed")),
    ];

    let mut expected = journal_initial();
    for action in &actions {
        expected = journal_reducer(&expected, action);
    }
    for action in actions {
        dispatcher.dispatch(action).unwrap();
    }

    assert_eq!(accessor.value("journal"), expected);
    assert_eq!(
        accessor.value("journal"),
        json!({"entries": ["opened", "closed"], "total": 12})
    );
}

#[test]
fn slices_do_not_observe_each_other() {
    let scope = compose(
        SliceSet::new()
            .with(SliceConfig::boxed("left", json!(0)))
            .with(SliceConfig::boxed("right", json!(0))),
        Storage::Disabled,
    )
    .mount();
    let accessor = scope.accessor();
    let right_feed = accessor.subscribe("right");

    accessor.dispatcher("left").set(json!(99)).unwrap();

    assert_eq!(accessor.value("left"), json!(99));
    assert_eq!(accessor.value("right"), json!(0));
    assert!(!right_feed.has_changed());
}

#[test]
fn unknown_kind_leaves_state_and_subscribers_alone() {
    let scope = compose(
        SliceSet::new().with(SliceConfig::boxed("flag", json!(true))),
        Storage::Disabled,
    )
    .mount();
    let accessor = scope.accessor();
    let feed = accessor.subscribe("flag");

    accessor
        .dispatcher("flag")
        .dispatch(Action::new("toggle"))
        .unwrap();

    assert_eq!(accessor.value("flag"), json!(true));
    assert!(!feed.has_changed());
}

#[test]
fn set_on_a_reducer_slice_still_goes_through_the_reducer() {
    let scope = compose(
        SliceSet::new().with(SliceConfig::with_reducer(
            "guarded",
            json!(1),
            |state, action| match action.kind.as_str() {
                "double" => json!(state.as_i64().unwrap_or(0) * 2),
                _ => state.clone(),
            },
        )),
        Storage::Disabled,
    )
    .mount();
    let accessor = scope.accessor();

    // The reducer ignores SET, so the setter surface has no effect here.
    accessor.dispatcher("guarded").set(json!(42)).unwrap();
    assert_eq!(accessor.value("guarded"), json!(1));

    accessor
        .dispatcher("guarded")
        .dispatch(Action::new("double"))
        .unwrap();
    assert_eq!(accessor.value("guarded"), json!(2));
}

#[test]
fn init_closure_runs_once_per_mount() {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    let mints = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&mints);
    let composition = compose(
        SliceSet::new().with(SliceConfig::boxed_with("session", move || {
            json!({"mount": counter.fetch_add(1, Ordering::SeqCst)})
        })),
        Storage::Disabled,
    );

    let first = composition.mount();
    assert_eq!(first.accessor().value("session"), json!({"mount": 0}));
    drop(first);

    let second = composition.mount();
    assert_eq!(second.accessor().value("session"), json!({"mount": 1}));
    assert_eq!(mints.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn subscription_wakes_on_change() {
    let scope = compose(
        SliceSet::new().with(SliceConfig::boxed("n", json!(0))),
        Storage::Disabled,
    )
    .mount();
    let accessor = scope.accessor();
    let mut feed = accessor.subscribe("n");

    accessor.dispatcher("n").set(json!(1)).unwrap();
    assert!(feed.changed().await);
    assert_eq!(feed.current(), json!(1));

    drop(scope);
    assert!(!feed.changed().await);
}
