//! Event listener registration and exception routing through the engine.

mod common;

use common::{build, write_script};
use scriptforge_engine::{ListenerError, ScriptCallback};
use scriptforge_host_core::{EventKind, EventPriority, HostEvent, ScriptError, SCRIPT_EXCEPTION_KIND};
use serde_json::json;
use std::sync::{Arc, Mutex};

#[test]
fn test_listener_receives_dispatched_event() {
    let tmp = tempfile::tempdir().unwrap();
    write_script(tmp.path(), "a.sf", "");
    let bed = build(tmp.path());
    bed.engine.load_all();

    bed.engine.event_kinds().register(EventKind::new("player_join"));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bed.engine
        .register_listener(
            "a.sf",
            EventKind::new("player_join"),
            ScriptCallback::new("on_join", move |event: &HostEvent| {
                sink.lock()
                    .unwrap()
                    .push(event.payload()["player"].as_str().unwrap().to_string());
                Ok(())
            }),
            EventPriority::Normal,
            false,
        )
        .unwrap();

    let event = HostEvent::new(EventKind::new("player_join"), json!({"player": "steve"}));
    bed.engine.dispatch_event(&event);

    assert_eq!(*seen.lock().unwrap(), vec!["steve"]);
}

#[test]
fn test_duplicate_listener_rejected_per_script() {
    let tmp = tempfile::tempdir().unwrap();
    write_script(tmp.path(), "a.sf", "");
    let bed = build(tmp.path());
    bed.engine.load_all();

    bed.engine.event_kinds().register(EventKind::new("player_join"));

    bed.engine
        .register_listener(
            "a.sf",
            EventKind::new("player_join"),
            ScriptCallback::new("on_join", |_| Ok(())),
            EventPriority::Normal,
            false,
        )
        .unwrap();

    let result = bed.engine.register_listener(
        "a.sf",
        EventKind::new("player_join"),
        ScriptCallback::new("on_join_too", |_| Ok(())),
        EventPriority::High,
        false,
    );
    assert!(matches!(result, Err(ListenerError::Duplicate { .. })));
}

#[test]
fn test_listener_failure_reaches_host_and_exception_listeners() {
    let tmp = tempfile::tempdir().unwrap();
    write_script(tmp.path(), "broken.sf", "");
    write_script(tmp.path(), "watcher.sf", "");
    let bed = build(tmp.path());
    bed.engine.load_all();

    bed.engine.event_kinds().register(EventKind::new("player_join"));

    bed.engine
        .register_listener(
            "broken.sf",
            EventKind::new("player_join"),
            ScriptCallback::new("on_join", |_| {
                Err(ScriptError::Runtime("undefined name".to_string()))
            }),
            EventPriority::Normal,
            false,
        )
        .unwrap();

    let reported = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reported);
    bed.engine
        .register_listener(
            "watcher.sf",
            EventKind::new(SCRIPT_EXCEPTION_KIND),
            ScriptCallback::new("on_exception", move |event: &HostEvent| {
                sink.lock()
                    .unwrap()
                    .push(event.payload()["script"].as_str().unwrap().to_string());
                Ok(())
            }),
            EventPriority::Monitor,
            false,
        )
        .unwrap();

    let event = HostEvent::new(EventKind::new("player_join"), json!({}));
    bed.engine.dispatch_event(&event);

    let notices = bed.host.exception_notices.lock().unwrap();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].contains("broken.sf"));
    assert_eq!(*reported.lock().unwrap(), vec!["broken.sf"]);
}

#[test]
fn test_unload_removes_listeners() {
    let tmp = tempfile::tempdir().unwrap();
    write_script(tmp.path(), "a.sf", "");
    let bed = build(tmp.path());
    bed.engine.load_all();

    bed.engine.event_kinds().register(EventKind::new("player_join"));

    let count = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&count);
    bed.engine
        .register_listener(
            "a.sf",
            EventKind::new("player_join"),
            ScriptCallback::new("on_join", move |_| {
                *counter.lock().unwrap() += 1;
                Ok(())
            }),
            EventPriority::Normal,
            false,
        )
        .unwrap();

    bed.engine
        .dispatch_event(&HostEvent::new(EventKind::new("player_join"), json!({})));
    bed.engine.unload_script("a.sf");
    bed.engine
        .dispatch_event(&HostEvent::new(EventKind::new("player_join"), json!({})));

    assert_eq!(*count.lock().unwrap(), 1);
}

#[test]
fn test_listener_registration_refused_after_unload() {
    let tmp = tempfile::tempdir().unwrap();
    write_script(tmp.path(), "a.sf", "");
    let bed = build(tmp.path());
    bed.engine.load_all();

    bed.engine.event_kinds().register(EventKind::new("player_join"));
    bed.engine.unload_script("a.sf");

    let hits = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&hits);
    let result = bed.engine.register_listener(
        "a.sf",
        EventKind::new("player_join"),
        ScriptCallback::new("on_join", move |_| {
            *counter.lock().unwrap() += 1;
            Ok(())
        }),
        EventPriority::Normal,
        false,
    );

    assert!(matches!(result, Err(ListenerError::UnknownScript { .. })));
    bed.engine
        .dispatch_event(&HostEvent::new(EventKind::new("player_join"), json!({})));
    assert_eq!(*hits.lock().unwrap(), 0);
}

#[test]
fn test_dispatch_recovers_after_listener_failure() {
    let tmp = tempfile::tempdir().unwrap();
    write_script(tmp.path(), "broken.sf", "");
    write_script(tmp.path(), "healthy.sf", "");
    let bed = build(tmp.path());
    bed.engine.load_all();

    bed.engine.event_kinds().register(EventKind::new("player_join"));
    bed.engine.event_kinds().register(EventKind::new("block_break"));

    bed.engine
        .register_listener(
            "broken.sf",
            EventKind::new("player_join"),
            ScriptCallback::new("on_join", |_| {
                Err(ScriptError::Runtime("undefined name".to_string()))
            }),
            EventPriority::Normal,
            false,
        )
        .unwrap();

    let seen = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&seen);
    bed.engine
        .register_listener(
            "healthy.sf",
            EventKind::new("block_break"),
            ScriptCallback::new("on_break", move |_| {
                *counter.lock().unwrap() += 1;
                Ok(())
            }),
            EventPriority::Normal,
            false,
        )
        .unwrap();

    bed.engine
        .dispatch_event(&HostEvent::new(EventKind::new("player_join"), json!({})));
    // The failure is reported and contained; the next unrelated event
    // dispatches as if nothing happened.
    bed.engine
        .dispatch_event(&HostEvent::new(EventKind::new("block_break"), json!({})));

    assert_eq!(bed.host.exception_notices.lock().unwrap().len(), 1);
    assert_eq!(*seen.lock().unwrap(), 1);
}

#[test]
fn test_unregister_single_listener() {
    let tmp = tempfile::tempdir().unwrap();
    write_script(tmp.path(), "a.sf", "");
    let bed = build(tmp.path());
    bed.engine.load_all();

    bed.engine.event_kinds().register(EventKind::new("player_join"));
    bed.engine
        .register_listener(
            "a.sf",
            EventKind::new("player_join"),
            ScriptCallback::new("on_join", |_| Ok(())),
            EventPriority::Normal,
            false,
        )
        .unwrap();

    assert!(bed
        .engine
        .unregister_listener("a.sf", &EventKind::new("player_join")));
    assert!(!bed
        .engine
        .unregister_listener("a.sf", &EventKind::new("player_join")));
}
