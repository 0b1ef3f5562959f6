//! Exception capture and reporting.
//!
//! Every unhandled script error funnels through [`ExceptionBridge::report`]:
//! the host is notified synchronously and may suppress logging, scripts
//! listening for the engine's own exception event are told, and the error is
//! written to the failing script's log. Two guards keep error handling from
//! feeding on itself: a per-(script, callback) in-flight set breaks report
//! recursion, and the exception event is never delivered to the callback
//! that raised it.

use crate::listener::{DispatchFailure, ListenerManager};
use crate::registry::ScriptRegistry;
use scriptforge_host_core::{EventKind, HostAdapter, HostEvent, ScriptError, SCRIPT_EXCEPTION_KIND};
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{error, warn};

pub struct ExceptionBridge {
    host: Arc<dyn HostAdapter>,
    listeners: Arc<ListenerManager>,
    registry: Arc<ScriptRegistry>,
    in_flight: Mutex<HashSet<(String, String)>>,
}

impl ExceptionBridge {
    pub fn new(
        host: Arc<dyn HostAdapter>,
        listeners: Arc<ListenerManager>,
        registry: Arc<ScriptRegistry>,
    ) -> Self {
        Self {
            host,
            listeners,
            registry,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Report an unhandled error raised by `callback_name` in `script`.
    /// `context` says where it happened ("event listener", "task", script
    /// load, ...).
    pub fn report(&self, script: &str, callback_name: &str, context: &str, error: &ScriptError) {
        let key = (script.to_string(), callback_name.to_string());
        {
            let mut in_flight = self.in_flight.lock().expect("exception guard poisoned");
            if !in_flight.insert(key.clone()) {
                // Already reporting this callback further up the stack.
                warn!(
                    script,
                    callback = callback_name,
                    "recursive failure while reporting exception: {}",
                    error
                );
                return;
            }
        }

        let suppress_log = self.host.fire_exception_notification(script, error, context);

        let event = HostEvent::new(
            EventKind::new(SCRIPT_EXCEPTION_KIND),
            json!({
                "script": script,
                "context": context,
                "error": error.to_string(),
            }),
        );
        // The failing callback never sees its own failure.
        let failures = self
            .listeners
            .dispatch(&event, Some((script, callback_name)));
        for failure in failures {
            error!(
                script = %failure.script,
                callback = %failure.callback_name,
                "exception listener failed: {}",
                failure.error
            );
        }

        if !suppress_log {
            let message = format!("unhandled error in {context}: {error}");
            match self.registry.get(script) {
                Some(s) => s.logger().error(&message),
                None => error!(script, "{}", message),
            }
        }

        self.in_flight
            .lock()
            .expect("exception guard poisoned")
            .remove(&key);
    }

    /// Report every failure collected by a listener dispatch.
    pub fn report_dispatch_failures(&self, context: &str, failures: Vec<DispatchFailure>) {
        for failure in failures {
            self.report(
                &failure.script,
                &failure.callback_name,
                context,
                &failure.error,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::ScriptCallback;
    use crate::script::{Script, ScriptLogger, ScriptState};
    use scriptforge_host_core::{CancelHandle, EventKindRegistry, EventPriority, Runnable, ScriptSource};
    use scriptforge_runtime::ScriptOptions;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct NotedHost {
        suppress: bool,
        notified: AtomicUsize,
    }

    struct NoopCancel;

    impl CancelHandle for NoopCancel {
        fn cancel(&self) {}
    }

    impl HostAdapter for NotedHost {
        fn discover_script_sources(&self) -> Vec<ScriptSource> {
            Vec::new()
        }
        fn is_feature_available(&self, _name: &str) -> bool {
            true
        }
        fn fire_load_notification(&self, _script: &str) {}
        fn fire_unload_notification(&self, _script: &str, _error: bool) {}
        fn fire_exception_notification(
            &self,
            _script: &str,
            _error: &ScriptError,
            _context: &str,
        ) -> bool {
            self.notified.fetch_add(1, Ordering::SeqCst);
            self.suppress
        }
        fn run_on_main(&self, work: Runnable) {
            work();
        }
        fn schedule_delayed(&self, _work: Runnable, _delay: Duration) -> Box<dyn CancelHandle> {
            Box::new(NoopCancel)
        }
        fn spawn_async(&self, work: Runnable) {
            work();
        }
    }

    fn bridge_with_host(suppress: bool) -> (Arc<ExceptionBridge>, Arc<ListenerManager>, Arc<NotedHost>) {
        let kinds = Arc::new(EventKindRegistry::new());
        kinds.register(EventKind::new(SCRIPT_EXCEPTION_KIND));
        let registry = Arc::new(ScriptRegistry::new());
        for name in ["broken.sf", "watcher.sf", "meta.sf"] {
            let script = Arc::new(Script::new(
                name,
                format!("/scripts/{name}"),
                ScriptOptions::default(),
                ScriptLogger::new(name, "info", None),
            ));
            script.set_state(ScriptState::Running);
            registry.insert(script);
        }
        let listeners = Arc::new(ListenerManager::new(kinds, Arc::clone(&registry)));
        let host = Arc::new(NotedHost {
            suppress,
            notified: AtomicUsize::new(0),
        });
        let bridge = Arc::new(ExceptionBridge::new(
            Arc::clone(&host) as Arc<dyn HostAdapter>,
            Arc::clone(&listeners),
            registry,
        ));
        (bridge, listeners, host)
    }

    #[test]
    fn test_host_notified_and_exception_event_dispatched() {
        let (bridge, listeners, host) = bridge_with_host(false);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_inner = Arc::clone(&seen);
        listeners
            .register(
                "watcher.sf",
                EventKind::new(SCRIPT_EXCEPTION_KIND),
                ScriptCallback::new("on_exception", move |event: &HostEvent| {
                    seen_inner
                        .lock()
                        .unwrap()
                        .push(event.payload()["script"].as_str().unwrap().to_string());
                    Ok(())
                }),
                EventPriority::Normal,
                false,
            )
            .unwrap();

        bridge.report(
            "broken.sf",
            "on_join",
            "event listener",
            &ScriptError::Runtime("boom".to_string()),
        );

        assert_eq!(host.notified.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock().unwrap(), vec!["broken.sf"]);
    }

    #[test]
    fn test_failing_callback_does_not_see_its_own_failure() {
        let (bridge, listeners, _host) = bridge_with_host(false);
        let invoked = Arc::new(AtomicBool::new(false));

        let invoked_inner = Arc::clone(&invoked);
        listeners
            .register(
                "broken.sf",
                EventKind::new(SCRIPT_EXCEPTION_KIND),
                ScriptCallback::new("on_exception", move |_event: &HostEvent| {
                    invoked_inner.store(true, Ordering::SeqCst);
                    Ok(())
                }),
                EventPriority::Normal,
                false,
            )
            .unwrap();

        // The script's own exception handler failed; it must not be
        // re-entered for that failure.
        bridge.report(
            "broken.sf",
            "on_exception",
            "event listener",
            &ScriptError::Runtime("boom".to_string()),
        );
        assert!(!invoked.load(Ordering::SeqCst));

        // A different callback of the same script still reaches it.
        bridge.report(
            "broken.sf",
            "on_join",
            "event listener",
            &ScriptError::Runtime("boom".to_string()),
        );
        assert!(invoked.load(Ordering::SeqCst));
    }

    #[test]
    fn test_recursive_report_is_cut_short() {
        let (bridge, listeners, host) = bridge_with_host(false);

        // An exception listener in another script that itself fails would
        // recurse through report; the in-flight guard stops the cycle.
        listeners
            .register(
                "meta.sf",
                EventKind::new(SCRIPT_EXCEPTION_KIND),
                ScriptCallback::new("on_exception", |_event: &HostEvent| {
                    Err(ScriptError::Runtime("handler is broken too".to_string()))
                }),
                EventPriority::Normal,
                false,
            )
            .unwrap();

        bridge.report(
            "broken.sf",
            "on_join",
            "event listener",
            &ScriptError::Runtime("boom".to_string()),
        );

        // Host saw exactly the original report; the meta handler's failure
        // was logged, not re-bridged.
        assert_eq!(host.notified.load(Ordering::SeqCst), 1);
    }
}
