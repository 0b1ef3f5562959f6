//! Event listener registration and dispatch.
//!
//! Scripts register callbacks against event kind tags. Dispatch resolves the
//! listeners whose registered kind the event's kind is assignable to, orders
//! them by priority (registration order breaking ties), and invokes them.
//! Callback errors never abort dispatch; they are collected and handed back
//! so the caller can route them through the exception bridge.

use crate::registry::ScriptRegistry;
use scriptforge_host_core::{EventKind, EventKindRegistry, EventPriority, HostEvent, ScriptError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

/// A named script callback taking an event.
///
/// The name is the script-side function name and serves as the callback's
/// identity for exception recursion guarding.
#[derive(Clone)]
pub struct ScriptCallback {
    name: String,
    fun: Arc<dyn Fn(&HostEvent) -> Result<(), ScriptError> + Send + Sync>,
}

impl ScriptCallback {
    pub fn new(
        name: impl Into<String>,
        fun: impl Fn(&HostEvent) -> Result<(), ScriptError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            fun: Arc::new(fun),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, event: &HostEvent) -> Result<(), ScriptError> {
        (self.fun)(event)
    }
}

impl std::fmt::Debug for ScriptCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptCallback")
            .field("name", &self.name)
            .finish()
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ListenerError {
    /// The script already has a listener for this event kind.
    #[error("script '{script}' already has a listener for event kind '{kind}'")]
    Duplicate { script: String, kind: EventKind },

    /// The event kind was never registered by the host.
    #[error("unknown event kind '{kind}'")]
    UnknownKind { kind: EventKind },

    /// The named script is not loaded, or is past the point of owning
    /// listeners.
    #[error("script '{script}' is not loaded")]
    UnknownScript { script: String },
}

/// One registered listener.
#[derive(Clone)]
struct Registration {
    script: String,
    kind: EventKind,
    callback: ScriptCallback,
    priority: EventPriority,
    ignore_cancelled: bool,
    seq: u64,
}

/// A callback that returned an error during dispatch.
#[derive(Debug)]
pub struct DispatchFailure {
    pub script: String,
    pub callback_name: String,
    pub error: ScriptError,
}

/// Registry of script event listeners.
pub struct ListenerManager {
    kinds: Arc<EventKindRegistry>,
    scripts: Arc<ScriptRegistry>,
    listeners: Mutex<Vec<Registration>>,
    seq: AtomicU64,
}

impl ListenerManager {
    pub fn new(kinds: Arc<EventKindRegistry>, scripts: Arc<ScriptRegistry>) -> Self {
        Self {
            kinds,
            scripts,
            listeners: Mutex::new(Vec::new()),
            seq: AtomicU64::new(0),
        }
    }

    /// Register a listener. The owning script must be loading or running,
    /// and at most one listener per (script, event kind) pair is allowed;
    /// anything else is rejected.
    pub fn register(
        &self,
        script: &str,
        kind: EventKind,
        callback: ScriptCallback,
        priority: EventPriority,
        ignore_cancelled: bool,
    ) -> Result<(), ListenerError> {
        if !self.kinds.is_registered(&kind) {
            return Err(ListenerError::UnknownKind { kind });
        }

        let mut listeners = self.listeners.lock().expect("listener registry poisoned");
        // Checked under the listener lock: an unload marks the script before
        // it sweeps listeners, so a registration racing the sweep either
        // lands in time to be swept or sees the script as gone.
        if !self.scripts.is_live(script) {
            return Err(ListenerError::UnknownScript {
                script: script.to_string(),
            });
        }
        if listeners
            .iter()
            .any(|r| r.script == script && r.kind == kind)
        {
            return Err(ListenerError::Duplicate {
                script: script.to_string(),
                kind,
            });
        }

        debug!(script, kind = %kind, callback = callback.name(), "registering listener");
        listeners.push(Registration {
            script: script.to_string(),
            kind,
            callback,
            priority,
            ignore_cancelled,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
        });
        Ok(())
    }

    /// Remove the script's listener for `kind`. Returns whether one existed.
    pub fn unregister(&self, script: &str, kind: &EventKind) -> bool {
        let mut listeners = self.listeners.lock().expect("listener registry poisoned");
        let before = listeners.len();
        listeners.retain(|r| !(r.script == script && r.kind == *kind));
        listeners.len() != before
    }

    /// Remove every listener belonging to the script. Returns how many were
    /// removed.
    pub fn unregister_script(&self, script: &str) -> usize {
        let mut listeners = self.listeners.lock().expect("listener registry poisoned");
        let before = listeners.len();
        listeners.retain(|r| r.script != script);
        before - listeners.len()
    }

    /// Event kinds the script currently listens to.
    pub fn kinds_of(&self, script: &str) -> Vec<EventKind> {
        let listeners = self.listeners.lock().expect("listener registry poisoned");
        listeners
            .iter()
            .filter(|r| r.script == script)
            .map(|r| r.kind.clone())
            .collect()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().expect("listener registry poisoned").len()
    }

    /// Dispatch `event` to every matching listener, in priority order with
    /// registration order breaking ties. `suppress` names one
    /// (script, callback) pair to skip, used while delivering the engine's
    /// own exception event to keep a failing handler from seeing its own
    /// failure.
    ///
    /// Cancellation is re-checked before each listener runs, so a listener
    /// cancelling the event hides it from later `ignore_cancelled`
    /// listeners.
    pub fn dispatch(
        &self,
        event: &HostEvent,
        suppress: Option<(&str, &str)>,
    ) -> Vec<DispatchFailure> {
        // Snapshot matching registrations, then invoke without the lock so
        // callbacks can register and unregister listeners.
        let mut matching: Vec<Registration> = {
            let listeners = self.listeners.lock().expect("listener registry poisoned");
            listeners
                .iter()
                .filter(|r| self.kinds.is_assignable(event.kind(), &r.kind))
                .cloned()
                .collect()
        };
        matching.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.seq.cmp(&b.seq)));

        let mut failures = Vec::new();
        for reg in matching {
            if event.is_cancelled() && reg.ignore_cancelled {
                continue;
            }
            if let Some((script, callback)) = suppress {
                if reg.script == script && reg.callback.name() == callback {
                    continue;
                }
            }
            if let Err(error) = reg.callback.call(event) {
                failures.push(DispatchFailure {
                    script: reg.script,
                    callback_name: reg.callback.name().to_string(),
                    error,
                });
            }
        }
        failures
    }
}
