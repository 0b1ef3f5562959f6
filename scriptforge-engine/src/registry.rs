//! Registry of loaded scripts.
//!
//! Tracks every script the engine currently knows about, keyed by file name,
//! plus the order they were loaded in so shutdown can unload in reverse.

use crate::script::{Script, ScriptState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RegistryInner {
    scripts: HashMap<String, Arc<Script>>,
    load_order: Vec<String>,
}

/// Shared registry of scripts. Coarse-locked; every operation takes the one
/// lock briefly and never calls script code while holding it.
#[derive(Default)]
pub struct ScriptRegistry {
    inner: Mutex<RegistryInner>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a script. Returns false (and leaves the registry unchanged)
    /// when a script with the same name is already present.
    pub fn insert(&self, script: Arc<Script>) -> bool {
        let mut inner = self.inner.lock().expect("script registry poisoned");
        if inner.scripts.contains_key(script.name()) {
            return false;
        }
        let name = script.name().to_string();
        inner.scripts.insert(name.clone(), script);
        inner.load_order.push(name);
        true
    }

    pub fn get(&self, name: &str) -> Option<Arc<Script>> {
        let inner = self.inner.lock().expect("script registry poisoned");
        inner.scripts.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        let inner = self.inner.lock().expect("script registry poisoned");
        inner.scripts.contains_key(name)
    }

    /// Remove a script from the registry and the load order.
    pub fn remove(&self, name: &str) -> Option<Arc<Script>> {
        let mut inner = self.inner.lock().expect("script registry poisoned");
        let script = inner.scripts.remove(name);
        if script.is_some() {
            inner.load_order.retain(|n| n != name);
        }
        script
    }

    /// Whether the named script is present and able to own registrations,
    /// meaning it is still loading or running. Unloading and failed scripts
    /// no longer accept listeners or tasks.
    pub fn is_live(&self, name: &str) -> bool {
        self.get(name)
            .map(|s| matches!(s.state(), ScriptState::Loading | ScriptState::Running))
            .unwrap_or(false)
    }

    /// Whether the named script is present and running.
    pub fn is_running(&self, name: &str) -> bool {
        self.get(name)
            .map(|s| s.state() == ScriptState::Running)
            .unwrap_or(false)
    }

    /// Names of all tracked scripts, in load order.
    pub fn names(&self) -> Vec<String> {
        let inner = self.inner.lock().expect("script registry poisoned");
        inner.load_order.clone()
    }

    /// Names of all tracked scripts, most recently loaded first.
    pub fn names_reverse_load_order(&self) -> Vec<String> {
        let mut names = self.names();
        names.reverse();
        names
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().expect("script registry poisoned");
        inner.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
