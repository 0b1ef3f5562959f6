//! Tagged event kinds and host events.
//!
//! The engine never sees host-native event classes. Each host integration
//! registers the kinds it can produce in an [`EventKindRegistry`], optionally
//! linking a kind to a parent kind where the native API has subtyping, and
//! converts native events into [`HostEvent`] values before dispatch.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Kind tag of the engine's own exception notification event.
pub const SCRIPT_EXCEPTION_KIND: &str = "script_exception";

/// A tag identifying one kind of host event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventKind(String);

impl EventKind {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventKind {
    fn from(tag: &str) -> Self {
        Self(tag.to_string())
    }
}

/// Priority of a listener relative to other listeners for the same event.
///
/// `Lowest` runs first and `Monitor` last; `Monitor` listeners are expected
/// to observe, not mutate. Ties are broken by registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPriority {
    Lowest,
    Low,
    Normal,
    High,
    Highest,
    Monitor,
}

impl Default for EventPriority {
    fn default() -> Self {
        EventPriority::Normal
    }
}

/// Registry of known event kinds and their parent links.
///
/// Assignability over parent links stands in for native subtype checks: a
/// listener registered for `"player"` receives `"player_join"` events when
/// the host has linked `player_join -> player`.
#[derive(Debug, Default)]
pub struct EventKindRegistry {
    parents: RwLock<HashMap<EventKind, Option<EventKind>>>,
}

impl EventKindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a root kind with no parent. Re-registration is a no-op.
    pub fn register(&self, kind: EventKind) {
        let mut parents = self.parents.write().expect("event kind registry poisoned");
        parents.entry(kind).or_insert(None);
    }

    /// Register a kind as a child of `parent`, registering the parent as a
    /// root kind if it is not yet known.
    pub fn register_child(&self, kind: EventKind, parent: EventKind) {
        let mut parents = self.parents.write().expect("event kind registry poisoned");
        parents.entry(parent.clone()).or_insert(None);
        parents.insert(kind, Some(parent));
    }

    pub fn is_registered(&self, kind: &EventKind) -> bool {
        let parents = self.parents.read().expect("event kind registry poisoned");
        parents.contains_key(kind)
    }

    /// Whether an event tagged `kind` should reach a listener registered for
    /// `target`: true when `kind` is `target` or a transitive child of it.
    pub fn is_assignable(&self, kind: &EventKind, target: &EventKind) -> bool {
        if kind == target {
            return true;
        }
        let parents = self.parents.read().expect("event kind registry poisoned");
        let mut current = kind;
        while let Some(Some(parent)) = parents.get(current) {
            if parent == target {
                return true;
            }
            current = parent;
        }
        false
    }
}

/// A host event as seen by the engine: a kind tag, an opaque payload, and a
/// cancellation flag shared between listeners.
#[derive(Debug)]
pub struct HostEvent {
    kind: EventKind,
    payload: serde_json::Value,
    cancelled: AtomicBool,
}

impl HostEvent {
    pub fn new(kind: EventKind, payload: serde_json::Value) -> Self {
        Self {
            kind,
            payload,
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// Mark the event cancelled. Listeners registered with `ignore_cancelled`
    /// will not see it from this point on.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignability_follows_parent_links() {
        let registry = EventKindRegistry::new();
        registry.register(EventKind::new("player"));
        registry.register_child(EventKind::new("player_join"), EventKind::new("player"));
        registry.register_child(EventKind::new("player_join_spectator"), EventKind::new("player_join"));

        let join = EventKind::new("player_join");
        let spectator = EventKind::new("player_join_spectator");
        let player = EventKind::new("player");
        let block = EventKind::new("block_break");

        assert!(registry.is_assignable(&join, &join));
        assert!(registry.is_assignable(&join, &player));
        assert!(registry.is_assignable(&spectator, &player));
        assert!(!registry.is_assignable(&player, &join));
        assert!(!registry.is_assignable(&block, &player));
    }

    #[test]
    fn test_event_cancellation_flag() {
        let event = HostEvent::new(EventKind::new("player_join"), serde_json::json!({"player": "steve"}));
        assert!(!event.is_cancelled());
        event.cancel();
        assert!(event.is_cancelled());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(EventPriority::Lowest < EventPriority::Normal);
        assert!(EventPriority::Normal < EventPriority::Monitor);
        assert_eq!(EventPriority::default(), EventPriority::Normal);
    }
}
