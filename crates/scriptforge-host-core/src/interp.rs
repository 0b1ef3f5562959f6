//! Interpreter boundary.
//!
//! The embedded-language interpreter is an external collaborator: the engine
//! creates one execution context per script, runs the script's top-level
//! source through it, and releases it on unload. What happens inside is
//! opaque.

use crate::error::ScriptError;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// The module search path interpreter contexts consult when resolving
/// imports. Shared between the engine, the archive appenders, and every
/// context, so archives added at runtime become visible to running scripts.
#[derive(Debug, Default)]
pub struct ModuleSearchPath {
    paths: RwLock<Vec<PathBuf>>,
}

impl ModuleSearchPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a path. Duplicates are ignored.
    pub fn push(&self, path: &Path) {
        let mut paths = self.paths.write().expect("module search path poisoned");
        if !paths.iter().any(|p| p == path) {
            paths.push(path.to_path_buf());
        }
    }

    pub fn remove(&self, path: &Path) {
        let mut paths = self.paths.write().expect("module search path poisoned");
        paths.retain(|p| p != path);
    }

    pub fn contains(&self, path: &Path) -> bool {
        let paths = self.paths.read().expect("module search path poisoned");
        paths.iter().any(|p| p == path)
    }

    /// Snapshot of the current search path, in resolution order.
    pub fn snapshot(&self) -> Vec<PathBuf> {
        self.paths.read().expect("module search path poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.paths.read().expect("module search path poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Factory for per-script execution contexts.
pub trait Interpreter: Send + Sync {
    /// Create a fresh context for the named script. The context resolves
    /// imports through `search_path`.
    fn create_context(
        &self,
        script_name: &str,
        search_path: &ModuleSearchPath,
    ) -> Result<Box<dyn ScriptContext>, ScriptError>;
}

/// One script's live execution context.
///
/// Dropping the context releases every interpreter-side resource the script
/// holds; the engine guarantees no listener or task closure outlives it.
pub trait ScriptContext: Send + Sync {
    /// Execute the script's top-level source.
    fn execute(&self, source: &str) -> Result<(), ScriptError>;

    /// Call the script's optional `start` hook. A script without one returns
    /// `Ok(())`.
    fn run_start(&self) -> Result<(), ScriptError>;

    /// Call the script's optional `stop` hook. A script without one returns
    /// `Ok(())`.
    fn run_stop(&self) -> Result<(), ScriptError>;
}
