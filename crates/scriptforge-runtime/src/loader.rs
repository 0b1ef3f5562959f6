//! Runtime classpath extension.
//!
//! Scripts may pull in additional code archives at runtime via the engine's
//! library helper. How an archive becomes resolvable depends on the host:
//! hosts with a mutable module search path get [`SearchPathAppender`];
//! sidecar deployments route through the scoped [`SidecarLoader`] with
//! [`SidecarAppender`]. The engine picks a strategy once at startup and
//! treats it uniformly afterwards.

use crate::bootstrap::SidecarLoader;
use crate::error::{RuntimeError, RuntimeResult};
use scriptforge_host_core::ModuleSearchPath;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Strategy for making a code archive resolvable at runtime.
///
/// Additions are idempotent and last until process exit; there is no
/// per-script unloading of archives.
pub trait ArchiveAppender: Send + Sync {
    /// Make the archive at `path` resolvable. The path must exist.
    fn add_archive(&self, path: &Path) -> RuntimeResult<()>;

    /// Release any resources held by the appender. Called at engine
    /// shutdown.
    fn close(&self);
}

/// Appender for hosts whose module search path accepts runtime additions.
pub struct SearchPathAppender {
    search_path: Arc<ModuleSearchPath>,
}

impl SearchPathAppender {
    pub fn new(search_path: Arc<ModuleSearchPath>) -> Self {
        Self { search_path }
    }
}

impl ArchiveAppender for SearchPathAppender {
    fn add_archive(&self, path: &Path) -> RuntimeResult<()> {
        if !path.exists() {
            return Err(RuntimeError::Archive(format!(
                "archive not found: {}",
                path.display()
            )));
        }
        self.search_path.push(path);
        debug!("added {:?} to module search path", path);
        Ok(())
    }

    fn close(&self) {}
}

/// Appender for sidecar deployments, delegating to the scoped loader.
pub struct SidecarAppender {
    loader: Arc<SidecarLoader>,
}

impl SidecarAppender {
    pub fn new(loader: Arc<SidecarLoader>) -> Self {
        Self { loader }
    }
}

impl ArchiveAppender for SidecarAppender {
    fn add_archive(&self, path: &Path) -> RuntimeResult<()> {
        if !path.exists() {
            return Err(RuntimeError::Archive(format!(
                "archive not found: {}",
                path.display()
            )));
        }
        self.loader.add_archive(path);
        debug!("added {:?} to sidecar loader", path);
        Ok(())
    }

    fn close(&self) {
        self.loader.close();
    }
}
