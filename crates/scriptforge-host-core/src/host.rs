//! The host boundary.
//!
//! Each host integration supplies one [`HostAdapter`] implementation. The
//! engine consumes it for script discovery, dependency gating, lifecycle and
//! exception notifications, and the two scheduling primitives everything in
//! the task manager is built on.

use crate::error::ScriptError;
use std::path::PathBuf;
use std::time::Duration;

/// A unit of work handed to the host's scheduler.
pub type Runnable = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a scheduled unit of work that has not fired yet.
///
/// `cancel` must be safe to call concurrently with the work running: the work
/// either completes or never starts, but is never run twice.
pub trait CancelHandle: Send + Sync {
    fn cancel(&self);
}

/// One discovered script source: a stable name and the path it loads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSource {
    /// File name including extension; unique within a load batch.
    pub name: String,
    /// Absolute path of the source file.
    pub path: PathBuf,
}

impl ScriptSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Everything the engine needs from the surrounding host process.
///
/// Notification methods are best-effort fire-and-forget from the engine's
/// perspective, except [`fire_exception_notification`] whose return value
/// gates logging and must be computed synchronously.
///
/// [`fire_exception_notification`]: HostAdapter::fire_exception_notification
pub trait HostAdapter: Send + Sync {
    /// Discover candidate script sources, in stable order.
    fn discover_script_sources(&self) -> Vec<ScriptSource>;

    /// Whether the named host plugin/feature is present. Used to gate
    /// loading of scripts that declare dependencies.
    fn is_feature_available(&self, name: &str) -> bool;

    /// A script finished loading and is now running.
    fn fire_load_notification(&self, script: &str);

    /// A script was unloaded; `error` is true when the unload was
    /// error-triggered.
    fn fire_unload_notification(&self, script: &str, error: bool);

    /// A script raised an unhandled error. Returns true if the host wants
    /// the error suppressed (not written to the script's log).
    fn fire_exception_notification(&self, script: &str, error: &ScriptError, context: &str)
        -> bool;

    /// Run `work` on the host's main execution context. The caller may
    /// already be on it; the host decides.
    fn run_on_main(&self, work: Runnable);

    /// Run `work` after `delay`, on an unspecified timer context. Callers
    /// marshal onto the main context themselves when they need it.
    fn schedule_delayed(&self, work: Runnable, delay: Duration) -> Box<dyn CancelHandle>;

    /// Run `work` on the host's shared worker pool.
    fn spawn_async(&self, work: Runnable);

    /// Install host-side permissions for a script. No-op on hosts without a
    /// permission system.
    fn init_script_permissions(&self, _script: &str) {}

    /// Remove host-side permissions for a script.
    fn remove_script_permissions(&self, _script: &str) {}

    /// Platform-specific teardown invoked during unload, after the engine
    /// has released the script's listeners and tasks.
    fn unregister_from_host(&self, _script: &str) {}
}
