//! Script lifecycle: batch loading, single load, unload, and reload.
//!
//! Loading is gated in order on duplicate name, enabled flag, host feature
//! dependencies, and source presence; each gate has its own [`RunResult`]
//! variant so callers and logs can tell them apart. A batch load orders the
//! whole batch once, by load priority with names breaking ties, before any
//! script runs. Shutdown unloads in reverse load order.

use crate::config::EngineConfig;
use crate::exception::ExceptionBridge;
use crate::listener::ListenerManager;
use crate::registry::ScriptRegistry;
use crate::script::{Script, ScriptLogger, ScriptState};
use crate::task::TaskManager;
use scriptforge_host_core::{HostAdapter, Interpreter, ModuleSearchPath, ScriptError, ScriptSource};
use scriptforge_runtime::OptionsConfig;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Callback-identity tag for a script's top-level code.
const TOP_LEVEL: &str = "<main>";

/// Outcome of a load attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunResult {
    /// The script loaded and is running.
    Success,
    /// A script with the same name is already loaded.
    FailDuplicate,
    /// The script is disabled in its options.
    FailDisabled,
    /// A declared host feature dependency is missing.
    FailDependency,
    /// The script's source raised an error during load.
    FailError,
    /// The source file is missing or unreadable.
    FailSourceMissing,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        matches!(self, RunResult::Success)
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunResult::Success => "success",
            RunResult::FailDuplicate => "duplicate script name",
            RunResult::FailDisabled => "script disabled",
            RunResult::FailDependency => "missing dependency",
            RunResult::FailError => "error during load",
            RunResult::FailSourceMissing => "source missing",
        };
        f.write_str(s)
    }
}

/// Drives scripts through their lifecycle. One per engine.
pub struct ScriptManager {
    config: EngineConfig,
    options: OptionsConfig,
    host: Arc<dyn HostAdapter>,
    interpreter: Arc<dyn Interpreter>,
    search_path: Arc<ModuleSearchPath>,
    registry: Arc<ScriptRegistry>,
    listeners: Arc<ListenerManager>,
    tasks: Arc<TaskManager>,
    bridge: Arc<ExceptionBridge>,
}

impl ScriptManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: EngineConfig,
        options: OptionsConfig,
        host: Arc<dyn HostAdapter>,
        interpreter: Arc<dyn Interpreter>,
        search_path: Arc<ModuleSearchPath>,
        registry: Arc<ScriptRegistry>,
        listeners: Arc<ListenerManager>,
        tasks: Arc<TaskManager>,
        bridge: Arc<ExceptionBridge>,
    ) -> Self {
        Self {
            config,
            options,
            host,
            interpreter,
            search_path,
            registry,
            listeners,
            tasks,
            bridge,
        }
    }

    /// Load every discovered script. The order is fixed once for the whole
    /// batch before any script runs, so a script loading mid-batch cannot
    /// perturb it. Returns the number of scripts now running.
    pub fn load_all(&self) -> usize {
        let mut sources = self.host.discover_script_sources();
        sources.sort_by_key(|s| {
            (
                self.options.options_for(&s.name).load_priority,
                s.name.clone(),
            )
        });

        let mut loaded = 0;
        for source in &sources {
            match self.load(source) {
                RunResult::Success => loaded += 1,
                // Disabled is silent; a missing dependency already warned
                // with the dependency name.
                RunResult::FailDisabled | RunResult::FailDependency => {}
                result => {
                    warn!(script = %source.name, "script not loaded: {}", result);
                }
            }
        }
        info!("Loaded {} of {} discovered script(s)", loaded, sources.len());
        loaded
    }

    /// Load one script. See [`RunResult`] for the possible outcomes.
    pub fn load(&self, source: &ScriptSource) -> RunResult {
        let name = &source.name;

        if self.registry.contains(name) {
            warn!(script = %name, "a script with this name is already loaded");
            return RunResult::FailDuplicate;
        }

        let options = self.options.options_for(name);
        if !options.enabled {
            return RunResult::FailDisabled;
        }

        for dep in &options.depends {
            if !self.host.is_feature_available(dep) {
                warn!(script = %name, dependency = %dep, "missing host dependency, script not loaded");
                return RunResult::FailDependency;
            }
        }

        if !source.path.exists() {
            error!(script = %name, path = %source.path.display(), "script source not found");
            return RunResult::FailSourceMissing;
        }
        let text = match std::fs::read_to_string(&source.path) {
            Ok(text) => text,
            Err(e) => {
                error!(script = %name, "failed to read script source: {}", e);
                return RunResult::FailSourceMissing;
            }
        };

        let log_file = options.file_logging.then(|| {
            let stem = Path::new(name)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(name.as_str());
            self.config.log_dir.join(format!("{stem}.log"))
        });
        let logger = ScriptLogger::new(name.clone(), &options.min_log_level, log_file.as_deref());

        let script = Arc::new(Script::new(name.clone(), &source.path, options, logger));
        script.set_state(ScriptState::Loading);
        if !self.registry.insert(Arc::clone(&script)) {
            warn!(script = %name, "a script with this name is already loaded");
            return RunResult::FailDuplicate;
        }

        self.host.init_script_permissions(name);

        let context = match self.interpreter.create_context(name, &self.search_path) {
            Ok(context) => context,
            Err(error) => return self.fail_load(&script, "context creation", &error),
        };
        script.attach_context(context);

        if let Some(Err(error)) = script.with_context(|ctx| ctx.execute(&text)) {
            if error.is_exit() {
                info!(script = %name, "script exited during load");
                self.unload(name, false);
                return RunResult::Success;
            }
            return self.fail_load(&script, "script load", &error);
        }

        if let Some(Err(error)) = script.with_context(|ctx| ctx.run_start()) {
            return self.fail_load(&script, "start hook", &error);
        }

        script.set_state(ScriptState::Running);
        if self.config.script_action_logging {
            info!(script = %name, "Loaded script");
        }
        self.host.fire_load_notification(name);
        RunResult::Success
    }

    /// Unload a script. `error_unload` skips the stop hook, for teardown of
    /// a script that is already broken. Returns `None` for an unknown
    /// script, otherwise whether the unload was clean.
    pub fn unload(&self, name: &str, error_unload: bool) -> Option<bool> {
        let script = self.registry.get(name)?;
        script.set_state(ScriptState::Unloading);

        let mut clean = !error_unload;
        if !error_unload {
            if let Some(Err(error)) = script.with_context(|ctx| ctx.run_stop()) {
                self.bridge.report(name, "stop", "stop hook", &error);
                clean = false;
            }
        }

        self.release(name);
        script.detach_context();
        self.registry.remove(name);
        script.set_state(ScriptState::Unloaded);

        if self.config.script_action_logging {
            info!(script = %name, "Unloaded script");
        }
        self.host.fire_unload_notification(name, !clean);
        Some(clean)
    }

    /// Unload every script, most recently loaded first. Returns how many
    /// were unloaded.
    pub fn unload_all(&self) -> usize {
        let names = self.registry.names_reverse_load_order();
        let count = names.len();
        for name in names {
            self.unload(&name, false);
        }
        count
    }

    /// Unload and load the script again from its source file. An unknown
    /// name is looked up among the host's discovered sources, so a script
    /// that failed earlier can be reloaded once fixed.
    pub fn reload(&self, name: &str) -> RunResult {
        let path = match self.registry.get(name) {
            Some(script) => {
                let path = script.path().to_path_buf();
                self.unload(name, false);
                path
            }
            None => {
                match self
                    .host
                    .discover_script_sources()
                    .into_iter()
                    .find(|s| s.name == name)
                {
                    Some(source) => source.path,
                    None => {
                        error!(script = %name, "no such script");
                        return RunResult::FailSourceMissing;
                    }
                }
            }
        };
        self.load(&ScriptSource::new(name, path))
    }

    /// Teardown after a failed load: report, mark the script failed, drop
    /// every registration it managed to make, and remove it from the
    /// registry so the name can load again once the source is fixed. The
    /// unload notification carries the error flag. The failed mark goes on
    /// before the sweep; registrations racing the teardown are refused.
    fn fail_load(&self, script: &Arc<Script>, context: &str, error: &ScriptError) -> RunResult {
        self.bridge.report(script.name(), TOP_LEVEL, context, error);
        script.set_state(ScriptState::FailedToLoad);
        self.release(script.name());
        script.detach_context();
        self.registry.remove(script.name());
        self.host.fire_unload_notification(script.name(), true);
        RunResult::FailError
    }

    /// Drop everything the script registered across the engine and the host.
    fn release(&self, name: &str) {
        self.listeners.unregister_script(name);
        self.tasks.cancel_script_tasks(name);
        self.host.remove_script_permissions(name);
        self.host.unregister_from_host(name);
    }
}
