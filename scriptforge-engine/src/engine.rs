//! The engine facade.
//!
//! An [`Engine`] wires the registries, the script manager, the task manager,
//! and the exception bridge together around one host adapter and one
//! interpreter. Hosts construct exactly one; nothing here is global.

use crate::config::EngineConfig;
use crate::exception::ExceptionBridge;
use crate::lifecycle::{RunResult, ScriptManager};
use crate::listener::{ListenerError, ListenerManager, ScriptCallback};
use crate::registry::ScriptRegistry;
use crate::script::ScriptState;
use crate::task::{ProducerCallback, TaskCallback, TaskError, TaskId, TaskManager, ValueCallback};
use anyhow::{Context, Result};
use scriptforge_host_core::{
    EventKind, EventKindRegistry, EventPriority, HostAdapter, HostEvent, Interpreter,
    ModuleSearchPath, ScriptSource, SCRIPT_EXCEPTION_KIND,
};
use scriptforge_runtime::{
    ArchiveAppender, OptionsConfig, RuntimeResult, SearchPathAppender,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub struct Engine {
    config: EngineConfig,
    kinds: Arc<EventKindRegistry>,
    search_path: Arc<ModuleSearchPath>,
    registry: Arc<ScriptRegistry>,
    listeners: Arc<ListenerManager>,
    tasks: Arc<TaskManager>,
    bridge: Arc<ExceptionBridge>,
    manager: ScriptManager,
    appender: Arc<dyn ArchiveAppender>,
}

impl Engine {
    /// Build an engine over `host` and `interpreter`. Reads the options
    /// document named by the config; a missing document means every script
    /// runs with default options.
    pub fn new(
        config: EngineConfig,
        host: Arc<dyn HostAdapter>,
        interpreter: Arc<dyn Interpreter>,
    ) -> Result<Self> {
        config.validate()?;
        let options = if config.options_file.exists() {
            OptionsConfig::from_file(&config.options_file).with_context(|| {
                format!(
                    "Failed to load script options: {}",
                    config.options_file.display()
                )
            })?
        } else {
            OptionsConfig::default()
        };

        let kinds = Arc::new(EventKindRegistry::new());
        kinds.register(EventKind::new(SCRIPT_EXCEPTION_KIND));

        let search_path = Arc::new(ModuleSearchPath::new());
        search_path.push(&config.scripts_dir);

        let registry = Arc::new(ScriptRegistry::new());
        let listeners = Arc::new(ListenerManager::new(
            Arc::clone(&kinds),
            Arc::clone(&registry),
        ));
        let bridge = Arc::new(ExceptionBridge::new(
            Arc::clone(&host),
            Arc::clone(&listeners),
            Arc::clone(&registry),
        ));
        let tasks = Arc::new(TaskManager::new(
            Arc::clone(&host),
            Arc::clone(&bridge),
            Arc::clone(&registry),
        ));
        let appender: Arc<dyn ArchiveAppender> =
            Arc::new(SearchPathAppender::new(Arc::clone(&search_path)));

        let manager = ScriptManager::new(
            config.clone(),
            options,
            Arc::clone(&host),
            interpreter,
            Arc::clone(&search_path),
            Arc::clone(&registry),
            Arc::clone(&listeners),
            Arc::clone(&tasks),
            Arc::clone(&bridge),
        );

        Ok(Self {
            config,
            kinds,
            search_path,
            registry,
            listeners,
            tasks,
            bridge,
            manager,
            appender,
        })
    }

    /// Replace the archive-appending strategy. Sidecar deployments install
    /// a `SidecarAppender` here before loading scripts.
    pub fn with_appender(mut self, appender: Arc<dyn ArchiveAppender>) -> Self {
        self.appender = appender;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The event kind registry. Hosts register the kinds they can produce
    /// here before dispatching.
    pub fn event_kinds(&self) -> &Arc<EventKindRegistry> {
        &self.kinds
    }

    pub fn search_path(&self) -> &Arc<ModuleSearchPath> {
        &self.search_path
    }

    // Lifecycle -------------------------------------------------------------

    /// Load every discovered script, in priority order. Returns how many
    /// are now running.
    pub fn load_all(&self) -> usize {
        self.manager.load_all()
    }

    pub fn load_script(&self, source: &ScriptSource) -> RunResult {
        self.manager.load(source)
    }

    /// Gracefully unload a script. Returns `None` for an unknown script,
    /// otherwise whether the unload was clean.
    pub fn unload_script(&self, name: &str) -> Option<bool> {
        self.manager.unload(name, false)
    }

    pub fn reload_script(&self, name: &str) -> RunResult {
        self.manager.reload(name)
    }

    /// Shut the engine down: unload every script (most recently loaded
    /// first) when configured to, and release the archive appender.
    pub fn shutdown(&self) {
        if self.config.unload_on_shutdown {
            self.manager.unload_all();
        }
        self.appender.close();
    }

    // Queries ---------------------------------------------------------------

    /// The tracked script by name, for command layers that need more than
    /// its state.
    pub fn script(&self, name: &str) -> Option<Arc<crate::script::Script>> {
        self.registry.get(name)
    }

    pub fn script_state(&self, name: &str) -> Option<ScriptState> {
        self.registry.get(name).map(|s| s.state())
    }

    pub fn is_script_running(&self, name: &str) -> bool {
        self.registry.is_running(name)
    }

    pub fn script_uptime(&self, name: &str) -> Option<Duration> {
        self.registry.get(name).and_then(|s| s.uptime())
    }

    /// Names of every tracked script, in load order.
    pub fn script_names(&self) -> Vec<String> {
        self.registry.names()
    }

    // Listeners -------------------------------------------------------------

    /// Register an event listener on behalf of a script.
    pub fn register_listener(
        &self,
        script: &str,
        kind: EventKind,
        callback: ScriptCallback,
        priority: EventPriority,
        ignore_cancelled: bool,
    ) -> Result<(), ListenerError> {
        self.listeners
            .register(script, kind, callback, priority, ignore_cancelled)
    }

    pub fn unregister_listener(&self, script: &str, kind: &EventKind) -> bool {
        self.listeners.unregister(script, kind)
    }

    /// Dispatch a host event to every matching listener. Listener failures
    /// are routed through the exception bridge; dispatch itself never
    /// fails.
    pub fn dispatch_event(&self, event: &HostEvent) {
        let failures = self.listeners.dispatch(event, None);
        self.bridge.report_dispatch_failures("event listener", failures);
    }

    // Tasks -----------------------------------------------------------------

    /// Schedule work on behalf of a script. Every scheduling operation
    /// requires the owning script to be loading or running.
    pub fn run_task(&self, script: &str, callback: TaskCallback) -> Result<TaskId, TaskError> {
        self.tasks.run_task(script, callback)
    }

    pub fn run_task_async(&self, script: &str, callback: TaskCallback) -> Result<TaskId, TaskError> {
        self.tasks.run_task_async(script, callback)
    }

    pub fn run_task_later(
        &self,
        script: &str,
        callback: TaskCallback,
        delay: Duration,
    ) -> Result<TaskId, TaskError> {
        self.tasks.run_task_later(script, callback, delay)
    }

    pub fn run_task_later_async(
        &self,
        script: &str,
        callback: TaskCallback,
        delay: Duration,
    ) -> Result<TaskId, TaskError> {
        self.tasks.run_task_later_async(script, callback, delay)
    }

    pub fn schedule_repeating(
        &self,
        script: &str,
        callback: TaskCallback,
        delay: Duration,
        interval: Duration,
    ) -> Result<TaskId, TaskError> {
        self.tasks.schedule_repeating(script, callback, delay, interval)
    }

    pub fn schedule_repeating_async(
        &self,
        script: &str,
        callback: TaskCallback,
        delay: Duration,
        interval: Duration,
    ) -> Result<TaskId, TaskError> {
        self.tasks
            .schedule_repeating_async(script, callback, delay, interval)
    }

    pub fn run_with_callback(
        &self,
        script: &str,
        producer: ProducerCallback,
        callback: ValueCallback,
    ) -> Result<TaskId, TaskError> {
        self.tasks.run_with_callback(script, producer, callback)
    }

    pub fn run_with_callback_later(
        &self,
        script: &str,
        producer: ProducerCallback,
        callback: ValueCallback,
        delay: Duration,
    ) -> Result<TaskId, TaskError> {
        self.tasks
            .run_with_callback_later(script, producer, callback, delay)
    }

    pub fn cancel_task(&self, id: TaskId) -> bool {
        self.tasks.cancel(id)
    }

    pub fn is_task_active(&self, id: TaskId) -> bool {
        self.tasks.is_active(id)
    }

    pub fn script_tasks(&self, script: &str) -> Vec<TaskId> {
        self.tasks.tasks_of(script)
    }

    // Libraries -------------------------------------------------------------

    /// Make the code archive at `path` resolvable by script imports, for
    /// the rest of the process lifetime.
    pub fn load_library(&self, path: &Path) -> RuntimeResult<()> {
        self.appender.add_archive(path)
    }
}
