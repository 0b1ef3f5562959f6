//! Shared fixtures: a simulated host and a stub interpreter.
#![allow(dead_code)]

use scriptforge_engine::{Engine, EngineConfig};
use scriptforge_host_core::{
    CancelHandle, HostAdapter, Interpreter, ModuleSearchPath, Runnable, ScriptContext,
    ScriptError, ScriptSource,
};
use scriptforge_runtime::discover_scripts;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Host whose main context and worker pool run inline and whose delayed
/// scheduling is thread-backed. Notifications are recorded for assertions.
pub struct SimHost {
    pub scripts_dir: PathBuf,
    pub features: Vec<String>,
    pub suppress_exceptions: bool,
    pub load_notices: Mutex<Vec<String>>,
    pub unload_notices: Mutex<Vec<(String, bool)>>,
    pub exception_notices: Mutex<Vec<String>>,
}

impl SimHost {
    pub fn new(scripts_dir: &Path) -> Self {
        Self {
            scripts_dir: scripts_dir.to_path_buf(),
            features: Vec::new(),
            suppress_exceptions: false,
            load_notices: Mutex::new(Vec::new()),
            unload_notices: Mutex::new(Vec::new()),
            exception_notices: Mutex::new(Vec::new()),
        }
    }

    pub fn with_features(mut self, features: &[&str]) -> Self {
        self.features = features.iter().map(|s| s.to_string()).collect();
        self
    }
}

struct FlagCancel(Arc<AtomicBool>);

impl CancelHandle for FlagCancel {
    fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl HostAdapter for SimHost {
    fn discover_script_sources(&self) -> Vec<ScriptSource> {
        discover_scripts(&self.scripts_dir, "sf").unwrap_or_default()
    }

    fn is_feature_available(&self, name: &str) -> bool {
        self.features.iter().any(|f| f == name)
    }

    fn fire_load_notification(&self, script: &str) {
        self.load_notices.lock().unwrap().push(script.to_string());
    }

    fn fire_unload_notification(&self, script: &str, error: bool) {
        self.unload_notices
            .lock()
            .unwrap()
            .push((script.to_string(), error));
    }

    fn fire_exception_notification(
        &self,
        script: &str,
        error: &ScriptError,
        context: &str,
    ) -> bool {
        self.exception_notices
            .lock()
            .unwrap()
            .push(format!("{script} [{context}]: {error}"));
        self.suppress_exceptions
    }

    fn run_on_main(&self, work: Runnable) {
        work();
    }

    fn schedule_delayed(&self, work: Runnable, delay: Duration) -> Box<dyn CancelHandle> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        thread::spawn(move || {
            thread::sleep(delay);
            if !flag.load(Ordering::SeqCst) {
                work();
            }
        });
        Box::new(FlagCancel(cancelled))
    }

    fn spawn_async(&self, work: Runnable) {
        work();
    }
}

/// What the stub interpreter saw, shared between the test and the contexts.
#[derive(Default)]
pub struct InterpLog {
    pub executed: Mutex<Vec<String>>,
    pub started: Mutex<Vec<String>>,
    pub stopped: Mutex<Vec<String>>,
}

/// Interpreter driven by directives in the script source, one per line:
/// `error` fails execution, `exit` raises a script exit, `fail_start` /
/// `fail_stop` make the matching hook fail. Anything else is ignored.
pub struct StubInterpreter {
    pub log: Arc<InterpLog>,
}

impl StubInterpreter {
    pub fn new() -> Self {
        Self {
            log: Arc::new(InterpLog::default()),
        }
    }
}

struct StubContext {
    script: String,
    log: Arc<InterpLog>,
    fail_start: AtomicBool,
    fail_stop: AtomicBool,
}

impl Interpreter for StubInterpreter {
    fn create_context(
        &self,
        script_name: &str,
        _search_path: &ModuleSearchPath,
    ) -> Result<Box<dyn ScriptContext>, ScriptError> {
        Ok(Box::new(StubContext {
            script: script_name.to_string(),
            log: Arc::clone(&self.log),
            fail_start: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
        }))
    }
}

impl ScriptContext for StubContext {
    fn execute(&self, source: &str) -> Result<(), ScriptError> {
        self.log.executed.lock().unwrap().push(self.script.clone());
        for line in source.lines().map(str::trim) {
            match line {
                "error" => return Err(ScriptError::Runtime("directive: error".to_string())),
                "exit" => return Err(ScriptError::Exit(0)),
                "fail_start" => self.fail_start.store(true, Ordering::SeqCst),
                "fail_stop" => self.fail_stop.store(true, Ordering::SeqCst),
                _ => {}
            }
        }
        Ok(())
    }

    fn run_start(&self) -> Result<(), ScriptError> {
        self.log.started.lock().unwrap().push(self.script.clone());
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(ScriptError::Runtime("directive: fail_start".to_string()));
        }
        Ok(())
    }

    fn run_stop(&self) -> Result<(), ScriptError> {
        self.log.stopped.lock().unwrap().push(self.script.clone());
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(ScriptError::Runtime("directive: fail_stop".to_string()));
        }
        Ok(())
    }
}

/// Lay out a workspace under `root` and build an engine over it.
pub struct TestBed {
    pub engine: Engine,
    pub host: Arc<SimHost>,
    pub log: Arc<InterpLog>,
}

pub fn write_script(root: &Path, name: &str, content: &str) -> PathBuf {
    let dir = root.join("scripts");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

pub fn write_options(root: &Path, content: &str) {
    std::fs::write(root.join("script_options.toml"), content).unwrap();
}

pub fn test_config(root: &Path) -> EngineConfig {
    EngineConfig {
        scripts_dir: root.join("scripts"),
        script_extension: "sf".to_string(),
        options_file: root.join("script_options.toml"),
        log_dir: root.join("logs"),
        script_action_logging: false,
        unload_on_shutdown: true,
    }
}

pub fn build(root: &Path) -> TestBed {
    build_with_host(root, SimHost::new(&root.join("scripts")))
}

pub fn build_with_host(root: &Path, host: SimHost) -> TestBed {
    let host = Arc::new(host);
    let interpreter = StubInterpreter::new();
    let log = Arc::clone(&interpreter.log);
    let engine = Engine::new(
        test_config(root),
        Arc::clone(&host) as Arc<dyn HostAdapter>,
        Arc::new(interpreter),
    )
    .unwrap();
    TestBed { engine, host, log }
}
