//! Loaded-script representation.
//!
//! A [`Script`] is the engine's record of one script file: its options as
//! read at load time, its lifecycle state, its interpreter context while
//! running, and its logger. Every registration the script makes elsewhere in
//! the engine refers back to it by name.

use scriptforge_host_core::ScriptContext;
use scriptforge_runtime::ScriptOptions;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::Level;

/// Lifecycle state of a script.
///
/// `Discovered -> Loading -> Running -> Unloading -> Unloaded`, with any
/// state able to fall to `FailedToLoad` when loading errors out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptState {
    Discovered,
    Loading,
    Running,
    Unloading,
    Unloaded,
    FailedToLoad,
}

impl fmt::Display for ScriptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScriptState::Discovered => "discovered",
            ScriptState::Loading => "loading",
            ScriptState::Running => "running",
            ScriptState::Unloading => "unloading",
            ScriptState::Unloaded => "unloaded",
            ScriptState::FailedToLoad => "failed_to_load",
        };
        f.write_str(s)
    }
}

/// Logger scoped to one script.
///
/// Lines always go to the engine log tagged with the script name; when file
/// logging is enabled for the script they are also appended to its own log
/// file. Levels below the script's configured minimum are dropped.
pub struct ScriptLogger {
    script: String,
    min_level: Level,
    file: Option<Mutex<File>>,
}

impl ScriptLogger {
    /// Create a logger for `script`. When `log_file` is given the file is
    /// opened for append; failure to open it degrades to engine-log-only
    /// with a warning.
    pub fn new(script: impl Into<String>, min_level: &str, log_file: Option<&Path>) -> Self {
        let script = script.into();
        let min_level = Level::from_str(min_level).unwrap_or(Level::INFO);

        let file = log_file.and_then(|path| {
            if let Some(parent) = path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    tracing::warn!(script = %script, "failed to create log directory: {}", e);
                    return None;
                }
            }
            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(f) => Some(Mutex::new(f)),
                Err(e) => {
                    tracing::warn!(script = %script, "failed to open script log file: {}", e);
                    None
                }
            }
        });

        Self {
            script,
            min_level,
            file,
        }
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn info(&self, message: &str) {
        self.log(Level::INFO, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(Level::WARN, message);
    }

    pub fn error(&self, message: &str) {
        self.log(Level::ERROR, message);
    }

    /// Write `message` at `level`, honoring the script's minimum level.
    pub fn log(&self, level: Level, message: &str) {
        if level > self.min_level {
            return;
        }

        if level == Level::ERROR {
            tracing::error!(script = %self.script, "{}", message);
        } else if level == Level::WARN {
            tracing::warn!(script = %self.script, "{}", message);
        } else if level == Level::INFO {
            tracing::info!(script = %self.script, "{}", message);
        } else if level == Level::DEBUG {
            tracing::debug!(script = %self.script, "{}", message);
        } else {
            tracing::trace!(script = %self.script, "{}", message);
        }

        if let Some(file) = &self.file {
            let line = format!(
                "[{}] [{}] {}\n",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                level,
                message
            );
            let mut file = file.lock().expect("script log file poisoned");
            if let Err(e) = file.write_all(line.as_bytes()) {
                tracing::warn!(script = %self.script, "failed to write script log file: {}", e);
            }
        }
    }
}

/// One script known to the engine.
pub struct Script {
    name: String,
    path: PathBuf,
    options: ScriptOptions,
    logger: ScriptLogger,
    state: Mutex<ScriptState>,
    context: Mutex<Option<Box<dyn ScriptContext>>>,
    loaded_at: Mutex<Option<Instant>>,
}

impl Script {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        options: ScriptOptions,
        logger: ScriptLogger,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            options,
            logger,
            state: Mutex::new(ScriptState::Discovered),
            context: Mutex::new(None),
            loaded_at: Mutex::new(None),
        }
    }

    /// File name including extension; the script's identity everywhere in
    /// the engine.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File name without the extension, used for the script's log file.
    pub fn simple_name(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.name)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &ScriptOptions {
        &self.options
    }

    pub fn logger(&self) -> &ScriptLogger {
        &self.logger
    }

    pub fn state(&self) -> ScriptState {
        *self.state.lock().expect("script state poisoned")
    }

    pub fn set_state(&self, state: ScriptState) {
        *self.state.lock().expect("script state poisoned") = state;
    }

    /// Install the interpreter context and start the uptime clock.
    pub fn attach_context(&self, context: Box<dyn ScriptContext>) {
        *self.context.lock().expect("script context poisoned") = Some(context);
        *self.loaded_at.lock().expect("script clock poisoned") = Some(Instant::now());
    }

    /// Remove and return the interpreter context, stopping the uptime clock.
    pub fn detach_context(&self) -> Option<Box<dyn ScriptContext>> {
        *self.loaded_at.lock().expect("script clock poisoned") = None;
        self.context.lock().expect("script context poisoned").take()
    }

    /// Run `f` against the live context, if any.
    pub fn with_context<R>(&self, f: impl FnOnce(&dyn ScriptContext) -> R) -> Option<R> {
        let context = self.context.lock().expect("script context poisoned");
        context.as_deref().map(f)
    }

    /// How long the script has been loaded, or `None` when not running.
    pub fn uptime(&self) -> Option<Duration> {
        self.loaded_at
            .lock()
            .expect("script clock poisoned")
            .map(|at| at.elapsed())
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("state", &self.state())
            .finish()
    }
}
