//! Standalone script runner.
//!
//! Runs the engine outside any host process: scripts are discovered under
//! the configured scripts directory, loaded in priority order, and unloaded
//! on Ctrl+C. The host adapter is backed by a tokio scheduler; there is no
//! real interpreter, so script sources are traced rather than executed.
//! Useful for exercising options documents and load ordering without a
//! host.
//!
//! ```bash
//! # Run with the default configuration
//! cargo run --bin scriptforge
//!
//! # With debug logging
//! RUST_LOG=debug cargo run --bin scriptforge
//! ```

use anyhow::Result;
use scriptforge_engine::{Engine, EngineConfig};
use scriptforge_host_core::{
    CancelHandle, HostAdapter, Interpreter, ModuleSearchPath, Runnable, ScriptContext,
    ScriptError, ScriptSource, TokioScheduler,
};
use scriptforge_runtime::discover_scripts;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Host adapter for running without a surrounding host process.
struct StandaloneHost {
    scheduler: TokioScheduler,
    scripts_dir: PathBuf,
    extension: String,
}

impl HostAdapter for StandaloneHost {
    fn discover_script_sources(&self) -> Vec<ScriptSource> {
        match discover_scripts(&self.scripts_dir, &self.extension) {
            Ok(sources) => sources,
            Err(e) => {
                warn!("script discovery failed: {}", e);
                Vec::new()
            }
        }
    }

    // No plugin system when standalone; every declared dependency is
    // missing.
    fn is_feature_available(&self, _name: &str) -> bool {
        false
    }

    fn fire_load_notification(&self, script: &str) {
        debug!(script, "load notification");
    }

    fn fire_unload_notification(&self, script: &str, error: bool) {
        debug!(script, error, "unload notification");
    }

    fn fire_exception_notification(
        &self,
        _script: &str,
        _error: &ScriptError,
        _context: &str,
    ) -> bool {
        false
    }

    fn run_on_main(&self, work: Runnable) {
        self.scheduler.run_on_main(work);
    }

    fn schedule_delayed(&self, work: Runnable, delay: Duration) -> Box<dyn CancelHandle> {
        self.scheduler.schedule_delayed(work, delay)
    }

    fn spawn_async(&self, work: Runnable) {
        self.scheduler.spawn_async(work);
    }
}

/// Interpreter stand-in that traces instead of executing.
struct TraceInterpreter;

struct TraceContext {
    script: String,
}

impl Interpreter for TraceInterpreter {
    fn create_context(
        &self,
        script_name: &str,
        _search_path: &ModuleSearchPath,
    ) -> Result<Box<dyn ScriptContext>, ScriptError> {
        Ok(Box::new(TraceContext {
            script: script_name.to_string(),
        }))
    }
}

impl ScriptContext for TraceContext {
    fn execute(&self, source: &str) -> Result<(), ScriptError> {
        info!(script = %self.script, "would execute {} byte(s) of source", source.len());
        Ok(())
    }

    fn run_start(&self) -> Result<(), ScriptError> {
        debug!(script = %self.script, "start hook");
        Ok(())
    }

    fn run_stop(&self) -> Result<(), ScriptError> {
        debug!(script = %self.script, "stop hook");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    info!("Starting scriptforge v{}", env!("CARGO_PKG_VERSION"));

    let config = match EngineConfig::load_default() {
        Ok(cfg) => {
            info!("Loaded configuration from default path");
            cfg
        }
        Err(e) => {
            info!("Failed to load config, using defaults: {}", e);
            EngineConfig::default()
        }
    };

    let host = Arc::new(StandaloneHost {
        scheduler: TokioScheduler::start(),
        scripts_dir: config.scripts_dir.clone(),
        extension: config.script_extension.clone(),
    });

    let engine = Engine::new(config, host, Arc::new(TraceInterpreter))?;

    let loaded = engine.load_all();
    info!("{} script(s) running", loaded);
    info!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;

    info!("Shutting down...");
    engine.shutdown();
    // Dropping the host adapter stops its scheduler loop.
    drop(engine);

    info!("Stopped");
    Ok(())
}
