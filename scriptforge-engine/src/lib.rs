//! # scriptforge-engine
//!
//! A host-embeddable engine that manages the lifecycle of user scripts:
//! discovery, ordered loading, event listener registration, task
//! scheduling, exception capture, and runtime library loading.
//!
//! A host integration supplies two collaborators: a
//! [`HostAdapter`](scriptforge_host_core::HostAdapter) (discovery,
//! notifications, scheduling primitives) and an
//! [`Interpreter`](scriptforge_host_core::Interpreter) (per-script
//! execution contexts). The [`Engine`] wires everything together; one
//! engine per host process, no globals.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use scriptforge_engine::{Engine, EngineConfig};
//! # fn demo(host: Arc<dyn scriptforge_host_core::HostAdapter>,
//! #         interp: Arc<dyn scriptforge_host_core::Interpreter>) -> anyhow::Result<()> {
//! let engine = Engine::new(EngineConfig::default(), host, interp)?;
//! engine.load_all();
//! // ... host runs, events dispatch, tasks fire ...
//! engine.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod exception;
pub mod lifecycle;
pub mod listener;
pub mod registry;
pub mod script;
pub mod task;

pub use config::EngineConfig;
pub use engine::Engine;
pub use exception::ExceptionBridge;
pub use lifecycle::{RunResult, ScriptManager};
pub use listener::{DispatchFailure, ListenerError, ListenerManager, ScriptCallback};
pub use registry::ScriptRegistry;
pub use script::{Script, ScriptLogger, ScriptState};
pub use task::{ProducerCallback, TaskCallback, TaskError, TaskId, TaskManager, ValueCallback};
