//! # scriptforge-host-core
//!
//! Boundary traits between the scriptforge engine and the host process it is
//! embedded in.
//!
//! This crate provides:
//! - The [`HostAdapter`] trait: script source discovery, feature gating,
//!   lifecycle/exception notifications, and the scheduling primitives the
//!   engine builds its task machinery on
//! - The [`Interpreter`]/[`ScriptContext`] traits: the embedded-language
//!   interpreter is an external collaborator, opaque to the engine
//! - The tagged event-kind registry used for host-agnostic event dispatch
//! - [`TokioScheduler`]: a reference implementation of the scheduling
//!   primitives backed by tokio
//!
//! ## Event model
//!
//! Hosts do not share an event class hierarchy, so dispatch is keyed by
//! [`EventKind`] tags. Each host integration registers its kinds (with
//! optional parent links standing in for native subtyping) and maps native
//! event instances to tagged [`HostEvent`] values before handing them to the
//! engine.

pub mod error;
pub mod event;
pub mod host;
pub mod interp;
pub mod tokio_host;

pub use error::ScriptError;
pub use event::{EventKind, EventKindRegistry, EventPriority, HostEvent, SCRIPT_EXCEPTION_KIND};
pub use host::{CancelHandle, HostAdapter, Runnable, ScriptSource};
pub use interp::{Interpreter, ModuleSearchPath, ScriptContext};
pub use tokio_host::TokioScheduler;
