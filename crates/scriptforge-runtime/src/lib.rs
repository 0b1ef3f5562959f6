//! # scriptforge-runtime
//!
//! Runtime plumbing for the scriptforge engine.
//!
//! This crate provides:
//! - Script source discovery from a scripts folder
//! - Script options parsing (`script_options.toml`) with engine defaults
//! - The sidecar bootstrap: extracting an embedded implementation archive
//!   and constructing a loader scoped to it, for hosts whose module loader
//!   cannot add code after startup
//! - The [`ArchiveAppender`] seam the engine uses to add dependency archives
//!   at runtime, regardless of which loading strategy the host needs
//!
//! ## Script structure
//!
//! A scripts folder contains one source file per script (subfolders are
//! searched too). Options live in a single TOML document keyed by script
//! file name, with a `[defaults]` table applied to scripts that have no
//! entry of their own.

pub mod bootstrap;
pub mod discovery;
pub mod error;
pub mod loader;
pub mod options;

pub use bootstrap::{
    BootstrapError, BootstrapRegistry, EngineBootstrap, ResourceBundle, SidecarBootstrap,
    SidecarLoader,
};
pub use discovery::discover_scripts;
pub use error::{RuntimeError, RuntimeResult};
pub use loader::{ArchiveAppender, SearchPathAppender, SidecarAppender};
pub use options::{OptionsConfig, ScriptOptions};
