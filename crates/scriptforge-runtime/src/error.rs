//! Error types for the scriptforge runtime.

use thiserror::Error;

/// Errors that can occur in runtime plumbing (discovery, options, loading).
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// No script file found for the given name or path.
    #[error("script not found: {0}")]
    ScriptNotFound(String),

    /// The options document is malformed or contains invalid values.
    #[error("invalid script options: {0}")]
    InvalidOptions(String),

    /// An archive could not be added to the loadable code path.
    #[error("archive error: {0}")]
    Archive(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;
