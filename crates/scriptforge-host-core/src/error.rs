//! Errors surfaced by script execution.

use thiserror::Error;

/// An error raised by a script, at top-level execution or inside a callback.
///
/// These are interpreter-level failures: they belong to one script and must
/// never escape past a dispatch boundary to destabilize the host or sibling
/// scripts.
#[derive(Error, Debug, Clone)]
pub enum ScriptError {
    /// The source could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// An unhandled exception escaped script code.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// The script asked to terminate itself with an exit code.
    ///
    /// Treated as a graceful unload, not a failure.
    #[error("script exited with code {0}")]
    Exit(i32),

    /// The interpreter could not create or use the script's context.
    #[error("interpreter error: {0}")]
    Interpreter(String),
}

impl ScriptError {
    /// Whether this error represents a deliberate exit rather than a failure.
    pub fn is_exit(&self) -> bool {
        matches!(self, ScriptError::Exit(_))
    }
}
