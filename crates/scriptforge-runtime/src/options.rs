//! Script options parsing.
//!
//! Options for every script live in one TOML document, keyed by script file
//! name. A `[defaults]` table supplies values for scripts without an entry
//! and for fields an entry omits via serde defaults at the per-script
//! level, so an entry always carries a complete set after parsing.
//!
//! ```toml
//! [defaults]
//! enabled = true
//! load_priority = 1
//!
//! [scripts."economy.sf"]
//! load_priority = 5
//! depends = ["vault"]
//!
//! [scripts."broken.sf"]
//! enabled = false
//! ```

use crate::error::{RuntimeError, RuntimeResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Runtime options belonging to one script. Immutable per load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptOptions {
    /// Whether the script should be loaded at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Load priority; lower loads first, ties broken by name.
    #[serde(default = "default_load_priority")]
    pub load_priority: i32,

    /// Host plugin/feature names that must be present for the script to load.
    #[serde(default)]
    pub depends: Vec<String>,

    /// Whether the script's log output is also written to its own file.
    #[serde(default = "default_file_logging")]
    pub file_logging: bool,

    /// Minimum level written to the script's log (trace, debug, info, warn,
    /// error).
    #[serde(default = "default_min_log_level")]
    pub min_log_level: String,
}

fn default_enabled() -> bool {
    true
}

fn default_load_priority() -> i32 {
    1
}

fn default_file_logging() -> bool {
    true
}

fn default_min_log_level() -> String {
    "info".to_string()
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            load_priority: default_load_priority(),
            depends: Vec::new(),
            file_logging: default_file_logging(),
            min_log_level: default_min_log_level(),
        }
    }
}

impl ScriptOptions {
    fn validate(&self, script: &str) -> RuntimeResult<()> {
        if !LOG_LEVELS.contains(&self.min_log_level.as_str()) {
            return Err(RuntimeError::InvalidOptions(format!(
                "unknown min_log_level '{}' for script '{}'",
                self.min_log_level, script
            )));
        }
        Ok(())
    }
}

/// The parsed options document: defaults plus per-script overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptionsConfig {
    /// Options applied to scripts with no entry of their own.
    #[serde(default)]
    pub defaults: ScriptOptions,

    /// Per-script options, keyed by script file name.
    #[serde(default)]
    pub scripts: HashMap<String, ScriptOptions>,
}

impl OptionsConfig {
    /// Load the options document from a TOML file.
    pub fn from_file(path: &Path) -> RuntimeResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse the options document from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> RuntimeResult<Self> {
        let config: OptionsConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> RuntimeResult<()> {
        self.defaults.validate("defaults")?;
        for (name, options) in &self.scripts {
            options.validate(name)?;
        }
        Ok(())
    }

    /// Whether the document carries an explicit entry for the script.
    pub fn contains(&self, script: &str) -> bool {
        self.scripts.contains_key(script)
    }

    /// Options for the named script: its own entry, or the defaults.
    pub fn options_for(&self, script: &str) -> ScriptOptions {
        self.scripts
            .get(script)
            .cloned()
            .unwrap_or_else(|| self.defaults.clone())
    }
}
