//! Engine configuration loading.
//!
//! The standalone runner reads its configuration from
//! `$XDG_CONFIG_HOME/scriptforge/config.toml`. If the file doesn't exist, a
//! default configuration is created with documented comments. Embedded hosts
//! construct an [`EngineConfig`] directly instead.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Engine-wide configuration. Per-script options live in the options
/// document, not here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Directory scanned for script sources.
    pub scripts_dir: PathBuf,

    /// File extension (without dot) a file must carry to count as a script.
    pub script_extension: String,

    /// Path of the per-script options document. Missing file means every
    /// script runs with default options.
    pub options_file: PathBuf,

    /// Directory per-script log files are written to.
    pub log_dir: PathBuf,

    /// Whether load/unload actions are written to the engine log.
    pub script_action_logging: bool,

    /// Whether running scripts are unloaded (with their stop hooks) during
    /// engine shutdown.
    pub unload_on_shutdown: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scripts_dir: PathBuf::from("scripts"),
            script_extension: "sf".to_string(),
            options_file: PathBuf::from("script_options.toml"),
            log_dir: PathBuf::from("logs"),
            script_action_logging: true,
            unload_on_shutdown: true,
        }
    }
}

impl EngineConfig {
    /// Load configuration from the specified path.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: EngineConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default XDG config location, creating a
    /// commented default file on first run.
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_file(&config_path)?;
        }

        Self::load(&config_path)
    }

    /// Returns `$XDG_CONFIG_HOME/scriptforge/config.toml`.
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "scriptforge-dev", "scriptforge")
            .context("Failed to determine project directories")?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    fn create_default_file(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, Self::default_config_content())
            .with_context(|| format!("Failed to write default config file: {}", path.display()))?;

        tracing::info!("Created default configuration file at: {}", path.display());
        Ok(())
    }

    fn default_config_content() -> String {
        r#"# Scriptforge Engine Configuration

# Directory scanned (recursively) for script sources
scripts_dir = "scripts"

# File extension a file must carry to count as a script
script_extension = "sf"

# Per-script options document (enabled, load_priority, depends, ...)
options_file = "script_options.toml"

# Directory per-script log files are written to
log_dir = "logs"

# Log script load/unload actions to the engine log
script_action_logging = true

# Unload running scripts (running their stop hooks) on engine shutdown
unload_on_shutdown = true
"#
        .to_string()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.script_extension.is_empty() {
            anyhow::bail!("script_extension must not be empty");
        }
        if self.script_extension.starts_with('.') {
            anyhow::bail!(
                "script_extension must not include the dot: {}",
                self.script_extension
            );
        }
        Ok(())
    }
}
