//! Settings loading and persistence

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use tracing::{debug, info};

use crate::{error::Result, types::RunnerSettings};

/// Prefix of environment overrides, e.g. `PORTWARDEN_PORT=9222`
pub const ENV_PREFIX: &str = "PORTWARDEN";

/// Loads settings from a TOML file overlaid by environment variables
#[derive(Debug, Clone)]
pub struct SettingsManager {
    /// Configuration file path
    config_path: PathBuf,
    /// Environment prefix
    env_prefix: String,
}

impl SettingsManager {
    /// Manager for the default settings file
    pub fn new() -> Self {
        Self::with_path(Self::default_config_path())
    }

    /// Manager for a specific settings file
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// Use another environment prefix
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Settings file this manager reads and writes
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// `<config dir>/portwarden/config.toml`
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("portwarden")
            .join("config.toml")
    }

    /// Load and validate settings.
    ///
    /// A missing file is not an error; environment variables override values
    /// from the file, and `<PREFIX>_FLAGS` is split on commas.
    pub fn load(&self) -> Result<RunnerSettings> {
        let builder = Config::builder()
            .add_source(
                File::from(self.config_path.clone())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("flags"),
            );

        let settings: RunnerSettings = builder.build()?.try_deserialize()?;
        settings.validate()?;

        debug!(path = %self.config_path.display(), "Loaded settings");
        Ok(settings)
    }

    /// Validate and write settings as TOML, creating parent directories
    pub fn save(&self, settings: &RunnerSettings) -> Result<()> {
        settings.validate()?;

        let toml = toml::to_string_pretty(settings)?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.config_path, toml)?;

        info!(path = %self.config_path.display(), "Saved settings");
        Ok(())
    }
}

impl Default for SettingsManager {
    fn default() -> Self {
        Self::new()
    }
}
