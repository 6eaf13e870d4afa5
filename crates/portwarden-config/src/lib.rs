//! Portwarden settings
//!
//! Loads [`RunnerSettings`] from an optional TOML file overlaid by
//! `PORTWARDEN_*` environment variables, validates them, and turns them into
//! a [`LaunchConfig`](portwarden_process::LaunchConfig).

pub mod error;
pub mod manager;
pub mod types;

pub use error::{ConfigError, Result};
pub use manager::{SettingsManager, ENV_PREFIX};
pub use types::RunnerSettings;
