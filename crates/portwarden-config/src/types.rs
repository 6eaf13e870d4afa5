//! Settings file schema

use std::path::PathBuf;
use std::time::Duration;

use portwarden_process::{LaunchConfig, DEFAULT_STARTUP_TARGET, HEADLESS_FLAGS, NOISE_FLAGS};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Persisted supervisor settings.
///
/// Durations are stored in milliseconds. Every field has a default, so an
/// empty file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunnerSettings {
    /// Control port (unset = pick a free one)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Executable path (unset = discover)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,
    /// Extra flags, appended after the built-in ones
    pub flags: Vec<String>,
    /// Add the headless flags
    pub headless: bool,
    /// Add the background-noise flags
    pub quiet: bool,
    /// Final argument
    pub startup_target: String,
    /// Data directory override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// Redirect child output into the data directory
    pub logging_enabled: bool,
    /// Respawn on unexpected exit
    pub restart_on_exit: bool,
    /// Kill the child on SIGINT/SIGTERM/SIGQUIT
    pub handle_host_signals: bool,
    pub monitor_interval_ms: u64,
    pub readiness_attempts: u32,
    pub readiness_interval_ms: u64,
    pub probe_timeout_ms: u64,
    pub respawn_delay_ms: u64,
    pub hang_threshold: u32,
    pub kill_grace_ms: u64,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        let launch = LaunchConfig::default();
        Self {
            port: None,
            executable: None,
            flags: Vec::new(),
            headless: false,
            quiet: false,
            startup_target: DEFAULT_STARTUP_TARGET.to_string(),
            data_dir: None,
            logging_enabled: launch.logging_enabled,
            restart_on_exit: launch.restart_on_exit,
            handle_host_signals: launch.handle_host_signals,
            monitor_interval_ms: millis(launch.monitor_interval),
            readiness_attempts: launch.readiness_attempts,
            readiness_interval_ms: millis(launch.readiness_interval),
            probe_timeout_ms: millis(launch.probe_timeout),
            respawn_delay_ms: millis(launch.respawn_delay),
            hang_threshold: launch.hang_threshold,
            kill_grace_ms: millis(launch.kill_grace),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

impl RunnerSettings {
    /// Reject settings the supervisor cannot run with
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("monitor_interval_ms", self.monitor_interval_ms),
            ("readiness_interval_ms", self.readiness_interval_ms),
            ("probe_timeout_ms", self.probe_timeout_ms),
            ("kill_grace_ms", self.kill_grace_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Validation(format!(
                "{} must be greater than 0",
                name
            )));
        }

        if self.readiness_attempts == 0 {
            return Err(ConfigError::Validation(
                "readiness_attempts must be at least 1".to_string(),
            ));
        }
        if self.hang_threshold == 0 {
            return Err(ConfigError::Validation(
                "hang_threshold must be at least 1".to_string(),
            ));
        }
        if self.startup_target.trim().is_empty() {
            return Err(ConfigError::Validation(
                "startup_target must not be empty".to_string(),
            ));
        }
        if self.port == Some(0) {
            return Err(ConfigError::Validation(
                "port 0 is reserved; leave it unset to pick a free port".to_string(),
            ));
        }
        Ok(())
    }

    /// Convert into a launch configuration
    pub fn to_launch_config(&self) -> LaunchConfig {
        let mut config = LaunchConfig::new();
        if self.quiet {
            config = config.flags(NOISE_FLAGS.iter().copied());
        }
        if self.headless {
            config = config.flags(HEADLESS_FLAGS.iter().copied());
        }

        config = config
            .flags(self.flags.iter().cloned())
            .startup_target(self.startup_target.clone())
            .logging_enabled(self.logging_enabled)
            .restart_on_exit(self.restart_on_exit)
            .handle_host_signals(self.handle_host_signals)
            .monitor_interval(Duration::from_millis(self.monitor_interval_ms))
            .readiness(
                self.readiness_attempts,
                Duration::from_millis(self.readiness_interval_ms),
            )
            .probe_timeout(Duration::from_millis(self.probe_timeout_ms))
            .respawn_delay(Duration::from_millis(self.respawn_delay_ms))
            .hang_threshold(self.hang_threshold)
            .kill_grace(Duration::from_millis(self.kill_grace_ms));

        if let Some(port) = self.port {
            config = config.port(port);
        }
        if let Some(executable) = &self.executable {
            config = config.executable(executable.clone());
        }
        if let Some(dir) = &self.data_dir {
            config = config.data_dir(dir.clone());
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_launch_config() {
        let settings = RunnerSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.to_launch_config(), LaunchConfig::default());
    }

    #[test]
    fn test_presets_prefix_user_flags() {
        let settings = RunnerSettings {
            quiet: true,
            headless: true,
            flags: vec!["--window-size=800,600".to_string()],
            ..Default::default()
        };

        let flags = settings.to_launch_config().flags;
        assert_eq!(flags.len(), NOISE_FLAGS.len() + HEADLESS_FLAGS.len() + 1);
        assert_eq!(flags[0], NOISE_FLAGS[0]);
        assert_eq!(flags[NOISE_FLAGS.len()], HEADLESS_FLAGS[0]);
        assert_eq!(flags.last().map(String::as_str), Some("--window-size=800,600"));
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let cases = [
            RunnerSettings {
                monitor_interval_ms: 0,
                ..Default::default()
            },
            RunnerSettings {
                readiness_attempts: 0,
                ..Default::default()
            },
            RunnerSettings {
                hang_threshold: 0,
                ..Default::default()
            },
            RunnerSettings {
                startup_target: "  ".to_string(),
                ..Default::default()
            },
            RunnerSettings {
                port: Some(0),
                ..Default::default()
            },
        ];

        for settings in cases {
            assert!(matches!(
                settings.validate(),
                Err(ConfigError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_optional_fields_carry_over() {
        let settings = RunnerSettings {
            port: Some(9222),
            executable: Some(PathBuf::from("/opt/chrome/chrome")),
            data_dir: Some(PathBuf::from("/tmp/profile")),
            kill_grace_ms: 1500,
            ..Default::default()
        };

        let config = settings.to_launch_config();
        assert_eq!(config.port, Some(9222));
        assert_eq!(config.executable, Some(PathBuf::from("/opt/chrome/chrome")));
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/profile")));
        assert_eq!(config.kill_grace, Duration::from_millis(1500));
    }
}
