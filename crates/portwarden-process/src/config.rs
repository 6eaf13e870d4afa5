//! Launch configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::flags::{HEADLESS_FLAGS, NOISE_FLAGS};

/// Default page opened by the launched executable
pub const DEFAULT_STARTUP_TARGET: &str = "about:blank";

/// Immutable configuration for one supervised executable
///
/// Built once and handed to [`Supervisor::new`](crate::Supervisor::new); the
/// supervisor never mutates it afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchConfig {
    /// Control port (None = pick a free port at first spawn)
    pub port: Option<u16>,
    /// Executable path (None = ask the resolver)
    pub executable: Option<PathBuf>,
    /// User flags, appended after the built-in flags
    pub flags: Vec<String>,
    /// Page or URL passed as the final argument
    pub startup_target: String,
    /// Interval between liveness probes
    pub monitor_interval: Duration,
    /// Whether unexpected exits trigger a respawn
    pub restart_on_exit: bool,
    /// Data directory override (None = unique temp directory)
    pub data_dir: Option<PathBuf>,
    /// Redirect child stdout/stderr into the data directory
    pub logging_enabled: bool,
    /// Number of readiness probes before giving up
    pub readiness_attempts: u32,
    /// Delay between readiness probes
    pub readiness_interval: Duration,
    /// Timeout of a single TCP connect probe
    pub probe_timeout: Duration,
    /// Delay before respawning a crashed process
    pub respawn_delay: Duration,
    /// Consecutive failed liveness probes that count as a hang
    pub hang_threshold: u32,
    /// Time allowed between SIGTERM and SIGKILL during `kill()`
    pub kill_grace: Duration,
    /// Kill the child when the host receives a termination signal
    pub handle_host_signals: bool,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            port: None,
            executable: None,
            flags: Vec::new(),
            startup_target: DEFAULT_STARTUP_TARGET.to_string(),
            monitor_interval: Duration::from_millis(500),
            restart_on_exit: true,
            data_dir: None,
            logging_enabled: true,
            readiness_attempts: 10,
            readiness_interval: Duration::from_millis(500),
            probe_timeout: Duration::from_millis(500),
            respawn_delay: Duration::from_millis(250),
            hang_threshold: 3,
            kill_grace: Duration::from_secs(5),
            handle_host_signals: true,
        }
    }
}

impl LaunchConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration with background noise (sync, translate, extensions...) disabled
    pub fn without_noise() -> Self {
        Self::new().flags(NOISE_FLAGS.iter().copied())
    }

    /// Configuration that runs headless
    pub fn headless() -> Self {
        Self::new().flags(HEADLESS_FLAGS.iter().copied())
    }

    /// Set the control port
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the executable path
    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    /// Append user flags
    pub fn flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags.extend(flags.into_iter().map(Into::into));
        self
    }

    /// Append a single user flag
    pub fn flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(flag.into());
        self
    }

    /// Set the startup target
    pub fn startup_target(mut self, target: impl Into<String>) -> Self {
        self.startup_target = target.into();
        self
    }

    /// Set the liveness monitor interval
    pub fn monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    /// Enable/disable respawn on unexpected exit
    pub fn restart_on_exit(mut self, restart: bool) -> Self {
        self.restart_on_exit = restart;
        self
    }

    /// Use a fixed data directory instead of a temporary one
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Enable/disable stdout/stderr log files
    pub fn logging_enabled(mut self, enabled: bool) -> Self {
        self.logging_enabled = enabled;
        self
    }

    /// Set the readiness polling bound
    pub fn readiness(mut self, attempts: u32, interval: Duration) -> Self {
        self.readiness_attempts = attempts;
        self.readiness_interval = interval;
        self
    }

    /// Set the TCP probe timeout
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set the delay before a crash respawn
    pub fn respawn_delay(mut self, delay: Duration) -> Self {
        self.respawn_delay = delay;
        self
    }

    /// Set how many failed probes in a row count as a hang
    pub fn hang_threshold(mut self, failures: u32) -> Self {
        self.hang_threshold = failures;
        self
    }

    /// Set the SIGTERM to SIGKILL escalation delay
    pub fn kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Enable/disable the host termination hook
    pub fn handle_host_signals(mut self, enabled: bool) -> Self {
        self.handle_host_signals = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LaunchConfig::default();
        assert_eq!(config.port, None);
        assert_eq!(config.startup_target, "about:blank");
        assert_eq!(config.readiness_attempts, 10);
        assert_eq!(config.readiness_interval, Duration::from_millis(500));
        assert_eq!(config.monitor_interval, Duration::from_millis(500));
        assert!(config.restart_on_exit);
        assert!(config.logging_enabled);
    }

    #[test]
    fn test_presets_prepend_catalog() {
        let config = LaunchConfig::headless().flag("--mute-audio");
        assert_eq!(config.flags, vec!["--headless", "--disable-gpu", "--mute-audio"]);

        let quiet = LaunchConfig::without_noise();
        assert_eq!(quiet.flags.len(), NOISE_FLAGS.len());
        assert_eq!(quiet.flags[0], "--disable-translate");
    }
}
