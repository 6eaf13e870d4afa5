//! Command line arguments

use std::path::PathBuf;

use clap::Parser;
use portwarden_config::RunnerSettings;

#[derive(Parser, Debug)]
#[command(name = "portwarden")]
#[command(about = "Launch an executable with a TCP control port and keep it alive")]
#[command(version)]
pub struct Args {
    /// Settings file (default: <config dir>/portwarden/config.toml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Control port; reused if something already listens on it
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Executable to launch instead of the discovered one
    #[arg(short, long, value_name = "PATH")]
    pub executable: Option<PathBuf>,

    /// Extra flag passed to the executable (repeatable)
    #[arg(short = 'f', long = "flag", value_name = "FLAG", allow_hyphen_values = true)]
    pub flags: Vec<String>,

    /// Run headless
    #[arg(long)]
    pub headless: bool,

    /// Disable background networking, sync, extensions and similar noise
    #[arg(short, long)]
    pub quiet: bool,

    /// Do not respawn the process when it exits unexpectedly
    #[arg(long)]
    pub no_restart: bool,

    /// Discard the process output instead of writing log files
    #[arg(long)]
    pub no_logging: bool,

    /// Data directory (default: unique temporary directory)
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Page opened at startup
    #[arg(long, value_name = "URL")]
    pub startup_target: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Write the effective settings to the settings file and exit
    #[arg(long)]
    pub save_config: bool,
}

impl Args {
    /// Apply command line overrides on top of loaded settings
    pub fn apply(&self, settings: &mut RunnerSettings) {
        if let Some(port) = self.port {
            settings.port = Some(port);
        }
        if let Some(executable) = &self.executable {
            settings.executable = Some(executable.clone());
        }
        if let Some(dir) = &self.data_dir {
            settings.data_dir = Some(dir.clone());
        }
        if let Some(target) = &self.startup_target {
            settings.startup_target = target.clone();
        }
        settings.flags.extend(self.flags.iter().cloned());
        settings.headless |= self.headless;
        settings.quiet |= self.quiet;
        if self.no_restart {
            settings.restart_on_exit = false;
        }
        if self.no_logging {
            settings.logging_enabled = false;
        }
    }

    pub fn level(&self) -> tracing::Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "warn" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply_on_top_of_settings() {
        let args = Args::parse_from([
            "portwarden",
            "--port",
            "4577",
            "--flag",
            "--mute-audio",
            "-f",
            "--disable-gpu",
            "--headless",
            "--no-restart",
            "--startup-target",
            "https://example.com/",
        ]);

        let mut settings = RunnerSettings {
            flags: vec!["--from-file".to_string()],
            ..Default::default()
        };
        args.apply(&mut settings);

        assert_eq!(settings.port, Some(4577));
        assert_eq!(settings.flags, vec!["--from-file", "--mute-audio", "--disable-gpu"]);
        assert!(settings.headless);
        assert!(!settings.quiet);
        assert!(!settings.restart_on_exit);
        assert!(settings.logging_enabled);
        assert_eq!(settings.startup_target, "https://example.com/");
    }

    #[test]
    fn test_absent_options_keep_settings() {
        let args = Args::parse_from(["portwarden"]);
        let mut settings = RunnerSettings {
            port: Some(9222),
            quiet: true,
            ..Default::default()
        };
        args.apply(&mut settings);

        assert_eq!(settings.port, Some(9222));
        assert!(settings.quiet);
        assert!(settings.restart_on_exit);
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(Args::parse_from(["portwarden", "--log-level", "DEBUG"]).level(), tracing::Level::DEBUG);
        assert_eq!(Args::parse_from(["portwarden", "--log-level", "bogus"]).level(), tracing::Level::INFO);
    }
}
