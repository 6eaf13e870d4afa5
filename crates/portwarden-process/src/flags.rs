//! Command line flags passed to the supervised executable

use std::path::Path;

use crate::platform::Platform;

/// Flags every launch starts with
pub const DEFAULT_FLAGS: &[&str] = &[
    // Skip first run wizards
    "--no-first-run",
];

/// Flags that silence background services
pub const NOISE_FLAGS: &[&str] = &[
    "--disable-translate",
    "--disable-extensions",
    "--disable-background-networking",
    "--safebrowsing-disable-auto-update",
    "--disable-sync",
    "--metrics-recording-only",
    "--disable-default-apps",
];

/// Flags for running without a display
pub const HEADLESS_FLAGS: &[&str] = &["--headless", "--disable-gpu"];

/// Inputs of [`build_flags`]
#[derive(Debug, Clone, Copy)]
pub struct FlagInputs<'a> {
    pub port: u16,
    pub data_dir: &'a Path,
    pub platform: Platform,
    pub user_flags: &'a [String],
    pub startup_target: &'a str,
}

/// Compose the full argument list.
///
/// Order is fixed: defaults, debug port, data dir, platform flags, user
/// flags, startup target last.
pub fn build_flags(inputs: FlagInputs<'_>) -> Vec<String> {
    let mut flags: Vec<String> = DEFAULT_FLAGS.iter().map(|f| f.to_string()).collect();

    flags.push(format!("--remote-debugging-port={}", inputs.port));
    flags.push(format!("--user-data-dir={}", inputs.data_dir.display()));
    flags.extend(inputs.platform.hardening_flags().iter().map(|f| f.to_string()));
    flags.extend(inputs.user_flags.iter().cloned());
    flags.push(inputs.startup_target.to_string());

    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_exact_order_on_linux() {
        let dir = PathBuf::from("/tmp/portwarden_test");
        let user = vec!["--headless".to_string(), "--disable-gpu".to_string()];

        let flags = build_flags(FlagInputs {
            port: 4577,
            data_dir: &dir,
            platform: Platform::Linux,
            user_flags: &user,
            startup_target: "about:blank",
        });

        assert_eq!(
            flags,
            vec![
                "--no-first-run",
                "--remote-debugging-port=4577",
                "--user-data-dir=/tmp/portwarden_test",
                "--disable-setuid-sandbox",
                "--no-sandbox",
                "--headless",
                "--disable-gpu",
                "about:blank",
            ]
        );
    }

    #[test]
    fn test_no_platform_flags_on_macos() {
        let dir = PathBuf::from("/tmp/x");
        let flags = build_flags(FlagInputs {
            port: 9222,
            data_dir: &dir,
            platform: Platform::MacOs,
            user_flags: &[],
            startup_target: "https://example.com",
        });

        assert_eq!(
            flags,
            vec![
                "--no-first-run",
                "--remote-debugging-port=9222",
                "--user-data-dir=/tmp/x",
                "https://example.com",
            ]
        );
    }
}
