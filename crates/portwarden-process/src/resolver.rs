//! Executable discovery

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ProcessError, Result};
use crate::platform::Platform;

/// Environment variable that overrides discovery
pub const EXECUTABLE_ENV: &str = "CHROME_PATH";

/// Source of candidate executables, best first
pub trait ExecutableResolver: Send + Sync {
    /// Candidate paths for `platform`, ordered by preference
    fn candidates(&self, platform: Platform) -> Vec<PathBuf>;
}

/// Resolve the preferred executable or fail with [`ProcessError::Discovery`]
pub fn resolve_executable(
    resolver: &dyn ExecutableResolver,
    platform: Platform,
) -> Result<PathBuf> {
    let candidates = resolver.candidates(platform);
    debug!(platform = %platform, candidates = ?candidates, "Resolved executable candidates");

    candidates.into_iter().next().ok_or_else(|| {
        ProcessError::Discovery(format!(
            "no installation found for {}; set {} to an executable",
            platform, EXECUTABLE_ENV
        ))
    })
}

/// Default resolver: env override, `PATH` lookup, well-known install locations
#[derive(Debug, Clone)]
pub struct SystemResolver {
    env_var: String,
}

impl SystemResolver {
    /// Create a resolver reading [`EXECUTABLE_ENV`]
    pub fn new() -> Self {
        Self {
            env_var: EXECUTABLE_ENV.to_string(),
        }
    }

    /// Read the override from a different environment variable
    pub fn with_env_var(env_var: impl Into<String>) -> Self {
        Self {
            env_var: env_var.into(),
        }
    }

    fn env_override(&self) -> Option<PathBuf> {
        std::env::var_os(&self.env_var)
            .map(PathBuf::from)
            .filter(|p| is_accessible(p))
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutableResolver for SystemResolver {
    fn candidates(&self, platform: Platform) -> Vec<PathBuf> {
        let mut found: Vec<PathBuf> = self.env_override().into_iter().collect();

        match platform {
            Platform::Linux => {
                for name in [
                    "google-chrome-stable",
                    "google-chrome",
                    "chromium",
                    "chromium-browser",
                ] {
                    if let Ok(path) = which::which(name) {
                        found.push(path);
                    }
                }
            }
            Platform::MacOs => {
                let mut roots = vec![PathBuf::from("/Applications")];
                if let Some(home) = std::env::var_os("HOME") {
                    roots.push(PathBuf::from(home).join("Applications"));
                }
                for root in roots {
                    for bundle in [
                        "Google Chrome.app/Contents/MacOS/Google Chrome",
                        "Google Chrome Canary.app/Contents/MacOS/Google Chrome Canary",
                        "Chromium.app/Contents/MacOS/Chromium",
                    ] {
                        let path = root.join(bundle);
                        if is_accessible(&path) {
                            found.push(path);
                        }
                    }
                }
            }
            Platform::Windows => {
                for prefix_var in ["LOCALAPPDATA", "PROGRAMFILES", "PROGRAMFILES(X86)"] {
                    let Some(prefix) = std::env::var_os(prefix_var) else {
                        continue;
                    };
                    for suffix in [
                        r"Google\Chrome SxS\Application\chrome.exe",
                        r"Google\Chrome\Application\chrome.exe",
                    ] {
                        let path = PathBuf::from(&prefix).join(suffix);
                        if is_accessible(&path) {
                            found.push(path);
                        }
                    }
                }
            }
        }

        dedup_preserving_order(found)
    }
}

fn is_accessible(path: &Path) -> bool {
    path.is_file()
}

fn dedup_preserving_order(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut unique: Vec<PathBuf> = Vec::with_capacity(paths.len());
    for path in paths {
        if !unique.contains(&path) {
            unique.push(path);
        }
    }
    unique
}
