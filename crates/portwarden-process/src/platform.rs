//! Host platform detection

use std::fmt;

use crate::error::{ProcessError, Result};

/// Platforms the supervisor knows how to launch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

impl Platform {
    /// Platform of the running host
    pub fn current() -> Result<Self> {
        Self::from_os(std::env::consts::OS)
    }

    /// Map an `std::env::consts::OS` value to a platform
    pub fn from_os(os: &str) -> Result<Self> {
        match os {
            "linux" => Ok(Platform::Linux),
            "macos" => Ok(Platform::MacOs),
            "windows" => Ok(Platform::Windows),
            other => Err(ProcessError::UnsupportedPlatform(other.to_string())),
        }
    }

    /// Flags the orchestration environment needs on this platform
    pub fn hardening_flags(&self) -> &'static [&'static str] {
        match self {
            // setuid sandbox is unavailable in most containers
            Platform::Linux => &["--disable-setuid-sandbox", "--no-sandbox"],
            Platform::MacOs | Platform::Windows => &[],
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Linux => "linux",
            Platform::MacOs => "macos",
            Platform::Windows => "windows",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_os() {
        assert_eq!(Platform::from_os("linux").unwrap(), Platform::Linux);
        assert_eq!(Platform::from_os("macos").unwrap(), Platform::MacOs);
        assert_eq!(Platform::from_os("windows").unwrap(), Platform::Windows);

        match Platform::from_os("freebsd") {
            Err(ProcessError::UnsupportedPlatform(os)) => assert_eq!(os, "freebsd"),
            other => panic!("Expected UnsupportedPlatform, got {:?}", other),
        }
    }

    #[test]
    fn test_only_linux_needs_hardening() {
        assert_eq!(Platform::Linux.hardening_flags().len(), 2);
        assert!(Platform::MacOs.hardening_flags().is_empty());
        assert!(Platform::Windows.hardening_flags().is_empty());
    }
}
