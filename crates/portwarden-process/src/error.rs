//! Error types for process supervision

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Process supervision errors
#[derive(Debug, Error)]
pub enum ProcessError {
    /// No executable could be located for the current platform
    #[error("No executable found: {0}")]
    Discovery(String),

    /// The host operating system is not supported
    #[error("Platform {0} is not supported")]
    UnsupportedPlatform(String),

    /// The data directory or one of its files could not be created
    #[error("Failed to prepare data directory {path}: {source}")]
    Resource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The OS refused to start the executable
    #[error("Failed to spawn {executable}: {source}")]
    Spawn {
        executable: PathBuf,
        #[source]
        source: io::Error,
    },

    /// No free local port could be reserved
    #[error("Failed to allocate a control port: {0}")]
    PortAllocation(#[source] io::Error),

    /// The control port never accepted a connection
    #[error("Control port {port} not reachable after {attempts} attempts")]
    ReadinessTimeout { port: u16, attempts: u32 },

    /// `kill()` ran while `launch()` was still waiting for readiness
    #[error("Launch cancelled by kill")]
    Cancelled,

    /// Termination signal could not be delivered
    #[error("Failed to signal process group {pgid}: {reason}")]
    Signal { pgid: i32, reason: String },

    /// Data directory removal failed
    #[error("Failed to remove data directory {path}: {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type for process operations
pub type Result<T> = std::result::Result<T, ProcessError>;
