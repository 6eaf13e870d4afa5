//! # portwarden-process
//!
//! **Purpose**: Keep one long-running executable alive behind a TCP control port
//!
//! Locates the executable, prepares a private data directory, spawns the
//! process in its own process group, waits for the control port to accept
//! connections, and then watches it: unexpected exits and hung control ports
//! lead to a respawn on the same port until `kill()` is called.
//!
//! ## Features
//!
//! - **Executable Discovery**: Environment override, `PATH` lookup and well-known install locations
//! - **Data Directory**: Unique temporary directory (or a caller-provided one) with stdout/stderr logs and a pid file
//! - **Readiness**: Bounded, cancellable TCP polling of the control port
//! - **Liveness Monitor**: Periodic probes with hang detection
//! - **Restart Policy**: Automatic respawn on unexpected exit, disabled by `kill()`
//! - **Process Group Kill**: SIGTERM→SIGKILL escalation on Unix, task trees on Windows
//! - **Host Signals**: Optional SIGINT/SIGTERM/SIGQUIT hook that stops the child before the host exits
//!
//! ## Usage
//!
//! ```rust,no_run
//! use portwarden_process::{LaunchConfig, Supervisor, SupervisorEvent};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let supervisor = Supervisor::new(LaunchConfig::without_noise().port(4577));
//! let mut events = supervisor.subscribe();
//!
//! let handle = supervisor.launch().await?;
//! println!("listening on {}", handle.port);
//!
//! if let Ok(SupervisorEvent::Restarted { pid }) = events.recv().await {
//!     println!("respawned as {pid}");
//! }
//!
//! supervisor.kill().await;
//! # Ok(())
//! # }
//! ```

pub mod child;
pub mod config;
pub mod error;
pub mod events;
pub mod flags;
pub mod health;
pub mod platform;
pub mod probe;
pub mod resolver;
pub mod resources;
pub mod shutdown;
pub mod supervisor;

pub use child::{ExitReport, ProcessHandle};
pub use config::{LaunchConfig, DEFAULT_STARTUP_TARGET};
pub use error::{ProcessError, Result};
pub use events::{DeathCause, SupervisorEvent};
pub use flags::{build_flags, FlagInputs, DEFAULT_FLAGS, HEADLESS_FLAGS, NOISE_FLAGS};
pub use health::{HealthChecker, MonitorState};
pub use platform::Platform;
pub use probe::{free_port, is_port_open, wait_until_ready, ReadinessPolicy};
pub use resolver::{resolve_executable, ExecutableResolver, SystemResolver, EXECUTABLE_ENV};
pub use resources::{ResourceManager, PID_FILE, STDERR_LOG, STDOUT_LOG};
pub use shutdown::{wait_for_shutdown_signal, HOST_EXIT_CODE};
pub use supervisor::{LaunchHandle, Supervisor, SupervisorBuilder, SupervisorState};
