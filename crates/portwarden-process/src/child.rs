//! Spawned child in its own process group

use std::future::Future;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn, Instrument};

use crate::error::{ProcessError, Result};

/// What the exit watcher observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    pub pid: u32,
    /// Exit code, None when terminated by a signal
    pub code: Option<i32>,
    /// Whether `kill()` asked for this exit
    pub planned: bool,
}

/// Handle to one spawned child.
///
/// The `Child` itself is owned by a watcher task that reports the exit;
/// this handle keeps the ids, the exit state and the "stop requested" flag.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
    pgid: i32,
    generation: u64,
    exit: watch::Receiver<Option<ExitReport>>,
    stopping: Arc<AtomicBool>,
}

impl ProcessHandle {
    /// Spawn `executable` in a new process group.
    ///
    /// `on_exit` runs on the watcher task once the OS reports the exit,
    /// after the exit state of the handle has been updated.
    pub(crate) fn spawn<F, Fut>(
        executable: &Path,
        args: &[String],
        stdio: (Stdio, Stdio),
        generation: u64,
        on_exit: F,
    ) -> Result<Self>
    where
        F: FnOnce(ExitReport) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        debug!(executable = %executable.display(), args = ?args, "Spawning process");

        let (stdout, stderr) = stdio;
        let mut cmd = std::process::Command::new(executable);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // the executable forks helpers; a group lets kill reach all of them
            cmd.process_group(0);
        }

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }

        let spawn_error = |source| ProcessError::Spawn {
            executable: executable.to_path_buf(),
            source,
        };

        let mut child = tokio::process::Command::from(cmd)
            .spawn()
            .map_err(spawn_error)?;
        let pid = child.id().ok_or_else(|| {
            spawn_error(std::io::Error::other("process exited before its pid was read"))
        })?;

        let (exit_tx, exit_rx) = watch::channel(None);
        let stopping = Arc::new(AtomicBool::new(false));
        let planned = Arc::clone(&stopping);

        tokio::spawn(
            async move {
                let code = match child.wait().await {
                    Ok(status) => status.code(),
                    Err(e) => {
                        warn!(pid, error = %e, "Error waiting for process");
                        None
                    }
                };
                let report = ExitReport {
                    pid,
                    code,
                    planned: planned.load(Ordering::SeqCst),
                };
                debug!(pid, code = ?code, planned = report.planned, "Process exited");
                let _ = exit_tx.send(Some(report));
                on_exit(report).await;
            }
            .in_current_span(),
        );

        Ok(Self {
            pid,
            // process_group(0) makes the child the group leader
            pgid: pid as i32,
            generation,
            exit: exit_rx,
            stopping,
        })
    }

    /// Process id
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Process group id
    pub fn pgid(&self) -> i32 {
        self.pgid
    }

    /// Spawn counter value this handle was created with
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the OS has not reported an exit yet
    pub fn is_running(&self) -> bool {
        self.exit.borrow().is_none()
    }

    /// Exit observed by the watcher, if any
    pub fn exit_report(&self) -> Option<ExitReport> {
        *self.exit.borrow()
    }

    /// Flag the upcoming exit as requested
    pub(crate) fn mark_stopping(&self) {
        self.stopping.store(true, Ordering::SeqCst);
    }

    /// Wait for the exit confirmation, at most `timeout`
    pub(crate) async fn wait_exit(&self, timeout: Duration) -> Option<ExitReport> {
        let mut exit = self.exit.clone();
        let report = match tokio::time::timeout(timeout, exit.wait_for(Option::is_some)).await {
            Ok(Ok(report)) => *report,
            Ok(Err(_)) => self.exit_report(),
            Err(_) => None,
        };
        report
    }

    /// Signal the whole process group.
    ///
    /// - Unix: SIGTERM, or SIGKILL when `force` is set, via `killpg`
    /// - Windows: `taskkill /pid <pid> /T /F`
    #[cfg(unix)]
    pub(crate) fn signal_group(&self, force: bool) -> Result<()> {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
        killpg(Pid::from_raw(self.pgid), signal).map_err(|e| ProcessError::Signal {
            pgid: self.pgid,
            reason: e.to_string(),
        })?;

        debug!(pid = self.pid, pgid = self.pgid, signal = ?signal, "Signalled process group");
        Ok(())
    }

    #[cfg(windows)]
    pub(crate) fn signal_group(&self, _force: bool) -> Result<()> {
        std::process::Command::new("taskkill")
            .args(["/pid", &self.pid.to_string(), "/T", "/F"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ProcessError::Signal {
                pgid: self.pgid,
                reason: e.to_string(),
            })?;

        debug!(pid = self.pid, "Requested process tree termination");
        Ok(())
    }
}
