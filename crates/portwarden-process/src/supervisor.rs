//! Process supervisor - lifecycle orchestration
//!
//! ```text
//! Idle ─► Preparing ─► Spawning ─► AwaitingReady ─► Running
//!                          ▲                           │ unexpected exit
//!                          └──── Restarting ◄── Dead ◄─┘
//! any ─► Killing ─► Killed
//! ```
//!
//! Spawn, respawn, hang kills and `kill()` are serialized by one async
//! lifecycle lock. The restart gate is an atomic flag that `kill()` clears
//! before taking the lock, and every respawn re-checks it under the lock.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::{
    child::{ExitReport, ProcessHandle},
    config::LaunchConfig,
    error::{ProcessError, Result},
    events::{DeathCause, EventBus, SupervisorEvent},
    flags::{build_flags, FlagInputs},
    health::{HealthChecker, MonitorState},
    platform::Platform,
    probe::{self, ReadinessPolicy},
    resolver::{resolve_executable, ExecutableResolver, SystemResolver},
    resources::ResourceManager,
    shutdown,
};

const DEFAULT_EVENT_CAPACITY: usize = 256;

static NEXT_SUPERVISOR_ID: AtomicU64 = AtomicU64::new(1);

/// Supervisor lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Preparing,
    Spawning,
    AwaitingReady,
    Running,
    Dead,
    Restarting,
    Killing,
    Killed,
}

/// Result of a successful [`Supervisor::launch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchHandle {
    /// Control port
    pub port: u16,
    /// Child pid, None when an existing endpoint was reused
    pub pid: Option<u32>,
    /// Data directory of the child
    pub data_dir: Option<PathBuf>,
    /// True when `launch()` found the port already reachable and spawned nothing
    pub reused: bool,
}

#[derive(Debug, Clone)]
struct Status {
    state: SupervisorState,
    port: Option<u16>,
    pid: Option<u32>,
    data_dir: Option<PathBuf>,
    monitor: MonitorState,
}

/// State guarded by the lifecycle lock
struct Lifecycle {
    platform: Option<Platform>,
    executable: Option<PathBuf>,
    port: Option<u16>,
    resources: ResourceManager,
    child: Option<ProcessHandle>,
    generation: u64,
    cancel: CancellationToken,
    monitor: Option<JoinHandle<()>>,
}

struct Inner {
    id: u64,
    config: LaunchConfig,
    resolver: Arc<dyn ExecutableResolver>,
    /// Restart gate
    restart: AtomicBool,
    /// A respawned child is still inside its readiness window
    respawning: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
    status: RwLock<Status>,
    events: EventBus,
    span: Span,
}

/// Builder for [`Supervisor`]
pub struct SupervisorBuilder {
    config: LaunchConfig,
    resolver: Arc<dyn ExecutableResolver>,
    span: Option<Span>,
    event_capacity: usize,
}

impl SupervisorBuilder {
    /// Use a custom executable resolver
    pub fn resolver(mut self, resolver: Arc<dyn ExecutableResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Record all logs of this supervisor inside `span`
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Capacity of the lifecycle event channel
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Build the supervisor; nothing is spawned until [`Supervisor::launch`]
    pub fn build(self) -> Supervisor {
        let id = NEXT_SUPERVISOR_ID.fetch_add(1, Ordering::Relaxed);
        let span = self
            .span
            .unwrap_or_else(|| info_span!("portwarden.supervisor", id));

        let resources =
            ResourceManager::new(self.config.data_dir.clone(), self.config.logging_enabled);

        Supervisor {
            inner: Arc::new(Inner {
                id,
                restart: AtomicBool::new(self.config.restart_on_exit),
                respawning: AtomicBool::new(false),
                lifecycle: Mutex::new(Lifecycle {
                    platform: None,
                    executable: None,
                    port: None,
                    resources,
                    child: None,
                    generation: 0,
                    cancel: CancellationToken::new(),
                    monitor: None,
                }),
                status: RwLock::new(Status {
                    state: SupervisorState::Idle,
                    port: None,
                    pid: None,
                    data_dir: None,
                    monitor: MonitorState::Stopped,
                }),
                events: EventBus::new(self.event_capacity),
                resolver: self.resolver,
                config: self.config,
                span,
            }),
        }
    }
}

/// Supervises one long-running executable exposing a TCP control port.
///
/// Cheap to clone; clones share the same child.
///
/// # Examples
/// ```no_run
/// use portwarden_process::{LaunchConfig, Supervisor};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let supervisor = Supervisor::new(LaunchConfig::headless().port(9222));
/// let handle = supervisor.launch().await?;
/// println!("control port {} pid {:?}", handle.port, handle.pid);
///
/// supervisor.kill().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    /// Supervisor with the system resolver and a default span
    pub fn new(config: LaunchConfig) -> Self {
        Self::builder(config).build()
    }

    /// Start building a supervisor
    pub fn builder(config: LaunchConfig) -> SupervisorBuilder {
        SupervisorBuilder {
            config,
            resolver: Arc::new(SystemResolver::new()),
            span: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Configuration snapshot
    pub fn config(&self) -> &LaunchConfig {
        &self.inner.config
    }

    /// Receive lifecycle events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.inner.events.subscribe()
    }

    /// Current state
    pub fn state(&self) -> SupervisorState {
        self.inner.status.read().state
    }

    /// Control port, once assigned
    pub fn port(&self) -> Option<u16> {
        self.inner.status.read().port
    }

    /// Pid of the current child
    pub fn pid(&self) -> Option<u32> {
        self.inner.status.read().pid
    }

    /// Data directory, while prepared
    pub fn data_dir(&self) -> Option<PathBuf> {
        self.inner.status.read().data_dir.clone()
    }

    /// Whether the liveness monitor is polling
    pub fn monitor_state(&self) -> MonitorState {
        self.inner.status.read().monitor
    }

    /// Whether an unexpected exit would currently trigger a respawn
    pub fn restart_enabled(&self) -> bool {
        self.inner.restart.load(Ordering::SeqCst)
    }

    /// Launch the executable and wait until its control port accepts connections.
    ///
    /// - With an explicit port that is already reachable, nothing is spawned.
    /// - With a live child, returns the existing pid without spawning.
    /// - [`ProcessError::ReadinessTimeout`] leaves the child running.
    /// - A concurrent [`kill`](Self::kill) makes this return [`ProcessError::Cancelled`].
    pub async fn launch(&self) -> Result<LaunchHandle> {
        let inner = &self.inner;
        inner.launch().instrument(inner.span.clone()).await
    }

    /// Stop the child and release every resource.
    ///
    /// Disables restarts, cancels readiness polling and the monitor, signals
    /// the whole process group, waits for the exit, then removes the data
    /// directory. Safe to call repeatedly or before any launch.
    pub async fn kill(&self) {
        let inner = &self.inner;
        inner.kill().instrument(inner.span.clone()).await
    }
}

impl Inner {
    fn set_state(&self, state: SupervisorState) {
        let mut status = self.status.write();
        if status.state != state {
            debug!(from = ?status.state, to = ?state, "State transition");
            status.state = state;
        }
    }

    fn state(&self) -> SupervisorState {
        self.status.read().state
    }

    fn readiness_policy(&self) -> ReadinessPolicy {
        ReadinessPolicy {
            attempts: self.config.readiness_attempts,
            interval: self.config.readiness_interval,
            probe_timeout: self.config.probe_timeout,
        }
    }

    async fn launch(self: &Arc<Self>) -> Result<LaunchHandle> {
        let (port, cancel) = {
            let mut lc = self.lifecycle.lock().await;

            if let Some(child) = lc.child.as_ref().filter(|c| c.is_running()) {
                info!(pid = child.pid(), "Process already running");
                return Ok(LaunchHandle {
                    port: lc.port.unwrap_or_default(),
                    pid: Some(child.pid()),
                    data_dir: lc.resources.dir().map(Path::to_path_buf),
                    reused: false,
                });
            }

            if let Some(port) = self.config.port {
                if probe::is_port_open(port, self.config.probe_timeout).await {
                    info!(port, "Control port already reachable; reusing it");
                    lc.port = Some(port);
                    {
                        let mut status = self.status.write();
                        status.port = Some(port);
                        status.state = SupervisorState::Running;
                    }
                    self.events.publish(SupervisorEvent::Alive(port));
                    return Ok(LaunchHandle {
                        port,
                        pid: None,
                        data_dir: None,
                        reused: true,
                    });
                }
                debug!(port, "Nothing listening on configured port; launching a new process");
            }

            self.restart
                .store(self.config.restart_on_exit, Ordering::SeqCst);
            lc.cancel = CancellationToken::new();
            lc.child = None;

            if let Err(e) = self.spawn_locked(&mut lc) {
                error!(error = %e, "Launch failed");
                self.set_state(SupervisorState::Idle);
                return Err(e);
            }

            (lc.port.unwrap_or_default(), lc.cancel.clone())
        };

        if let Err(e) = probe::wait_until_ready(port, self.readiness_policy(), &cancel).await {
            match &e {
                ProcessError::ReadinessTimeout { .. } => {
                    warn!(port, error = %e, "Process left running for inspection")
                }
                _ => info!(port, "Launch interrupted by kill"),
            }
            return Err(e);
        }

        let mut lc = self.lifecycle.lock().await;
        if cancel.is_cancelled() {
            return Err(ProcessError::Cancelled);
        }

        self.set_state(SupervisorState::Running);
        self.events.publish(SupervisorEvent::Alive(port));
        self.start_monitor(&mut lc, port, cancel);

        let pid = lc.child.as_ref().map(ProcessHandle::pid);
        info!(port, pid = ?pid, "Process ready");
        Ok(LaunchHandle {
            port,
            pid,
            data_dir: lc.resources.dir().map(Path::to_path_buf),
            reused: false,
        })
    }

    /// Resolve, prepare and spawn one child. Caller holds the lifecycle lock.
    fn spawn_locked(self: &Arc<Self>, lc: &mut Lifecycle) -> Result<u32> {
        self.set_state(SupervisorState::Preparing);

        let platform = match lc.platform {
            Some(platform) => platform,
            None => *lc.platform.insert(Platform::current()?),
        };

        let executable = match &lc.executable {
            Some(executable) => executable.clone(),
            None => {
                let executable = match &self.config.executable {
                    Some(executable) => executable.clone(),
                    None => resolve_executable(self.resolver.as_ref(), platform)?,
                };
                lc.executable.insert(executable).clone()
            }
        };

        if !lc.resources.is_prepared() {
            let dir = lc.resources.prepare()?;
            self.status.write().data_dir = Some(dir.clone());
            self.events.publish(SupervisorEvent::Prepared(dir));
        }

        let port = match lc.port {
            Some(port) => port,
            None => {
                let port = match self.config.port {
                    Some(port) => port,
                    None => probe::free_port().map_err(ProcessError::PortAllocation)?,
                };
                self.status.write().port = Some(port);
                *lc.port.insert(port)
            }
        };

        let data_dir = lc.resources.dir().map(Path::to_path_buf).unwrap_or_default();
        let args = build_flags(FlagInputs {
            port,
            data_dir: &data_dir,
            platform,
            user_flags: &self.config.flags,
            startup_target: &self.config.startup_target,
        });

        self.set_state(SupervisorState::Spawning);
        lc.generation += 1;
        let generation = lc.generation;
        let weak = Arc::downgrade(self);

        let child = ProcessHandle::spawn(
            &executable,
            &args,
            lc.resources.stdio()?,
            generation,
            move |report| async move {
                if let Some(inner) = weak.upgrade() {
                    inner.on_exit(generation, report).await;
                }
            },
        )?;

        let pid = child.pid();
        if let Err(e) = lc.resources.write_pid(pid) {
            warn!(pid, error = %e, "Cannot record pid; stopping the new process");
            child.mark_stopping();
            if let Err(signal_err) = child.signal_group(true) {
                warn!(error = %signal_err, "Kill signal not delivered");
            }
            return Err(e);
        }
        lc.child = Some(child);
        self.status.write().pid = Some(pid);

        if self.config.handle_host_signals {
            let weak = Arc::downgrade(self);
            shutdown::install(self.id, move || async move {
                if let Some(inner) = weak.upgrade() {
                    inner.kill().await;
                }
            });
        }

        info!(pid, port, executable = %executable.display(), "Process spawned");
        self.set_state(SupervisorState::AwaitingReady);
        Ok(pid)
    }

    /// Exit notification from the watcher of child `generation`
    async fn on_exit(self: Arc<Self>, generation: u64, report: ExitReport) {
        if report.planned {
            debug!(pid = report.pid, "Process exited after kill");
            return;
        }

        warn!(pid = report.pid, code = ?report.code, "Process exited unexpectedly");
        self.set_state(SupervisorState::Dead);
        self.events.publish(SupervisorEvent::Dead {
            pid: Some(report.pid),
            cause: DeathCause::Exited { code: report.code },
        });

        if !self.restart.load(Ordering::SeqCst) {
            info!(pid = report.pid, "Restart policy inactive; not respawning");
            return;
        }

        tokio::time::sleep(self.config.respawn_delay).await;
        self.respawn(generation).await;
    }

    async fn respawn(self: &Arc<Self>, generation: u64) {
        let (pid, port, cancel) = {
            let mut lc = self.lifecycle.lock().await;

            if !self.restart.load(Ordering::SeqCst) {
                debug!("Restart disabled while waiting to respawn");
                return;
            }
            if lc.child.as_ref().map(ProcessHandle::generation) != Some(generation) {
                debug!(generation, "Stale exit notification; child already replaced");
                return;
            }

            lc.child = None;
            self.set_state(SupervisorState::Restarting);
            self.respawning.store(true, Ordering::SeqCst);
            match self.spawn_locked(&mut lc) {
                Ok(pid) => (pid, lc.port.unwrap_or_default(), lc.cancel.clone()),
                Err(e) => {
                    error!(error = %e, "Respawn failed");
                    self.respawning.store(false, Ordering::SeqCst);
                    self.set_state(SupervisorState::Dead);
                    return;
                }
            }
        };

        info!(pid, port, "Process restarted");
        self.events.publish(SupervisorEvent::Restarted { pid });

        match probe::wait_until_ready(port, self.readiness_policy(), &cancel).await {
            Ok(()) => {
                let mut status = self.status.write();
                if status.state == SupervisorState::AwaitingReady && status.pid == Some(pid) {
                    status.state = SupervisorState::Running;
                }
            }
            Err(ProcessError::Cancelled) => {}
            Err(e) => warn!(pid, error = %e, "Restarted process not ready; liveness monitor takes over"),
        }
        self.respawning.store(false, Ordering::SeqCst);
    }

    /// Whether the monitor checks the port: a spawned child outside a respawn readiness window
    fn liveness_check_due(&self) -> bool {
        let state = self.state();
        matches!(state, SupervisorState::Running | SupervisorState::AwaitingReady)
            && !self.respawning.load(Ordering::SeqCst)
    }

    fn start_monitor(self: &Arc<Self>, lc: &mut Lifecycle, port: u16, cancel: CancellationToken) {
        if lc.monitor.as_ref().is_some_and(|m| !m.is_finished()) {
            return;
        }

        let checker = HealthChecker::new(self.config.monitor_interval, self.config.hang_threshold);
        let weak = Arc::downgrade(self);
        self.status.write().monitor = MonitorState::Polling;
        lc.monitor = Some(tokio::spawn(
            monitor_loop(weak, port, checker, cancel).instrument(self.span.clone()),
        ));
    }

    /// Kill a child whose control port stopped answering; the exit watcher respawns it
    async fn kill_hung_child(&self) {
        let lc = self.lifecycle.lock().await;
        if !self.restart.load(Ordering::SeqCst) {
            return;
        }

        if let Some(child) = lc.child.as_ref().filter(|c| c.is_running()) {
            warn!(pid = child.pid(), "Control port unresponsive; killing hung process group");
            if let Err(e) = child.signal_group(true) {
                warn!(error = %e, "Could not kill hung process group");
            }
        }
    }

    async fn kill(&self) {
        self.restart.store(false, Ordering::SeqCst);

        let mut lc = self.lifecycle.lock().await;
        lc.cancel.cancel();
        if let Some(monitor) = lc.monitor.take() {
            monitor.abort();
        }
        self.status.write().monitor = MonitorState::Stopped;
        shutdown::uninstall(self.id);

        let Some(child) = lc.child.take() else {
            if let Some(dir) = lc.resources.destroy() {
                self.events.publish(SupervisorEvent::DataDirRemoved(dir));
            }
            self.status.write().data_dir = None;
            if self.state() != SupervisorState::Idle {
                self.set_state(SupervisorState::Killed);
            }
            debug!("No process to kill");
            return;
        };

        self.set_state(SupervisorState::Killing);
        child.mark_stopping();

        if child.is_running() {
            info!(pid = child.pid(), pgid = child.pgid(), "Killing process group");
            if let Err(e) = child.signal_group(false) {
                warn!(error = %e, "Termination signal not delivered");
            }

            if child.wait_exit(self.config.kill_grace).await.is_none() {
                warn!(pid = child.pid(), "Process group ignored SIGTERM; sending SIGKILL");
                if let Err(e) = child.signal_group(true) {
                    warn!(error = %e, "Kill signal not delivered");
                }

                if child.wait_exit(self.config.kill_grace).await.is_none() {
                    error!(pid = child.pid(), "Process did not exit; keeping data directory");
                    lc.child = Some(child);
                    return;
                }
            }
        }

        self.status.write().pid = None;
        if let Some(dir) = lc.resources.destroy() {
            self.events.publish(SupervisorEvent::DataDirRemoved(dir));
        }
        self.status.write().data_dir = None;
        self.set_state(SupervisorState::Killed);
        info!("Process stopped and resources released");
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        shutdown::uninstall(self.id);
        let lc = self.lifecycle.get_mut();
        if let Some(child) = lc.child.as_ref().filter(|c| c.is_running()) {
            warn!(pid = child.pid(), "Supervisor dropped without kill; killing process group");
            child.mark_stopping();
            let _ = child.signal_group(true);
        }
        // best effort: exit confirmation cannot be awaited here
        if let Some(dir) = lc.resources.destroy() {
            debug!(data_dir = %dir.display(), "Removed data directory on drop");
        }
    }
}

async fn monitor_loop(
    weak: Weak<Inner>,
    port: u16,
    mut checker: HealthChecker,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(checker.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;

    debug!(port, interval_ms = checker.interval().as_millis() as u64, "Liveness monitor started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(inner) = weak.upgrade() else {
            break;
        };

        if !inner.liveness_check_due() {
            checker.reset();
            continue;
        }

        if probe::is_port_open(port, inner.config.probe_timeout).await {
            checker.record_success();
            {
                let mut status = inner.status.write();
                if status.state == SupervisorState::AwaitingReady {
                    debug!(port, "Control port came up late");
                    status.state = SupervisorState::Running;
                }
            }
            inner.events.publish(SupervisorEvent::Alive(port));
            continue;
        }

        checker.record_failure();
        inner.events.publish(SupervisorEvent::Dead {
            pid: inner.status.read().pid,
            cause: DeathCause::Unreachable,
        });

        if checker.is_unhealthy() {
            inner.kill_hung_child().await;
            checker.reset();
        }
    }

    if let Some(inner) = weak.upgrade() {
        inner.status.write().monitor = MonitorState::Stopped;
    }
    debug!(port, "Liveness monitor stopped");
}
