//! Host termination hook.
//!
//! When the hosting program receives SIGINT, SIGTERM or SIGQUIT (Ctrl-C on
//! Windows) the most recently installed hook stops its supervisor and exits
//! the host with [`HOST_EXIT_CODE`]. Installing a new hook replaces the
//! previous one, so repeated supervisors in one process never stack handlers.
//!
//! Signals are received by one process-wide listener thread, started with the
//! first hook. Registering a listener replaces the default disposition for
//! the whole process, so while no hook is installed the listener restores the
//! default action and re-raises the signal.

use std::future::Future;
use std::pin::Pin;
use std::sync::{mpsc, Once};

use parking_lot::Mutex;
use tracing::{info, warn, Instrument, Span};

/// Exit status used after a signal-triggered shutdown
pub const HOST_EXIT_CODE: i32 = 130;

type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

struct InstalledHook {
    owner: u64,
    span: Span,
    on_signal: Box<dyn FnOnce() -> HookFuture + Send>,
}

static HOOK: Mutex<Option<InstalledHook>> = parking_lot::const_mutex(None);

/// Termination signals the host listens for
#[cfg(unix)]
struct HostSignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl HostSignals {
    fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    async fn recv(&mut self) -> nix::sys::signal::Signal {
        use nix::sys::signal::Signal;

        tokio::select! {
            _ = self.interrupt.recv() => Signal::SIGINT,
            _ = self.terminate.recv() => Signal::SIGTERM,
            _ = self.quit.recv() => Signal::SIGQUIT,
        }
    }
}

#[cfg(not(unix))]
struct HostSignals;

#[cfg(not(unix))]
impl HostSignals {
    fn new() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> std::io::Result<()> {
        tokio::signal::ctrl_c().await
    }
}

/// Completes when the host receives a termination signal
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    let mut signals = HostSignals::new()?;
    #[cfg(unix)]
    signals.recv().await;
    #[cfg(not(unix))]
    signals.recv().await?;
    Ok(())
}

/// Replace the installed hook with one owned by `owner`
pub(crate) fn install<F, Fut>(owner: u64, on_signal: F)
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    start_listener();

    let hook = InstalledHook {
        owner,
        span: Span::current(),
        on_signal: Box::new(move || Box::pin(on_signal()) as HookFuture),
    };
    HOOK.lock().replace(hook);
}

/// Remove the hook if `owner` installed it
pub(crate) fn uninstall(owner: u64) {
    let mut slot = HOOK.lock();
    if slot.as_ref().is_some_and(|hook| hook.owner == owner) {
        slot.take();
    }
}

#[cfg(test)]
pub(crate) fn installed_owner() -> Option<u64> {
    HOOK.lock().as_ref().map(|hook| hook.owner)
}

/// Start the listener thread once and wait until its signal handlers exist
fn start_listener() {
    static LISTENER: Once = Once::new();

    LISTENER.call_once(|| {
        let (ready_tx, ready_rx) = mpsc::channel();
        let spawned = std::thread::Builder::new()
            .name("portwarden-signals".to_string())
            .spawn(move || listen(ready_tx));

        match spawned {
            Ok(_) => {
                let _ = ready_rx.recv();
            }
            Err(e) => warn!(error = %e, "Cannot start host signal listener"),
        }
    });
}

fn listen(ready: mpsc::Sender<()>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            warn!(error = %e, "Cannot build host signal runtime");
            let _ = ready.send(());
            return;
        }
    };

    runtime.block_on(async move {
        let signals = HostSignals::new();
        let _ = ready.send(());
        let mut signals = match signals {
            Ok(signals) => signals,
            Err(e) => {
                warn!(error = %e, "Cannot listen for host termination signals");
                return;
            }
        };

        loop {
            let received = signals.recv().await;

            // taken out first so the kill it runs cannot remove it mid-flight
            let hook = HOOK.lock().take();
            match hook {
                Some(hook) => {
                    let span = hook.span.clone();
                    async {
                        info!(signal = ?received, "Host termination requested; stopping supervised process");
                        (hook.on_signal)().await;
                    }
                    .instrument(span)
                    .await;
                    std::process::exit(HOST_EXIT_CODE);
                }
                None => terminate_by_default(received),
            }
        }
    });
}

/// Apply the default action of `signal`, which terminates the host
#[cfg(unix)]
fn terminate_by_default(signal: nix::sys::signal::Signal) {
    use nix::sys::signal::{raise, sigaction, SaFlags, SigAction, SigHandler, SigSet};

    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    // SAFETY: restoring SIG_DFL installs no handler code
    if unsafe { sigaction(signal, &default) }.is_ok() {
        let _ = raise(signal);
    }
    std::process::exit(128 + signal as i32);
}

#[cfg(not(unix))]
fn terminate_by_default(_received: std::io::Result<()>) {
    std::process::exit(HOST_EXIT_CODE);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[tokio::test]
    #[serial]
    async fn test_install_replaces_previous_hook() {
        install(1001, || async {});
        install(1001, || async {});
        assert_eq!(installed_owner(), Some(1001));

        install(1002, || async {});
        assert_eq!(installed_owner(), Some(1002));

        // only the owner may remove it
        uninstall(1001);
        assert_eq!(installed_owner(), Some(1002));

        uninstall(1002);
        assert_eq!(installed_owner(), None);
    }
}
