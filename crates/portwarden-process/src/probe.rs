//! TCP reachability of the control port

use std::io;
use std::net::{Ipv4Addr, TcpListener};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ProcessError, Result};

/// Ask the OS for a port that is free right now
pub fn free_port() -> io::Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    Ok(listener.local_addr()?.port())
}

/// Whether `port` on localhost accepts a TCP connection within `timeout`
pub async fn is_port_open(port: u16, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect((Ipv4Addr::LOCALHOST, port))).await,
        Ok(Ok(_))
    )
}

/// Readiness polling bound
#[derive(Debug, Clone, Copy)]
pub struct ReadinessPolicy {
    pub attempts: u32,
    pub interval: Duration,
    pub probe_timeout: Duration,
}

/// Poll `port` until it accepts a connection.
///
/// Makes at most `policy.attempts` probes with `policy.interval` between
/// them. Fails with [`ProcessError::ReadinessTimeout`] when every probe
/// failed and with [`ProcessError::Cancelled`] as soon as `cancel` fires.
pub async fn wait_until_ready(
    port: u16,
    policy: ReadinessPolicy,
    cancel: &CancellationToken,
) -> Result<()> {
    let attempts = policy.attempts.max(1);

    for attempt in 1..=attempts {
        if cancel.is_cancelled() {
            return Err(ProcessError::Cancelled);
        }
        if is_port_open(port, policy.probe_timeout).await {
            debug!(port, attempt, "Control port ready");
            return Ok(());
        }
        if attempt == attempts {
            break;
        }

        debug!(port, attempt, "Control port not ready yet");
        tokio::select! {
            _ = cancel.cancelled() => return Err(ProcessError::Cancelled),
            _ = tokio::time::sleep(policy.interval) => {}
        }
    }

    Err(ProcessError::ReadinessTimeout { port, attempts })
}
