//! Lifecycle notifications

use std::path::PathBuf;

use tokio::sync::broadcast;

/// Why the supervisor considers the process dead
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeathCause {
    /// The OS reported an exit the supervisor did not request
    Exited { code: Option<i32> },
    /// The control port stopped accepting connections
    Unreachable,
}

/// Event emitted by a [`Supervisor`](crate::Supervisor)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// Data directory created
    Prepared(PathBuf),
    /// Liveness probe succeeded
    Alive(u16),
    /// Unexpected exit or failed liveness probe
    Dead { pid: Option<u32>, cause: DeathCause },
    /// A crashed process was replaced
    Restarted { pid: u32 },
    /// Data directory removed after kill
    DataDirRemoved(PathBuf),
}

/// Per-supervisor broadcast channel.
///
/// Publishing never blocks; events sent while nobody listens are dropped and
/// slow receivers see `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub(crate) struct EventBus {
    tx: broadcast::Sender<SupervisorEvent>,
}

impl EventBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub(crate) fn publish(&self, event: SupervisorEvent) {
        let _ = self.tx.send(event);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_see_later_events() {
        let bus = EventBus::new(8);
        bus.publish(SupervisorEvent::Alive(1));

        let mut rx = bus.subscribe();
        bus.publish(SupervisorEvent::Alive(2));
        assert_eq!(rx.recv().await.unwrap(), SupervisorEvent::Alive(2));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(0);
        bus.publish(SupervisorEvent::Restarted { pid: 1 });
    }
}
