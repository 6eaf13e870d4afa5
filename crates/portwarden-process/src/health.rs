//! Liveness bookkeeping for the periodic monitor

use std::time::Duration;

use tracing::{debug, warn};

/// Whether the periodic monitor is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Stopped,
    Polling,
}

/// Tracks consecutive probe failures
#[derive(Debug, Clone)]
pub struct HealthChecker {
    /// Probe interval
    check_interval: Duration,
    /// Number of consecutive failures
    failure_count: u32,
    /// Consecutive failures before the process counts as hung
    max_failures: u32,
}

impl HealthChecker {
    /// Create a new health checker
    pub fn new(check_interval: Duration, max_failures: u32) -> Self {
        Self {
            check_interval,
            failure_count: 0,
            max_failures: max_failures.max(1),
        }
    }

    /// Probe interval
    pub fn interval(&self) -> Duration {
        self.check_interval
    }

    /// Record a successful probe
    pub fn record_success(&mut self) {
        if self.failure_count > 0 {
            debug!(previous_failures = self.failure_count, "Control port reachable again");
        }
        self.failure_count = 0;
    }

    /// Record a failed probe
    pub fn record_failure(&mut self) {
        self.failure_count += 1;

        warn!(
            failure_count = self.failure_count,
            max_failures = self.max_failures,
            "Liveness probe failed"
        );
    }

    /// Whether enough probes failed in a row to treat the process as hung
    pub fn is_unhealthy(&self) -> bool {
        self.failure_count >= self.max_failures
    }

    /// Reset after the process was replaced
    pub fn reset(&mut self) {
        self.failure_count = 0;
    }

    /// Number of consecutive failures
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }
}
