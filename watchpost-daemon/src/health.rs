//! Aggregated health reporting.
//!
//! The daemon's status is the worst status among its enabled components
//! (`engine`, `ingest`):
//!
//! - all Healthy -> Healthy
//! - any Degraded, none Unhealthy -> Degraded(reasons)
//! - any Unhealthy -> Unhealthy(reasons)

use serde::Serialize;

use watchpost_core::pipeline::HealthStatus;

/// Aggregated health report for the daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Worst status of all enabled components.
    pub status: HealthStatus,
    /// Seconds since the daemon started.
    pub uptime_secs: u64,
    /// Per-component reports.
    pub components: Vec<ComponentHealth>,
}

impl DaemonHealth {
    pub fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }
}

/// Health of a single component.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub enabled: bool,
    pub status: HealthStatus,
}

impl ComponentHealth {
    pub fn new(name: impl Into<String>, enabled: bool, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            enabled,
            status,
        }
    }
}

/// Fold component statuses into one. Disabled components are ignored.
pub fn aggregate_status(components: &[ComponentHealth]) -> HealthStatus {
    let mut degraded = Vec::new();
    let mut unhealthy = Vec::new();

    for component in components.iter().filter(|c| c.enabled) {
        match &component.status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => {
                degraded.push(format!("{}: {}", component.name, reason));
            }
            HealthStatus::Unhealthy(reason) => {
                unhealthy.push(format!("{}: {}", component.name, reason));
            }
        }
    }

    if !unhealthy.is_empty() {
        HealthStatus::Unhealthy(unhealthy.join("; "))
    } else if !degraded.is_empty() {
        HealthStatus::Degraded(degraded.join("; "))
    } else {
        HealthStatus::Healthy
    }
}
