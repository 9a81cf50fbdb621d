//! Registered worker model
//!
//! A worker is an independently owned execution unit with declared
//! capabilities, a status, and rolling performance statistics. The registry
//! is the only component allowed to mutate these records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::capability::{Capability, CapabilitySet};

/// Status of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Available, no tasks in flight
    Idle,
    /// At least one task in flight
    Busy,
    /// Bound to an open negotiation session
    Negotiating,
    /// Reported unhealthy; excluded from selection
    Error,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Idle => "idle",
            WorkerStatus::Busy => "busy",
            WorkerStatus::Negotiating => "negotiating",
            WorkerStatus::Error => "error",
        }
    }
}

impl std::str::FromStr for WorkerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(WorkerStatus::Idle),
            "busy" => Ok(WorkerStatus::Busy),
            "negotiating" => Ok(WorkerStatus::Negotiating),
            "error" => Ok(WorkerStatus::Error),
            _ => Err(format!("Invalid worker status: {}", s)),
        }
    }
}

/// Rolling performance statistics for a worker
///
/// Both means are recomputed incrementally so no per-task history is kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceStats {
    /// Fraction of completed tasks that succeeded, in [0, 1]
    pub success_rate: f64,
    /// Mean latency of completed tasks in milliseconds
    pub avg_response_time_ms: f64,
    /// Number of completed tasks folded into the means
    pub completed_tasks: u64,
}

impl PerformanceStats {
    /// Fold one task outcome into the running means
    pub fn record(&mut self, success: bool, latency_ms: f64) {
        self.completed_tasks += 1;
        let n = self.completed_tasks as f64;
        let outcome = if success { 1.0 } else { 0.0 };
        self.success_rate += (outcome - self.success_rate) / n;
        self.avg_response_time_ms += (latency_ms - self.avg_response_time_ms) / n;
    }
}

/// A worker registered with the coordination engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredWorker {
    /// Unique worker id
    pub id: String,
    /// Capability tags declared at registration
    pub capabilities: CapabilitySet,
    /// Current status
    pub status: WorkerStatus,
    /// Declared concurrency limit
    pub max_concurrent_tasks: u32,
    /// Number of in-flight tasks; never exceeds `max_concurrent_tasks`
    pub current_load: u32,
    /// Rolling performance statistics
    pub performance: PerformanceStats,
    /// When this worker was registered
    pub registered_at: DateTime<Utc>,
    /// Registration order, used as the final selection tie-break
    #[serde(skip)]
    pub seq: u64,
}

impl RegisteredWorker {
    pub fn new(
        id: impl Into<String>,
        capabilities: CapabilitySet,
        max_concurrent_tasks: u32,
        seq: u64,
    ) -> Self {
        Self {
            id: id.into(),
            capabilities,
            status: WorkerStatus::Idle,
            max_concurrent_tasks,
            current_load: 0,
            performance: PerformanceStats::default(),
            registered_at: Utc::now(),
            seq,
        }
    }

    /// Check if this worker declares a capability
    pub fn has_capability(&self, cap: &Capability) -> bool {
        self.capabilities.has(cap)
    }

    /// Check if this worker covers every capability in `required`
    pub fn covers(&self, required: &[Capability]) -> bool {
        self.capabilities.covers(required)
    }

    /// Check if this worker can take on another task
    pub fn is_available(&self) -> bool {
        self.status != WorkerStatus::Error && self.current_load < self.max_concurrent_tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_worker(id: &str) -> RegisteredWorker {
        RegisteredWorker::new(id, vec!["search".into()].into(), 2, 0)
    }

    #[test]
    fn test_worker_status_roundtrip() {
        for status in [
            WorkerStatus::Idle,
            WorkerStatus::Busy,
            WorkerStatus::Negotiating,
            WorkerStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<WorkerStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<WorkerStatus>().is_err());
    }

    #[test]
    fn test_new_worker_defaults() {
        let worker = make_worker("w1");
        assert_eq!(worker.status, WorkerStatus::Idle);
        assert_eq!(worker.current_load, 0);
        assert_eq!(worker.performance.completed_tasks, 0);
        assert!(worker.is_available());
    }

    #[test]
    fn test_worker_availability() {
        let mut worker = make_worker("w1");
        worker.current_load = 2;
        assert!(!worker.is_available());

        worker.current_load = 1;
        assert!(worker.is_available());

        worker.status = WorkerStatus::Error;
        assert!(!worker.is_available());
    }

    #[test]
    fn test_worker_capabilities() {
        let worker = make_worker("w1");
        assert!(worker.has_capability(&"search".into()));
        assert!(!worker.has_capability(&"math".into()));
        assert!(worker.covers(&["search".into()]));
        assert!(!worker.covers(&["search".into(), "math".into()]));
    }

    #[test]
    fn test_performance_stats_running_means() {
        let mut stats = PerformanceStats::default();

        stats.record(true, 100.0);
        assert_eq!(stats.completed_tasks, 1);
        assert!((stats.success_rate - 1.0).abs() < f64::EPSILON);
        assert!((stats.avg_response_time_ms - 100.0).abs() < f64::EPSILON);

        stats.record(false, 300.0);
        assert_eq!(stats.completed_tasks, 2);
        assert!((stats.success_rate - 0.5).abs() < 1e-9);
        assert!((stats.avg_response_time_ms - 200.0).abs() < 1e-9);

        stats.record(true, 200.0);
        assert!((stats.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((stats.avg_response_time_ms - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_worker_serialization() {
        let worker = make_worker("w1");
        let json = serde_json::to_string(&worker).unwrap();
        assert!(json.contains("\"id\":\"w1\""));
        assert!(json.contains("idle"));
        // registration order is internal
        assert!(!json.contains("seq"));
    }
}
