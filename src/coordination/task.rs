//! Tasks and their lifecycle
//!
//! A task is the unit of schedulable work. Status moves
//! `Pending -> InProgress -> {Completed | Failed | Cancelled}` and is
//! monotonic: once terminal it never changes. Cancelled may preempt
//! Pending or InProgress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::capability::Capability;
use super::CoordinationError;

/// Priority level for tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low = 0,
    Normal = 1,
    High = 2,
    Urgent = 3,
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Normal
    }
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Normal => "normal",
            TaskPriority::High => "high",
            TaskPriority::Urgent => "urgent",
        }
    }
}

impl std::str::FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(TaskPriority::Low),
            "normal" => Ok(TaskPriority::Normal),
            "high" => Ok(TaskPriority::High),
            "urgent" => Ok(TaskPriority::Urgent),
            _ => Err(format!("Invalid task priority: {}", s)),
        }
    }
}

/// Status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Queued, waiting for dispatch
    Pending,
    /// Dispatched to assigned workers
    InProgress,
    /// All required work finished
    Completed,
    /// Terminated with an error
    Failed,
    /// Cancelled by the caller
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Check if this is a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            _ => Err(format!("Invalid task status: {}", s)),
        }
    }
}

/// Machine-checkable classification of a terminal task failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskFailureKind {
    /// The task type disappeared from the routing table before dispatch
    UnknownTaskType,
    /// A required capability had no available worker
    NoEligibleWorkers,
    /// One or more worker invocations failed
    Execution,
    /// The deadline passed before the task finished
    DeadlineExceeded,
    /// An assigned worker was unregistered mid-flight
    WorkerRemoved,
    /// A dependency ended Failed or Cancelled
    DependencyFailed,
}

impl TaskFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskFailureKind::UnknownTaskType => "unknown_task_type",
            TaskFailureKind::NoEligibleWorkers => "no_eligible_workers",
            TaskFailureKind::Execution => "execution",
            TaskFailureKind::DeadlineExceeded => "deadline_exceeded",
            TaskFailureKind::WorkerRemoved => "worker_removed",
            TaskFailureKind::DependencyFailed => "dependency_failed",
        }
    }
}

/// Terminal failure: a machine-checkable kind plus a human-readable reason
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: TaskFailureKind,
    pub reason: String,
}

impl TaskFailure {
    pub fn new(kind: TaskFailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

/// Per-worker result entry
///
/// `Failure` must come first so `{"error": ...}` objects deserialize as
/// failures rather than opaque success values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerResult {
    Failure { error: String },
    Success(Value),
}

impl WorkerResult {
    pub fn is_success(&self) -> bool {
        matches!(self, WorkerResult::Success(_))
    }
}

/// A task submission, as accepted at the API boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Unique, caller-supplied id
    pub id: String,
    /// Key into the routing table
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub priority: TaskPriority,
    /// Opaque to the engine
    #[serde(default)]
    pub payload: Value,
    /// Task ids that must reach Completed before this task is dispatched
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

impl TaskSpec {
    pub fn new(id: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task_type: task_type.into(),
            priority: TaskPriority::default(),
            payload: Value::Null,
            dependencies: Vec::new(),
            deadline: None,
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Validate required fields; rejected specs never enter the queue
    pub fn validate(&self) -> Result<(), CoordinationError> {
        if self.id.trim().is_empty() {
            return Err(CoordinationError::InvalidTask(
                "task id cannot be empty".to_string(),
            ));
        }
        if self.task_type.trim().is_empty() {
            return Err(CoordinationError::InvalidTask(
                "task type cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// A task tracked by the coordinator
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub priority: TaskPriority,
    pub payload: Value,
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    /// Derived from the routing table at dispatch
    pub required_capabilities: Vec<Capability>,
    /// Ordered worker assignment
    pub assigned_workers: Vec<String>,
    /// Per-worker results
    pub results: HashMap<String, WorkerResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskFailure>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(spec: TaskSpec) -> Self {
        Self {
            id: spec.id,
            task_type: spec.task_type,
            priority: spec.priority,
            payload: spec.payload,
            dependencies: spec.dependencies,
            deadline: spec.deadline,
            status: TaskStatus::Pending,
            required_capabilities: Vec::new(),
            assigned_workers: Vec::new(),
            results: HashMap::new(),
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Move to InProgress with the given assignment
    pub fn start(
        &mut self,
        assigned_workers: Vec<String>,
        required_capabilities: Vec<Capability>,
    ) -> Result<(), String> {
        if self.status != TaskStatus::Pending {
            return Err(format!(
                "Cannot start task with status: {}",
                self.status.as_str()
            ));
        }
        self.status = TaskStatus::InProgress;
        self.assigned_workers = assigned_workers;
        self.required_capabilities = required_capabilities;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Terminal: all required work finished
    pub fn complete(&mut self, results: HashMap<String, WorkerResult>) -> Result<(), String> {
        if self.status != TaskStatus::InProgress {
            return Err(format!(
                "Cannot complete task with status: {}",
                self.status.as_str()
            ));
        }
        self.results = results;
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Terminal: failed with a classified reason
    pub fn fail(
        &mut self,
        failure: TaskFailure,
        results: HashMap<String, WorkerResult>,
    ) -> Result<(), String> {
        if self.status.is_terminal() {
            return Err(format!(
                "Cannot fail task with terminal status: {}",
                self.status.as_str()
            ));
        }
        self.results = results;
        self.error = Some(failure);
        self.status = TaskStatus::Failed;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Terminal: cancelled by the caller
    pub fn cancel(&mut self) -> Result<(), String> {
        if self.status.is_terminal() {
            return Err(format!(
                "Cannot cancel task with terminal status: {}",
                self.status.as_str()
            ));
        }
        self.status = TaskStatus::Cancelled;
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}
