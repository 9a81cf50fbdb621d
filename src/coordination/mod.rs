//! Coordination engine: worker registry, task routing, multi-protocol
//! execution, and negotiation resolution
//!
//! The registry is the single owner of worker records; the coordinator owns
//! the task queue and tables; the negotiation manager owns sessions. All
//! three share one event bus.

pub mod capability;
pub mod coordinator;
pub mod events;
pub mod invoke;
pub mod negotiation;
pub mod registry;
pub mod routing;
pub mod task;
pub mod worker;

pub use capability::{Capability, CapabilitySet};
pub use coordinator::{Coordinator, CoordinatorConfig, CoordinatorMetrics};
pub use events::{EngineEvent, EventBus};
pub use invoke::{ExecutePayload, WorkerHandle, DEFAULT_WORKER_CHANNEL_CAPACITY};
pub use negotiation::{
    NegotiationConfig, NegotiationManager, NegotiationSession, NegotiationStatus,
    ResolutionStrategy, StrictEquality,
};
pub use registry::WorkerRegistry;
pub use routing::{CoordinationProtocol, RoutePlan, RouteSpec, RoutingTable, TaskRouter};
pub use task::{
    Task, TaskFailure, TaskFailureKind, TaskPriority, TaskSpec, TaskStatus, WorkerResult,
};
pub use worker::{PerformanceStats, RegisteredWorker, WorkerStatus};

use thiserror::Error;
use uuid::Uuid;

/// Error types for coordination operations
///
/// Each variant maps to a stable machine-checkable kind via [`Self::kind`].
#[derive(Error, Debug, Clone)]
pub enum CoordinationError {
    /// Malformed task submission; never enters the queue
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    /// The task type has no routing table entry
    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    /// Malformed worker registration
    #[error("Invalid worker: {0}")]
    InvalidWorker(String),

    /// Worker id already registered
    #[error("Duplicate worker id: {0}")]
    DuplicateWorker(String),

    /// Worker not found
    #[error("Worker not found: {0}")]
    WorkerNotFound(String),

    /// Worker already at its declared concurrency limit
    #[error("Worker at capacity: {0}")]
    WorkerAtCapacity(String),

    /// Task not found
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// A required capability has no available worker
    #[error("No eligible workers: {0}")]
    NoEligibleWorkers(String),

    /// Malformed negotiation request
    #[error("Invalid negotiation: {0}")]
    InvalidNegotiation(String),

    /// Negotiation session not found
    #[error("Unknown negotiation session: {0}")]
    UnknownSession(Uuid),

    /// Proposer is not a participant of the session
    #[error("Worker {worker_id} is not a participant in session {session_id}")]
    NotAParticipant { session_id: Uuid, worker_id: String },

    /// Session already reached a terminal state
    #[error("Negotiation session {0} is closed")]
    SessionClosed(Uuid),

    /// Invalid state transition
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    /// Malformed routing configuration; the table is rejected as a whole
    #[error("Invalid routing config: {0}")]
    InvalidRoutingConfig(String),
}

impl CoordinationError {
    /// Stable kind string for programmatic branching
    pub fn kind(&self) -> &'static str {
        match self {
            CoordinationError::InvalidTask(_) => "invalid_task",
            CoordinationError::UnknownTaskType(_) => "unknown_task_type",
            CoordinationError::InvalidWorker(_) => "invalid_worker",
            CoordinationError::DuplicateWorker(_) => "duplicate_worker",
            CoordinationError::WorkerNotFound(_) => "worker_not_found",
            CoordinationError::WorkerAtCapacity(_) => "worker_at_capacity",
            CoordinationError::TaskNotFound(_) => "task_not_found",
            CoordinationError::NoEligibleWorkers(_) => "no_eligible_workers",
            CoordinationError::InvalidNegotiation(_) => "invalid_negotiation",
            CoordinationError::UnknownSession(_) => "unknown_session",
            CoordinationError::NotAParticipant { .. } => "not_a_participant",
            CoordinationError::SessionClosed(_) => "session_closed",
            CoordinationError::InvalidTransition(_) => "invalid_transition",
            CoordinationError::InvalidRoutingConfig(_) => "invalid_routing_config",
        }
    }
}

/// Result type for coordination operations
pub type CoordinationResult<T> = Result<T, CoordinationError>;
