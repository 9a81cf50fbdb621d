//! Engine event bus
//!
//! Central pub/sub for worker, task, and negotiation lifecycle events.
//! Components emit, consumers (the `/events` WebSocket, tests) subscribe.
//! Emission is fire-and-forget: with no subscribers the event is dropped.

use serde::Serialize;
use tokio::sync::broadcast;

use super::capability::Capability;
use super::negotiation::NegotiationStatus;
use super::task::{TaskFailureKind, TaskPriority};
use super::worker::WorkerStatus;

/// Default channel capacity (events)
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Events emitted by the coordination engine
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A worker was registered
    WorkerRegistered {
        worker_id: String,
        capabilities: Vec<Capability>,
    },
    /// A worker was unregistered
    WorkerUnregistered { worker_id: String },
    /// A worker's status changed
    WorkerStatusChanged {
        worker_id: String,
        status: WorkerStatus,
    },
    /// A task entered the queue
    TaskSubmitted {
        task_id: String,
        task_type: String,
        priority: TaskPriority,
    },
    /// A task was dispatched to its assigned workers
    TaskStarted {
        task_id: String,
        assigned_workers: Vec<String>,
    },
    /// A task reached Completed
    TaskCompleted { task_id: String },
    /// A task reached Failed
    TaskFailed {
        task_id: String,
        kind: TaskFailureKind,
        reason: String,
    },
    /// A task was cancelled; assigned workers are notified through this event
    TaskCancelled {
        task_id: String,
        assigned_workers: Vec<String>,
    },
    /// A negotiation session was opened; participants are notified through
    /// this event
    NegotiationInitiated {
        session_id: uuid::Uuid,
        initiator: String,
        participants: Vec<String>,
        topic: String,
    },
    /// A participant submitted a proposal
    ProposalSubmitted {
        session_id: uuid::Uuid,
        worker_id: String,
    },
    /// A negotiation session reached a terminal state
    NegotiationResolved {
        session_id: uuid::Uuid,
        status: NegotiationStatus,
    },
    /// The routing table was replaced
    RoutingReloaded { task_types: usize },
}

/// Broadcast bus shared by the registry, coordinator, and negotiation manager
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: EngineEvent) {
        tracing::debug!(?event, "engine event");
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
