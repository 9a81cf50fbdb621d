//! Request/response models for the HTTP API

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::coordination::{
    Capability, Task, TaskFailure, TaskStatus, WorkerResult, WorkerStatus,
};

/// Response to a task submission
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitTaskResponse {
    pub task_id: String,
}

/// Task status as served by `GET /tasks/:id`
#[derive(Debug, Serialize)]
pub struct TaskStatusResponse {
    pub task_id: String,
    pub status: TaskStatus,
    pub assigned_workers: Vec<String>,
    pub results: HashMap<String, WorkerResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskFailure>,
}

impl From<Task> for TaskStatusResponse {
    fn from(task: Task) -> Self {
        Self {
            task_id: task.id,
            status: task.status,
            assigned_workers: task.assigned_workers,
            results: task.results,
            error: task.error,
        }
    }
}

/// Response to a cancellation request
#[derive(Debug, Serialize)]
pub struct CancelTaskResponse {
    pub task_id: String,
    pub status: TaskStatus,
}

/// Request to register a worker
#[derive(Debug, Deserialize)]
pub struct RegisterWorkerRequest {
    pub worker_id: String,
    pub capabilities: Vec<Capability>,
    pub max_concurrent_tasks: u32,
    /// Base URL of the worker's execute endpoint
    pub endpoint: String,
}

/// Request to update a worker's status
#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub status: WorkerStatus,
}

/// Request to open a negotiation session
#[derive(Debug, Deserialize)]
pub struct InitiateNegotiationRequest {
    pub initiator: String,
    pub participants: Vec<String>,
    pub topic: String,
}

/// Response carrying the new session id
#[derive(Debug, Serialize)]
pub struct InitiateNegotiationResponse {
    pub session_id: Uuid,
}

/// Request to submit a proposal to a session
#[derive(Debug, Deserialize)]
pub struct ProposeRequest {
    pub worker_id: String,
    pub proposal: Value,
    #[serde(default)]
    pub reasoning: String,
    /// Explicit acceptance flag for the majority fallback
    #[serde(default)]
    pub accept: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::TaskSpec;

    #[test]
    fn test_task_status_response_from_task() {
        let task = Task::new(TaskSpec::new("t1", "echo"));
        let response = TaskStatusResponse::from(task);
        assert_eq!(response.task_id, "t1");
        assert_eq!(response.status, TaskStatus::Pending);
        assert!(response.results.is_empty());
        assert!(response.error.is_none());
    }

    #[test]
    fn test_register_worker_request_deserialization() {
        let json = r#"{
            "worker_id": "w1",
            "capabilities": ["echo", "search"],
            "max_concurrent_tasks": 3,
            "endpoint": "http://localhost:9000"
        }"#;
        let request: RegisterWorkerRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.worker_id, "w1");
        assert_eq!(request.capabilities.len(), 2);
        assert_eq!(request.max_concurrent_tasks, 3);
    }

    #[test]
    fn test_propose_request_defaults() {
        let json = r#"{"worker_id": "a", "proposal": {"rate": 50}}"#;
        let request: ProposeRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.reasoning, "");
        assert!(!request.accept);
    }
}
