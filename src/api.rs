//! HTTP API for the coordination engine
//!
//! Thin handlers over the coordinator: task submission/status/cancel,
//! worker registration, negotiation, routing reload, and metrics. All
//! errors surface as `{error, kind}` JSON with a mapped status code.

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::coordination::{
    CoordinationError, CoordinatorMetrics, NegotiationSession, RegisteredWorker, RoutingTable,
    TaskSpec, DEFAULT_WORKER_CHANNEL_CAPACITY,
};
use crate::error::Result;
use crate::models::{
    CancelTaskResponse, HeartbeatRequest, InitiateNegotiationRequest,
    InitiateNegotiationResponse, ProposeRequest, RegisterWorkerRequest, SubmitTaskResponse,
    TaskStatusResponse,
};
use crate::remote::RemoteWorker;
use crate::{websocket, AppState};

/// Build the API router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tasks", post(submit_task))
        .route("/tasks/:id", get(task_status))
        .route("/tasks/:id/cancel", post(cancel_task))
        .route("/workers", post(register_worker).get(list_workers))
        .route("/workers/:id", axum::routing::delete(unregister_worker))
        .route("/workers/:id/heartbeat", post(heartbeat))
        .route("/negotiations", post(initiate_negotiation))
        .route("/negotiations/:id", get(negotiation_status))
        .route("/negotiations/:id/proposals", post(propose))
        .route("/routing", put(reload_routing))
        .route("/metrics", get(metrics))
        .route("/events", get(websocket::handler))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn submit_task(
    State(state): State<Arc<AppState>>,
    Json(spec): Json<TaskSpec>,
) -> Result<Json<SubmitTaskResponse>> {
    let task_id = state.coordinator.submit(spec).await?;
    Ok(Json(SubmitTaskResponse { task_id }))
}

async fn task_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>> {
    let task = state
        .coordinator
        .get_status(&task_id)
        .await
        .ok_or(CoordinationError::TaskNotFound(task_id))?;
    Ok(Json(task.into()))
}

async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<CancelTaskResponse>> {
    let status = state.coordinator.cancel(&task_id).await?;
    Ok(Json(CancelTaskResponse { task_id, status }))
}

async fn register_worker(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterWorkerRequest>,
) -> Result<Json<RegisteredWorker>> {
    let handle =
        RemoteWorker::new(request.endpoint).into_handle(DEFAULT_WORKER_CHANNEL_CAPACITY);
    let worker = state
        .coordinator
        .add_worker(
            request.worker_id,
            request.capabilities.into(),
            request.max_concurrent_tasks,
            handle,
        )
        .await?;
    Ok(Json(worker))
}

async fn list_workers(State(state): State<Arc<AppState>>) -> Json<Vec<RegisteredWorker>> {
    Json(state.coordinator.registry().list().await)
}

async fn unregister_worker(
    State(state): State<Arc<AppState>>,
    Path(worker_id): Path<String>,
) -> Result<Json<RegisteredWorker>> {
    let removed = state.coordinator.remove_worker(&worker_id).await?;
    Ok(Json(removed))
}

async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Path(worker_id): Path<String>,
    Json(request): Json<HeartbeatRequest>,
) -> Result<Json<RegisteredWorker>> {
    state
        .coordinator
        .registry()
        .heartbeat(&worker_id, request.status)
        .await?;
    let worker = state
        .coordinator
        .registry()
        .get(&worker_id)
        .await
        .ok_or(CoordinationError::WorkerNotFound(worker_id))?;
    Ok(Json(worker))
}

async fn initiate_negotiation(
    State(state): State<Arc<AppState>>,
    Json(request): Json<InitiateNegotiationRequest>,
) -> Result<Json<InitiateNegotiationResponse>> {
    let session = state
        .coordinator
        .negotiations()
        .initiate(&request.initiator, request.participants, &request.topic)
        .await?;
    Ok(Json(InitiateNegotiationResponse {
        session_id: session.id,
    }))
}

async fn negotiation_status(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<NegotiationSession>> {
    let session = state
        .coordinator
        .negotiations()
        .get(session_id)
        .await
        .ok_or(CoordinationError::UnknownSession(session_id))?;
    Ok(Json(session))
}

async fn propose(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<ProposeRequest>,
) -> Result<Json<NegotiationSession>> {
    let session = state
        .coordinator
        .negotiations()
        .propose(
            session_id,
            &request.worker_id,
            request.proposal,
            request.reasoning,
            request.accept,
        )
        .await?;
    Ok(Json(session))
}

async fn reload_routing(
    State(state): State<Arc<AppState>>,
    Json(table): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>> {
    let table = RoutingTable::from_value(table)?;
    let task_types = state.coordinator.reload_routing(table).await;
    Ok(Json(serde_json::json!({ "task_types": task_types })))
}

async fn metrics(State(state): State<Arc<AppState>>) -> Json<CoordinatorMetrics> {
    Json(state.coordinator.metrics().await)
}
