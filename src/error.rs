//! Error types for the API surface

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::coordination::CoordinationError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Coordination(#[from] CoordinationError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn kind(&self) -> &'static str {
        match self {
            AppError::Coordination(e) => e.kind(),
            AppError::BadRequest(_) => "bad_request",
            AppError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Coordination(e) => match e {
                CoordinationError::InvalidTask(_)
                | CoordinationError::UnknownTaskType(_)
                | CoordinationError::InvalidWorker(_)
                | CoordinationError::InvalidNegotiation(_)
                | CoordinationError::InvalidRoutingConfig(_) => StatusCode::BAD_REQUEST,
                CoordinationError::WorkerNotFound(_)
                | CoordinationError::TaskNotFound(_)
                | CoordinationError::UnknownSession(_) => StatusCode::NOT_FOUND,
                CoordinationError::NotAParticipant { .. } => StatusCode::FORBIDDEN,
                CoordinationError::DuplicateWorker(_)
                | CoordinationError::WorkerAtCapacity(_)
                | CoordinationError::NoEligibleWorkers(_)
                | CoordinationError::SessionClosed(_)
                | CoordinationError::InvalidTransition(_) => StatusCode::CONFLICT,
            },
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("API error: {}", self);
        }
        let body = serde_json::json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });
        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
