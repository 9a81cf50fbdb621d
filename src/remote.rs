//! Remote worker adapter - HTTP client driving an external worker process
//!
//! A worker registered over the API is reached through `POST
//! {endpoint}/execute`. The worker answers `{"result": ...}` on success or
//! `{"error": "..."}` (or a non-2xx status) on failure, and is expected to
//! enforce its own internal timeout.

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::coordination::{ExecutePayload, WorkerHandle};

/// HTTP client for one remote worker endpoint
pub struct RemoteWorker {
    client: Client,
    base_url: String,
}

impl RemoteWorker {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Run one invocation against the remote endpoint
    pub async fn execute(&self, payload: &ExecutePayload) -> Result<Value, String> {
        let response = self
            .client
            .post(format!("{}/execute", self.base_url))
            .json(payload)
            .send()
            .await
            .map_err(|e| format!("worker request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(format!("worker returned {}: {}", status, text));
        }

        let body: ExecuteResponse = response
            .json()
            .await
            .map_err(|e| format!("worker returned malformed response: {}", e))?;
        body.into_result()
    }

    /// Bridge this adapter onto the engine's invocation channel
    pub fn into_handle(self, capacity: usize) -> WorkerHandle {
        let worker = Arc::new(self);
        WorkerHandle::spawn(capacity, move |payload| {
            let worker = Arc::clone(&worker);
            async move { worker.execute(&payload).await }
        })
    }
}

/// Wire format of a worker's execute response
#[derive(Debug, Deserialize)]
struct ExecuteResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

impl ExecuteResponse {
    fn into_result(self) -> Result<Value, String> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}
