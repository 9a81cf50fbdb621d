//! Worker invocation contract
//!
//! The coordinator never calls into worker internals: each worker is driven
//! through a bounded mpsc channel of [`ExecuteRequest`]s, each carrying a
//! oneshot reply slot. A worker's business logic (in-process service,
//! remote HTTP adapter) lives entirely on the receiving side.

use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Default invocation channel capacity per worker
pub const DEFAULT_WORKER_CHANNEL_CAPACITY: usize = 32;

/// The payload delivered to a worker for one invocation
#[derive(Debug, Clone, Serialize)]
pub struct ExecutePayload {
    pub task_id: String,
    pub task_type: String,
    /// Caller-supplied task payload, opaque to the engine
    pub payload: Value,
    /// Prior stage output, set only for pipeline stages after the first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_input: Option<Value>,
}

/// One invocation: payload in, result (or worker error string) out
pub struct ExecuteRequest {
    pub payload: ExecutePayload,
    pub reply: oneshot::Sender<Result<Value, String>>,
}

impl std::fmt::Debug for ExecuteRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecuteRequest")
            .field("payload", &self.payload)
            .finish_non_exhaustive()
    }
}

/// Sending side of a worker's invocation channel
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<ExecuteRequest>,
}

impl WorkerHandle {
    /// Create a handle plus the receiving end for a custom service loop
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ExecuteRequest>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Spawn a service task answering every request with `service`
    ///
    /// Requests are handled concurrently so a worker with
    /// `max_concurrent_tasks > 1` is not serialized by its channel.
    pub fn spawn<F, Fut>(capacity: usize, service: F) -> Self
    where
        F: Fn(ExecutePayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        let (handle, mut rx) = Self::channel(capacity);
        let service = Arc::new(service);
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    let result = service(request.payload).await;
                    // Receiver may have given up; nothing to do
                    let _ = request.reply.send(result);
                });
            }
        });
        handle
    }

    /// Invoke the worker once and wait for its result
    pub async fn execute(&self, payload: ExecutePayload) -> Result<Value, String> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ExecuteRequest {
                payload,
                reply: reply_tx,
            })
            .await
            .map_err(|_| "worker is unavailable".to_string())?;
        reply_rx
            .await
            .map_err(|_| "worker dropped the request".to_string())?
    }
}
