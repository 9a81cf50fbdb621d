//! Worker registry
//!
//! Single owner of all worker records. Every status, load, or performance
//! mutation goes through this API; the coordinator and negotiation manager
//! hold worker ids only.

use std::collections::HashMap;
use tokio::sync::RwLock;

use super::capability::{Capability, CapabilitySet};
use super::events::{EngineEvent, EventBus};
use super::invoke::WorkerHandle;
use super::task::TaskPriority;
use super::worker::{RegisteredWorker, WorkerStatus};
use super::{CoordinationError, CoordinationResult};

struct WorkerEntry {
    record: RegisteredWorker,
    handle: WorkerHandle,
}

/// Registry of known workers and their invocation handles
pub struct WorkerRegistry {
    workers: RwLock<HashMap<String, WorkerEntry>>,
    next_seq: std::sync::atomic::AtomicU64,
    events: EventBus,
}

impl WorkerRegistry {
    pub fn new(events: EventBus) -> Self {
        Self {
            workers: RwLock::new(HashMap::new()),
            next_seq: std::sync::atomic::AtomicU64::new(0),
            events,
        }
    }

    /// Register a worker with its capability set and invocation handle
    pub async fn register(
        &self,
        id: impl Into<String>,
        capabilities: CapabilitySet,
        max_concurrent_tasks: u32,
        handle: WorkerHandle,
    ) -> CoordinationResult<RegisteredWorker> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(CoordinationError::InvalidWorker(
                "worker id cannot be empty".to_string(),
            ));
        }
        if max_concurrent_tasks == 0 {
            return Err(CoordinationError::InvalidWorker(
                "max_concurrent_tasks must be at least 1".to_string(),
            ));
        }

        let mut workers = self.workers.write().await;
        if workers.contains_key(&id) {
            return Err(CoordinationError::DuplicateWorker(id));
        }

        let seq = self
            .next_seq
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let record = RegisteredWorker::new(id.clone(), capabilities, max_concurrent_tasks, seq);
        workers.insert(
            id.clone(),
            WorkerEntry {
                record: record.clone(),
                handle,
            },
        );
        drop(workers);

        self.events.emit(EngineEvent::WorkerRegistered {
            worker_id: id,
            capabilities: record.capabilities.to_vec(),
        });

        Ok(record)
    }

    /// Remove a worker, returning its final record
    pub async fn unregister(&self, id: &str) -> CoordinationResult<RegisteredWorker> {
        let mut workers = self.workers.write().await;
        let entry = workers
            .remove(id)
            .ok_or_else(|| CoordinationError::WorkerNotFound(id.to_string()))?;
        drop(workers);

        self.events.emit(EngineEvent::WorkerUnregistered {
            worker_id: id.to_string(),
        });

        Ok(entry.record)
    }

    /// External liveness/status report from a worker
    pub async fn heartbeat(&self, id: &str, status: WorkerStatus) -> CoordinationResult<()> {
        let mut workers = self.workers.write().await;
        let entry = workers
            .get_mut(id)
            .ok_or_else(|| CoordinationError::WorkerNotFound(id.to_string()))?;
        entry.record.status = status;
        drop(workers);

        self.events.emit(EngineEvent::WorkerStatusChanged {
            worker_id: id.to_string(),
            status,
        });

        Ok(())
    }

    /// Get a worker record by id
    pub async fn get(&self, id: &str) -> Option<RegisteredWorker> {
        let workers = self.workers.read().await;
        workers.get(id).map(|e| e.record.clone())
    }

    /// Get a worker's invocation handle
    pub async fn handle(&self, id: &str) -> Option<WorkerHandle> {
        let workers = self.workers.read().await;
        workers.get(id).map(|e| e.handle.clone())
    }

    /// All registered workers
    pub async fn list(&self) -> Vec<RegisteredWorker> {
        let workers = self.workers.read().await;
        let mut records: Vec<_> = workers.values().map(|e| e.record.clone()).collect();
        records.sort_by_key(|w| w.seq);
        records
    }

    pub async fn len(&self) -> usize {
        self.workers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.workers.read().await.is_empty()
    }

    /// Whether any non-Error worker declares `cap`, regardless of load
    ///
    /// Distinguishes "nobody can ever do this" (route failure) from
    /// "everybody is momentarily full" (task stays queued).
    pub async fn capable_exists(&self, cap: &Capability) -> bool {
        let workers = self.workers.read().await;
        workers
            .values()
            .any(|e| e.record.status != WorkerStatus::Error && e.record.has_capability(cap))
    }

    /// Available workers declaring `cap`, ranked best-first for `priority`
    pub async fn eligible_for(
        &self,
        cap: &Capability,
        required: &[Capability],
        priority: TaskPriority,
    ) -> Vec<String> {
        let workers = self.workers.read().await;
        let mut candidates: Vec<&RegisteredWorker> = workers
            .values()
            .map(|e| &e.record)
            .filter(|w| w.is_available() && w.has_capability(cap))
            .collect();
        Self::rank(&mut candidates, required, priority);
        candidates.into_iter().map(|w| w.id.clone()).collect()
    }

    /// Highest-scoring available worker among `candidates`
    ///
    /// Score: +10 when the worker covers the task's full required set,
    /// -2 per in-flight task, +5 when the task is Urgent. Ties break on
    /// lowest average response time, then registration order.
    pub async fn select_best(
        &self,
        candidates: &[String],
        required: &[Capability],
        priority: TaskPriority,
    ) -> Option<String> {
        let workers = self.workers.read().await;
        let mut eligible: Vec<&RegisteredWorker> = candidates
            .iter()
            .filter_map(|id| workers.get(id))
            .map(|e| &e.record)
            .filter(|w| w.is_available())
            .collect();
        Self::rank(&mut eligible, required, priority);
        eligible.first().map(|w| w.id.clone())
    }

    fn score(worker: &RegisteredWorker, required: &[Capability], priority: TaskPriority) -> i64 {
        let mut score: i64 = 0;
        if worker.covers(required) {
            score += 10;
        }
        score -= 2 * i64::from(worker.current_load);
        if priority == TaskPriority::Urgent {
            score += 5;
        }
        score
    }

    fn rank(workers: &mut [&RegisteredWorker], required: &[Capability], priority: TaskPriority) {
        workers.sort_by(|a, b| {
            Self::score(b, required, priority)
                .cmp(&Self::score(a, required, priority))
                .then_with(|| {
                    a.performance
                        .avg_response_time_ms
                        .total_cmp(&b.performance.avg_response_time_ms)
                })
                .then_with(|| a.seq.cmp(&b.seq))
        });
    }

    /// Account one dispatched task; fails if the worker is at capacity
    ///
    /// Dispatch re-validates capacity here because other tasks may have
    /// claimed the worker since routing took its snapshot.
    pub async fn begin_task(&self, id: &str) -> CoordinationResult<()> {
        let mut workers = self.workers.write().await;
        let entry = workers
            .get_mut(id)
            .ok_or_else(|| CoordinationError::WorkerNotFound(id.to_string()))?;
        if entry.record.current_load >= entry.record.max_concurrent_tasks {
            return Err(CoordinationError::WorkerAtCapacity(id.to_string()));
        }
        entry.record.current_load += 1;
        if entry.record.status == WorkerStatus::Idle {
            entry.record.status = WorkerStatus::Busy;
        }
        Ok(())
    }

    /// Release one in-flight task; a no-op for unknown workers
    pub async fn end_task(&self, id: &str) {
        let mut workers = self.workers.write().await;
        if let Some(entry) = workers.get_mut(id) {
            entry.record.current_load = entry.record.current_load.saturating_sub(1);
            if entry.record.current_load == 0 && entry.record.status == WorkerStatus::Busy {
                entry.record.status = WorkerStatus::Idle;
            }
        }
    }

    /// Fold a task outcome into the worker's rolling statistics
    pub async fn record_outcome(&self, id: &str, success: bool, latency_ms: f64) {
        let mut workers = self.workers.write().await;
        if let Some(entry) = workers.get_mut(id) {
            entry.record.performance.record(success, latency_ms);
        }
    }

    /// Bind or release a set of workers to a negotiation session
    ///
    /// Binding only claims Idle workers; releasing restores Idle or Busy
    /// from the current load. Error status is never overwritten.
    pub async fn set_negotiating(&self, ids: &[String], negotiating: bool) {
        let mut changed = Vec::new();
        {
            let mut workers = self.workers.write().await;
            for id in ids {
                if let Some(entry) = workers.get_mut(id) {
                    let record = &mut entry.record;
                    if negotiating && record.status == WorkerStatus::Idle {
                        record.status = WorkerStatus::Negotiating;
                        changed.push((id.clone(), record.status));
                    } else if !negotiating && record.status == WorkerStatus::Negotiating {
                        record.status = if record.current_load > 0 {
                            WorkerStatus::Busy
                        } else {
                            WorkerStatus::Idle
                        };
                        changed.push((id.clone(), record.status));
                    }
                }
            }
        }
        for (worker_id, status) in changed {
            self.events
                .emit(EngineEvent::WorkerStatusChanged { worker_id, status });
        }
    }
}
