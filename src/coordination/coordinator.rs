//! Task coordinator
//!
//! Owns the priority queue and the task tables. One run loop drives
//! dequeue under admission control, deadline monitoring, negotiation
//! expiry, and completion finalization. Worker invocations happen in
//! spawned protocol executors that report back over a completion channel,
//! so the loop itself never blocks on a worker.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, RwLock};

use super::capability::CapabilitySet;
use super::events::{EngineEvent, EventBus};
use super::invoke::{ExecutePayload, WorkerHandle};
use super::negotiation::{NegotiationConfig, NegotiationManager};
use super::registry::WorkerRegistry;
use super::routing::{CoordinationProtocol, RoutingTable, TaskRouter};
use super::task::{Task, TaskFailure, TaskFailureKind, TaskPriority, TaskSpec, TaskStatus, WorkerResult};
use super::worker::RegisteredWorker;
use super::{CoordinationError, CoordinationResult};

/// Coordinator behavior knobs
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Admission control: tasks dispatched concurrently
    pub max_concurrent_tasks: usize,
    /// Monitoring/dequeue tick
    pub tick_interval: Duration,
    pub negotiation: NegotiationConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 10,
            tick_interval: Duration::from_millis(100),
            negotiation: NegotiationConfig::default(),
        }
    }
}

/// Read-only counters snapshot
#[derive(Debug, Clone, Default, Serialize)]
pub struct CoordinatorMetrics {
    pub tasks_processed: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub tasks_cancelled: u64,
    pub avg_task_duration_ms: f64,
    pub active_tasks: usize,
    pub queued_tasks: usize,
    pub registered_workers: usize,
    pub active_negotiations: usize,
}

struct QueueEntry {
    priority: TaskPriority,
    seq: u64,
    task_id: String,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    /// Max-heap: highest priority first, FIFO within a band
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct RunningTask {
    workers: Vec<String>,
    started_at: DateTime<Utc>,
    /// Set once loads are released and outcomes recorded ahead of the
    /// executor's report (deadline, cancel, worker removal)
    reaped: bool,
    cancel_tx: watch::Sender<bool>,
}

#[derive(Debug, Clone, Default)]
struct Counters {
    succeeded: u64,
    failed: u64,
    cancelled: u64,
    timed: u64,
    avg_duration_ms: f64,
}

impl Counters {
    fn record_duration(&mut self, ms: f64) {
        self.timed += 1;
        self.avg_duration_ms += (ms - self.avg_duration_ms) / self.timed as f64;
    }

    fn processed(&self) -> u64 {
        self.succeeded + self.failed + self.cancelled
    }
}

struct CoordinatorState {
    tasks: HashMap<String, Task>,
    queue: BinaryHeap<QueueEntry>,
    running: HashMap<String, RunningTask>,
    next_seq: u64,
    counters: Counters,
}

struct ExecutionReport {
    task_id: String,
    results: HashMap<String, WorkerResult>,
    failure: Option<TaskFailure>,
}

/// Top-level orchestrator for the coordination engine
pub struct Coordinator {
    config: CoordinatorConfig,
    registry: Arc<WorkerRegistry>,
    router: Arc<TaskRouter>,
    negotiations: Arc<NegotiationManager>,
    events: EventBus,
    state: RwLock<CoordinatorState>,
    completion_tx: mpsc::Sender<ExecutionReport>,
    completion_rx: std::sync::Mutex<Option<mpsc::Receiver<ExecutionReport>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig, routing: RoutingTable) -> Arc<Self> {
        let events = EventBus::default();
        let registry = Arc::new(WorkerRegistry::new(events.clone()));
        let router = Arc::new(TaskRouter::new(Arc::clone(&registry), routing));
        let negotiations = Arc::new(NegotiationManager::new(
            Arc::clone(&registry),
            config.negotiation.clone(),
            events.clone(),
        ));
        let (completion_tx, completion_rx) = mpsc::channel(64);
        let (shutdown_tx, _) = watch::channel(false);

        Arc::new(Self {
            config,
            registry,
            router,
            negotiations,
            events,
            state: RwLock::new(CoordinatorState {
                tasks: HashMap::new(),
                queue: BinaryHeap::new(),
                running: HashMap::new(),
                next_seq: 0,
                counters: Counters::default(),
            }),
            completion_tx,
            completion_rx: std::sync::Mutex::new(Some(completion_rx)),
            shutdown_tx,
        })
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn negotiations(&self) -> &Arc<NegotiationManager> {
        &self.negotiations
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Spawn the run loop; call once
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let rx = self
            .completion_rx
            .lock()
            .ok()
            .and_then(|mut guard| guard.take());
        tokio::spawn(async move {
            match rx {
                Some(rx) => self.run_loop(rx).await,
                None => tracing::warn!("coordinator run loop already started"),
            }
        })
    }

    /// Stop the run loop after the current iteration
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    async fn run_loop(&self, mut completions: mpsc::Receiver<ExecutionReport>) {
        tracing::info!("coordinator started");
        let mut tick = tokio::time::interval(self.config.tick_interval);
        let mut shutdown = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.monitor_deadlines().await;
                    self.negotiations.expire_due(Utc::now()).await;
                    self.dispatch_ready().await;
                }
                Some(report) = completions.recv() => {
                    self.finalize(report).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("coordinator stopped");
    }

    /// Validate and enqueue a task; rejected tasks never enter the queue
    pub async fn submit(&self, spec: TaskSpec) -> CoordinationResult<String> {
        spec.validate()?;
        if !self.router.knows_type(&spec.task_type).await {
            return Err(CoordinationError::UnknownTaskType(spec.task_type));
        }

        let mut state = self.state.write().await;
        if state.tasks.contains_key(&spec.id) {
            return Err(CoordinationError::InvalidTask(format!(
                "duplicate task id: {:?}",
                spec.id
            )));
        }
        for dep in &spec.dependencies {
            if !state.tasks.contains_key(dep) {
                return Err(CoordinationError::InvalidTask(format!(
                    "unknown dependency: {:?}",
                    dep
                )));
            }
        }

        let task = Task::new(spec);
        let id = task.id.clone();
        let entry = QueueEntry {
            priority: task.priority,
            seq: state.next_seq,
            task_id: id.clone(),
        };
        state.next_seq += 1;
        self.events.emit(EngineEvent::TaskSubmitted {
            task_id: id.clone(),
            task_type: task.task_type.clone(),
            priority: task.priority,
        });
        state.tasks.insert(id.clone(), task);
        state.queue.push(entry);

        tracing::info!(task_id = %id, "task submitted");
        Ok(id)
    }

    /// Snapshot of a live or archived task
    pub async fn get_status(&self, task_id: &str) -> Option<Task> {
        let state = self.state.read().await;
        state.tasks.get(task_id).cloned()
    }

    /// Cancel a Pending or InProgress task; a no-op on terminal tasks
    ///
    /// Cooperative: an invocation already in flight is not preempted, but
    /// its eventual result is discarded and further pipeline stages stop.
    pub async fn cancel(&self, task_id: &str) -> CoordinationResult<TaskStatus> {
        let now = Utc::now();
        let mut reap: Option<(Vec<String>, f64)> = None;
        let status = {
            let mut state = self.state.write().await;
            let st = &mut *state;
            let task = st
                .tasks
                .get_mut(task_id)
                .ok_or_else(|| CoordinationError::TaskNotFound(task_id.to_string()))?;

            if task.status.is_terminal() {
                task.status
            } else {
                let was_in_progress = task.status == TaskStatus::InProgress;
                task.cancel().map_err(CoordinationError::InvalidTransition)?;
                st.counters.cancelled += 1;

                if was_in_progress {
                    if let Some(run) = st.running.get_mut(task_id) {
                        if !run.reaped {
                            run.reaped = true;
                            let _ = run.cancel_tx.send(true);
                            let latency = (now - run.started_at).num_milliseconds().max(0) as f64;
                            reap = Some((run.workers.clone(), latency));
                        }
                    }
                }
                self.events.emit(EngineEvent::TaskCancelled {
                    task_id: task_id.to_string(),
                    assigned_workers: task.assigned_workers.clone(),
                });
                tracing::info!(task_id, "task cancelled");
                task.status
            }
        };

        if let Some((workers, latency)) = reap {
            for worker in &workers {
                self.registry.end_task(worker).await;
                self.registry.record_outcome(worker, false, latency).await;
            }
        }
        Ok(status)
    }

    /// Register a worker with the engine
    pub async fn add_worker(
        &self,
        id: impl Into<String>,
        capabilities: CapabilitySet,
        max_concurrent_tasks: u32,
        handle: WorkerHandle,
    ) -> CoordinationResult<RegisteredWorker> {
        self.registry
            .register(id, capabilities, max_concurrent_tasks, handle)
            .await
    }

    /// Unregister a worker; its in-flight tasks fail with "worker removed"
    pub async fn remove_worker(&self, worker_id: &str) -> CoordinationResult<RegisteredWorker> {
        let removed = self.registry.unregister(worker_id).await?;

        let now = Utc::now();
        let mut reaped: Vec<(Vec<String>, f64)> = Vec::new();
        {
            let mut state = self.state.write().await;
            let st = &mut *state;
            let affected: Vec<String> = st
                .running
                .iter()
                .filter(|(_, run)| !run.reaped && run.workers.iter().any(|w| w == worker_id))
                .map(|(id, _)| id.clone())
                .collect();

            for task_id in affected {
                let Some(task) = st.tasks.get_mut(&task_id) else {
                    continue;
                };
                if task
                    .fail(
                        TaskFailure::new(TaskFailureKind::WorkerRemoved, "worker removed"),
                        HashMap::new(),
                    )
                    .is_err()
                {
                    continue;
                }
                st.counters.failed += 1;
                if let Some(run) = st.running.get_mut(&task_id) {
                    run.reaped = true;
                    let _ = run.cancel_tx.send(true);
                    let latency = (now - run.started_at).num_milliseconds().max(0) as f64;
                    let others: Vec<String> = run
                        .workers
                        .iter()
                        .filter(|w| w.as_str() != worker_id)
                        .cloned()
                        .collect();
                    reaped.push((others, latency));
                }
                self.events.emit(EngineEvent::TaskFailed {
                    task_id: task_id.clone(),
                    kind: TaskFailureKind::WorkerRemoved,
                    reason: "worker removed".to_string(),
                });
                tracing::warn!(task_id = %task_id, worker_id, "task failed: worker removed");
            }
        }

        for (workers, latency) in reaped {
            for worker in &workers {
                self.registry.end_task(worker).await;
                self.registry.record_outcome(worker, false, latency).await;
            }
        }
        Ok(removed)
    }

    /// Replace the routing table; returns the number of routable types
    pub async fn reload_routing(&self, table: RoutingTable) -> usize {
        let count = self.router.reload(table).await;
        self.events
            .emit(EngineEvent::RoutingReloaded { task_types: count });
        count
    }

    /// Read-only counters snapshot
    pub async fn metrics(&self) -> CoordinatorMetrics {
        let (counters, active, queued) = {
            let state = self.state.read().await;
            (
                state.counters.clone(),
                state.running.len(),
                state
                    .tasks
                    .values()
                    .filter(|t| t.status == TaskStatus::Pending)
                    .count(),
            )
        };
        CoordinatorMetrics {
            tasks_processed: counters.processed(),
            tasks_succeeded: counters.succeeded,
            tasks_failed: counters.failed,
            tasks_cancelled: counters.cancelled,
            avg_task_duration_ms: counters.avg_duration_ms,
            active_tasks: active,
            queued_tasks: queued,
            registered_workers: self.registry.len().await,
            active_negotiations: self.negotiations.active_count().await,
        }
    }

    /// Fail a task that never started; no loads to release
    fn fail_pending(
        state: &mut CoordinatorState,
        events: &EventBus,
        task_id: &str,
        kind: TaskFailureKind,
        reason: String,
    ) {
        if let Some(task) = state.tasks.get_mut(task_id) {
            if task
                .fail(TaskFailure::new(kind, reason.clone()), HashMap::new())
                .is_ok()
            {
                state.counters.failed += 1;
                events.emit(EngineEvent::TaskFailed {
                    task_id: task_id.to_string(),
                    kind,
                    reason,
                });
                tracing::warn!(task_id, kind = kind.as_str(), "task failed before dispatch");
            }
        }
    }

    /// Pop the next dispatchable task, deferring dependency-blocked entries
    async fn next_ready_task(&self) -> Option<String> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        if state.running.len() >= self.config.max_concurrent_tasks {
            return None;
        }

        let mut deferred = Vec::new();
        let mut picked = None;
        while let Some(entry) = state.queue.pop() {
            let (status, deadline, dependencies) = match state.tasks.get(&entry.task_id) {
                Some(task) => (task.status, task.deadline, task.dependencies.clone()),
                None => continue,
            };
            // stale entry for a task cancelled or failed while queued
            if status != TaskStatus::Pending {
                continue;
            }

            if let Some(deadline) = deadline {
                if deadline <= now {
                    Self::fail_pending(
                        &mut state,
                        &self.events,
                        &entry.task_id,
                        TaskFailureKind::DeadlineExceeded,
                        "deadline exceeded".to_string(),
                    );
                    continue;
                }
            }

            let mut blocked = false;
            let mut failed_dep = None;
            for dep in &dependencies {
                match state.tasks.get(dep).map(|d| d.status) {
                    Some(TaskStatus::Completed) => {}
                    Some(status) if status.is_terminal() => {
                        failed_dep = Some(dep.clone());
                        break;
                    }
                    _ => {
                        blocked = true;
                        break;
                    }
                }
            }
            if let Some(dep) = failed_dep {
                Self::fail_pending(
                    &mut state,
                    &self.events,
                    &entry.task_id,
                    TaskFailureKind::DependencyFailed,
                    format!("dependency {:?} did not complete", dep),
                );
                continue;
            }
            if blocked {
                deferred.push(entry);
                continue;
            }

            picked = Some(entry.task_id.clone());
            break;
        }

        for entry in deferred {
            state.queue.push(entry);
        }
        picked
    }

    async fn dispatch_ready(&self) {
        while let Some(task_id) = self.next_ready_task().await {
            // a deferred task went back to the queue; retry next tick
            // instead of spinning on it
            if !self.dispatch(task_id).await {
                break;
            }
        }
    }

    /// Requeue a task that hit transient worker contention
    async fn defer(&self, task_id: String, priority: TaskPriority) {
        let mut state = self.state.write().await;
        let entry = QueueEntry {
            priority,
            seq: state.next_seq,
            task_id,
        };
        state.next_seq += 1;
        state.queue.push(entry);
    }

    /// Dispatch one task; returns false when the task was deferred
    async fn dispatch(&self, task_id: String) -> bool {
        let (task_type, priority, payload) = {
            let state = self.state.read().await;
            match state.tasks.get(&task_id) {
                Some(task) => (task.task_type.clone(), task.priority, task.payload.clone()),
                None => return true,
            }
        };

        let plan = match self.router.route(&task_type, priority).await {
            Ok(plan) => plan,
            Err(CoordinationError::WorkerAtCapacity(_)) => {
                self.defer(task_id, priority).await;
                return false;
            }
            Err(CoordinationError::UnknownTaskType(_)) => {
                let mut state = self.state.write().await;
                Self::fail_pending(
                    &mut state,
                    &self.events,
                    &task_id,
                    TaskFailureKind::UnknownTaskType,
                    format!("task type {:?} is no longer routable", task_type),
                );
                return true;
            }
            Err(err) => {
                let mut state = self.state.write().await;
                Self::fail_pending(
                    &mut state,
                    &self.events,
                    &task_id,
                    TaskFailureKind::NoEligibleWorkers,
                    err.to_string(),
                );
                return true;
            }
        };

        let mut handles = Vec::with_capacity(plan.workers.len());
        for worker_id in &plan.workers {
            match self.registry.handle(worker_id).await {
                Some(handle) => handles.push((worker_id.clone(), handle)),
                None => {
                    let mut state = self.state.write().await;
                    Self::fail_pending(
                        &mut state,
                        &self.events,
                        &task_id,
                        TaskFailureKind::NoEligibleWorkers,
                        format!("worker {:?} disappeared during dispatch", worker_id),
                    );
                    return true;
                }
            }
        }

        // Claim capacity, re-validating after the routing snapshot: another
        // dispatch may have filled a worker since route() looked.
        let mut claimed: Vec<String> = Vec::new();
        let mut contended = false;
        for (worker_id, _) in &handles {
            match self.registry.begin_task(worker_id).await {
                Ok(()) => claimed.push(worker_id.clone()),
                Err(_) => {
                    contended = true;
                    break;
                }
            }
        }
        if contended {
            for worker_id in &claimed {
                self.registry.end_task(worker_id).await;
            }
            self.defer(task_id, priority).await;
            return false;
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let started = {
            let mut state = self.state.write().await;
            let st = &mut *state;
            let ready = st.tasks.get_mut(&task_id).is_some_and(|task| {
                task.start(plan.workers.clone(), plan.required_capabilities.clone())
                    .is_ok()
            });
            // cancelled while dispatching, or gone
            if ready {
                st.running.insert(
                    task_id.clone(),
                    RunningTask {
                        workers: plan.workers.clone(),
                        started_at: Utc::now(),
                        reaped: false,
                        cancel_tx,
                    },
                );
            }
            ready
        };
        if !started {
            for worker_id in &claimed {
                self.registry.end_task(worker_id).await;
            }
            return true;
        }

        self.events.emit(EngineEvent::TaskStarted {
            task_id: task_id.clone(),
            assigned_workers: plan.workers.clone(),
        });
        tracing::info!(
            task_id = %task_id,
            protocol = plan.protocol.as_str(),
            workers = ?plan.workers,
            "task dispatched"
        );

        let completion_tx = self.completion_tx.clone();
        let protocol = plan.protocol;
        tokio::spawn(async move {
            let report =
                execute_protocol(protocol, task_id, task_type, payload, handles, cancel_rx).await;
            let _ = completion_tx.send(report).await;
        });
        true
    }

    async fn finalize(&self, report: ExecutionReport) {
        let now = Utc::now();
        let failure = report.failure.clone();
        let success = failure.is_none();

        let outcome = {
            let mut state = self.state.write().await;
            let st = &mut *state;
            let Some(run) = st.running.remove(&report.task_id) else {
                return;
            };
            if run.reaped {
                // already terminal via deadline, cancel, or worker removal;
                // the late report is discarded
                return;
            }
            let latency_ms = (now - run.started_at).num_milliseconds().max(0) as f64;

            if let Some(task) = st.tasks.get_mut(&report.task_id) {
                let applied = match report.failure {
                    None => task.complete(report.results).is_ok(),
                    Some(failure) => task.fail(failure, report.results).is_ok(),
                };
                if applied {
                    if success {
                        st.counters.succeeded += 1;
                    } else {
                        st.counters.failed += 1;
                    }
                    st.counters.record_duration(latency_ms);
                }
            }
            Some((run.workers, latency_ms))
        };

        let Some((workers, latency_ms)) = outcome else {
            return;
        };
        for worker in &workers {
            self.registry.end_task(worker).await;
            self.registry.record_outcome(worker, success, latency_ms).await;
        }

        match failure {
            None => {
                self.events.emit(EngineEvent::TaskCompleted {
                    task_id: report.task_id.clone(),
                });
                tracing::info!(task_id = %report.task_id, latency_ms, "task completed");
            }
            Some(failure) => {
                self.events.emit(EngineEvent::TaskFailed {
                    task_id: report.task_id.clone(),
                    kind: failure.kind,
                    reason: failure.reason.clone(),
                });
                tracing::warn!(
                    task_id = %report.task_id,
                    kind = failure.kind.as_str(),
                    reason = %failure.reason,
                    "task failed"
                );
            }
        }
    }

    /// Fail InProgress tasks whose deadline passed; soft, tick-driven
    async fn monitor_deadlines(&self) {
        let now = Utc::now();
        let mut expired: Vec<(String, Vec<String>, f64)> = Vec::new();
        {
            let mut state = self.state.write().await;
            let due: Vec<String> = state
                .running
                .iter()
                .filter(|(_, run)| !run.reaped)
                .filter_map(|(id, _)| {
                    state
                        .tasks
                        .get(id)
                        .filter(|t| t.status == TaskStatus::InProgress)
                        .and_then(|t| t.deadline)
                        .filter(|d| *d <= now)
                        .map(|_| id.clone())
                })
                .collect();

            let st = &mut *state;
            for task_id in due {
                let Some(task) = st.tasks.get_mut(&task_id) else {
                    continue;
                };
                if task
                    .fail(
                        TaskFailure::new(TaskFailureKind::DeadlineExceeded, "deadline exceeded"),
                        HashMap::new(),
                    )
                    .is_err()
                {
                    continue;
                }
                st.counters.failed += 1;
                if let Some(run) = st.running.get_mut(&task_id) {
                    run.reaped = true;
                    let _ = run.cancel_tx.send(true);
                    let latency = (now - run.started_at).num_milliseconds().max(0) as f64;
                    st.counters.record_duration(latency);
                    expired.push((task_id.clone(), run.workers.clone(), latency));
                }
                self.events.emit(EngineEvent::TaskFailed {
                    task_id: task_id.clone(),
                    kind: TaskFailureKind::DeadlineExceeded,
                    reason: "deadline exceeded".to_string(),
                });
            }
        }

        for (task_id, workers, latency) in expired {
            tracing::warn!(task_id = %task_id, "task exceeded deadline");
            for worker in &workers {
                self.registry.end_task(worker).await;
                self.registry.record_outcome(worker, false, latency).await;
            }
        }
    }
}

/// Run one task's invocations under its coordination protocol
async fn execute_protocol(
    protocol: CoordinationProtocol,
    task_id: String,
    task_type: String,
    payload: Value,
    workers: Vec<(String, WorkerHandle)>,
    cancel_rx: watch::Receiver<bool>,
) -> ExecutionReport {
    let mut results: HashMap<String, WorkerResult> = HashMap::new();
    let mut failure: Option<TaskFailure> = None;

    let request = |pipeline_input: Option<Value>| ExecutePayload {
        task_id: task_id.clone(),
        task_type: task_type.clone(),
        payload: payload.clone(),
        pipeline_input,
    };

    match protocol {
        CoordinationProtocol::Sequential => {
            for (worker_id, handle) in &workers {
                if *cancel_rx.borrow() {
                    break;
                }
                match handle.execute(request(None)).await {
                    Ok(value) => {
                        results.insert(worker_id.clone(), WorkerResult::Success(value));
                    }
                    Err(error) => {
                        failure = Some(TaskFailure::new(
                            TaskFailureKind::Execution,
                            format!("worker {:?} failed: {}", worker_id, error),
                        ));
                        break;
                    }
                }
            }
        }
        CoordinationProtocol::Parallel => {
            let invocations = workers.iter().map(|(worker_id, handle)| {
                let worker_id = worker_id.clone();
                let handle = handle.clone();
                let payload = request(None);
                async move { (worker_id, handle.execute(payload).await) }
            });
            let mut successes = 0usize;
            for (worker_id, outcome) in futures::future::join_all(invocations).await {
                match outcome {
                    Ok(value) => {
                        successes += 1;
                        results.insert(worker_id, WorkerResult::Success(value));
                    }
                    Err(error) => {
                        results.insert(worker_id, WorkerResult::Failure { error });
                    }
                }
            }
            if successes == 0 {
                failure = Some(TaskFailure::new(
                    TaskFailureKind::Execution,
                    format!("all {} assigned workers failed", workers.len()),
                ));
            }
        }
        CoordinationProtocol::Pipeline => {
            let mut carry: Option<Value> = None;
            for (worker_id, handle) in &workers {
                if *cancel_rx.borrow() {
                    break;
                }
                match handle.execute(request(carry.take())).await {
                    Ok(value) => {
                        results.insert(worker_id.clone(), WorkerResult::Success(value.clone()));
                        carry = Some(value);
                    }
                    Err(error) => {
                        failure = Some(TaskFailure::new(
                            TaskFailureKind::Execution,
                            format!("pipeline stage {:?} failed: {}", worker_id, error),
                        ));
                        break;
                    }
                }
            }
        }
    }

    ExecutionReport {
        task_id,
        results,
        failure,
    }
}
