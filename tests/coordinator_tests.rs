//! Coordination engine integration tests
//!
//! Drives the full run loop with in-process workers: routing, the three
//! coordination protocols, deadlines, dependencies, cancellation, and
//! worker removal.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use foreman::coordination::{
    Capability, CapabilitySet, Coordinator, CoordinatorConfig, RoutingTable, Task,
    TaskFailureKind, TaskPriority, TaskSpec, TaskStatus, WorkerHandle, WorkerResult,
};

fn routing() -> RoutingTable {
    RoutingTable::from_json_str(
        r#"{
            "echo": {"capabilities": ["echo"], "protocol": "sequential"},
            "fanout_search": {"capabilities": ["search"], "protocol": "parallel"},
            "draft": {"capabilities": ["research", "write"], "protocol": "pipeline"}
        }"#,
    )
    .unwrap()
}

fn fast_config() -> CoordinatorConfig {
    CoordinatorConfig {
        tick_interval: Duration::from_millis(10),
        ..CoordinatorConfig::default()
    }
}

fn caps(tags: &[&str]) -> CapabilitySet {
    tags.iter().map(|t| Capability::from(*t)).collect()
}

fn echo_worker() -> WorkerHandle {
    WorkerHandle::spawn(8, |req| async move { Ok(req.payload) })
}

fn failing_worker(message: &str) -> WorkerHandle {
    let message = message.to_string();
    WorkerHandle::spawn(8, move |_req| {
        let message = message.clone();
        async move { Err(message) }
    })
}

fn slow_worker(delay: Duration) -> WorkerHandle {
    WorkerHandle::spawn(8, move |req| async move {
        tokio::time::sleep(delay).await;
        Ok(req.payload)
    })
}

async fn wait_for_terminal(coordinator: &Coordinator, task_id: &str) -> Task {
    for _ in 0..500 {
        if let Some(task) = coordinator.get_status(task_id).await {
            if task.status.is_terminal() {
                return task;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {} did not reach a terminal state", task_id);
}

async fn wait_for_in_progress(coordinator: &Coordinator, task_id: &str) {
    for _ in 0..500 {
        if let Some(task) = coordinator.get_status(task_id).await {
            if task.status == TaskStatus::InProgress {
                return;
            }
            assert!(
                !task.status.is_terminal(),
                "task {} terminal before starting: {:?}",
                task_id,
                task.status
            );
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("task {} never started", task_id);
}

fn success_value(result: &WorkerResult) -> &Value {
    match result {
        WorkerResult::Success(value) => value,
        WorkerResult::Failure { error } => panic!("expected success, got error: {}", error),
    }
}

#[tokio::test]
async fn test_sequential_echo_completes_with_worker_result() {
    let coordinator = Coordinator::new(fast_config(), routing());
    coordinator
        .add_worker("w1", caps(&["echo"]), 2, echo_worker())
        .await
        .unwrap();
    Arc::clone(&coordinator).start();

    let spec = TaskSpec::new("t1", "echo").with_payload(json!({"msg": "hello"}));
    coordinator.submit(spec).await.unwrap();

    let task = wait_for_terminal(&coordinator, "t1").await;
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.assigned_workers, vec!["w1".to_string()]);
    assert_eq!(success_value(&task.results["w1"]), &json!({"msg": "hello"}));
    assert!(task.error.is_none());

    // outcome folded into the worker's stats, load released
    let worker = coordinator.registry().get("w1").await.unwrap();
    assert_eq!(worker.current_load, 0);
    assert_eq!(worker.performance.completed_tasks, 1);
    assert!((worker.performance.success_rate - 1.0).abs() < f64::EPSILON);

    coordinator.shutdown();
}

#[tokio::test]
async fn test_sequential_worker_error_fails_task() {
    let coordinator = Coordinator::new(fast_config(), routing());
    coordinator
        .add_worker("w1", caps(&["echo"]), 1, failing_worker("no can do"))
        .await
        .unwrap();
    Arc::clone(&coordinator).start();

    coordinator.submit(TaskSpec::new("t1", "echo")).await.unwrap();

    let task = wait_for_terminal(&coordinator, "t1").await;
    assert_eq!(task.status, TaskStatus::Failed);
    let failure = task.error.unwrap();
    assert_eq!(failure.kind, TaskFailureKind::Execution);
    assert!(failure.reason.contains("no can do"));

    let worker = coordinator.registry().get("w1").await.unwrap();
    assert!((worker.performance.success_rate - 0.0).abs() < f64::EPSILON);

    coordinator.shutdown();
}

#[tokio::test]
async fn test_parallel_partial_failure_still_completes() {
    let coordinator = Coordinator::new(fast_config(), routing());
    coordinator
        .add_worker("s_ok", caps(&["search"]), 1, echo_worker())
        .await
        .unwrap();
    coordinator
        .add_worker("s_bad", caps(&["search"]), 1, failing_worker("index offline"))
        .await
        .unwrap();
    Arc::clone(&coordinator).start();

    let spec = TaskSpec::new("t1", "fanout_search").with_payload(json!({"q": "rust"}));
    coordinator.submit(spec).await.unwrap();

    let task = wait_for_terminal(&coordinator, "t1").await;
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.results.len(), 2);
    assert!(task.results["s_ok"].is_success());
    match &task.results["s_bad"] {
        WorkerResult::Failure { error } => assert!(error.contains("index offline")),
        other => panic!("expected failure entry, got {:?}", other),
    }

    coordinator.shutdown();
}

#[tokio::test]
async fn test_parallel_all_failures_fail_task() {
    let coordinator = Coordinator::new(fast_config(), routing());
    coordinator
        .add_worker("s1", caps(&["search"]), 1, failing_worker("down"))
        .await
        .unwrap();
    coordinator
        .add_worker("s2", caps(&["search"]), 1, failing_worker("also down"))
        .await
        .unwrap();
    Arc::clone(&coordinator).start();

    coordinator
        .submit(TaskSpec::new("t1", "fanout_search"))
        .await
        .unwrap();

    let task = wait_for_terminal(&coordinator, "t1").await;
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.unwrap().kind, TaskFailureKind::Execution);
    // per-worker errors are retained
    assert_eq!(task.results.len(), 2);

    coordinator.shutdown();
}

#[tokio::test]
async fn test_pipeline_chains_prior_output() {
    let coordinator = Coordinator::new(fast_config(), routing());
    coordinator
        .add_worker(
            "researcher",
            caps(&["research"]),
            1,
            WorkerHandle::spawn(4, |_req| async move { Ok(json!({"notes": "findings"})) }),
        )
        .await
        .unwrap();
    // the writer reports exactly what it was piped
    coordinator
        .add_worker(
            "writer",
            caps(&["write"]),
            1,
            WorkerHandle::spawn(4, |req| async move {
                Ok(json!({"received": req.pipeline_input}))
            }),
        )
        .await
        .unwrap();
    Arc::clone(&coordinator).start();

    coordinator.submit(TaskSpec::new("t1", "draft")).await.unwrap();

    let task = wait_for_terminal(&coordinator, "t1").await;
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(
        task.assigned_workers,
        vec!["researcher".to_string(), "writer".to_string()]
    );
    assert_eq!(
        success_value(&task.results["writer"]),
        &json!({"received": {"notes": "findings"}})
    );

    coordinator.shutdown();
}

#[tokio::test]
async fn test_pipeline_halts_at_failing_stage() {
    let coordinator = Coordinator::new(fast_config(), routing());
    coordinator
        .add_worker("researcher", caps(&["research"]), 1, echo_worker())
        .await
        .unwrap();
    coordinator
        .add_worker("writer", caps(&["write"]), 1, failing_worker("writer block"))
        .await
        .unwrap();
    Arc::clone(&coordinator).start();

    coordinator.submit(TaskSpec::new("t1", "draft")).await.unwrap();

    let task = wait_for_terminal(&coordinator, "t1").await;
    assert_eq!(task.status, TaskStatus::Failed);
    let failure = task.error.unwrap();
    assert_eq!(failure.kind, TaskFailureKind::Execution);
    assert!(failure.reason.contains("writer"));
    // results hold exactly the stages completed before the failure
    assert_eq!(task.results.len(), 1);
    assert!(task.results.contains_key("researcher"));

    coordinator.shutdown();
}

#[tokio::test]
async fn test_past_deadline_fails_without_invocation() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&invocations);
    let worker = WorkerHandle::spawn(4, move |req| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(req.payload)
        }
    });

    let coordinator = Coordinator::new(fast_config(), routing());
    coordinator
        .add_worker("w1", caps(&["echo"]), 1, worker)
        .await
        .unwrap();
    Arc::clone(&coordinator).start();

    let spec = TaskSpec::new("t1", "echo")
        .with_deadline(chrono::Utc::now() - chrono::Duration::seconds(5));
    coordinator.submit(spec).await.unwrap();

    let task = wait_for_terminal(&coordinator, "t1").await;
    assert_eq!(task.status, TaskStatus::Failed);
    let failure = task.error.unwrap();
    assert_eq!(failure.kind, TaskFailureKind::DeadlineExceeded);
    assert_eq!(failure.reason, "deadline exceeded");
    assert!(task.results.is_empty());
    assert_eq!(invocations.load(Ordering::SeqCst), 0);

    coordinator.shutdown();
}

#[tokio::test]
async fn test_deadline_during_execution_reclaims_worker() {
    let coordinator = Coordinator::new(fast_config(), routing());
    coordinator
        .add_worker("w1", caps(&["echo"]), 1, slow_worker(Duration::from_secs(30)))
        .await
        .unwrap();
    Arc::clone(&coordinator).start();

    let spec = TaskSpec::new("t1", "echo")
        .with_deadline(chrono::Utc::now() + chrono::Duration::milliseconds(80));
    coordinator.submit(spec).await.unwrap();

    let task = wait_for_terminal(&coordinator, "t1").await;
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.unwrap().kind, TaskFailureKind::DeadlineExceeded);

    // loads are released by the monitoring tick, not the stuck invocation
    let worker = coordinator.registry().get("w1").await.unwrap();
    assert_eq!(worker.current_load, 0);
    assert_eq!(worker.performance.completed_tasks, 1);
    assert!((worker.performance.success_rate - 0.0).abs() < f64::EPSILON);

    coordinator.shutdown();
}

#[tokio::test]
async fn test_priority_order_with_fifo_tie_break() {
    let executed: Arc<tokio::sync::Mutex<Vec<String>>> =
        Arc::new(tokio::sync::Mutex::new(Vec::new()));
    let log = Arc::clone(&executed);
    let worker = WorkerHandle::spawn(8, move |req| {
        let log = Arc::clone(&log);
        async move {
            log.lock().await.push(req.task_id.clone());
            Ok(req.payload)
        }
    });

    let config = CoordinatorConfig {
        max_concurrent_tasks: 1,
        ..fast_config()
    };
    let coordinator = Coordinator::new(config, routing());
    coordinator
        .add_worker("w1", caps(&["echo"]), 1, worker)
        .await
        .unwrap();

    // queue up before the loop starts so ordering is decided by priority
    for (id, priority) in [
        ("low", TaskPriority::Low),
        ("first_normal", TaskPriority::Normal),
        ("second_normal", TaskPriority::Normal),
        ("urgent", TaskPriority::Urgent),
    ] {
        coordinator
            .submit(TaskSpec::new(id, "echo").with_priority(priority))
            .await
            .unwrap();
    }
    Arc::clone(&coordinator).start();

    for id in ["low", "first_normal", "second_normal", "urgent"] {
        wait_for_terminal(&coordinator, id).await;
    }

    let order = executed.lock().await.clone();
    assert_eq!(order, vec!["urgent", "first_normal", "second_normal", "low"]);

    coordinator.shutdown();
}

#[tokio::test]
async fn test_worker_load_never_exceeds_capacity() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));
    let (in_flight_ref, max_seen_ref) = (Arc::clone(&in_flight), Arc::clone(&max_seen));
    let worker = WorkerHandle::spawn(8, move |req| {
        let in_flight = Arc::clone(&in_flight_ref);
        let max_seen = Arc::clone(&max_seen_ref);
        async move {
            let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            max_seen.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(40)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(req.payload)
        }
    });

    let coordinator = Coordinator::new(fast_config(), routing());
    coordinator
        .add_worker("w1", caps(&["echo"]), 2, worker)
        .await
        .unwrap();
    Arc::clone(&coordinator).start();

    for i in 0..5 {
        coordinator
            .submit(TaskSpec::new(format!("t{}", i), "echo"))
            .await
            .unwrap();
    }
    for i in 0..5 {
        let task = wait_for_terminal(&coordinator, &format!("t{}", i)).await;
        assert_eq!(task.status, TaskStatus::Completed);
    }

    assert!(max_seen.load(Ordering::SeqCst) <= 2);
    let worker = coordinator.registry().get("w1").await.unwrap();
    assert_eq!(worker.current_load, 0);

    coordinator.shutdown();
}

#[tokio::test]
async fn test_dependency_runs_after_prerequisite() {
    let executed: Arc<tokio::sync::Mutex<Vec<String>>> =
        Arc::new(tokio::sync::Mutex::new(Vec::new()));
    let log = Arc::clone(&executed);
    let worker = WorkerHandle::spawn(8, move |req| {
        let log = Arc::clone(&log);
        async move {
            log.lock().await.push(req.task_id.clone());
            Ok(req.payload)
        }
    });

    let coordinator = Coordinator::new(fast_config(), routing());
    coordinator
        .add_worker("w1", caps(&["echo"]), 2, worker)
        .await
        .unwrap();

    coordinator.submit(TaskSpec::new("base", "echo")).await.unwrap();
    coordinator
        .submit(TaskSpec::new("dependent", "echo").with_dependencies(vec!["base".to_string()]))
        .await
        .unwrap();
    Arc::clone(&coordinator).start();

    let dependent = wait_for_terminal(&coordinator, "dependent").await;
    assert_eq!(dependent.status, TaskStatus::Completed);

    let order = executed.lock().await.clone();
    assert_eq!(order, vec!["base", "dependent"]);

    coordinator.shutdown();
}

#[tokio::test]
async fn test_failed_dependency_fails_dependent() {
    let coordinator = Coordinator::new(fast_config(), routing());
    coordinator
        .add_worker("w1", caps(&["echo"]), 1, echo_worker())
        .await
        .unwrap();

    // base fails at dequeue: its deadline already passed
    coordinator
        .submit(
            TaskSpec::new("base", "echo")
                .with_deadline(chrono::Utc::now() - chrono::Duration::seconds(1)),
        )
        .await
        .unwrap();
    coordinator
        .submit(TaskSpec::new("dependent", "echo").with_dependencies(vec!["base".to_string()]))
        .await
        .unwrap();
    Arc::clone(&coordinator).start();

    let base = wait_for_terminal(&coordinator, "base").await;
    assert_eq!(base.error.unwrap().kind, TaskFailureKind::DeadlineExceeded);

    let dependent = wait_for_terminal(&coordinator, "dependent").await;
    assert_eq!(dependent.status, TaskStatus::Failed);
    let failure = dependent.error.unwrap();
    assert_eq!(failure.kind, TaskFailureKind::DependencyFailed);
    assert!(failure.reason.contains("base"));

    coordinator.shutdown();
}

#[tokio::test]
async fn test_cancel_in_progress_is_cooperative_and_final() {
    let coordinator = Coordinator::new(fast_config(), routing());
    coordinator
        .add_worker("w1", caps(&["echo"]), 1, slow_worker(Duration::from_millis(200)))
        .await
        .unwrap();
    Arc::clone(&coordinator).start();

    coordinator.submit(TaskSpec::new("t1", "echo")).await.unwrap();
    wait_for_in_progress(&coordinator, "t1").await;

    let status = coordinator.cancel("t1").await.unwrap();
    assert_eq!(status, TaskStatus::Cancelled);

    // the slow invocation finishes later; its result must be discarded
    tokio::time::sleep(Duration::from_millis(400)).await;
    let task = coordinator.get_status("t1").await.unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert!(task.results.is_empty());

    let worker = coordinator.registry().get("w1").await.unwrap();
    assert_eq!(worker.current_load, 0);

    coordinator.shutdown();
}

#[tokio::test]
async fn test_unregistering_worker_fails_its_tasks() {
    let coordinator = Coordinator::new(fast_config(), routing());
    coordinator
        .add_worker("w1", caps(&["echo"]), 1, slow_worker(Duration::from_secs(30)))
        .await
        .unwrap();
    Arc::clone(&coordinator).start();

    coordinator.submit(TaskSpec::new("t1", "echo")).await.unwrap();
    wait_for_in_progress(&coordinator, "t1").await;

    coordinator.remove_worker("w1").await.unwrap();

    let task = wait_for_terminal(&coordinator, "t1").await;
    assert_eq!(task.status, TaskStatus::Failed);
    let failure = task.error.unwrap();
    assert_eq!(failure.kind, TaskFailureKind::WorkerRemoved);
    assert_eq!(failure.reason, "worker removed");

    coordinator.shutdown();
}

#[tokio::test]
async fn test_routing_reload_changes_submittable_types() {
    let coordinator = Coordinator::new(fast_config(), routing());
    coordinator
        .add_worker("w1", caps(&["summarize"]), 1, echo_worker())
        .await
        .unwrap();
    Arc::clone(&coordinator).start();

    let result = coordinator.submit(TaskSpec::new("t1", "summarize_doc")).await;
    assert!(result.is_err());

    let table = RoutingTable::from_json_str(
        r#"{"summarize_doc": {"capabilities": ["summarize"], "protocol": "sequential"}}"#,
    )
    .unwrap();
    coordinator.reload_routing(table).await;

    coordinator
        .submit(TaskSpec::new("t1", "summarize_doc"))
        .await
        .unwrap();
    let task = wait_for_terminal(&coordinator, "t1").await;
    assert_eq!(task.status, TaskStatus::Completed);

    coordinator.shutdown();
}

#[tokio::test]
async fn test_metrics_reflect_outcomes() {
    let coordinator = Coordinator::new(fast_config(), routing());
    coordinator
        .add_worker("w1", caps(&["echo"]), 2, echo_worker())
        .await
        .unwrap();
    coordinator
        .add_worker("s1", caps(&["search"]), 1, failing_worker("down"))
        .await
        .unwrap();
    Arc::clone(&coordinator).start();

    coordinator.submit(TaskSpec::new("ok", "echo")).await.unwrap();
    coordinator
        .submit(TaskSpec::new("bad", "fanout_search"))
        .await
        .unwrap();
    wait_for_terminal(&coordinator, "ok").await;
    wait_for_terminal(&coordinator, "bad").await;

    let metrics = coordinator.metrics().await;
    assert_eq!(metrics.tasks_processed, 2);
    assert_eq!(metrics.tasks_succeeded, 1);
    assert_eq!(metrics.tasks_failed, 1);
    assert_eq!(metrics.active_tasks, 0);
    assert_eq!(metrics.registered_workers, 2);

    coordinator.shutdown();
}
