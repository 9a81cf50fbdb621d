//! Remote worker adapter integration tests (wiremock)

use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use foreman::coordination::ExecutePayload;
use foreman::remote::RemoteWorker;

fn payload() -> ExecutePayload {
    ExecutePayload {
        task_id: "t1".to_string(),
        task_type: "echo".to_string(),
        payload: json!({"msg": "hi"}),
        pipeline_input: None,
    }
}

#[tokio::test]
async fn test_execute_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/execute"))
        .and(body_partial_json(json!({"task_id": "t1", "task_type": "echo"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {"ok": true}})))
        .mount(&server)
        .await;

    let worker = RemoteWorker::new(server.uri());
    let result = worker.execute(&payload()).await.unwrap();
    assert_eq!(result, json!({"ok": true}));
}

#[tokio::test]
async fn test_execute_worker_error_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/execute"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"error": "quota exhausted"})),
        )
        .mount(&server)
        .await;

    let worker = RemoteWorker::new(server.uri());
    let err = worker.execute(&payload()).await.unwrap_err();
    assert_eq!(err, "quota exhausted");
}

#[tokio::test]
async fn test_execute_http_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/execute"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let worker = RemoteWorker::new(server.uri());
    let err = worker.execute(&payload()).await.unwrap_err();
    assert!(err.contains("503"));
    assert!(err.contains("maintenance"));
}

#[tokio::test]
async fn test_execute_unreachable_endpoint() {
    // nothing listens here
    let worker = RemoteWorker::new("http://127.0.0.1:1");
    let err = worker.execute(&payload()).await.unwrap_err();
    assert!(err.contains("worker request failed"));
}

#[tokio::test]
async fn test_handle_bridges_channel_to_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/execute"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "bridged"})))
        .mount(&server)
        .await;

    let handle = RemoteWorker::new(server.uri()).into_handle(4);
    let result = handle.execute(payload()).await.unwrap();
    assert_eq!(result, Value::String("bridged".to_string()));
}

#[tokio::test]
async fn test_pipeline_input_forwarded_on_wire() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/execute"))
        .and(body_partial_json(json!({"pipeline_input": {"notes": "prior"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "refined"})))
        .mount(&server)
        .await;

    let worker = RemoteWorker::new(server.uri());
    let mut request = payload();
    request.pipeline_input = Some(json!({"notes": "prior"}));
    let result = worker.execute(&request).await.unwrap();
    assert_eq!(result, Value::String("refined".to_string()));
}
