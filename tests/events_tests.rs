//! WebSocket event stream tests

use futures::StreamExt;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

use foreman::coordination::{
    Capability, CapabilitySet, Coordinator, CoordinatorConfig, RoutingTable, TaskSpec,
    WorkerHandle,
};
use foreman::{api, AppState};

async fn start_server() -> (SocketAddr, Arc<Coordinator>) {
    let routing = RoutingTable::from_json_str(
        r#"{"echo": {"capabilities": ["echo"], "protocol": "sequential"}}"#,
    )
    .unwrap();
    let config = CoordinatorConfig {
        tick_interval: Duration::from_millis(10),
        ..CoordinatorConfig::default()
    };
    let coordinator = Coordinator::new(config, routing);
    Arc::clone(&coordinator).start();

    let state = AppState::new(Arc::clone(&coordinator));
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, coordinator)
}

async fn next_event(
    ws: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("stream closed")
            .expect("websocket error");
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_event_stream_reports_lifecycle() {
    let (addr, coordinator) = start_server().await;

    let url = format!("ws://{}/events", addr);
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    // give the upgraded handler time to subscribe before events flow
    tokio::time::sleep(Duration::from_millis(100)).await;

    let caps: CapabilitySet = vec![Capability::from("echo")].into();
    coordinator
        .add_worker(
            "w1",
            caps,
            1,
            WorkerHandle::spawn(4, |req| async move { Ok(req.payload) }),
        )
        .await
        .unwrap();

    let event = next_event(&mut ws).await;
    assert_eq!(event["type"], "worker_registered");
    assert_eq!(event["worker_id"], "w1");

    coordinator
        .submit(TaskSpec::new("t1", "echo").with_payload(json!({"msg": "hi"})))
        .await
        .unwrap();

    let event = next_event(&mut ws).await;
    assert_eq!(event["type"], "task_submitted");
    assert_eq!(event["task_id"], "t1");
    assert_eq!(event["priority"], "normal");

    let event = next_event(&mut ws).await;
    assert_eq!(event["type"], "task_started");
    assert_eq!(event["assigned_workers"], json!(["w1"]));

    let event = next_event(&mut ws).await;
    assert_eq!(event["type"], "task_completed");
    assert_eq!(event["task_id"], "t1");

    coordinator.shutdown();
}
