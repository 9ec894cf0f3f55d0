//! End-to-end push delivery over a real WebSocket connection.

mod common;

use std::time::Duration;

use common::{body_json, post_json, TestApp};
use futures::{SinkExt, StreamExt};
use imgq_api::ws::HeartbeatConfig;
use imgq_core::store::ResultStore;
use imgq_core::types::ClientId;
use imgq_events::ResultReady;
use serde_json::json;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Serve `app` on an ephemeral port and return its address.
async fn serve(app: &TestApp) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn connect(addr: std::net::SocketAddr, client_id: &str) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/ws/{client_id}"))
        .await
        .unwrap();
    ws
}

async fn next_message(ws: &mut Client) -> Message {
    tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("message within timeout")
        .expect("stream open")
        .expect("valid frame")
}

async fn submit(app: &TestApp) -> String {
    let json = body_json(post_json(&app.router, "/generate/", json!({"prompt": "a cat"})).await).await;
    json["client_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn result_is_pushed_after_initial_ping() {
    let app = common::build_test_app();
    let addr = serve(&app).await;
    let client_id = submit(&app).await;

    let mut ws = connect(addr, &client_id).await;
    assert_eq!(next_message(&mut ws).await, Message::Text("ping".into()));
    ws.send(Message::Text("pong".into())).await.unwrap();

    let payload = r#"{"images":[{"url":"https://cdn.example/1.jpg"}]}"#;
    let id = ClientId::from(client_id.as_str());
    app.results.put(&id, payload, Duration::from_secs(3600)).await.unwrap();
    app.bus.send(ResultReady::new(id));

    assert_eq!(
        next_message(&mut ws).await,
        Message::Text(format!("Result Ready: {payload}"))
    );

    // The subscription ends but the socket stays usable.
    assert_eq!(app.notifier.stats().await.unwrap().watching, 0);
    ws.send(Message::Text("still here".into())).await.unwrap();
}

#[tokio::test]
async fn silent_client_is_disconnected_after_missed_heartbeats() {
    let mut config = common::test_config();
    config.heartbeat = HeartbeatConfig {
        interval: Duration::from_millis(100),
        max_missed: 1,
    };
    let app = common::build_test_app_with(config);
    let addr = serve(&app).await;

    let mut ws = connect(addr, "quiet-client").await;

    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(frame) = ws.next().await {
            match frame {
                Ok(Message::Close(_)) | Err(_) => return true,
                Ok(Message::Text(t)) => assert_eq!(t, "ping"),
                Ok(_) => {}
            }
        }
        true
    })
    .await
    .expect("server should close the connection");
    assert!(closed);

    // The registration is gone once the socket task finishes.
    for _ in 0..50 {
        if app.notifier.stats().await.unwrap().connections == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("connection still registered");
}

#[tokio::test]
async fn shutdown_sends_close_to_connected_clients() {
    let app = common::build_test_app();
    let addr = serve(&app).await;

    let mut ws = connect(addr, "c1").await;
    assert_eq!(next_message(&mut ws).await, Message::Text("ping".into()));
    while app.notifier.stats().await.unwrap().connections == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    app.cancel.cancel();

    assert!(matches!(next_message(&mut ws).await, Message::Close(_)));
}

#[tokio::test]
async fn reconnect_receives_result_missed_while_offline() {
    let app = common::build_test_app();
    let addr = serve(&app).await;
    let client_id = submit(&app).await;

    let payload = r#"{"images":[]}"#;
    let id = ClientId::from(client_id.as_str());
    app.results.put(&id, payload, Duration::from_secs(3600)).await.unwrap();
    app.bus.send(ResultReady::new(id));
    while app.notifier.stats().await.unwrap().undelivered == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let mut ws = connect(addr, &client_id).await;
    let mut texts = Vec::new();
    for _ in 0..2 {
        if let Message::Text(t) = next_message(&mut ws).await {
            texts.push(t);
        }
    }
    assert!(texts.contains(&"ping".to_string()));
    assert!(texts.contains(&format!("Result Ready: {payload}")));
}
