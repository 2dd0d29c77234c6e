//! End-to-end test over real WebSocket connections.

mod helpers;

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(app: &helpers::TestApp) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let router = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    format!("ws://{addr}/ws")
}

async fn connect(url: &str) -> Client {
    let (client, _) = connect_async(url).await.expect("connect");
    client
}

async fn send(client: &mut Client, value: Value) {
    client
        .send(Message::text(value.to_string()))
        .await
        .expect("send");
}

/// Reads events until one with the given type arrives.
async fn expect_event(client: &mut Client, kind: &str) -> Value {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            let msg = client.next().await.expect("stream ended").expect("read");
            if let Message::Text(text) = msg {
                let value: Value = serde_json::from_str(text.as_str()).expect("json");
                if value["type"] == kind {
                    return value;
                }
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {kind}"))
}

#[tokio::test]
async fn test_producer_frames_reach_consumer() {
    let app = helpers::TestApp::new();
    let session_id = app.create_session().await;
    let url = serve(&app).await;

    let mut producer = connect(&url).await;
    let mut consumer = connect(&url).await;

    send(
        &mut producer,
        json!({"type": "join", "session_id": session_id, "role": "producer"}),
    )
    .await;
    let joined = expect_event(&mut producer, "joined").await;
    assert_eq!(joined["role"], "producer");

    send(
        &mut consumer,
        json!({"type": "join-room", "roomId": session_id.to_lowercase(), "role": "viewer", "ack_id": "c1"}),
    )
    .await;
    let joined = expect_event(&mut consumer, "joined").await;
    assert_eq!(joined["producer_connected"], true);
    let ack = expect_event(&mut consumer, "ack").await;
    assert_eq!(ack["ack_id"], "c1");
    assert_eq!(ack["ok"], true);

    let announced = expect_event(&mut producer, "consumer-joined").await;
    assert_eq!(announced["consumer_id"], joined["connection_id"]);

    send(
        &mut producer,
        json!({"type": "frame", "session_id": session_id, "payload": "aGVsbG8=", "metadata": {"width": 640}}),
    )
    .await;
    let frame = expect_event(&mut consumer, "frame").await;
    assert_eq!(frame["payload"], "aGVsbG8=");
    assert_eq!(frame["sequence"], 1);
    assert_eq!(frame["catch_up"], false);
    assert_eq!(frame["metadata"]["width"], 640);

    producer.close(None).await.expect("close");
    let gone = expect_event(&mut consumer, "producer-disconnected").await;
    assert_eq!(gone["session_id"], session_id.as_str());
}

#[tokio::test]
async fn test_malformed_event_reports_error() {
    let app = helpers::TestApp::new();
    let url = serve(&app).await;
    let mut client = connect(&url).await;

    send(&mut client, json!({"type": "join", "role": "producer"})).await;
    let error = expect_event(&mut client, "error").await;
    assert_eq!(error["code"], "VALIDATION_ERROR");

    send(&mut client, json!({"type": "heartbeat-ping"})).await;
    expect_event(&mut client, "heartbeat-pong").await;
}

#[tokio::test]
async fn test_replaced_producer_is_closed() {
    let app = helpers::TestApp::new();
    let session_id = app.create_session().await;
    let url = serve(&app).await;

    let mut first = connect(&url).await;
    let mut second = connect(&url).await;

    send(
        &mut first,
        json!({"type": "join", "session_id": session_id, "role": "producer"}),
    )
    .await;
    expect_event(&mut first, "joined").await;

    send(
        &mut second,
        json!({"type": "join", "session_id": session_id, "role": "producer"}),
    )
    .await;
    expect_event(&mut first, "replaced").await;
    expect_event(&mut second, "joined").await;

    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match first.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "replaced producer was not disconnected");
}
