//! WebSocket upgrade handler and per-connection transport loop.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tracing::{error, info, warn};

use camrelay_realtime::connection::heartbeat::run_heartbeat;
use camrelay_realtime::message::types::OutboundMessage;

use crate::state::AppState;

/// How long the writer may take to flush after the reader stops.
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// GET /ws: WebSocket upgrade
pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let max_bytes = state.config.realtime.max_message_bytes;
    ws.max_message_size(max_bytes)
        .on_upgrade(move |socket| handle_ws_connection(state, socket))
}

/// Drives one established WebSocket connection until either side closes.
async fn handle_ws_connection(state: AppState, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let connections = state.realtime.connections.clone();

    let (handle, mut outbound_rx) = connections.register().await;
    let conn_id = handle.id;
    let close = handle.close_token();

    let heartbeat_task = tokio::spawn(run_heartbeat(
        handle.clone(),
        connections.heartbeat_config(),
    ));

    // Outbound writer. On a forced close it flushes whatever is already
    // queued, then sends a close frame.
    let writer_close = close.clone();
    let mut outbound_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                msg = outbound_rx.recv() => match msg {
                    Some(msg) => {
                        if !send_json(&mut ws_tx, &msg).await {
                            break;
                        }
                    }
                    None => break,
                },
                _ = writer_close.cancelled() => {
                    while let Ok(msg) = outbound_rx.try_recv() {
                        if !send_json(&mut ws_tx, &msg).await {
                            break;
                        }
                    }
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Inbound reader.
    loop {
        tokio::select! {
            _ = close.cancelled() => break,
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    connections.handle_inbound(&conn_id, text.as_str()).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => handle.touch().await,
                Some(Err(e)) => {
                    warn!(conn_id = %conn_id, error = %e, "WebSocket error");
                    break;
                }
            }
        }
    }

    // Cleanup
    connections.unregister(&conn_id).await;
    handle.force_close();
    heartbeat_task.abort();
    if tokio::time::timeout(WRITER_FLUSH_TIMEOUT, &mut outbound_task)
        .await
        .is_err()
    {
        outbound_task.abort();
    }

    info!(conn_id = %conn_id, "WebSocket connection closed");
}

/// Serializes and writes one message. Returns `false` once the socket is gone.
async fn send_json(sink: &mut SplitSink<WebSocket, Message>, msg: &OutboundMessage) -> bool {
    let text = match serde_json::to_string(msg) {
        Ok(text) => text,
        Err(e) => {
            error!(error = %e, "Failed to serialize outbound message");
            return true;
        }
    };
    sink.send(Message::Text(text.into())).await.is_ok()
}
