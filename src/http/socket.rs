//! WebSocket session handler.
//!
//! Same session as the SSE endpoint, over one socket: outbound events are
//! JSON text frames `{ "event", "data" }`, inbound text frames are control
//! payloads for this connection, and the heartbeat is a WebSocket ping.

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::Uri;
use axum::response::Response;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::extract_connection_id;
use crate::bridge::{SessionBridge, StreamRequest, CONNECTION_ID_FIELD};
use crate::protocol::ExternalEvent;
use crate::session::ClientFrame;
use crate::AppError;

/// `GET /api/v1/sre/socket`.
pub(super) async fn open_socket(
    State(bridge): State<SessionBridge>,
    uri: Uri,
    ws: WebSocketUpgrade,
) -> Response {
    let connection_id = extract_connection_id(&uri);
    ws.on_upgrade(move |socket| run_socket(bridge, connection_id, socket))
}

fn text_frame(event: &ExternalEvent) -> Option<Message> {
    serde_json::to_string(event)
        .map(|text| Message::Text(text.into()))
        .ok()
}

async fn run_socket(bridge: SessionBridge, connection_id: Option<String>, mut socket: WebSocket) {
    let request = StreamRequest {
        connection_id,
        accepts_stream: true,
        body: json!({}),
    };
    let mut opened = match bridge.open_session(request).await {
        Ok(opened) => opened,
        Err(err) => {
            warn!(%err, "websocket session rejected");
            if let Some(frame) = text_frame(&ExternalEvent::error(err.to_string())) {
                let _ = socket.send(frame).await;
            }
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    let connection_id = opened.connection_id.clone();

    loop {
        tokio::select! {
            frame = opened.stream.next_frame() => {
                let message = match frame {
                    Some(ClientFrame::Event(event)) => text_frame(&event),
                    Some(ClientFrame::Ping) => Some(Message::Ping(Bytes::new())),
                    None => {
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    }
                };
                if let Some(message) = message {
                    if socket.send(message).await.is_err() {
                        debug!(connection_id, "websocket send failed, client gone");
                        break;
                    }
                }
            }

            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let outcome = match serde_json::from_str::<Value>(text.as_str()) {
                        Ok(mut payload) => {
                            // The socket already names the connection.
                            if let Some(fields) = payload.as_object_mut() {
                                fields.remove(CONNECTION_ID_FIELD);
                            }
                            bridge.forward_payload(&connection_id, payload).await
                        }
                        Err(err) => Err(AppError::BadRequest(format!("invalid JSON frame: {err}"))),
                    };
                    if let Err(err) = outcome {
                        warn!(connection_id, %err, "websocket payload rejected");
                        if let Some(frame) = text_frame(&ExternalEvent::error(err.to_string())) {
                            let _ = socket.send(frame).await;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!(connection_id, "websocket closed by client");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(connection_id, %err, "websocket receive failed");
                    break;
                }
            },
        }
    }
    // Dropping the stream signals the disconnect to the session.
}
