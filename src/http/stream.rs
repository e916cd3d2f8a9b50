//! SSE stream and control-channel handlers.

use std::convert::Infallible;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::ACCEPT;
use axum::http::{HeaderMap, Uri};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map, Value};

use super::extract_connection_id;
use crate::bridge::{SessionBridge, StreamRequest};
use crate::session::ClientFrame;
use crate::{AppError, Result};

const EVENT_STREAM: &str = "text/event-stream";

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.contains(EVENT_STREAM))
}

/// Parse an optional JSON body; empty means `{}`.
fn parse_body(body: &Bytes) -> Result<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_slice(body).map_err(|err| AppError::BadRequest(format!("invalid JSON body: {err}")))
}

fn sse_event(frame: ClientFrame) -> Event {
    match frame {
        ClientFrame::Event(event) => Event::default()
            .event(event.name.as_str())
            .data(event.data.to_string()),
        ClientFrame::Ping => Event::default().comment("ping"),
    }
}

/// `GET|POST /api/stream/investigate`.
pub(super) async fn open_stream(
    State(bridge): State<SessionBridge>,
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
) -> Result<Response> {
    let opened = bridge
        .open_session(StreamRequest {
            connection_id: extract_connection_id(&uri),
            accepts_stream: accepts_event_stream(&headers),
            body: parse_body(&body)?,
        })
        .await?;

    let frames = futures_util::stream::unfold(opened.stream, |mut stream| async move {
        let frame = stream.next_frame().await?;
        Some((Ok::<_, Infallible>(sse_event(frame)), stream))
    });

    Ok(Sse::new(frames).into_response())
}

/// `POST /api/stream/investigate/send`.
pub(super) async fn send(
    State(bridge): State<SessionBridge>,
    body: Bytes,
) -> Result<Json<Value>> {
    bridge.send_control(parse_body(&body)?).await?;
    Ok(Json(json!({ "ok": true })))
}
