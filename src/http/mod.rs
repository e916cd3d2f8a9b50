//! HTTP transport.
//!
//! Routes:
//! - `GET|POST /api/stream/investigate`: open an SSE session.
//! - `POST /api/stream/investigate/send`: control channel.
//! - `GET /api/v1/sre/socket`: WebSocket session.
//! - `GET /health`: liveness probe.

mod socket;
mod stream;

use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::bridge::SessionBridge;
use crate::{AppError, Result};

/// SSE stream path.
pub const STREAM_PATH: &str = "/api/stream/investigate";
/// Control channel path.
pub const SEND_PATH: &str = "/api/stream/investigate/send";
/// WebSocket path.
pub const SOCKET_PATH: &str = "/api/v1/sre/socket";

/// Handler for `GET /health`: 200 with a plain-text body.
async fn health() -> &'static str {
    "ok"
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::UnknownConnection(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Extract `connectionId` from a URI query string.
///
/// Returns `None` when the parameter is absent or empty.
fn extract_connection_id(uri: &axum::http::Uri) -> Option<String> {
    uri.query().and_then(|q| {
        q.split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == "connectionId")
            .map(|(_, v)| v.to_owned())
            .filter(|v| !v.is_empty())
    })
}

/// Build the application router.
#[must_use]
pub fn router(bridge: SessionBridge) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(STREAM_PATH, get(stream::open_stream).post(stream::open_stream))
        .route(SEND_PATH, post(stream::send))
        .route(SOCKET_PATH, get(socket::open_socket))
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(bridge)
}

/// Serve the router on `addr` until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Config` if the listener cannot bind, or
/// `AppError::Io` if the server fails.
pub async fn serve(bridge: SessionBridge, addr: SocketAddr, ct: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind HTTP on {addr}: {err}")))?;

    info!(%addr, "starting HTTP transport");

    axum::serve(listener, router(bridge))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Io(format!("HTTP server error: {err}")))?;

    info!("HTTP transport shut down");
    Ok(())
}
