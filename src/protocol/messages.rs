//! Outbound JSON-RPC requests and inbound field accessors.
//!
//! The handshake uses two fixed correlation ids, [`INIT_REQUEST_ID`] and
//! [`THREAD_START_REQUEST_ID`]. Every other request the bridge issues
//! (`turn/start`, alert-derived `thread/start`) carries a fresh id from
//! [`RequestIdAllocator`](crate::session::pending::RequestIdAllocator).

use serde::Serialize;
use serde_json::{json, Value};

use crate::config::ThreadConfig;

/// Correlation id of the `initialize` request.
pub const INIT_REQUEST_ID: u64 = 1;

/// Correlation id of the handshake `thread/start` request.
pub const THREAD_START_REQUEST_ID: u64 = 2;

/// `initialize` method name.
pub const METHOD_INITIALIZE: &str = "initialize";
/// `thread/start` method name.
pub const METHOD_THREAD_START: &str = "thread/start";
/// `turn/start` method name.
pub const METHOD_TURN_START: &str = "turn/start";

/// Turn statuses that end a turn.
pub const TERMINAL_TURN_STATUSES: &[&str] = &["completed", "failed", "interrupted"];

/// Identity the bridge announces to the agent.
#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    /// Client name.
    pub name: &'static str,
    /// Client version.
    pub version: &'static str,
    /// Human-readable title.
    pub title: &'static str,
}

/// `initialize` parameters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Announced client identity.
    pub client_info: ClientInfo,
}

/// `thread/start` parameters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadStartParams {
    cwd: String,
    model: Option<String>,
    model_provider: Option<String>,
    approval_policy: String,
    sandbox: String,
    config: Option<Value>,
    base_instructions: Option<String>,
    developer_instructions: Option<String>,
}

/// One input item of a turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnInput {
    /// Input kind; always `text`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Input text.
    pub text: String,
}

/// `turn/start` parameters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnStartParams {
    thread_id: String,
    input: Vec<TurnInput>,
    cwd: Option<String>,
    approval_policy: Option<String>,
    sandbox_policy: Option<Value>,
    model: Option<String>,
    effort: Option<String>,
    summary: Option<String>,
}

fn request(method: &str, id: u64, params: impl Serialize) -> Value {
    json!({
        "method": method,
        "id": id,
        "params": serde_json::to_value(params).unwrap_or(Value::Null),
    })
}

/// The `initialize` request, always sent with [`INIT_REQUEST_ID`].
#[must_use]
pub fn initialize_request() -> Value {
    request(
        METHOD_INITIALIZE,
        INIT_REQUEST_ID,
        InitializeParams {
            client_info: ClientInfo {
                name: env!("CARGO_PKG_NAME"),
                version: env!("CARGO_PKG_VERSION"),
                title: "Server Init",
            },
        },
    )
}

/// A `thread/start` request with the configured thread defaults.
///
/// `model` overrides the configured default model.
#[must_use]
pub fn thread_start_request(id: u64, defaults: &ThreadConfig, model: Option<&str>) -> Value {
    request(
        METHOD_THREAD_START,
        id,
        ThreadStartParams {
            cwd: defaults.cwd.clone(),
            model: model.map(str::to_owned).or_else(|| defaults.model.clone()),
            model_provider: None,
            approval_policy: defaults.approval_policy.clone(),
            sandbox: defaults.sandbox.clone(),
            config: None,
            base_instructions: None,
            developer_instructions: None,
        },
    )
}

/// A `turn/start` request carrying `text` as the only input.
#[must_use]
pub fn turn_start_request(id: u64, thread_id: &str, text: &str, model: Option<&str>) -> Value {
    request(
        METHOD_TURN_START,
        id,
        TurnStartParams {
            thread_id: thread_id.to_owned(),
            input: vec![TurnInput {
                kind: "text",
                text: text.to_owned(),
            }],
            cwd: None,
            approval_policy: None,
            sandbox_policy: None,
            model: model.map(str::to_owned),
            effort: None,
            summary: None,
        },
    )
}

/// Numeric correlation id of a message, if any.
#[must_use]
pub fn numeric_id(message: &Value) -> Option<u64> {
    message.get("id").and_then(Value::as_u64)
}

/// `result` of a response, when present and not null.
#[must_use]
pub fn result_of(message: &Value) -> Option<&Value> {
    message.get("result").filter(|result| !result.is_null())
}

/// `result.thread.id` of a `thread/start` response.
#[must_use]
pub fn result_thread_id(message: &Value) -> Option<&str> {
    message.pointer("/result/thread/id").and_then(Value::as_str)
}

/// `result.turn.status` of a response.
#[must_use]
pub fn result_turn_status(message: &Value) -> Option<&str> {
    message.pointer("/result/turn/status").and_then(Value::as_str)
}

/// `params.turn.status` of a notification.
#[must_use]
pub fn notification_turn_status(message: &Value) -> Option<&str> {
    message.pointer("/params/turn/status").and_then(Value::as_str)
}

/// `params.msg.type` of an agent event notification.
#[must_use]
pub fn event_type(message: &Value) -> Option<&str> {
    message.pointer("/params/msg/type").and_then(Value::as_str)
}

/// Whether `status` ends a turn.
#[must_use]
pub fn is_terminal_status(status: &str) -> bool {
    TERMINAL_TURN_STATUSES.contains(&status)
}
