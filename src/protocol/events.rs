//! External event vocabulary sent to clients.

use std::fmt::{Display, Formatter};

use serde::Serialize;
use serde_json::{json, Value};

/// Names of the events a client can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    /// Stream opened; carries the resolved connection id.
    ConnectionAck,
    /// Passthrough of a JSON-RPC response.
    RpcResult,
    /// The agent asks the client to approve an action.
    ApprovalRequired,
    /// A tool invocation started.
    StartToolCalling,
    /// A tool invocation finished.
    ToolCallingResult,
    /// Agent text or reasoning.
    AiMessage,
    /// The agent finished its answer.
    AiAnswerEnd,
    /// Token usage report.
    TokenCount,
    /// Something failed.
    Error,
    /// The agent process exited.
    ProcessExit,
}

impl EventName {
    /// Wire name of the event.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionAck => "connection_ack",
            Self::RpcResult => "rpc_result",
            Self::ApprovalRequired => "approval_required",
            Self::StartToolCalling => "start_tool_calling",
            Self::ToolCallingResult => "tool_calling_result",
            Self::AiMessage => "ai_message",
            Self::AiAnswerEnd => "ai_answer_end",
            Self::TokenCount => "token_count",
            Self::Error => "error",
            Self::ProcessExit => "process_exit",
        }
    }
}

impl Display for EventName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event in the external vocabulary: a name plus a JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExternalEvent {
    /// Event name.
    #[serde(rename = "event")]
    pub name: EventName,
    /// Event payload.
    pub data: Value,
}

impl ExternalEvent {
    /// Build an event.
    #[must_use]
    pub fn new(name: EventName, data: Value) -> Self {
        Self { name, data }
    }

    /// `connection_ack { connectionId }`.
    #[must_use]
    pub fn connection_ack(connection_id: &str) -> Self {
        Self::new(EventName::ConnectionAck, json!({ "connectionId": connection_id }))
    }

    /// `error { error }`.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(EventName::Error, json!({ "error": message.into() }))
    }

    /// `process_exit { code, signal }`.
    #[must_use]
    pub fn process_exit(code: Option<i32>, signal: Option<&str>) -> Self {
        Self::new(
            EventName::ProcessExit,
            json!({ "code": code, "signal": signal }),
        )
    }
}
