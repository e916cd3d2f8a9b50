//! Agent-native messages → external events.
//!
//! [`translate`] is pure: it never looks at session state, and the same
//! message always yields the same events in the same order. Shapes it does
//! not recognise yield no events.

use std::fmt::Write as _;

use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::protocol::events::{EventName, ExternalEvent};
use crate::protocol::messages::{event_type, numeric_id, result_of};

/// Direct approval request issued by the agent as a JSON-RPC request.
pub const METHOD_COMMAND_APPROVAL: &str = "item/commandExecution/requestApproval";

/// Turn completion notification.
pub const METHOD_TURN_COMPLETED: &str = "turn/completed";

/// Tool name reported for shell commands with an empty command vector.
pub const SHELL_TOOL: &str = "shell_exec";

/// Tool name reported for patch application.
pub const PATCH_TOOL: &str = "apply_patch";

/// Tool name of the synthetic plan-update invocation.
pub const TODO_TOOL: &str = "todo_write";

/// Translate one agent message into zero or more external events.
#[must_use]
pub fn translate(message: &Value) -> Vec<ExternalEvent> {
    if let (Some(id), Some(result)) = (numeric_id(message), result_of(message)) {
        return vec![ExternalEvent::new(
            EventName::RpcResult,
            json!({ "id": id, "result": result }),
        )];
    }

    match message.get("method").and_then(Value::as_str) {
        Some(METHOD_COMMAND_APPROVAL) => return direct_approval(message),
        Some(METHOD_TURN_COMPLETED) => return turn_completed(message),
        _ => {}
    }

    let Some(kind) = event_type(message) else {
        return Vec::new();
    };
    let msg = &message["params"]["msg"];

    match kind {
        "exec_command_begin" => vec![start_tool(&command_tool_name(&msg["command"]), &msg["call_id"])],
        "exec_command_end" => vec![exec_command_end(msg)],
        "patch_apply_begin" => vec![start_tool(PATCH_TOOL, &msg["call_id"])],
        "patch_apply_end" => vec![patch_apply_end(msg)],
        "mcp_tool_call_begin" => {
            let tool = str_field(&msg["invocation"], "tool").unwrap_or("mcp_tool");
            vec![start_tool(tool, &msg["call_id"])]
        }
        "mcp_tool_call_end" => vec![mcp_tool_call_end(msg)],
        "agent_message" => vec![ExternalEvent::new(
            EventName::AiMessage,
            json!({ "content": msg["message"] }),
        )],
        "agent_reasoning" => vec![ExternalEvent::new(
            EventName::AiMessage,
            json!({ "content": msg["text"], "is_reasoning": true }),
        )],
        "exec_approval_request" => exec_approval_request(msg),
        "task_complete" => vec![ExternalEvent::new(
            EventName::AiAnswerEnd,
            json!({ "sections": {}, "analysis": msg["last_agent_message"] }),
        )],
        "token_count" => vec![ExternalEvent::new(EventName::TokenCount, msg.clone())],
        "error" | "stream_error" => vec![ExternalEvent::error(
            str_field(msg, "message").unwrap_or("Unknown error"),
        )],
        "turn_aborted" => vec![ExternalEvent::error(format!(
            "turn aborted: {}",
            str_field(msg, "reason").unwrap_or("unknown")
        ))],
        "plan_update" => plan_update(msg),
        _ => Vec::new(),
    }
}

/// Non-empty string field of `value`.
fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// A command vector (or plain command string) rendered as one line.
fn command_text(command: &Value) -> String {
    match command {
        Value::Array(parts) => parts
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" "),
        Value::String(s) => s.clone(),
        _ => String::new(),
    }
}

fn command_tool_name(command: &Value) -> String {
    let first = match command {
        Value::Array(parts) => parts.first().and_then(Value::as_str),
        Value::String(s) => s.split_whitespace().next(),
        _ => None,
    };
    first
        .filter(|s| !s.is_empty())
        .unwrap_or(SHELL_TOOL)
        .to_owned()
}

fn start_tool(tool_name: &str, call_id: &Value) -> ExternalEvent {
    ExternalEvent::new(
        EventName::StartToolCalling,
        json!({ "tool_name": tool_name, "id": call_id }),
    )
}

/// Normalised `result` object of a `tool_calling_result` event.
struct ToolResult {
    success: bool,
    error: Option<String>,
    return_code: Value,
    data: Value,
    invocation: Value,
    params: Value,
}

impl ToolResult {
    fn into_event(self, call_id: &Value, name: &str, description: String) -> ExternalEvent {
        ExternalEvent::new(
            EventName::ToolCallingResult,
            json!({
                "tool_call_id": call_id,
                "role": "tool",
                "description": description,
                "name": name,
                "result": {
                    "status": if self.success { "success" } else { "error" },
                    "error": self.error,
                    "return_code": self.return_code,
                    "data": self.data,
                    "invocation": self.invocation,
                    "params": self.params,
                },
            }),
        )
    }
}

fn exec_command_end(msg: &Value) -> ExternalEvent {
    let command = command_text(&msg["command"]);
    let success = msg["exit_code"].as_i64() == Some(0);
    let data = str_field(msg, "formatted_output")
        .or_else(|| str_field(msg, "stdout"))
        .map_or(Value::Null, |s| Value::String(s.to_owned()));

    ToolResult {
        success,
        error: (!success).then(|| str_field(msg, "stderr").unwrap_or("Command failed").to_owned()),
        return_code: msg["exit_code"].clone(),
        data,
        invocation: Value::String(command.clone()),
        params: json!({}),
    }
    .into_event(&msg["call_id"], &command_tool_name(&msg["command"]), command)
}

fn patch_apply_end(msg: &Value) -> ExternalEvent {
    let files: Vec<&str> = msg["changes"]
        .as_object()
        .map(|changes| changes.keys().map(String::as_str).collect())
        .unwrap_or_default();
    let success = msg["success"].as_bool().unwrap_or(false);

    ToolResult {
        success,
        error: (!success).then(|| str_field(msg, "stderr").unwrap_or("Patch failed").to_owned()),
        return_code: json!(i32::from(!success)),
        data: msg["stdout"].clone(),
        invocation: Value::String(PATCH_TOOL.to_owned()),
        params: json!({ "files": files }),
    }
    .into_event(
        &msg["call_id"],
        PATCH_TOOL,
        format!("Applied patch to files: {}", files.join(", ")),
    )
}

/// Concatenated `text` segments of an MCP `content` array.
fn content_text(content: &Value) -> String {
    content
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter(|item| item["type"] == "text")
                .filter_map(|item| item["text"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default()
}

fn mcp_tool_call_end(msg: &Value) -> ExternalEvent {
    let invocation = &msg["invocation"];
    let server = str_field(invocation, "server").unwrap_or_default();
    let tool = str_field(invocation, "tool").unwrap_or("mcp_tool");
    let arguments = match &invocation["arguments"] {
        Value::Null => json!({}),
        other => other.clone(),
    };

    let (success, error, data) = if let Some(ok) = msg["result"].get("Ok") {
        let is_error = ok["isError"].as_bool().or_else(|| ok["is_error"].as_bool()).unwrap_or(false);
        let text = content_text(&ok["content"]);
        let error = is_error.then(|| if text.is_empty() { "Tool call failed".to_owned() } else { text.clone() });
        (!is_error, error, Value::String(text))
    } else if let Some(err) = msg["result"].get("Err") {
        let error = err.as_str().map_or_else(|| err.to_string(), str::to_owned);
        (false, Some(error), Value::Null)
    } else {
        (false, Some("Tool call returned no result".to_owned()), Value::Null)
    };

    ToolResult {
        success,
        error,
        return_code: Value::Null,
        data,
        invocation: json!({ "server": server, "tool": tool, "arguments": arguments }),
        params: arguments,
    }
    .into_event(&msg["call_id"], tool, format!("{server}.{tool}"))
}

fn exec_approval_request(msg: &Value) -> Vec<ExternalEvent> {
    let description = command_text(&msg["command"]);
    if description.is_empty() {
        return Vec::new();
    }
    vec![ExternalEvent::new(
        EventName::ApprovalRequired,
        json!({
            "tool_call_id": msg["call_id"],
            "description": description,
            "reason": msg["reason"],
            "risk": msg["risk"],
        }),
    )]
}

fn direct_approval(message: &Value) -> Vec<ExternalEvent> {
    let Some(id) = message.get("id").filter(|id| !id.is_null()) else {
        return Vec::new();
    };
    let params = &message["params"];
    vec![ExternalEvent::new(
        EventName::ApprovalRequired,
        json!({
            "id": id,
            "tool_call_id": params["itemId"],
            "description": command_text(&params["command"]),
            "reason": params["reason"],
            "thread_id": params["threadId"],
            "turn_id": params["turnId"],
        }),
    )]
}

fn turn_completed(message: &Value) -> Vec<ExternalEvent> {
    let turn = &message["params"]["turn"];
    match turn["status"].as_str() {
        Some("failed") => vec![ExternalEvent::error(
            turn.pointer("/error/message")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .unwrap_or("turn failed"),
        )],
        Some("interrupted") => vec![ExternalEvent::error("turn interrupted")],
        _ => Vec::new(),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum StepStatus {
    Completed,
    InProgress,
    Pending,
}

impl StepStatus {
    fn parse(raw: &str) -> Self {
        match raw {
            "completed" => Self::Completed,
            "in_progress" | "inProgress" => Self::InProgress,
            _ => Self::Pending,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::InProgress => "in_progress",
            Self::Pending => "pending",
        }
    }

    fn marker(self) -> &'static str {
        match self {
            Self::Completed => "[x]",
            Self::InProgress => "[~]",
            Self::Pending => "[ ]",
        }
    }
}

/// Call id derived from the plan contents: `todo-` plus 16 hex digits.
fn todo_call_id(msg: &Value) -> String {
    let digest = Sha256::digest(msg.to_string().as_bytes());
    let mut id = String::from("todo-");
    for byte in &digest[..8] {
        let _ = write!(id, "{byte:02x}");
    }
    id
}

fn plan_update(msg: &Value) -> Vec<ExternalEvent> {
    let steps: Vec<(String, StepStatus)> = msg["plan"]
        .as_array()
        .map(|plan| {
            plan.iter()
                .map(|item| {
                    (
                        item["step"].as_str().unwrap_or_default().to_owned(),
                        StepStatus::parse(item["status"].as_str().unwrap_or_default()),
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    let count = |status: StepStatus| steps.iter().filter(|(_, s)| *s == status).count();
    let mut summary = format!(
        "Todo list updated: {} completed, {} in progress, {} pending",
        count(StepStatus::Completed),
        count(StepStatus::InProgress),
        count(StepStatus::Pending),
    );
    if let Some(explanation) = str_field(msg, "explanation") {
        let _ = write!(summary, "\n{explanation}");
    }
    for (step, status) in &steps {
        let _ = write!(summary, "\n- {} {step}", status.marker());
    }

    let todos: Vec<Value> = steps
        .iter()
        .enumerate()
        .map(|(index, (step, status))| {
            let mut todo = Map::new();
            todo.insert("id".into(), json!((index + 1).to_string()));
            todo.insert("content".into(), json!(step));
            todo.insert("status".into(), json!(status.as_str()));
            Value::Object(todo)
        })
        .collect();

    let call_id = Value::String(todo_call_id(msg));
    vec![
        start_tool(TODO_TOOL, &call_id),
        ToolResult {
            success: true,
            error: None,
            return_code: json!(0),
            data: Value::String(summary),
            invocation: Value::String(TODO_TOOL.to_owned()),
            params: json!({ "todos": todos }),
        }
        .into_event(&call_id, TODO_TOOL, "Update todo list".to_owned()),
    ]
}
