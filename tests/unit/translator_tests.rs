//! Unit tests for the agent message → external event translator.

use serde_json::json;

use agent_stream_bridge::protocol::{translate, EventName, ExternalEvent};

fn names(events: &[ExternalEvent]) -> Vec<EventName> {
    events.iter().map(|e| e.name).collect()
}

fn event(kind: &str, msg: serde_json::Value) -> serde_json::Value {
    let mut msg = msg;
    msg["type"] = json!(kind);
    json!({ "method": format!("codex/event/{kind}"), "params": { "id": "0", "msg": msg } })
}

// ── JSON-RPC responses ──────────────────────────────────────────────────────

#[test]
fn response_with_result_is_rpc_result() {
    let events = translate(&json!({ "id": 1, "result": { "userAgent": "codex" } }));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, EventName::RpcResult);
    assert_eq!(events[0].data, json!({ "id": 1, "result": { "userAgent": "codex" } }));
}

#[test]
fn response_with_null_result_is_ignored() {
    assert!(translate(&json!({ "id": 3, "result": null })).is_empty());
}

// ── Approvals ───────────────────────────────────────────────────────────────

/// The direct approval request carries the correlation id the client answers with.
#[test]
fn direct_approval_request_carries_id() {
    let events = translate(&json!({
        "id": 42,
        "method": "item/commandExecution/requestApproval",
        "params": {
            "threadId": "thr",
            "turnId": "turn",
            "itemId": "item-1",
            "command": ["rm", "-rf", "/tmp/x"],
            "reason": "cleanup"
        }
    }));
    assert_eq!(names(&events), vec![EventName::ApprovalRequired]);
    let data = &events[0].data;
    assert_eq!(data["id"], 42);
    assert_eq!(data["tool_call_id"], "item-1");
    assert_eq!(data["description"], "rm -rf /tmp/x");
    assert_eq!(data["reason"], "cleanup");
}

/// The legacy event form is informational and carries no correlation id.
#[test]
fn exec_approval_request_has_no_id() {
    let events = translate(&event(
        "exec_approval_request",
        json!({ "call_id": "c1", "command": ["kubectl", "delete", "pod", "x"], "reason": "restart", "risk": "high" }),
    ));
    assert_eq!(names(&events), vec![EventName::ApprovalRequired]);
    assert_eq!(
        events[0].data,
        json!({ "tool_call_id": "c1", "description": "kubectl delete pod x", "reason": "restart", "risk": "high" })
    );
    assert!(events[0].data.get("id").is_none());
}

#[test]
fn exec_approval_request_with_empty_command_is_dropped() {
    let events = translate(&event("exec_approval_request", json!({ "call_id": "c1", "command": [] })));
    assert!(events.is_empty(), "phantom approval must produce no events");
}

// ── Command execution ───────────────────────────────────────────────────────

/// A begin/end pair for the same call id references that id in both events.
#[test]
fn exec_command_begin_then_end_share_call_id() {
    let begin = translate(&event(
        "exec_command_begin",
        json!({ "call_id": "call-7", "command": ["kubectl", "get", "pods"] }),
    ));
    let end = translate(&event(
        "exec_command_end",
        json!({
            "call_id": "call-7",
            "command": ["kubectl", "get", "pods"],
            "exit_code": 0,
            "stdout": "raw",
            "formatted_output": "NAME READY",
            "stderr": ""
        }),
    ));

    assert_eq!(names(&begin), vec![EventName::StartToolCalling]);
    assert_eq!(begin[0].data, json!({ "tool_name": "kubectl", "id": "call-7" }));

    assert_eq!(names(&end), vec![EventName::ToolCallingResult]);
    let data = &end[0].data;
    assert_eq!(data["tool_call_id"], "call-7");
    assert_eq!(data["role"], "tool");
    assert_eq!(data["name"], "kubectl");
    assert_eq!(data["description"], "kubectl get pods");
    assert_eq!(data["result"]["status"], "success");
    assert!(data["result"]["error"].is_null());
    assert_eq!(data["result"]["return_code"], 0);
    assert_eq!(data["result"]["data"], "NAME READY");
    assert_eq!(data["result"]["invocation"], "kubectl get pods");
    assert_eq!(data["result"]["params"], json!({}));
}

#[test]
fn failed_command_reports_stderr() {
    let events = translate(&event(
        "exec_command_end",
        json!({ "call_id": "c", "command": ["false"], "exit_code": 1, "stdout": "", "stderr": "boom" }),
    ));
    let result = &events[0].data["result"];
    assert_eq!(result["status"], "error");
    assert_eq!(result["error"], "boom");
    assert_eq!(result["return_code"], 1);
}

#[test]
fn failed_command_without_stderr_has_default_error() {
    let events = translate(&event(
        "exec_command_end",
        json!({ "call_id": "c", "command": ["false"], "exit_code": 2, "stdout": "out" }),
    ));
    assert_eq!(events[0].data["result"]["error"], "Command failed");
    assert_eq!(events[0].data["result"]["data"], "out");
}

#[test]
fn empty_command_vector_uses_shell_tool() {
    let events = translate(&event("exec_command_begin", json!({ "call_id": "c", "command": [] })));
    assert_eq!(events[0].data["tool_name"], "shell_exec");
}

// ── Patches ─────────────────────────────────────────────────────────────────

#[test]
fn patch_apply_lists_changed_files() {
    let begin = translate(&event("patch_apply_begin", json!({ "call_id": "p1", "changes": {} })));
    assert_eq!(begin[0].data, json!({ "tool_name": "apply_patch", "id": "p1" }));

    let end = translate(&event(
        "patch_apply_end",
        json!({
            "call_id": "p1",
            "stdout": "applied",
            "stderr": "",
            "success": true,
            "changes": { "a.yaml": {}, "b.yaml": {} }
        }),
    ));
    let data = &end[0].data;
    assert_eq!(data["name"], "apply_patch");
    assert_eq!(data["description"], "Applied patch to files: a.yaml, b.yaml");
    assert_eq!(data["result"]["status"], "success");
    assert_eq!(data["result"]["params"]["files"], json!(["a.yaml", "b.yaml"]));
}

// ── External tools ──────────────────────────────────────────────────────────

#[test]
fn mcp_tool_ok_concatenates_text() {
    let events = translate(&event(
        "mcp_tool_call_end",
        json!({
            "call_id": "m1",
            "invocation": { "server": "prom", "tool": "query", "arguments": { "q": "up" } },
            "result": { "Ok": { "content": [
                { "type": "text", "text": "line1\n" },
                { "type": "text", "text": "line2" }
            ], "isError": false } }
        }),
    ));
    let data = &events[0].data;
    assert_eq!(data["name"], "query");
    assert_eq!(data["description"], "prom.query");
    assert_eq!(data["result"]["status"], "success");
    assert_eq!(data["result"]["data"], "line1\nline2");
    assert_eq!(data["result"]["params"], json!({ "q": "up" }));
}

#[test]
fn mcp_tool_is_error_flips_status() {
    let events = translate(&event(
        "mcp_tool_call_end",
        json!({
            "call_id": "m1",
            "invocation": { "server": "prom", "tool": "query" },
            "result": { "Ok": { "content": [{ "type": "text", "text": "bad query" }], "isError": true } }
        }),
    ));
    assert_eq!(events[0].data["result"]["status"], "error");
    assert_eq!(events[0].data["result"]["error"], "bad query");
}

#[test]
fn mcp_tool_err_branch() {
    let events = translate(&event(
        "mcp_tool_call_end",
        json!({
            "call_id": "m2",
            "invocation": { "server": "prom", "tool": "query" },
            "result": { "Err": "timeout" }
        }),
    ));
    assert_eq!(events[0].data["result"]["status"], "error");
    assert_eq!(events[0].data["result"]["error"], "timeout");
}

#[test]
fn mcp_tool_begin_names_tool() {
    let events = translate(&event(
        "mcp_tool_call_begin",
        json!({ "call_id": "m3", "invocation": { "server": "k8s", "tool": "logs" } }),
    ));
    assert_eq!(events[0].data, json!({ "tool_name": "logs", "id": "m3" }));
}

// ── Messages ────────────────────────────────────────────────────────────────

#[test]
fn agent_message_and_reasoning() {
    let message = translate(&event("agent_message", json!({ "message": "hello" })));
    assert_eq!(message[0].name, EventName::AiMessage);
    assert_eq!(message[0].data, json!({ "content": "hello" }));

    let reasoning = translate(&event("agent_reasoning", json!({ "text": "thinking" })));
    assert_eq!(reasoning[0].data, json!({ "content": "thinking", "is_reasoning": true }));
}

#[test]
fn task_complete_is_answer_end() {
    let events = translate(&event("task_complete", json!({ "last_agent_message": "root cause: OOM" })));
    assert_eq!(names(&events), vec![EventName::AiAnswerEnd]);
    assert_eq!(events[0].data, json!({ "sections": {}, "analysis": "root cause: OOM" }));
}

#[test]
fn token_count_passes_through() {
    let events = translate(&event("token_count", json!({ "info": { "total": 10 } })));
    assert_eq!(events[0].name, EventName::TokenCount);
    assert_eq!(events[0].data["info"]["total"], 10);
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[test]
fn error_and_stream_error() {
    let err = translate(&event("error", json!({ "message": "rate limited" })));
    assert_eq!(err[0].data, json!({ "error": "rate limited" }));

    let stream = translate(&event("stream_error", json!({})));
    assert_eq!(stream[0].data, json!({ "error": "Unknown error" }));
}

#[test]
fn turn_aborted_is_error() {
    let events = translate(&event("turn_aborted", json!({ "reason": "interrupted" })));
    assert_eq!(events[0].data, json!({ "error": "turn aborted: interrupted" }));
}

#[test]
fn turn_completed_notification() {
    let failed = translate(&json!({
        "method": "turn/completed",
        "params": { "turn": { "status": "failed", "error": { "message": "quota" } } }
    }));
    assert_eq!(failed, vec![ExternalEvent::error("quota")]);

    let interrupted = translate(&json!({
        "method": "turn/completed",
        "params": { "turn": { "status": "interrupted" } }
    }));
    assert_eq!(interrupted, vec![ExternalEvent::error("turn interrupted")]);

    let completed = translate(&json!({
        "method": "turn/completed",
        "params": { "turn": { "status": "completed" } }
    }));
    assert!(completed.is_empty());
}

// ── Plan updates ────────────────────────────────────────────────────────────

/// Summary counts match the plan and every step becomes a todo entry.
#[test]
fn plan_update_summarises_steps() {
    let events = translate(&event(
        "plan_update",
        json!({
            "explanation": "triage",
            "plan": [
                { "step": "check pods", "status": "completed" },
                { "step": "read logs", "status": "in_progress" },
                { "step": "roll back", "status": "pending" },
                { "step": "write report", "status": "pending" }
            ]
        }),
    ));

    assert_eq!(
        names(&events),
        vec![EventName::StartToolCalling, EventName::ToolCallingResult]
    );
    assert_eq!(events[0].data["tool_name"], "todo_write");
    assert_eq!(events[0].data["id"], events[1].data["tool_call_id"]);

    let summary = events[1].data["result"]["data"].as_str().expect("summary");
    assert!(summary.starts_with("Todo list updated: 1 completed, 1 in progress, 2 pending"));
    assert!(summary.contains("- [x] check pods"));
    assert!(summary.contains("- [~] read logs"));
    assert!(summary.contains("- [ ] roll back"));

    let todos = events[1].data["result"]["params"]["todos"].as_array().expect("todos");
    assert_eq!(todos.len(), 4);
    assert_eq!(todos[1], json!({ "id": "2", "content": "read logs", "status": "in_progress" }));
}

#[test]
fn plan_update_is_deterministic() {
    let msg = event("plan_update", json!({ "plan": [{ "step": "a", "status": "pending" }] }));
    assert_eq!(translate(&msg), translate(&msg));
}

// ── Unknown shapes ──────────────────────────────────────────────────────────

#[test]
fn unknown_shapes_produce_nothing() {
    assert!(translate(&event("user_message", json!({ "message": "hi" }))).is_empty());
    assert!(translate(&json!({ "method": "item/started", "params": {} })).is_empty());
    assert!(translate(&json!({})).is_empty());
}
