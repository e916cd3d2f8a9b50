//! Integration tests for the agent process adapter against real `sh` children.

use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;

use agent_stream_bridge::agent::{AgentEvent, AgentProcess, SpawnConfig};
use agent_stream_bridge::AppError;

fn shell(script: &str) -> SpawnConfig {
    SpawnConfig {
        program: "sh".into(),
        args: vec!["-c".into(), script.into()],
        working_dir: None,
        env_passthrough: Vec::new(),
    }
}

async fn next_event(events: &mut mpsc::Receiver<AgentEvent>) -> Option<AgentEvent> {
    tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("agent event within 10s")
}

async fn collect_until_exit(events: &mut mpsc::Receiver<AgentEvent>) -> Vec<AgentEvent> {
    let mut seen = Vec::new();
    while let Some(event) = next_event(events).await {
        let done = matches!(event, AgentEvent::Exit { .. });
        seen.push(event);
        if done {
            break;
        }
    }
    seen
}

// ── Output and exit ─────────────────────────────────────────────────────────

/// Every stdout message is delivered before the exit notification.
#[tokio::test]
async fn messages_precede_exit() {
    let script = r#"printf '%s\n' '{"id":1,"result":{}}' '{"method":"turn/started"}'; exit 3"#;
    let (_agent, mut events) = AgentProcess::start(&shell(script), "p1", &[]).expect("spawn");

    let seen = collect_until_exit(&mut events).await;
    assert_eq!(
        seen,
        vec![
            AgentEvent::Message(json!({ "id": 1, "result": {} })),
            AgentEvent::Message(json!({ "method": "turn/started" })),
            AgentEvent::Exit {
                code: Some(3),
                signal: None
            },
        ]
    );
}

#[tokio::test]
async fn malformed_output_is_skipped() {
    let script = r#"echo 'starting up...'; echo '[1,2]'; echo '{"ok":true}'"#;
    let (_agent, mut events) = AgentProcess::start(&shell(script), "p2", &[]).expect("spawn");

    let seen = collect_until_exit(&mut events).await;
    assert_eq!(seen.first(), Some(&AgentEvent::Message(json!({ "ok": true }))));
    assert_eq!(seen.len(), 2, "only the valid message and the exit: {seen:?}");
}

// ── Input ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sent_messages_reach_stdin_as_lines() {
    let script = r#"read -r line; printf '%s\n' "$line""#;
    let (agent, mut events) = AgentProcess::start(&shell(script), "p3", &[]).expect("spawn");

    agent
        .send(json!({ "id": 7, "method": "initialize" }))
        .expect("send");
    assert_eq!(
        next_event(&mut events).await,
        Some(AgentEvent::Message(json!({ "id": 7, "method": "initialize" })))
    );
}

#[tokio::test]
async fn send_after_exit_is_rejected() {
    let (agent, mut events) = AgentProcess::start(&shell("exit 0"), "p4", &[]).expect("spawn");
    collect_until_exit(&mut events).await;

    assert!(!agent.is_running());
    let err = agent.send(json!({ "method": "ping" })).expect_err("agent exited");
    assert!(matches!(err, AppError::NotRunning(_)), "got {err:?}");
}

#[tokio::test]
async fn explicit_env_is_applied() {
    let script = r#"printf '{"marker":"%s"}\n' "$BRIDGE_TEST_MARKER""#;
    let env = [("BRIDGE_TEST_MARKER".to_owned(), "present".to_owned())];
    let (_agent, mut events) = AgentProcess::start(&shell(script), "p5", &env).expect("spawn");

    assert_eq!(
        next_event(&mut events).await,
        Some(AgentEvent::Message(json!({ "marker": "present" })))
    );
}

// ── Stop and spawn failure ──────────────────────────────────────────────────

/// `stop` terminates the child with SIGTERM and the exit names the signal.
#[cfg(unix)]
#[tokio::test]
async fn stop_terminates_with_sigterm() {
    let (agent, mut events) =
        AgentProcess::start(&shell("exec sleep 30"), "p6", &[]).expect("spawn");

    agent.stop();
    agent.stop();
    assert!(!agent.is_running(), "stop is immediate for senders");

    let seen = collect_until_exit(&mut events).await;
    assert_eq!(
        seen,
        vec![AgentEvent::Exit {
            code: None,
            signal: Some("SIGTERM".into())
        }]
    );
}

#[tokio::test]
async fn missing_binary_is_a_spawn_error() {
    let config = SpawnConfig {
        program: "/nonexistent/agent-binary".into(),
        args: Vec::new(),
        working_dir: None,
        env_passthrough: Vec::new(),
    };
    let err = AgentProcess::start(&config, "p7", &[]).expect_err("must fail");
    assert!(matches!(err, AppError::Spawn(_)), "got {err:?}");
}

/// Dropping the event receiver kills a chatty agent instead of leaving it
/// writing into a closed pipe.
#[tokio::test]
async fn dropped_listener_kills_agent() {
    let script = r#"while true; do printf '%s\n' '{"method":"tick"}'; sleep 0.05; done"#;
    let (agent, events) = AgentProcess::start(&shell(script), "p8", &[]).expect("spawn");
    drop(events);

    for _ in 0..200 {
        if !agent.is_running() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("agent still running after its listener went away");
}
