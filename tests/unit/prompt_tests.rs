//! Unit tests for initial prompt resolution and alert instructions.

use serde_json::json;

use agent_stream_bridge::lifecycle::InitialPrompt;
use agent_stream_bridge::protocol::prompt::{
    compose_alert_prompt, initial_user_input, is_alert_payload, requested_model,
};

fn alert() -> serde_json::Value {
    json!({
        "source": "prometheus",
        "title": "HighLatency",
        "description": "p95 latency above 2s",
        "subject": { "service": "checkout", "labels": { "env": "prod" } },
        "context": { "start_timestamp": "2024-05-01T10:00:00Z", "end_timestamp": "2024-05-01T10:15:00Z" },
        "model": "gpt-5"
    })
}

#[test]
fn alert_requires_source_title_and_subject() {
    assert!(is_alert_payload(&alert()));
    assert!(!is_alert_payload(&json!({ "source": "x", "title": "y" })));
    assert!(!is_alert_payload(&json!({ "input": "hello" })));
}

#[test]
fn alert_prompt_includes_alert_details() {
    let prompt = compose_alert_prompt(&alert());
    assert!(prompt.contains("Alert: p95 latency above 2s"));
    assert!(prompt.contains("Time range: 2024-05-01T10:00:00Z to 2024-05-01T10:15:00Z"));
    assert!(prompt.contains("service: checkout"));
    assert!(prompt.contains(r#"labels: {"env":"prod"}"#), "object subject values render as JSON");
    assert!(prompt.contains("start_timestamp: 2024-05-01T10:00:00Z"));
    assert!(prompt.ends_with("Please investigate the root cause and recommend safe remediation steps."));
}

#[test]
fn alert_prompt_falls_back_to_title_and_unspecified_range() {
    let prompt = compose_alert_prompt(&json!({
        "source": "grafana",
        "title": "DiskFull",
        "subject": { "host": "db-1" }
    }));
    assert!(prompt.contains("Alert: DiskFull"));
    assert!(prompt.contains("Time range: unspecified to unspecified"));
    assert!(!prompt.contains("Context details"));
}

#[test]
fn user_input_field_precedence() {
    assert_eq!(
        initial_user_input(&json!({ "input": "", "message": "from message", "text": "from text" })),
        Some("from message".to_owned())
    );
    assert_eq!(initial_user_input(&json!({ "text": 42 })), Some("42".to_owned()));
    assert_eq!(initial_user_input(&json!({})), None);
}

#[test]
fn model_is_read_from_payload() {
    assert_eq!(requested_model(&alert()), Some("gpt-5"));
    assert_eq!(requested_model(&json!({ "model": "" })), None);
}

#[test]
fn initial_prompt_from_body() {
    assert!(matches!(
        InitialPrompt::from_body(&json!({ "payload": alert() })),
        InitialPrompt::Alert(_)
    ));
    assert_eq!(
        InitialPrompt::from_body(&json!({ "message": "check redis", "model": "m" })),
        InitialPrompt::Text {
            text: "check redis".into(),
            model: Some("m".into())
        }
    );
}
