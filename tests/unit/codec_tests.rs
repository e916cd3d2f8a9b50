//! Unit tests for agent stdio framing: codec, stdout reader, stdin writer.

use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use agent_stream_bridge::agent::codec::MAX_LINE_BYTES;
use agent_stream_bridge::agent::reader::{parse_line, run_reader, ReadOutcome};
use agent_stream_bridge::agent::writer::{encode_line, run_writer};
use agent_stream_bridge::agent::AgentEvent;
use agent_stream_bridge::AppError;

async fn read_all(input: Vec<u8>) -> (ReadOutcome, Vec<AgentEvent>) {
    let (tx, mut rx) = mpsc::channel(64);
    let outcome = run_reader("test", input.as_slice(), &tx)
        .await
        .expect("reader must not fail on in-memory input");
    drop(tx);
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    (outcome, events)
}

// ── parse_line ──────────────────────────────────────────────────────────────

#[test]
fn parse_line_accepts_objects_only() {
    assert_eq!(
        parse_line("{\"id\":1}").expect("object"),
        Some(json!({ "id": 1 }))
    );
    assert_eq!(parse_line("   ").expect("blank"), None);
    assert!(matches!(parse_line("[1,2]"), Err(AppError::ProcessIo(_))));
    assert!(matches!(parse_line("{oops"), Err(AppError::ProcessIo(_))));
}

// ── run_reader ──────────────────────────────────────────────────────────────

/// Messages keep their order; a malformed line in between is dropped.
#[tokio::test]
async fn malformed_line_does_not_end_stream() {
    let input = b"{\"id\":1}\nnot json\n\n{\"id\":2}\n".to_vec();
    let (outcome, events) = read_all(input).await;
    assert_eq!(outcome, ReadOutcome::Eof);
    assert_eq!(
        events,
        vec![
            AgentEvent::Message(json!({ "id": 1 })),
            AgentEvent::Message(json!({ "id": 2 })),
        ]
    );
}

#[tokio::test]
async fn final_line_without_newline_is_delivered() {
    let (_, events) = read_all(b"{\"id\":9}".to_vec()).await;
    assert_eq!(events, vec![AgentEvent::Message(json!({ "id": 9 }))]);
}

#[tokio::test]
async fn oversized_line_is_skipped() {
    let mut input = vec![b'x'; MAX_LINE_BYTES + 10];
    input.extend_from_slice(b"\n{\"id\":3}\n");
    let (_, events) = read_all(input).await;
    assert_eq!(events, vec![AgentEvent::Message(json!({ "id": 3 }))]);
}

#[tokio::test]
async fn invalid_utf8_line_is_skipped() {
    let mut input = vec![0xff, 0xfe, b'\n'];
    input.extend_from_slice(b"{\"id\":4}\n");
    let (_, events) = read_all(input).await;
    assert_eq!(events, vec![AgentEvent::Message(json!({ "id": 4 }))]);
}

#[tokio::test]
async fn dropped_receiver_detaches_reader() {
    let (tx, rx) = mpsc::channel(1);
    drop(rx);
    let outcome = run_reader("test", b"{\"id\":1}\n".as_slice(), &tx)
        .await
        .expect("reader");
    assert_eq!(outcome, ReadOutcome::Detached);
}

// ── writer ──────────────────────────────────────────────────────────────────

#[test]
fn encode_line_is_compact_and_newline_terminated() {
    let bytes = encode_line(&json!({ "method": "initialize", "id": 1 })).expect("encode");
    let text = String::from_utf8(bytes).expect("utf8");
    assert!(text.ends_with('\n'));
    assert_eq!(text.matches('\n').count(), 1);
}

#[tokio::test]
async fn writer_preserves_send_order() {
    let (client, mut server) = tokio::io::duplex(4096);
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let writer = tokio::spawn(run_writer("test", client, rx, cancel));

    tx.send(json!({ "id": 1 })).expect("send");
    tx.send(json!({ "id": 2 })).expect("send");
    drop(tx);
    writer.await.expect("join").expect("writer");

    let mut out = Vec::new();
    server.read_to_end(&mut out).await.expect("read");
    assert_eq!(String::from_utf8(out).expect("utf8"), "{\"id\":1}\n{\"id\":2}\n");
}
