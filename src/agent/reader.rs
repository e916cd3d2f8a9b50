//! Agent stdout pump.
//!
//! Reads bytes from the agent's stdout, frames them into lines with
//! [`AgentCodec`], parses each non-empty line as JSON, and forwards the result
//! as [`AgentEvent::Message`].
//!
//! A line that is not valid JSON, or exceeds the codec's length limit, is
//! logged and dropped; it never ends the session. Only an I/O error on the
//! pipe itself is fatal.

use bytes::BytesMut;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_util::codec::Decoder;
use tracing::{debug, warn};

use crate::agent::codec::AgentCodec;
use crate::agent::AgentEvent;
use crate::{AppError, Result};

const READ_CHUNK: usize = 8 * 1024;

/// Parse a single stdout line into a JSON message.
///
/// - `Ok(Some(value))`: the line holds a JSON object.
/// - `Ok(None)`: the line is empty or whitespace.
///
/// # Errors
///
/// Returns [`AppError::ProcessIo`] if the line is not JSON, or is JSON but
/// not an object.
pub fn parse_line(line: &str) -> Result<Option<Value>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| AppError::ProcessIo(format!("malformed json: {e}")))?;

    if !value.is_object() {
        return Err(AppError::ProcessIo(
            "expected a JSON object per line".into(),
        ));
    }

    Ok(Some(value))
}

/// Why the stdout pump stopped.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The agent closed its stdout.
    Eof,
    /// The event receiver was dropped; nobody is listening any more.
    Detached,
}

/// Pump `stdout` until EOF, forwarding every parsed message to `event_tx`.
///
/// # Errors
///
/// Returns [`AppError::Io`] when reading from the pipe fails. Malformed lines
/// are not errors; they are logged and skipped.
pub async fn run_reader<R>(
    connection_id: &str,
    mut stdout: R,
    event_tx: &mpsc::Sender<AgentEvent>,
) -> Result<ReadOutcome>
where
    R: AsyncRead + Unpin,
{
    let mut codec = AgentCodec::new();
    let mut buf = BytesMut::with_capacity(READ_CHUNK);

    loop {
        while let Some(line) = next_line(connection_id, &mut codec, &mut buf, false)? {
            if !forward(connection_id, &line, event_tx).await {
                return Ok(ReadOutcome::Detached);
            }
        }

        let n = stdout
            .read_buf(&mut buf)
            .await
            .map_err(|e| AppError::Io(format!("agent stdout read failed: {e}")))?;

        if n == 0 {
            while let Some(line) = next_line(connection_id, &mut codec, &mut buf, true)? {
                if !forward(connection_id, &line, event_tx).await {
                    return Ok(ReadOutcome::Detached);
                }
            }
            debug!(connection_id, "agent reader: EOF");
            return Ok(ReadOutcome::Eof);
        }
    }
}

/// Pull the next complete line out of `buf`, skipping oversized lines.
fn next_line(
    connection_id: &str,
    codec: &mut AgentCodec,
    buf: &mut BytesMut,
    eof: bool,
) -> Result<Option<String>> {
    loop {
        let decoded = if eof {
            codec.decode_eof(buf)
        } else {
            codec.decode(buf)
        };
        match decoded {
            Ok(line) => return Ok(line),
            Err(AppError::ProcessIo(msg)) => {
                warn!(connection_id, error = %msg, "agent reader: framing error, skipping line");
            }
            Err(e) => return Err(e),
        }
    }
}

/// Parse and forward one line. Returns `false` when the receiver is gone.
async fn forward(connection_id: &str, line: &str, event_tx: &mpsc::Sender<AgentEvent>) -> bool {
    match parse_line(line) {
        Ok(Some(message)) => {
            if event_tx.send(AgentEvent::Message(message)).await.is_err() {
                debug!(connection_id, "agent reader: event channel closed");
                return false;
            }
        }
        Ok(None) => {}
        Err(e) => {
            warn!(connection_id, error = %e, raw_line = %line, "agent reader: dropping unparseable line");
        }
    }
    true
}
