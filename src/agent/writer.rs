//! Agent stdin pump.
//!
//! Receives outbound JSON messages from an unbounded channel, serialises each
//! to a single compact line terminated by `\n`, and writes it to the agent's
//! stdin. Senders never wait on the pipe: a message is queued and written in
//! the order it was sent.

use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{AppError, Result};

/// Serialise `value` as one NDJSON line.
///
/// # Errors
///
/// Returns [`AppError::ProcessIo`] if serialisation fails.
pub fn encode_line(value: &Value) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(value)
        .map_err(|e| AppError::ProcessIo(format!("failed to serialise outbound message: {e}")))?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Drain `msg_rx` into `stdin` until the channel closes or `cancel` fires.
///
/// Messages still queued when `cancel` fires are dropped; the agent is being
/// stopped and will not read them.
///
/// # Errors
///
/// Returns [`AppError::Io`] if a write to `stdin` fails (typically because
/// the agent exited).
pub async fn run_writer<W>(
    connection_id: &str,
    mut stdin: W,
    mut msg_rx: mpsc::UnboundedReceiver<Value>,
    cancel: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(connection_id, "agent writer: cancellation received, stopping");
                break;
            }

            msg = msg_rx.recv() => {
                let Some(value) = msg else {
                    debug!(connection_id, "agent writer: message channel closed, stopping");
                    break;
                };

                let bytes = encode_line(&value)?;
                let written = async {
                    stdin.write_all(&bytes).await?;
                    stdin.flush().await
                };
                written.await.map_err(|e| {
                    warn!(connection_id, error = %e, "agent writer: write to stdin failed");
                    AppError::Io(format!("write failed: {e}"))
                })?;
            }
        }
    }

    Ok(())
}
