//! Agent process adapter.
//!
//! Each client session owns exactly one agent child process speaking
//! newline-delimited JSON-RPC over stdio. The adapter turns the child's stdout
//! into a channel of [`AgentEvent`]s and accepts outbound JSON values for its
//! stdin.
//!
//! - `codec`: bounded line framing for the stdout byte stream.
//! - `reader`: stdout pump that parses lines into JSON messages.
//! - `writer`: stdin pump that serialises outbound messages as NDJSON.
//! - `process`: spawn, send, stop, and exit supervision.

pub mod codec;
pub mod process;
pub mod reader;
pub mod writer;

pub use process::{AgentProcess, SpawnConfig};

use serde_json::Value;

/// Events emitted by an agent adapter, in the order they happened.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// One parsed JSON message from the agent's stdout.
    Message(Value),
    /// Fatal I/O condition on the agent's stdio.
    Error(String),
    /// The agent process terminated. Emitted exactly once, always last.
    Exit {
        /// Exit code, absent when terminated by a signal.
        code: Option<i32>,
        /// Terminating signal name (e.g. `SIGTERM`), unix only.
        signal: Option<String>,
    },
}
