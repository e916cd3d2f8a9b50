//! Per-connection session state and the process-wide tables that hold it.

pub mod heartbeat;
pub mod pending;
pub mod registry;
pub mod sink;
pub mod teardown;

pub use pending::{PendingKind, PendingRequest, PendingRequestTable};
pub use registry::ConnectionRegistry;
pub use sink::{ClientFrame, ClientSink, ClientStream};
pub use teardown::{TerminalCondition, Teardown};

use tokio::task::AbortHandle;

use crate::agent::AgentProcess;

/// State bridging one client stream to one agent process.
#[derive(Debug, Clone)]
pub struct Session {
    /// Connection identifier, unique among live sessions.
    pub connection_id: String,
    /// The session's agent. Stopped when the session is torn down.
    pub agent: AgentProcess,
    /// Send/close capability toward the client.
    pub sink: ClientSink,
    /// Thread id, set once the agent confirms a thread.
    pub thread_id: Option<String>,
    /// Keep-alive task, aborted when the session is removed.
    pub heartbeat: Option<AbortHandle>,
}

impl Session {
    /// Create a session with no thread and no heartbeat yet.
    #[must_use]
    pub fn new(connection_id: &str, agent: AgentProcess, sink: ClientSink) -> Self {
        Self {
            connection_id: connection_id.to_owned(),
            agent,
            sink,
            thread_id: None,
            heartbeat: None,
        }
    }
}
