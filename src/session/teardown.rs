//! Once-only session teardown.
//!
//! Four conditions end a session: the agent exits, the agent's stdio fails,
//! the turn finalizes, or the client disconnects. They can fire concurrently;
//! the [`Teardown`] latch lets exactly one of them run the side effects.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::agent::AgentProcess;
use crate::protocol::ExternalEvent;
use crate::session::{ClientSink, ConnectionRegistry, PendingRequestTable};

/// Why a session ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCondition {
    /// The agent process exited.
    Exit {
        /// Exit code, if any.
        code: Option<i32>,
        /// Terminating signal name, if any.
        signal: Option<String>,
    },
    /// The agent failed with a fatal error.
    Error(String),
    /// The turn reached a terminal status and its outcome was forwarded.
    TurnFinished,
    /// The client went away.
    Disconnected,
}

impl TerminalCondition {
    fn label(&self) -> &'static str {
        match self {
            Self::Exit { .. } => "process_exit",
            Self::Error(_) => "process_error",
            Self::TurnFinished => "turn_finished",
            Self::Disconnected => "client_disconnect",
        }
    }
}

#[derive(Debug)]
struct State {
    connection_id: String,
    agent: AgentProcess,
    sink: ClientSink,
    registry: ConnectionRegistry,
    pending: PendingRequestTable,
    torn_down: AtomicBool,
    turn_finalized: AtomicBool,
}

/// Shared teardown latch for one session. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Teardown {
    state: Arc<State>,
}

impl Teardown {
    /// Create the latch for a session.
    #[must_use]
    pub fn new(
        connection_id: &str,
        agent: AgentProcess,
        sink: ClientSink,
        registry: ConnectionRegistry,
        pending: PendingRequestTable,
    ) -> Self {
        Self {
            state: Arc::new(State {
                connection_id: connection_id.to_owned(),
                agent,
                sink,
                registry,
                pending,
                torn_down: AtomicBool::new(false),
                turn_finalized: AtomicBool::new(false),
            }),
        }
    }

    /// Mark the turn finalized. Returns `true` only for the first caller.
    pub fn finalize_turn(&self) -> bool {
        !self.state.turn_finalized.swap(true, Ordering::SeqCst)
    }

    /// Whether the turn has been finalized.
    #[must_use]
    pub fn is_turn_finalized(&self) -> bool {
        self.state.turn_finalized.load(Ordering::SeqCst)
    }

    /// Whether teardown already ran.
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.state.torn_down.load(Ordering::SeqCst)
    }

    /// Report `condition` to the client and release the session: stop the
    /// agent, close the sink, drop the heartbeat, deregister, and forget any
    /// request still pending for it.
    ///
    /// Runs at most once; later calls return `false` and do nothing. A
    /// process exit after a finalized turn is not reported, the client
    /// already has the outcome.
    pub async fn run(&self, condition: TerminalCondition) -> bool {
        let state = &self.state;
        let connection_id = state.connection_id.as_str();
        if state.torn_down.swap(true, Ordering::SeqCst) {
            debug!(connection_id, reason = condition.label(), "teardown already ran");
            return false;
        }

        match &condition {
            TerminalCondition::Exit { code, signal } if !self.is_turn_finalized() => {
                state
                    .sink
                    .send(ExternalEvent::process_exit(*code, signal.as_deref()));
            }
            TerminalCondition::Error(cause) => state.sink.send(ExternalEvent::error(cause.clone())),
            _ => {}
        }

        state.agent.stop();
        state.sink.close();
        state.registry.remove_connection(connection_id).await;
        state.pending.remove_for_connection(connection_id).await;

        info!(connection_id, reason = condition.label(), "session closed");
        true
    }
}
