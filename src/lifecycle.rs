//! Turn lifecycle controller.
//!
//! Consumes every message from one session's agent, drives the
//! `initialize` → `thread/start` → `turn/start` handshake, forwards
//! translated events to the client, and finalizes the session when the turn
//! reaches a terminal status.
//!
//! ```text
//! InitSent ──init response──▶ ThreadRequested ──thread id──▶ ThreadReady
//!                                   │                           │ prompt queued
//!                                   └──── pending alert ───▶ TurnRunning
//!                     any state ──terminal status──▶ Finalized
//! ```

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::agent::AgentProcess;
use crate::config::ThreadConfig;
use crate::protocol::messages::{
    event_type, is_terminal_status, notification_turn_status, numeric_id, result_of,
    result_thread_id, result_turn_status, thread_start_request, turn_start_request,
    INIT_REQUEST_ID, THREAD_START_REQUEST_ID,
};
use crate::protocol::prompt::{
    compose_alert_prompt, initial_user_input, is_alert_payload, requested_model, resolve_payload,
};
use crate::protocol::translate;
use crate::session::{
    ClientSink, ConnectionRegistry, PendingKind, PendingRequestTable, Session, TerminalCondition,
    Teardown,
};

/// Delay between forwarding the final event and closing the session, so the
/// transport can flush it.
pub const FINALIZE_GRACE: Duration = Duration::from_millis(100);

/// Agent event types that end the turn as `failed`.
const ABORT_EVENT_TYPES: &[&str] = &["turn_aborted", "stream_error", "error"];

/// Handshake and turn progress of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// `initialize` sent, waiting for its response.
    InitSent,
    /// `thread/start` sent, waiting for a thread id.
    ThreadRequested,
    /// Thread exists, no turn started.
    ThreadReady,
    /// `turn/start` sent.
    TurnRunning,
    /// Terminal status seen; nothing more is forwarded.
    Finalized,
}

/// The prompt a stream was opened with.
#[derive(Debug, Clone, PartialEq)]
pub enum InitialPrompt {
    /// No prompt; the session waits for control-channel input.
    None,
    /// Free-text user input.
    Text {
        /// Prompt text.
        text: String,
        /// Model named by the payload.
        model: Option<String>,
    },
    /// Monitoring alert, turned into an investigation instruction once the
    /// thread exists.
    Alert(Value),
}

impl InitialPrompt {
    /// Resolve the prompt from a stream-open request body.
    #[must_use]
    pub fn from_body(body: &Value) -> Self {
        let payload = resolve_payload(body);
        if is_alert_payload(payload) {
            return Self::Alert(payload.clone());
        }
        match initial_user_input(payload) {
            Some(text) => Self::Text {
                text,
                model: requested_model(payload).map(str::to_owned),
            },
            None => Self::None,
        }
    }

    fn model(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::Text { model, .. } => model.as_deref(),
            Self::Alert(payload) => requested_model(payload),
        }
    }
}

/// Per-session state machine over agent messages.
#[derive(Debug)]
pub struct TurnController {
    connection_id: String,
    agent: AgentProcess,
    sink: ClientSink,
    registry: ConnectionRegistry,
    pending: PendingRequestTable,
    teardown: Teardown,
    thread_defaults: ThreadConfig,
    prompt: InitialPrompt,
    state: TurnState,
    // One-shot handshake steps, tracked apart from `state`, which the
    // pending-alert path also advances.
    thread_requested: bool,
    awaiting_primary_thread: bool,
}

impl TurnController {
    /// Build the controller for `session`. The caller sends `initialize`.
    #[must_use]
    pub fn new(
        session: &Session,
        registry: ConnectionRegistry,
        pending: PendingRequestTable,
        teardown: Teardown,
        thread_defaults: ThreadConfig,
        prompt: InitialPrompt,
    ) -> Self {
        Self {
            connection_id: session.connection_id.clone(),
            agent: session.agent.clone(),
            sink: session.sink.clone(),
            registry,
            pending,
            teardown,
            thread_defaults,
            prompt,
            state: TurnState::InitSent,
            thread_requested: false,
            awaiting_primary_thread: false,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Handle one agent message.
    pub async fn handle_message(&mut self, message: Value) {
        if self.state == TurnState::Finalized || self.teardown.is_turn_finalized() {
            debug!(connection_id = %self.connection_id, "turn finalized, message ignored");
            return;
        }

        self.handle_pending_alert(&message).await;

        if numeric_id(&message) == Some(INIT_REQUEST_ID)
            && result_of(&message).is_some()
            && !self.thread_requested
        {
            self.request_thread().await;
        }

        if numeric_id(&message) == Some(THREAD_START_REQUEST_ID) && self.awaiting_primary_thread {
            if let Some(thread_id) = result_thread_id(&message) {
                self.awaiting_primary_thread = false;
                self.thread_ready(thread_id).await;
            }
        }

        if let Some((status, source)) = terminal_trigger(&message) {
            self.finalize(&message, &status, &source);
            return;
        }

        for event in translate(&message) {
            self.sink.send(event);
        }
    }

    /// Start the deferred turn if `message` answers a pending alert request.
    async fn handle_pending_alert(&mut self, message: &Value) {
        let Some(id) = numeric_id(message) else {
            return;
        };
        let Some(request) = self.pending.get_pending_request(id).await else {
            return;
        };

        if message.get("error").is_some_and(|e| !e.is_null()) {
            self.pending.remove_pending_request(id).await;
            warn!(
                connection_id = %self.connection_id,
                request_id = id,
                error = %message["error"],
                "alert thread/start failed, pending request dropped"
            );
            return;
        }

        let Some(thread_id) = result_thread_id(message) else {
            return;
        };
        // Removal first: a duplicated response must not start a second turn.
        if self.pending.remove_pending_request(id).await.is_none() {
            return;
        }

        match request.kind {
            PendingKind::InitAlert => {
                self.registry.set_thread_id(&self.connection_id, thread_id).await;
                let prompt = compose_alert_prompt(&request.payload);
                let turn_id = self.pending.next_request_id();
                let model = requested_model(&request.payload);
                info!(
                    connection_id = %self.connection_id,
                    request_id = id,
                    thread_id,
                    "thread created for alert, starting turn"
                );
                self.send(turn_start_request(turn_id, thread_id, &prompt, model));
                self.state = TurnState::TurnRunning;
            }
        }
    }

    async fn request_thread(&mut self) {
        let id = match &self.prompt {
            InitialPrompt::Alert(payload) => {
                self.pending
                    .add_pending_request(
                        &self.connection_id,
                        PendingKind::InitAlert,
                        payload.clone(),
                    )
                    .await
            }
            _ => {
                self.awaiting_primary_thread = true;
                THREAD_START_REQUEST_ID
            }
        };
        self.thread_requested = true;
        debug!(connection_id = %self.connection_id, request_id = id, "initialized, starting thread");
        let request = thread_start_request(id, &self.thread_defaults, self.prompt.model());
        self.send(request);
        if self.state == TurnState::InitSent {
            self.state = TurnState::ThreadRequested;
        }
    }

    async fn thread_ready(&mut self, thread_id: &str) {
        self.registry.set_thread_id(&self.connection_id, thread_id).await;
        if self.state == TurnState::ThreadRequested {
            self.state = TurnState::ThreadReady;
        }
        debug!(connection_id = %self.connection_id, thread_id, "thread ready");

        if let InitialPrompt::Text { text, model } = &self.prompt {
            let id = self.pending.next_request_id();
            let request = turn_start_request(id, thread_id, text, model.as_deref());
            self.send(request);
            self.state = TurnState::TurnRunning;
        }
    }

    fn finalize(&mut self, message: &Value, status: &str, source: &str) {
        if !self.teardown.finalize_turn() {
            return;
        }
        self.state = TurnState::Finalized;
        info!(
            connection_id = %self.connection_id,
            turn_status = status,
            source,
            "turn finished, closing connection"
        );

        for event in translate(message) {
            self.sink.send(event);
        }

        let teardown = self.teardown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(FINALIZE_GRACE).await;
            teardown.run(TerminalCondition::TurnFinished).await;
        });
    }

    fn send(&self, message: Value) {
        if let Err(err) = self.agent.send(message) {
            warn!(connection_id = %self.connection_id, %err, "failed to send to agent");
        }
    }
}

/// Terminal turn status carried by `message`, with where it was found.
fn terminal_trigger(message: &Value) -> Option<(String, String)> {
    if let Some(status) = result_turn_status(message).filter(|s| is_terminal_status(s)) {
        return Some((status.to_owned(), "rpc_result".to_owned()));
    }
    if let Some(status) = notification_turn_status(message).filter(|s| is_terminal_status(s)) {
        return Some((status.to_owned(), "notification".to_owned()));
    }
    event_type(message)
        .filter(|kind| ABORT_EVENT_TYPES.contains(kind))
        .map(|kind| ("failed".to_owned(), kind.to_owned()))
}
