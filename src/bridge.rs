//! Session bridge: the composition root run once per client connection.
//!
//! Opening a stream spawns the agent, registers the session, starts the
//! heartbeat, acknowledges the connection, installs the
//! [`TurnController`] and sends `initialize`. One task per session then
//! feeds agent events to the controller and turns process exit, process
//! error and client disconnect into a single [`Teardown`].

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::agent::{AgentEvent, AgentProcess, SpawnConfig};
use crate::config::GlobalConfig;
use crate::lifecycle::{InitialPrompt, TurnController};
use crate::protocol::messages::{initialize_request, thread_start_request};
use crate::protocol::prompt::{is_alert_payload, requested_model};
use crate::protocol::ExternalEvent;
use crate::session::heartbeat::spawn_heartbeat;
use crate::session::{
    ClientSink, ClientStream, ConnectionRegistry, PendingKind, PendingRequestTable, Session,
    TerminalCondition, Teardown,
};
use crate::{AppError, Result};

/// Field carrying the connection id in request bodies.
pub const CONNECTION_ID_FIELD: &str = "connectionId";

/// A client's request to open a streaming session.
#[derive(Debug, Clone, Default)]
pub struct StreamRequest {
    /// Caller-chosen connection id; taken from the body or generated when
    /// absent.
    pub connection_id: Option<String>,
    /// Whether the client declared it accepts a streaming response.
    pub accepts_stream: bool,
    /// Request body: optional `payload` plus prompt fields.
    pub body: Value,
}

/// An opened session as seen by the transport.
#[derive(Debug)]
pub struct OpenedStream {
    /// Resolved connection id.
    pub connection_id: String,
    /// Frames to deliver to the client. Dropping it disconnects the session.
    pub stream: ClientStream,
}

/// Shared entry point for all transports. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SessionBridge {
    config: Arc<GlobalConfig>,
    spawn: Arc<SpawnConfig>,
    registry: ConnectionRegistry,
    pending: PendingRequestTable,
}

impl SessionBridge {
    /// Create a bridge with empty tables.
    #[must_use]
    pub fn new(config: GlobalConfig) -> Self {
        let spawn = SpawnConfig::from_agent_config(&config.agent);
        Self {
            config: Arc::new(config),
            spawn: Arc::new(spawn),
            registry: ConnectionRegistry::new(),
            pending: PendingRequestTable::new(),
        }
    }

    /// Live sessions.
    #[must_use]
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Deferred requests.
    #[must_use]
    pub fn pending(&self) -> &PendingRequestTable {
        &self.pending
    }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    /// Open a session for a new client stream.
    ///
    /// If the agent cannot be spawned the returned stream carries a single
    /// `error` event and then ends; no session is registered.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::BadRequest`] if the client does not accept a
    /// streaming response or the connection id is already live. Nothing is
    /// spawned in either case.
    pub async fn open_session(&self, request: StreamRequest) -> Result<OpenedStream> {
        if !request.accepts_stream {
            return Err(AppError::BadRequest(
                "client must accept text/event-stream".into(),
            ));
        }

        let connection_id = request
            .connection_id
            .filter(|id| !id.is_empty())
            .or_else(|| body_connection_id(&request.body).map(str::to_owned))
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        if self.registry.has_connection(&connection_id).await {
            return Err(AppError::BadRequest(format!(
                "connection '{connection_id}' is already active"
            )));
        }

        let (sink, stream) = ClientSink::channel();

        let (agent, events) = match AgentProcess::start(&self.spawn, &connection_id, &[]) {
            Ok(started) => started,
            Err(err) => {
                warn!(connection_id, %err, "agent spawn failed");
                sink.send(ExternalEvent::error(err.to_string()));
                sink.close();
                return Ok(OpenedStream {
                    connection_id,
                    stream,
                });
            }
        };

        let session = Session::new(&connection_id, agent.clone(), sink.clone());
        if let Err(err) = self.registry.add_connection(session.clone()).await {
            agent.stop();
            return Err(err);
        }

        let heartbeat = spawn_heartbeat(
            &connection_id,
            sink.clone(),
            self.config.heartbeat_interval(),
        );
        self.registry.set_heartbeat(&connection_id, heartbeat).await;

        sink.send(ExternalEvent::connection_ack(&connection_id));

        let teardown = Teardown::new(
            &connection_id,
            agent.clone(),
            sink.clone(),
            self.registry.clone(),
            self.pending.clone(),
        );
        let controller = TurnController::new(
            &session,
            self.registry.clone(),
            self.pending.clone(),
            teardown.clone(),
            self.config.thread.clone(),
            InitialPrompt::from_body(&request.body),
        );

        let span = info_span!("session", connection_id = %connection_id);
        tokio::spawn(
            run_session(controller, events, teardown, sink.disconnect_token()).instrument(span),
        );

        if let Err(err) = agent.send(initialize_request()) {
            warn!(connection_id, %err, "failed to send initialize");
        }
        info!(connection_id, "session opened");

        Ok(OpenedStream {
            connection_id,
            stream,
        })
    }

    /// Forward a control-channel body `{ connectionId, ...rest }`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::BadRequest`] if the body is not an object or has
    /// no `connectionId`, plus any error from [`forward_payload`](Self::forward_payload).
    pub async fn send_control(&self, body: Value) -> Result<()> {
        let Value::Object(mut fields) = body else {
            return Err(AppError::BadRequest("body must be a JSON object".into()));
        };
        let connection_id = match fields.remove(CONNECTION_ID_FIELD) {
            Some(Value::String(id)) if !id.is_empty() => id,
            _ => return Err(AppError::BadRequest("connectionId is required".into())),
        };
        self.forward_payload(&connection_id, Value::Object(fields))
            .await
    }

    /// Deliver `payload` to a session's agent.
    ///
    /// Alert-shaped payloads start a new thread whose response triggers a
    /// deferred `turn/start`; anything else is sent to the agent verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::UnknownConnection`] if no session is registered
    /// under `connection_id`, or [`AppError::NotRunning`] if its agent has
    /// stopped.
    pub async fn forward_payload(&self, connection_id: &str, payload: Value) -> Result<()> {
        let session = self
            .registry
            .get_connection(connection_id)
            .await
            .ok_or_else(|| {
                AppError::UnknownConnection(format!("no active session '{connection_id}'"))
            })?;

        if is_alert_payload(&payload) {
            let model = requested_model(&payload).map(str::to_owned);
            let id = self
                .pending
                .add_pending_request(connection_id, PendingKind::InitAlert, payload)
                .await;
            info!(connection_id, request_id = id, "alert received, starting thread");
            let sent = session.agent.send(thread_start_request(
                id,
                &self.config.thread,
                model.as_deref(),
            ));
            if sent.is_err() {
                self.pending.remove_pending_request(id).await;
            }
            return sent;
        }

        debug!(connection_id, "forwarding control payload to agent");
        session.agent.send(payload)
    }
}

fn body_connection_id(body: &Value) -> Option<&str> {
    body.get(CONNECTION_ID_FIELD)
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
}

/// Feed agent events to the controller until the session ends.
async fn run_session(
    mut controller: TurnController,
    mut events: mpsc::Receiver<AgentEvent>,
    teardown: Teardown,
    disconnected: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            () = disconnected.cancelled() => {
                teardown.run(TerminalCondition::Disconnected).await;
                break;
            }

            event = events.recv() => match event {
                Some(AgentEvent::Message(message)) => controller.handle_message(message).await,
                Some(AgentEvent::Error(cause)) => {
                    teardown.run(TerminalCondition::Error(cause)).await;
                }
                Some(AgentEvent::Exit { code, signal }) => {
                    teardown.run(TerminalCondition::Exit { code, signal }).await;
                    break;
                }
                None => {
                    teardown
                        .run(TerminalCondition::Error("agent event stream ended".into()))
                        .await;
                    break;
                }
            },
        }
    }
    debug!("session task finished");
}
