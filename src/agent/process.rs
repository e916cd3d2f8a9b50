//! Agent process spawner and adapter handle.
//!
//! Spawns the agent binary with:
//! - a fixed argument set that selects the JSON-RPC app server and a
//!   conservative (`untrusted`) default approval policy,
//! - `env_clear()` plus an allowlist, so server-side secrets do not leak into
//!   the child unless explicitly passed through,
//! - `kill_on_drop(true)` so an abandoned child never outlives its handle.
//!
//! One supervisor task owns the [`Child`]: it pumps stdout through the reader,
//! applies stop requests, and emits [`AgentEvent::Exit`] exactly once after
//! stdout is drained, so no message is lost behind the exit notification.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::reader::{run_reader, ReadOutcome};
use crate::agent::writer::run_writer;
use crate::agent::AgentEvent;
use crate::config::AgentConfig;
use crate::{AppError, Result};

/// Arguments every agent launch starts with.
pub const AGENT_ARGS: &[&str] = &["app-server", "-c", "approval_policy=\"untrusted\""];

/// Environment variables inherited by the spawned agent process.
///
/// Everything else is stripped via `env_clear()`; add names through
/// `agent.env_passthrough` in the config.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "RUST_LOG",
    "OPENAI_API_KEY",
    "CODEX_HOME",
    "TMPDIR",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "APPDATA",
    "LOCALAPPDATA",
];

/// Capacity of the agent → session event channel.
const EVENT_BUFFER: usize = 256;

/// How long a stopped agent gets to exit before it is force-killed.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Configuration for spawning one agent process.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Agent binary.
    pub program: String,
    /// Full argument list.
    pub args: Vec<String>,
    /// Working directory for the child.
    pub working_dir: Option<PathBuf>,
    /// Extra environment variable names inherited from the server.
    pub env_passthrough: Vec<String>,
}

impl SpawnConfig {
    /// Build a spawn configuration: [`AGENT_ARGS`] followed by `extra_args`.
    #[must_use]
    pub fn from_agent_config(config: &AgentConfig) -> Self {
        let args = AGENT_ARGS
            .iter()
            .map(|arg| (*arg).to_owned())
            .chain(config.extra_args.iter().cloned())
            .collect();
        Self {
            program: config.program.clone(),
            args,
            working_dir: config.working_dir.clone(),
            env_passthrough: config.env_passthrough.clone(),
        }
    }
}

#[derive(Debug)]
struct Shared {
    connection_id: String,
    outbound: mpsc::UnboundedSender<Value>,
    running: AtomicBool,
    stop: CancellationToken,
}

/// Handle to one agent process.
///
/// Cheap to clone; every clone addresses the same child. The session that
/// created it is its only owner, other holders only send through it.
#[derive(Debug, Clone)]
pub struct AgentProcess {
    inner: Arc<Shared>,
}

impl AgentProcess {
    /// Spawn the agent and start its stdio pumps.
    ///
    /// Returns the handle plus the receiver of the agent's [`AgentEvent`]s.
    /// `env` is applied on top of the inherited allowlist.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Spawn`] if the binary cannot be launched or its
    /// stdin/stdout cannot be attached.
    pub fn start(
        config: &SpawnConfig,
        connection_id: &str,
        env: &[(String, String)],
    ) -> Result<(Self, mpsc::Receiver<AgentEvent>)> {
        let mut cmd = Command::new(&config.program);
        cmd.args(&config.args);

        cmd.env_clear();
        let inherited = ALLOWED_ENV_VARS
            .iter()
            .copied()
            .chain(config.env_passthrough.iter().map(String::as_str));
        for key in inherited {
            if let Ok(val) = std::env::var(key) {
                cmd.env(key, val);
            }
        }
        for (key, val) in env {
            cmd.env(key, val);
        }

        if let Some(dir) = &config.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|err| {
            AppError::Spawn(format!("failed to spawn agent `{}`: {err}", config.program))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::Spawn("failed to capture agent stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Spawn("failed to capture agent stdout".into()))?;

        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();

        let shared = Arc::new(Shared {
            connection_id: connection_id.to_owned(),
            outbound: outbound_tx,
            running: AtomicBool::new(true),
            stop: stop.clone(),
        });

        info!(
            connection_id,
            pid = child.id(),
            program = %config.program,
            "agent process started"
        );

        let writer_id = connection_id.to_owned();
        tokio::spawn(async move {
            if let Err(err) = run_writer(&writer_id, stdin, outbound_rx, stop).await {
                warn!(connection_id = %writer_id, %err, "agent writer stopped with error");
            }
        });

        tokio::spawn(supervise(Arc::clone(&shared), child, stdout, event_tx));

        Ok((Self { inner: shared }, event_rx))
    }

    /// Build a handle with no process behind it.
    ///
    /// Messages passed to [`send`](Self::send) are delivered to the returned
    /// receiver instead of a child's stdin. Used to wire sessions in memory.
    #[must_use]
    pub fn detached(connection_id: &str) -> (Self, mpsc::UnboundedReceiver<Value>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            connection_id: connection_id.to_owned(),
            outbound: outbound_tx,
            running: AtomicBool::new(true),
            stop: CancellationToken::new(),
        });
        (Self { inner: shared }, outbound_rx)
    }

    /// Connection this agent serves.
    #[must_use]
    pub fn connection_id(&self) -> &str {
        &self.inner.connection_id
    }

    /// Queue `message` for the agent's stdin as one JSON line.
    ///
    /// Never waits on the pipe.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotRunning`] after [`stop`](Self::stop) or once
    /// the process has exited.
    pub fn send(&self, message: Value) -> Result<()> {
        let connection_id = self.connection_id();
        if !self.is_running() {
            return Err(AppError::NotRunning(format!(
                "agent for connection '{connection_id}' is not running"
            )));
        }

        let method = message
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_owned();
        self.inner.outbound.send(message).map_err(|_| {
            AppError::NotRunning(format!(
                "agent stdin closed for connection '{connection_id}'"
            ))
        })?;
        debug!(connection_id, method, "agent message queued");
        Ok(())
    }

    /// Request termination. Idempotent.
    pub fn stop(&self) {
        if self.inner.running.swap(false, Ordering::SeqCst) {
            debug!(connection_id = self.connection_id(), "agent stop requested");
        }
        self.inner.stop.cancel();
    }

    /// Whether the adapter still accepts messages.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }
}

/// Own the child for its whole life: pump stdout, honour stop requests, and
/// report the exit once stdout is drained.
async fn supervise(
    shared: Arc<Shared>,
    mut child: Child,
    stdout: ChildStdout,
    event_tx: mpsc::Sender<AgentEvent>,
) {
    let connection_id = shared.connection_id.as_str();
    let mut stop_requested = false;
    let mut killed = false;

    let kill_timer = tokio::time::sleep(Duration::from_secs(86_400));
    tokio::pin!(kill_timer);

    let read = run_reader(connection_id, stdout, &event_tx);
    tokio::pin!(read);

    let outcome = loop {
        tokio::select! {
            outcome = &mut read => break outcome,

            () = shared.stop.cancelled(), if !stop_requested => {
                stop_requested = true;
                request_termination(&mut child, connection_id);
                kill_timer.as_mut().reset(Instant::now() + KILL_GRACE);
            }

            () = &mut kill_timer, if stop_requested && !killed => {
                killed = true;
                warn!(connection_id, "agent ignored termination request, killing");
                if let Err(err) = child.start_kill() {
                    debug!(connection_id, %err, "kill after grace period failed");
                }
            }
        }
    };

    match outcome {
        Ok(ReadOutcome::Eof) => {}
        Ok(ReadOutcome::Detached) => {
            debug!(connection_id, "no event listener left, killing agent");
            kill_child(&mut child, connection_id);
        }
        Err(err) => {
            warn!(connection_id, %err, "fatal agent stdout error");
            if event_tx.send(AgentEvent::Error(err.to_string())).await.is_err() {
                debug!(connection_id, "event channel closed before error could be delivered");
            }
            kill_child(&mut child, connection_id);
        }
    }

    shared.running.store(false, Ordering::SeqCst);

    let (code, signal) = match child.wait().await {
        Ok(status) => (status.code(), signal_name(status)),
        Err(err) => {
            warn!(connection_id, %err, "error waiting for agent process");
            (None, None)
        }
    };

    info!(connection_id, ?code, ?signal, "agent process exited");

    if event_tx
        .send(AgentEvent::Exit { code, signal })
        .await
        .is_err()
    {
        debug!(connection_id, "event channel closed before exit could be delivered");
    }

    // Releases the writer task and its stdin handle.
    shared.stop.cancel();
}

fn kill_child(child: &mut Child, connection_id: &str) {
    if let Err(err) = child.start_kill() {
        debug!(connection_id, %err, "agent already exited");
    }
}

#[cfg(unix)]
fn request_termination(child: &mut Child, connection_id: &str) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
        match kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) => return,
            Err(err) => debug!(connection_id, %err, "SIGTERM failed, falling back to kill"),
        }
    }

    kill_child(child, connection_id);
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child, connection_id: &str) {
    kill_child(child, connection_id);
}

#[cfg(unix)]
fn signal_name(status: ExitStatus) -> Option<String> {
    use std::os::unix::process::ExitStatusExt;

    let raw = status.signal()?;
    Some(
        nix::sys::signal::Signal::try_from(raw)
            .map_or_else(|_| raw.to_string(), |sig| sig.as_str().to_owned()),
    )
}

#[cfg(not(unix))]
fn signal_name(_status: ExitStatus) -> Option<String> {
    None
}
