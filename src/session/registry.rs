//! Connection registry: connection id → [`Session`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::session::Session;
use crate::{AppError, Result};

/// Live sessions keyed by connection id.
///
/// Cheap to clone; clones share the same table. Owned by the bridge rather
/// than a global so tests can build isolated instances.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::BadRequest`] if a live session already uses the
    /// same connection id.
    pub async fn add_connection(&self, session: Session) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&session.connection_id) {
            return Err(AppError::BadRequest(format!(
                "connection '{}' is already active",
                session.connection_id
            )));
        }
        debug!(connection_id = %session.connection_id, "session registered");
        sessions.insert(session.connection_id.clone(), session);
        Ok(())
    }

    /// Snapshot of a registered session.
    pub async fn get_connection(&self, connection_id: &str) -> Option<Session> {
        self.sessions.lock().await.get(connection_id).cloned()
    }

    /// Whether `connection_id` is registered.
    pub async fn has_connection(&self, connection_id: &str) -> bool {
        self.sessions.lock().await.contains_key(connection_id)
    }

    /// Remove a session, aborting its heartbeat first.
    ///
    /// Idempotent; returns the removed session if one was registered.
    pub async fn remove_connection(&self, connection_id: &str) -> Option<Session> {
        let mut sessions = self.sessions.lock().await;
        if let Some(heartbeat) = sessions.get_mut(connection_id).and_then(|s| s.heartbeat.take()) {
            heartbeat.abort();
        }
        let removed = sessions.remove(connection_id);
        if removed.is_some() {
            debug!(connection_id, "session removed");
        }
        removed
    }

    /// Record the agent's thread id on a session. No-op if unregistered.
    pub async fn set_thread_id(&self, connection_id: &str, thread_id: &str) {
        if let Some(session) = self.sessions.lock().await.get_mut(connection_id) {
            session.thread_id = Some(thread_id.to_owned());
        }
    }

    /// Attach a heartbeat handle to a session.
    ///
    /// If the session is no longer registered the heartbeat is aborted so it
    /// cannot outlive the session.
    pub async fn set_heartbeat(&self, connection_id: &str, heartbeat: AbortHandle) {
        match self.sessions.lock().await.get_mut(connection_id) {
            Some(session) => {
                if let Some(previous) = session.heartbeat.replace(heartbeat) {
                    previous.abort();
                }
            }
            None => heartbeat.abort(),
        }
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether no session is live.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}
