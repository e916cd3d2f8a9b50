//! Pending-request table and request-id allocation.
//!
//! A pending request records work deferred until the agent answers a
//! correlated request. The only kind today is [`PendingKind::InitAlert`]:
//! "start a turn with this alert once the thread exists".

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

/// Kind of deferred work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    /// Start a turn with the composed alert prompt once the thread exists.
    InitAlert,
}

impl PendingKind {
    /// Wire tag used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InitAlert => "init_alert",
        }
    }
}

/// One deferred request.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    /// Session the deferred work belongs to.
    pub connection_id: String,
    /// What to do when the correlated response arrives.
    pub kind: PendingKind,
    /// Client-submitted input the deferred work is built from.
    pub payload: Value,
}

/// Time-derived request ids: milliseconds since the epoch, bumped so every
/// id handed out is strictly greater than the previous one.
#[derive(Debug, Default)]
pub struct RequestIdAllocator {
    last: AtomicU64,
}

impl RequestIdAllocator {
    /// Create an allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id.
    pub fn next_id(&self) -> u64 {
        let now = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default();
        let mut last = self.last.load(Ordering::SeqCst);
        loop {
            let candidate = now.max(last + 1);
            match self
                .last
                .compare_exchange(last, candidate, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }
}

/// Process-wide table of deferred requests keyed by request id.
///
/// Cheap to clone; clones share the same table and id allocator.
#[derive(Debug, Clone, Default)]
pub struct PendingRequestTable {
    requests: Arc<Mutex<HashMap<u64, PendingRequest>>>,
    ids: Arc<RequestIdAllocator>,
}

impl PendingRequestTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh request id without recording anything.
    #[must_use]
    pub fn next_request_id(&self) -> u64 {
        self.ids.next_id()
    }

    /// Record deferred work for `connection_id` and return the id the
    /// correlated request must use.
    pub async fn add_pending_request(
        &self,
        connection_id: &str,
        kind: PendingKind,
        payload: Value,
    ) -> u64 {
        let mut requests = self.requests.lock().await;
        let mut id = self.ids.next_id();
        while requests.contains_key(&id) {
            id = self.ids.next_id();
        }
        requests.insert(
            id,
            PendingRequest {
                connection_id: connection_id.to_owned(),
                kind,
                payload,
            },
        );
        debug!(
            connection_id,
            request_id = id,
            kind = kind.as_str(),
            "pending request recorded"
        );
        id
    }

    /// Look up a pending request without consuming it.
    pub async fn get_pending_request(&self, id: u64) -> Option<PendingRequest> {
        self.requests.lock().await.get(&id).cloned()
    }

    /// Remove and return a pending request. `None` if it was already consumed.
    pub async fn remove_pending_request(&self, id: u64) -> Option<PendingRequest> {
        let removed = self.requests.lock().await.remove(&id);
        if removed.is_some() {
            debug!(request_id = id, "pending request consumed");
        }
        removed
    }

    /// Drop every request owned by `connection_id`. Returns how many were
    /// dropped.
    pub async fn remove_for_connection(&self, connection_id: &str) -> usize {
        let mut requests = self.requests.lock().await;
        let before = requests.len();
        requests.retain(|_, request| request.connection_id != connection_id);
        let dropped = before - requests.len();
        if dropped > 0 {
            debug!(connection_id, dropped, "pending requests dropped with session");
        }
        dropped
    }

    /// Number of requests still pending.
    pub async fn len(&self) -> usize {
        self.requests.lock().await.len()
    }

    /// Whether no request is pending.
    pub async fn is_empty(&self) -> bool {
        self.requests.lock().await.is_empty()
    }
}
