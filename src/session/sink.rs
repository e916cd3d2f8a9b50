//! Client send/close capability.
//!
//! A [`ClientSink`] is the write half handed to the session; the transport
//! (SSE body or WebSocket pump) owns the matching [`ClientStream`]. Frames are
//! queued on an unbounded channel so emitting never waits on the client.
//!
//! Closing the sink does not discard frames: the stream yields everything
//! queued before the close, then ends. Writes after close, or after the
//! transport went away, are skipped.

use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFuture};
use tracing::debug;

use crate::protocol::ExternalEvent;

/// One frame for the client transport.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    /// An external event.
    Event(ExternalEvent),
    /// Keep-alive with no payload.
    Ping,
}

/// Write half of a client connection. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ClientSink {
    tx: mpsc::UnboundedSender<ClientFrame>,
    closed: CancellationToken,
    disconnected: CancellationToken,
}

/// Read half of a client connection, owned by the transport.
///
/// Dropping it signals a client disconnect to the session.
#[derive(Debug)]
pub struct ClientStream {
    rx: mpsc::UnboundedReceiver<ClientFrame>,
    closed: CancellationToken,
    _disconnect_guard: DropGuard,
}

impl ClientSink {
    /// Create a connected sink/stream pair.
    #[must_use]
    pub fn channel() -> (Self, ClientStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = CancellationToken::new();
        let disconnected = CancellationToken::new();
        let sink = Self {
            tx,
            closed: closed.clone(),
            disconnected: disconnected.clone(),
        };
        let stream = ClientStream {
            rx,
            closed,
            _disconnect_guard: disconnected.drop_guard(),
        };
        (sink, stream)
    }

    /// Queue an event for the client.
    pub fn send(&self, event: ExternalEvent) {
        self.push(ClientFrame::Event(event));
    }

    /// Queue a keep-alive frame.
    pub fn ping(&self) {
        self.push(ClientFrame::Ping);
    }

    fn push(&self, frame: ClientFrame) {
        if self.closed.is_cancelled() {
            debug!(?frame, "client sink closed, frame skipped");
            return;
        }
        if self.tx.send(frame).is_err() {
            debug!("client transport gone, frame skipped");
        }
    }

    /// End the stream once queued frames are delivered. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Whether [`close`](Self::close) was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves when the sink is closed.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }

    /// Token cancelled when the transport drops its [`ClientStream`].
    #[must_use]
    pub fn disconnect_token(&self) -> CancellationToken {
        self.disconnected.clone()
    }
}

impl ClientStream {
    /// Next frame, or `None` once the sink is closed and drained.
    pub async fn next_frame(&mut self) -> Option<ClientFrame> {
        tokio::select! {
            biased;

            frame = self.rx.recv() => frame,
            () = self.closed.cancelled() => self.rx.try_recv().ok(),
        }
    }
}
