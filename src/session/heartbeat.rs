//! Fixed-interval keep-alive for one client stream.

use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::session::sink::ClientSink;

/// Spawn a task that pings `sink` every `interval` until the sink closes.
///
/// The returned handle cancels the task; the registry aborts it when the
/// session is removed.
#[must_use]
pub fn spawn_heartbeat(connection_id: &str, sink: ClientSink, interval: Duration) -> AbortHandle {
    let connection_id = connection_id.to_owned();
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = sink.closed() => break,
                _ = ticker.tick() => sink.ping(),
            }
        }
        debug!(connection_id, "heartbeat stopped");
    });
    task.abort_handle()
}
