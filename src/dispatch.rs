// Broadcast Dispatcher
//
// This module fans presence snapshots out to every connected client. Each
// connection owns one outbound slot holding at most the newest undelivered
// payload: an unread snapshot is superseded, never queued behind a slow peer.

use std::collections::HashMap;

use tokio::sync::{watch, RwLock};
use tokio_tungstenite::tungstenite::Utf8Bytes;

use crate::protocol::ServerFrame;

/// Receiving side of one connection's outbound slot.
pub type SnapshotReceiver = watch::Receiver<Option<Utf8Bytes>>;

struct DispatchState {
    slots: HashMap<String, watch::Sender<Option<Utf8Bytes>>>,

    /// Version of the last snapshot handed out. Broadcasts carry the registry
    /// version they were computed at; anything at or below this is stale.
    last_version: u64,
}

/// Broadcast dispatcher
pub struct BroadcastDispatcher {
    state: RwLock<DispatchState>,
}

impl BroadcastDispatcher {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(DispatchState {
                slots: HashMap::new(),
                last_version: 0,
            }),
        }
    }

    /// Create the outbound slot for a connection.
    pub async fn attach(&self, id: &str) -> SnapshotReceiver {
        let (tx, rx) = watch::channel(None);
        let mut state = self.state.write().await;
        state.slots.insert(id.to_string(), tx);
        rx
    }

    /// Drop a connection's slot, releasing any undelivered payload.
    pub async fn detach(&self, id: &str) {
        let mut state = self.state.write().await;
        state.slots.remove(id);
    }

    /// Serialize the frame once and hand the identical bytes to every slot.
    ///
    /// `version` orders broadcasts: a snapshot computed before one that
    /// already went out is skipped, so no client can observe state moving
    /// backwards. Delivery into a dead slot is logged and skipped; tearing
    /// the connection down stays the lifecycle path's job.
    pub async fn broadcast(&self, version: u64, frame: &ServerFrame) {
        let payload = match serde_json::to_string(frame) {
            Ok(text) => Utf8Bytes::from(text),
            Err(err) => {
                tracing::error!("failed to serialize broadcast frame: {}", err);
                return;
            }
        };

        let mut state = self.state.write().await;
        if version <= state.last_version {
            tracing::debug!(
                "skipping superseded broadcast (version {} <= {})",
                version,
                state.last_version
            );
            return;
        }
        state.last_version = version;

        for (id, slot) in &state.slots {
            if slot.send(Some(payload.clone())).is_err() {
                tracing::debug!("participant {}: outbound slot closed, skipping delivery", id);
            }
        }
    }
}

impl Default for BroadcastDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: &str) -> ServerFrame {
        ServerFrame::YourId { id: id.to_string() }
    }

    async fn take_payload(rx: &mut SnapshotReceiver) -> String {
        rx.changed().await.unwrap();
        rx.borrow_and_update().clone().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_slot() {
        let dispatcher = BroadcastDispatcher::new();
        let mut rx_a = dispatcher.attach("a").await;
        let mut rx_b = dispatcher.attach("b").await;

        dispatcher.broadcast(1, &frame("hello")).await;

        let payload_a = take_payload(&mut rx_a).await;
        let payload_b = take_payload(&mut rx_b).await;
        assert_eq!(payload_a, payload_b);
        assert!(payload_a.contains("hello"));
    }

    #[tokio::test]
    async fn test_dead_slot_does_not_affect_others() {
        let dispatcher = BroadcastDispatcher::new();
        let rx_a = dispatcher.attach("a").await;
        let mut rx_b = dispatcher.attach("b").await;

        drop(rx_a);
        dispatcher.broadcast(1, &frame("still-delivered")).await;

        let payload = take_payload(&mut rx_b).await;
        assert!(payload.contains("still-delivered"));
    }

    #[tokio::test]
    async fn test_superseded_version_is_skipped() {
        let dispatcher = BroadcastDispatcher::new();
        let mut rx = dispatcher.attach("a").await;

        dispatcher.broadcast(2, &frame("newer")).await;
        dispatcher.broadcast(1, &frame("older")).await;

        let payload = take_payload(&mut rx).await;
        assert!(payload.contains("newer"));
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_newest_payload_supersedes_unread() {
        let dispatcher = BroadcastDispatcher::new();
        let mut rx = dispatcher.attach("a").await;

        dispatcher.broadcast(1, &frame("first")).await;
        dispatcher.broadcast(2, &frame("second")).await;

        // Nothing was read between the two broadcasts; only the newest
        // payload is left in the slot.
        let payload = take_payload(&mut rx).await;
        assert!(payload.contains("second"));
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_detach_cancels_pending_delivery() {
        let dispatcher = BroadcastDispatcher::new();
        let mut rx = dispatcher.attach("a").await;

        dispatcher.detach("a").await;
        dispatcher.broadcast(1, &frame("too-late")).await;

        assert!(rx.changed().await.is_err());
    }
}
