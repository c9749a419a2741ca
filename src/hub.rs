// Presence Hub
//
// This module is the single owner of "state changed, therefore everyone must
// be told". It applies incoming events to the registry and hands the
// resulting snapshot to the dispatcher without ever waiting on a delivery.

use std::sync::Arc;

use crate::dispatch::BroadcastDispatcher;
use crate::protocol::ServerFrame;
use crate::registry::ParticipantRegistry;

/// Presence hub
pub struct PresenceHub {
    registry: Arc<ParticipantRegistry>,
    dispatcher: Arc<BroadcastDispatcher>,
}

impl PresenceHub {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(ParticipantRegistry::new()),
            dispatcher: Arc::new(BroadcastDispatcher::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ParticipantRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<BroadcastDispatcher> {
        &self.dispatcher
    }

    /// Membership changed: a connection finished registering. Membership is
    /// observable state, so the broadcast is unconditional.
    pub async fn participant_joined(&self, id: &str) {
        tracing::debug!("participant {} joined", id);
        self.broadcast_snapshot().await;
    }

    /// A location report from `id`. Broadcasts only if the participant is
    /// still registered; a report that lost the disconnect race is ignored.
    pub async fn location_updated(&self, id: &str, lat: f64, lng: f64) -> bool {
        if !self.registry.update_position(id, lat, lng).await {
            tracing::debug!("participant {}: stale location report, ignoring", id);
            return false;
        }
        self.broadcast_snapshot().await;
        true
    }

    /// Membership changed: a connection is gone. Removal is idempotent, the
    /// broadcast unconditional.
    pub async fn participant_left(&self, id: &str) {
        self.registry.remove(id).await;
        tracing::debug!("participant {} left", id);
        self.broadcast_snapshot().await;
    }

    async fn broadcast_snapshot(&self) {
        let snapshot = self.registry.snapshot().await;
        let frame = ServerFrame::users(&snapshot);
        self.dispatcher.broadcast(snapshot.version, &frame).await;
    }
}

impl Default for PresenceHub {
    fn default() -> Self {
        Self::new()
    }
}
