// Participant Registry
//
// This module owns the synchronized table of connected participants and their
// last reported positions. All shared state goes through this one boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

/// A single coordinate sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
}

/// One connected participant.
#[derive(Debug, Clone)]
pub struct Participant {
    /// Unique id, assigned at registration, never reused.
    pub id: String,

    /// Last reported position; absent until the first report arrives.
    pub position: Option<Position>,

    /// Registration timestamp, immutable for the connection's lifetime.
    pub connected_at: DateTime<Utc>,
}

/// Point-in-time copy of the whole table.
///
/// `version` totally orders snapshots: it is bumped under the table lock on
/// every mutation, so a higher version always reflects a strictly newer state.
#[derive(Debug, Clone)]
pub struct PresenceSnapshot {
    pub version: u64,
    pub participants: Vec<Participant>,
}

#[derive(Default)]
struct RegistryState {
    /// Insertion-ordered; callers must not rely on order.
    participants: Vec<Participant>,
    version: u64,
}

/// Participant registry
pub struct ParticipantRegistry {
    state: RwLock<RegistryState>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Register a new participant with no position yet.
    pub async fn register(&self) -> Participant {
        let participant = Participant {
            id: Uuid::new_v4().to_string(),
            position: None,
            connected_at: Utc::now(),
        };

        let mut state = self.state.write().await;
        state.participants.push(participant.clone());
        state.version += 1;
        participant
    }

    /// Replace the stored participant with one carrying the new position.
    ///
    /// Returns `false` when the id is already gone: a report that lost the
    /// race against a concurrent disconnect, not an error.
    pub async fn update_position(&self, id: &str, lat: f64, lng: f64) -> bool {
        let mut state = self.state.write().await;
        let Some(slot) = state.participants.iter_mut().find(|p| p.id == id) else {
            return false;
        };

        // Wholesale replacement; `connected_at` survives.
        *slot = Participant {
            id: slot.id.clone(),
            position: Some(Position { lat, lng }),
            connected_at: slot.connected_at,
        };
        state.version += 1;
        true
    }

    /// Remove a participant. Removing an absent id is a no-op.
    pub async fn remove(&self, id: &str) -> bool {
        let mut state = self.state.write().await;
        let before = state.participants.len();
        state.participants.retain(|p| p.id != id);
        if state.participants.len() == before {
            return false;
        }
        state.version += 1;
        true
    }

    /// Consistent copy of all current entries, atomic with respect to every
    /// mutation above.
    pub async fn snapshot(&self) -> PresenceSnapshot {
        let state = self.state.read().await;
        PresenceSnapshot {
            version: state.version,
            participants: state.participants.clone(),
        }
    }

    /// Number of currently registered participants.
    pub async fn count(&self) -> usize {
        let state = self.state.read().await;
        state.participants.len()
    }
}

impl Default for ParticipantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_register_assigns_unique_ids() {
        let registry = ParticipantRegistry::new();
        let mut seen = HashSet::new();
        for _ in 0..100 {
            let participant = registry.register().await;
            assert!(seen.insert(participant.id), "id reused");
            assert!(participant.position.is_none());
        }
        assert_eq!(registry.count().await, 100);
    }

    #[tokio::test]
    async fn test_update_replaces_position_and_keeps_connected_at() {
        let registry = ParticipantRegistry::new();
        let participant = registry.register().await;

        assert!(registry.update_position(&participant.id, 10.0, 20.0).await);

        let snapshot = registry.snapshot().await;
        let stored = &snapshot.participants[0];
        assert_eq!(stored.position, Some(Position { lat: 10.0, lng: 20.0 }));
        assert_eq!(stored.connected_at, participant.connected_at);
    }

    #[tokio::test]
    async fn test_update_after_remove_is_stale() {
        let registry = ParticipantRegistry::new();
        let participant = registry.register().await;

        assert!(registry.remove(&participant.id).await);
        assert!(!registry.update_position(&participant.id, 1.0, 2.0).await);
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let registry = ParticipantRegistry::new();
        let participant = registry.register().await;

        assert!(registry.remove(&participant.id).await);
        assert!(!registry.remove(&participant.id).await);
        assert!(!registry.remove("never-registered").await);
    }

    #[tokio::test]
    async fn test_snapshot_reflects_current_membership() {
        let registry = ParticipantRegistry::new();
        let a = registry.register().await;
        let b = registry.register().await;

        registry.update_position(&a.id, 1.0, 2.0).await;
        registry.remove(&b.id).await;

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.participants.len(), 1);
        assert_eq!(snapshot.participants[0].id, a.id);
        assert_eq!(
            snapshot.participants[0].position,
            Some(Position { lat: 1.0, lng: 2.0 })
        );
    }

    #[tokio::test]
    async fn test_removed_id_never_reappears() {
        let registry = ParticipantRegistry::new();
        let a = registry.register().await;
        registry.remove(&a.id).await;
        registry.register().await;

        let snapshot = registry.snapshot().await;
        assert!(snapshot.participants.iter().all(|p| p.id != a.id));
    }

    #[tokio::test]
    async fn test_version_increases_with_each_mutation() {
        let registry = ParticipantRegistry::new();
        let v0 = registry.snapshot().await.version;

        let a = registry.register().await;
        let v1 = registry.snapshot().await.version;
        assert!(v1 > v0);

        registry.update_position(&a.id, 1.0, 2.0).await;
        let v2 = registry.snapshot().await.version;
        assert!(v2 > v1);

        registry.remove(&a.id).await;
        let v3 = registry.snapshot().await.version;
        assert!(v3 > v2);

        // A stale update must not move the version.
        registry.update_position(&a.id, 3.0, 4.0).await;
        assert_eq!(registry.snapshot().await.version, v3);
    }
}
