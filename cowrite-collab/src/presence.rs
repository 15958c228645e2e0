//! Room-scoped presence tracking.
//!
//! The registry is the single membership authority for the hub: a
//! per-note, insertion-ordered list of live participants, mutated only
//! by the hub's join/leave/disconnect handling. It is an owned,
//! injectable instance — tests build isolated registries, and a shared
//! backing store could replace this one without touching call sites.
//!
//! Every mutating call computes its snapshot inside the same write-lock
//! critical section as the mutation, so two operations racing for the
//! same note can never observe or publish a half-applied list.

use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::protocol::Participant;

pub struct PresenceRegistry {
    rooms: RwLock<HashMap<Uuid, Vec<Participant>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Add a participant to a note's room and return the updated
    /// ordered snapshot. Safe to call twice for the same
    /// (note, connection) — the duplicate is ignored.
    pub async fn add(&self, note_id: Uuid, participant: Participant) -> Vec<Participant> {
        let mut rooms = self.rooms.write().await;
        let entries = rooms.entry(note_id).or_default();
        if !entries
            .iter()
            .any(|p| p.connection_id == participant.connection_id)
        {
            entries.push(participant);
        }
        entries.clone()
    }

    /// Remove a connection's entry from one note's room. Returns the
    /// updated snapshot, or `None` when nothing was removed.
    pub async fn remove(&self, note_id: Uuid, connection_id: Uuid) -> Option<Vec<Participant>> {
        let mut rooms = self.rooms.write().await;
        let entries = rooms.get_mut(&note_id)?;
        let before = entries.len();
        entries.retain(|p| p.connection_id != connection_id);
        if entries.len() == before {
            return None;
        }
        let snapshot = entries.clone();
        if snapshot.is_empty() {
            rooms.remove(&note_id);
        }
        Some(snapshot)
    }

    /// Remove a connection from every room it occupies. Returns
    /// `(note_id, updated snapshot)` for each room that actually
    /// shrank — the disconnect path broadcasts exactly those.
    pub async fn remove_connection_everywhere(
        &self,
        connection_id: Uuid,
    ) -> Vec<(Uuid, Vec<Participant>)> {
        let mut rooms = self.rooms.write().await;
        let mut changed = Vec::new();
        rooms.retain(|note_id, entries| {
            let before = entries.len();
            entries.retain(|p| p.connection_id != connection_id);
            if entries.len() < before {
                changed.push((*note_id, entries.clone()));
            }
            !entries.is_empty()
        });
        changed
    }

    /// Ordered snapshot of a room's membership (insertion order).
    pub async fn list(&self, note_id: Uuid) -> Vec<Participant> {
        let rooms = self.rooms.read().await;
        rooms.get(&note_id).cloned().unwrap_or_default()
    }

    pub async fn count(&self, note_id: Uuid) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(&note_id).map_or(0, |entries| entries.len())
    }

    /// Number of rooms with at least one participant.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(name: &str) -> Participant {
        Participant {
            user_id: Uuid::new_v4(),
            connection_id: Uuid::new_v4(),
            name: name.into(),
        }
    }

    #[tokio::test]
    async fn add_preserves_insertion_order() {
        let registry = PresenceRegistry::new();
        let note_id = Uuid::new_v4();

        registry.add(note_id, participant("Alice")).await;
        registry.add(note_id, participant("Bob")).await;
        let snapshot = registry.add(note_id, participant("Charlie")).await;

        let names: Vec<&str> = snapshot.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Alice", "Bob", "Charlie"]);
    }

    #[tokio::test]
    async fn add_twice_does_not_duplicate() {
        let registry = PresenceRegistry::new();
        let note_id = Uuid::new_v4();
        let alice = participant("Alice");

        registry.add(note_id, alice.clone()).await;
        let snapshot = registry.add(note_id, alice).await;

        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.count(note_id).await, 1);
    }

    #[tokio::test]
    async fn same_user_two_connections_holds_two_entries() {
        let registry = PresenceRegistry::new();
        let note_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        for _ in 0..2 {
            registry
                .add(
                    note_id,
                    Participant {
                        user_id,
                        connection_id: Uuid::new_v4(),
                        name: "Alice".into(),
                    },
                )
                .await;
        }

        assert_eq!(registry.count(note_id).await, 2);
    }

    #[tokio::test]
    async fn remove_reports_change_and_is_idempotent() {
        let registry = PresenceRegistry::new();
        let note_id = Uuid::new_v4();
        let alice = participant("Alice");
        let bob = participant("Bob");

        registry.add(note_id, alice.clone()).await;
        registry.add(note_id, bob.clone()).await;

        let snapshot = registry.remove(note_id, alice.connection_id).await.unwrap();
        assert_eq!(snapshot, vec![bob]);

        // Already gone — no change reported.
        assert!(registry.remove(note_id, alice.connection_id).await.is_none());
    }

    #[tokio::test]
    async fn empty_room_is_dropped() {
        let registry = PresenceRegistry::new();
        let note_id = Uuid::new_v4();
        let alice = participant("Alice");

        registry.add(note_id, alice.clone()).await;
        assert_eq!(registry.room_count().await, 1);

        registry.remove(note_id, alice.connection_id).await;
        assert_eq!(registry.room_count().await, 0);
    }

    #[tokio::test]
    async fn remove_everywhere_reports_only_shrunk_rooms() {
        let registry = PresenceRegistry::new();
        let note_a = Uuid::new_v4();
        let note_b = Uuid::new_v4();
        let alice = participant("Alice");
        let bob = participant("Bob");

        registry.add(note_a, alice.clone()).await;
        registry.add(note_a, bob.clone()).await;
        registry.add(note_b, bob.clone()).await;

        let changed = registry
            .remove_connection_everywhere(alice.connection_id)
            .await;

        assert_eq!(changed.len(), 1);
        let (note_id, snapshot) = &changed[0];
        assert_eq!(*note_id, note_a);
        assert_eq!(*snapshot, vec![bob.clone()]);

        // Bob's rooms are untouched.
        assert_eq!(registry.count(note_b).await, 1);
    }

    #[tokio::test]
    async fn list_unknown_room_is_empty() {
        let registry = PresenceRegistry::new();
        assert!(registry.list(Uuid::new_v4()).await.is_empty());
    }
}
