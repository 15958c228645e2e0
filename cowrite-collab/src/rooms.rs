//! Per-note broadcast fan-out.
//!
//! Each note room owns one tokio broadcast channel. An event is encoded
//! once and shared behind an `Arc`; every member's connection task holds
//! a receiver and forwards frames to its socket, skipping frames whose
//! `exclude` names its own connection. Lagging receivers drop messages
//! (bounded capacity).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::protocol::{ProtocolError, ServerEvent};

/// One fan-out frame: the encoded event plus the connection to skip.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub exclude: Option<Uuid>,
    pub frame: Arc<Vec<u8>>,
}

/// Broadcast bus for a single note room.
pub struct RoomBus {
    sender: broadcast::Sender<Outbound>,
    capacity: usize,
}

impl RoomBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.sender.subscribe()
    }

    /// Encode once and fan out. Returns the number of receivers the
    /// frame reached (zero when the room has no subscribers).
    pub fn send(
        &self,
        event: &ServerEvent,
        exclude: Option<Uuid>,
    ) -> Result<usize, ProtocolError> {
        let frame = Arc::new(event.encode()?);
        Ok(self.sender.send(Outbound { exclude, frame }).unwrap_or(0))
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Registry of room buses, keyed by note id.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<Uuid, Arc<RoomBus>>>,
    default_capacity: usize,
}

impl RoomRegistry {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            default_capacity,
        }
    }

    pub async fn get_or_create(&self, note_id: Uuid) -> Arc<RoomBus> {
        // Fast path: read lock.
        {
            let rooms = self.rooms.read().await;
            if let Some(bus) = rooms.get(&note_id) {
                return bus.clone();
            }
        }

        // Slow path: write lock, double-checked.
        let mut rooms = self.rooms.write().await;
        if let Some(bus) = rooms.get(&note_id) {
            return bus.clone();
        }
        let bus = Arc::new(RoomBus::new(self.default_capacity));
        rooms.insert(note_id, bus.clone());
        bus
    }

    pub async fn get(&self, note_id: Uuid) -> Option<Arc<RoomBus>> {
        self.rooms.read().await.get(&note_id).cloned()
    }

    pub async fn remove(&self, note_id: Uuid) {
        self.rooms.write().await.remove(&note_id);
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fan_out_reaches_all_subscribers() {
        let bus = RoomBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let sent = bus
            .send(&ServerEvent::error("room closing"), None)
            .unwrap();
        assert_eq!(sent, 2);

        // Both receivers see the same shared frame; exclusion is
        // applied by the connection task, not the channel.
        let out1 = rx1.recv().await.unwrap();
        let out2 = rx2.recv().await.unwrap();
        assert!(out1.exclude.is_none());
        assert_eq!(*out1.frame, *out2.frame);
    }

    #[tokio::test]
    async fn exclude_is_carried_in_envelope() {
        let bus = RoomBus::new(16);
        let mut rx = bus.subscribe();
        let skip = Uuid::new_v4();

        bus.send(&ServerEvent::error("quiet"), Some(skip)).unwrap();
        let out = rx.recv().await.unwrap();
        assert_eq!(out.exclude, Some(skip));
    }

    #[tokio::test]
    async fn send_without_subscribers_reaches_zero() {
        let bus = RoomBus::new(16);
        assert_eq!(bus.send(&ServerEvent::error("void"), None).unwrap(), 0);
    }

    #[tokio::test]
    async fn registry_get_or_create_returns_same_bus() {
        let registry = RoomRegistry::new(16);
        let note_id = Uuid::new_v4();

        let a = registry.get_or_create(note_id).await;
        let b = registry.get_or_create(note_id).await;

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.room_count().await, 1);
    }

    #[tokio::test]
    async fn registry_remove_drops_bus() {
        let registry = RoomRegistry::new(16);
        let note_id = Uuid::new_v4();

        registry.get_or_create(note_id).await;
        registry.remove(note_id).await;

        assert!(registry.get(note_id).await.is_none());
        assert_eq!(registry.room_count().await, 0);
    }

    #[tokio::test]
    async fn bus_capacity_is_reported() {
        let bus = RoomBus::new(64);
        assert_eq!(bus.capacity(), 64);
    }
}
