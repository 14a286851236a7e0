use crate::config::SfuConfig;
use crate::room::Room;
use dashmap::DashMap;
use fanout_core::RoomId;
use std::sync::Arc;
use tracing::info;

/// Registry of live rooms keyed by session id. Rooms are never evicted.
#[derive(Clone)]
pub struct RoomManager {
    rooms: Arc<DashMap<RoomId, Arc<Room>>>,
    config: Arc<SfuConfig>,
}

impl RoomManager {
    pub fn new(config: Arc<SfuConfig>) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            config,
        }
    }

    pub fn get_or_create(&self, session_id: &str) -> Arc<Room> {
        let room_id = RoomId::from(session_id);
        if let Some(room) = self.rooms.get(&room_id) {
            return Arc::clone(room.value());
        }

        let entry = self.rooms.entry(room_id.clone()).or_insert_with(|| {
            info!("Creating new room: {}", room_id);
            Arc::new(Room::new(room_id, Arc::clone(&self.config)))
        });
        Arc::clone(entry.value())
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Room>> {
        self.rooms
            .get(&RoomId::from(session_id))
            .map(|room| Arc::clone(room.value()))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// `(session, peer count)` for every room.
    pub fn stats(&self) -> Vec<(RoomId, usize)> {
        self.rooms
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().peer_count()))
            .collect()
    }
}
