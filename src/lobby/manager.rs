use std::sync::Arc;

use rand::Rng;
use tracing::info;
use uuid::Uuid;

use crate::game::constants::room;
use crate::game::state::{Room, RoomId, RoomPatch, RoomStatus};
use crate::lobby::player::LocalPlayer;
use crate::store::{RoomStore, StoreError};
use crate::util::vec3::Vec3;

/// User-initiated room actions. Each either completes or fails before
/// touching the store.
pub struct LobbyClient {
    store: Arc<dyn RoomStore>,
    capacity: usize,
}

impl LobbyClient {
    pub fn new(store: Arc<dyn RoomStore>, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.clamp(1, room::MAX_PLAYERS),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Create a waiting room hosted by `host`
    pub fn create_room(&self, host: &LocalPlayer, name: &str) -> Result<RoomId, LobbyError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LobbyError::EmptyName);
        }

        let id = Uuid::new_v4().to_string();
        let room = Room::new(id.clone(), name.to_string(), host.entry(), random_key_position());
        self.store.create_room(room)?;

        info!("{} created room '{}' ({})", host.name, name, id);
        Ok(id)
    }

    /// Rooms that can still be joined
    pub fn list_rooms(&self) -> Result<Vec<RoomInfo>, LobbyError> {
        Ok(self
            .store
            .list_waiting()?
            .into_iter()
            .map(|room| RoomInfo {
                id: room.id,
                name: room.name,
                player_count: room.players.len(),
                capacity: self.capacity,
            })
            .collect())
    }

    pub fn join_room(&self, room_id: &str, player: &LocalPlayer) -> Result<Room, LobbyError> {
        let room = self.store.join(room_id, player.entry(), self.capacity)?;
        info!("{} joined room '{}'", player.name, room.name);
        Ok(room)
    }

    /// Host only: `waiting -> in-game`
    pub fn start_game(&self, room_id: &str, player: &LocalPlayer) -> Result<(), LobbyError> {
        let room = self
            .store
            .fetch(room_id)?
            .ok_or(StoreError::RoomNotFound)?;
        if !room.is_host(&player.uid) {
            return Err(LobbyError::NotHost);
        }
        if room.status != RoomStatus::Waiting {
            return Err(StoreError::GameInProgress.into());
        }
        if room.players.is_empty() {
            return Err(LobbyError::NotEnoughPlayers);
        }

        self.store
            .update(room_id, &RoomPatch::status(RoomStatus::InGame))?;
        info!("Room '{}' started with {} player(s)", room.name, room.players.len());
        Ok(())
    }
}

/// Key spawn inside the room, `x, z` in `[-9, 9)`
pub fn random_key_position() -> Vec3 {
    let mut rng = rand::thread_rng();
    Vec3::new(
        rng.gen_range(-room::KEY_SPAWN_RANGE..room::KEY_SPAWN_RANGE),
        room::KEY_HEIGHT,
        rng.gen_range(-room::KEY_SPAWN_RANGE..room::KEY_SPAWN_RANGE),
    )
}

/// Room info for listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub id: RoomId,
    pub name: String,
    pub player_count: usize,
    pub capacity: usize,
}

impl std::fmt::Display for RoomInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}/{})", self.name, self.player_count, self.capacity)
    }
}

/// Lobby action errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LobbyError {
    #[error("Room name cannot be empty")]
    EmptyName,
    #[error("Only the host can start the game")]
    NotHost,
    #[error("Not enough players to start")]
    NotEnoughPlayers,
    #[error(transparent)]
    Store(#[from] StoreError),
}
