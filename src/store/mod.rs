//! Boundary to the replicated room store and the signaling relay.
//!
//! Calls are synchronous and must return promptly: the simulation frame
//! issues writes without waiting on a round trip. A networked backend queues
//! the write and reports a failure as `StoreError::Unavailable` on a later
//! call; the level-triggered controller then repeats the write.

pub mod memory;

use tokio::sync::watch;

use crate::game::state::{PlayerEntry, Room, RoomPatch, RoomStatus};
use crate::net::signaling::Signal;

pub use memory::MemoryStore;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Room not found")]
    RoomNotFound,
    #[error("Room is full ({capacity} players)")]
    RoomFull { capacity: usize },
    #[error("Game already in progress")]
    GameInProgress,
    #[error("Invalid status transition {from:?} -> {to:?}")]
    InvalidTransition { from: RoomStatus, to: RoomStatus },
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Worth repeating on the next snapshot
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Change feed for one room. `None` means the document was deleted.
/// Dropping the subscription unsubscribes.
pub struct RoomSubscription {
    rx: watch::Receiver<Option<Room>>,
}

impl RoomSubscription {
    pub fn new(rx: watch::Receiver<Option<Room>>) -> Self {
        Self { rx }
    }

    /// Latest document, marking it seen
    pub fn current(&mut self) -> Option<Room> {
        self.rx.borrow_and_update().clone()
    }

    /// Wait for the next change. Returns `false` once the store side is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(true)
    }
}

/// Document operations keyed by room id
pub trait RoomStore: Send + Sync {
    fn create_room(&self, room: Room) -> Result<(), StoreError>;

    fn fetch(&self, room_id: &str) -> Result<Option<Room>, StoreError>;

    /// Pushes the full document on every change
    fn subscribe(&self, room_id: &str) -> Result<RoomSubscription, StoreError>;

    /// Atomic multi-field update
    fn update(&self, room_id: &str, patch: &RoomPatch) -> Result<(), StoreError>;

    /// All-or-nothing join: missing, started and full rooms are rejected
    /// without mutation. Joining twice is a no-op.
    fn join(&self, room_id: &str, player: PlayerEntry, capacity: usize) -> Result<Room, StoreError>;

    /// Set-remove from the roster
    fn remove_player(&self, room_id: &str, uid: &str) -> Result<(), StoreError>;

    /// Atomic `threatLevel += 1` together with `lastNoiseMaker = noise_maker`.
    /// Returns the new level.
    fn increment_threat(&self, room_id: &str, noise_maker: &str) -> Result<u32, StoreError>;

    /// Adds `uid` to `caughtPlayers` unless present. Returns whether it was added.
    fn append_caught_if_absent(&self, room_id: &str, uid: &str) -> Result<bool, StoreError>;

    /// Rooms still in `waiting`, oldest first
    fn list_waiting(&self) -> Result<Vec<Room>, StoreError>;

    fn delete_room(&self, room_id: &str) -> Result<(), StoreError>;
}

/// Where a new signal inbox starts reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalCursor {
    /// Replay everything already published to the room
    Beginning,
    /// Only signals published after subscribing
    Now,
}

/// Per-recipient view of a room's signal log
pub trait SignalInbox: Send {
    /// Signals addressed to this inbox since the last drain, in publish order
    fn drain(&mut self) -> Vec<Signal>;
}

/// Ordered, recipient-filtered negotiation messages keyed by `(room, to)`
pub trait SignalingRelay: Send + Sync {
    fn publish(&self, room_id: &str, signal: Signal) -> Result<(), StoreError>;

    fn subscribe_signals(
        &self,
        room_id: &str,
        to: &str,
        cursor: SignalCursor,
    ) -> Result<Box<dyn SignalInbox>, StoreError>;
}
