//! Capture and threat rules.
//!
//! Capture effects are derived from `caughtPlayers` on every client. Threat
//! accrual and capture writes happen only on the host.

use smallvec::SmallVec;

use crate::game::constants::room::MAX_PLAYERS;
use crate::game::state::{RoomId, RoomPatch, Uid};
use crate::game::world::LocalWorld;
use crate::store::{RoomStore, StoreError};

/// Uids still in play, in roster order
pub type LivingPool = SmallVec<[Uid; MAX_PLAYERS]>;

/// How the host counts noise into `threatLevel`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreatCounting {
    /// Atomic increment in the store; concurrent events are all counted
    #[default]
    Strict,
    /// Read the level, write level + 1. Two events handled between the same
    /// read and write count once.
    Soft,
}

impl std::str::FromStr for ThreatCounting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(ThreatCounting::Strict),
            "soft" => Ok(ThreatCounting::Soft),
            other => Err(format!("unknown threat counting '{other}'")),
        }
    }
}

/// Hide avatars of caught players. Returns the uids hidden by this call,
/// so repeating a snapshot hides nothing new.
pub fn apply_caught(world: &mut LocalWorld, caught: &[Uid]) -> Vec<Uid> {
    let mut newly_hidden = Vec::new();
    for uid in caught {
        if let Some(avatar) = world.avatar_mut(uid) {
            if avatar.visible {
                avatar.visible = false;
                newly_hidden.push(uid.clone());
            }
        }
    }
    newly_hidden
}

/// Roster members that are visible and still in the room
pub fn living_pool(world: &LocalWorld) -> LivingPool {
    world
        .avatars()
        .filter(|a| a.is_active())
        .map(|a| a.uid.clone())
        .collect()
}

/// Host-side: everyone is out
pub fn is_match_over(world: &LocalWorld) -> bool {
    living_pool(world).is_empty()
}

/// Host-side threat accrual for one noise event
pub fn record_noise(
    store: &dyn RoomStore,
    room_id: &RoomId,
    from: &str,
    counting: ThreatCounting,
) -> Result<u32, StoreError> {
    match counting {
        ThreatCounting::Strict => store.increment_threat(room_id, from),
        ThreatCounting::Soft => {
            let room = store.fetch(room_id)?.ok_or(StoreError::RoomNotFound)?;
            let next = room.threat_level.saturating_add(1);
            store.update(room_id, &RoomPatch::noise(next, from))?;
            Ok(next)
        }
    }
}

/// Host-side capture: exactly-once append to `caughtPlayers`
pub fn capture(store: &dyn RoomStore, room_id: &RoomId, uid: &str) -> Result<bool, StoreError> {
    store.append_caught_if_absent(room_id, uid)
}
