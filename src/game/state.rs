use serde::{Deserialize, Serialize};

use crate::game::constants;
use crate::store::StoreError;
use crate::util::vec3::Vec3;

/// Player identifier issued by the auth collaborator
pub type Uid = String;

/// Room document identifier
pub type RoomId = String;

/// Match phase of a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoomStatus {
    /// Lobby, players can still join
    Waiting,
    /// Match running, roster frozen for the peer mesh
    InGame,
    /// Terminal
    Finished,
}

impl RoomStatus {
    fn rank(self) -> u8 {
        match self {
            RoomStatus::Waiting => 0,
            RoomStatus::InGame => 1,
            RoomStatus::Finished => 2,
        }
    }

    /// Status only moves forward: `waiting -> in-game -> finished`
    pub fn can_transition_to(self, next: RoomStatus) -> bool {
        next.rank() >= self.rank()
    }

    pub fn is_terminal(self) -> bool {
        self == RoomStatus::Finished
    }
}

/// Roster entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerEntry {
    pub uid: Uid,
    pub name: String,
}

impl PlayerEntry {
    pub fn new(uid: impl Into<Uid>, name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
        }
    }
}

/// AI behavior state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiState {
    #[default]
    Dormant,
    Hunting,
}

/// AI fields of the room document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSnapshot {
    pub state: AiState,
    pub position: Vec3,
    pub target_uid: Option<Uid>,
}

impl Default for AiSnapshot {
    fn default() -> Self {
        Self {
            state: AiState::Dormant,
            position: constants::ai::SPAWN,
            target_uid: None,
        }
    }
}

/// The replicated room document. The store holds the authoritative copy;
/// every client derives its local view from the latest snapshot of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub host_id: Uid,
    pub status: RoomStatus,
    pub players: Vec<PlayerEntry>,
    #[serde(default)]
    pub caught_players: Vec<Uid>,
    pub key_position: Vec3,
    #[serde(default)]
    pub key_found: bool,
    #[serde(default)]
    pub key_holder_uid: Option<Uid>,
    #[serde(default)]
    pub threat_level: u32,
    #[serde(default)]
    pub last_noise_maker: Option<Uid>,
    #[serde(default)]
    pub ai: AiSnapshot,
    #[serde(default)]
    pub created_at_ms: u64,
}

impl Room {
    /// Fresh waiting room with the creator as host and only player
    pub fn new(id: RoomId, name: String, host: PlayerEntry, key_position: Vec3) -> Self {
        let created_at_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            id,
            name,
            host_id: host.uid.clone(),
            status: RoomStatus::Waiting,
            players: vec![host],
            caught_players: Vec::new(),
            key_position,
            key_found: false,
            key_holder_uid: None,
            threat_level: 0,
            last_noise_maker: None,
            ai: AiSnapshot::default(),
            created_at_ms,
        }
    }

    pub fn is_host(&self, uid: &str) -> bool {
        self.host_id == uid
    }

    pub fn has_player(&self, uid: &str) -> bool {
        self.players.iter().any(|p| p.uid == uid)
    }

    pub fn is_caught(&self, uid: &str) -> bool {
        self.caught_players.iter().any(|c| c == uid)
    }

    /// In the roster and not caught
    pub fn is_living(&self, uid: &str) -> bool {
        self.has_player(uid) && !self.is_caught(uid)
    }

    /// Roster members that are not caught, in roster order
    pub fn living_players(&self) -> impl Iterator<Item = &PlayerEntry> {
        self.players.iter().filter(|p| !self.is_caught(&p.uid))
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }
}

/// A set of field writes against one room document.
///
/// Unset fields are left alone. `key_holder` also sets `keyFound` and is
/// set-once: a later pickup never replaces the first holder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomPatch {
    pub status: Option<RoomStatus>,
    pub key_holder: Option<Uid>,
    pub threat_level: Option<u32>,
    pub last_noise_maker: Option<Uid>,
    pub ai_state: Option<AiState>,
    pub ai_target_uid: Option<Option<Uid>>,
    pub ai_position: Option<Vec3>,
}

impl RoomPatch {
    /// `dormant -> hunting` with the threat counter reset
    pub fn start_hunting(target: impl Into<Uid>) -> Self {
        Self {
            ai_state: Some(AiState::Hunting),
            ai_target_uid: Some(Some(target.into())),
            threat_level: Some(0),
            ..Default::default()
        }
    }

    /// `hunting -> dormant`, persisting where the AI stopped
    pub fn go_dormant(position: Vec3) -> Self {
        Self {
            ai_state: Some(AiState::Dormant),
            ai_target_uid: Some(None),
            ai_position: Some(position),
            threat_level: Some(0),
            ..Default::default()
        }
    }

    pub fn key_found(holder: impl Into<Uid>) -> Self {
        Self {
            key_holder: Some(holder.into()),
            ..Default::default()
        }
    }

    pub fn status(status: RoomStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Threat accrual as a plain field write (read-then-write counting)
    pub fn noise(threat_level: u32, from: impl Into<Uid>) -> Self {
        Self {
            threat_level: Some(threat_level),
            last_noise_maker: Some(from.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply to a document. Returns whether any field changed.
    pub fn apply(&self, room: &mut Room) -> Result<bool, StoreError> {
        if let Some(next) = self.status {
            if !room.status.can_transition_to(next) {
                return Err(StoreError::InvalidTransition {
                    from: room.status,
                    to: next,
                });
            }
        }

        let before = room.clone();

        if let Some(next) = self.status {
            room.status = next;
        }
        if let Some(holder) = &self.key_holder {
            if !room.key_found {
                room.key_found = true;
                room.key_holder_uid = Some(holder.clone());
            }
        }
        if let Some(level) = self.threat_level {
            room.threat_level = level;
        }
        if let Some(from) = &self.last_noise_maker {
            room.last_noise_maker = Some(from.clone());
        }
        if let Some(state) = self.ai_state {
            room.ai.state = state;
        }
        if let Some(target) = &self.ai_target_uid {
            room.ai.target_uid = target.clone();
        }
        if let Some(position) = self.ai_position {
            room.ai.position = position;
        }

        Ok(*room != before)
    }
}
