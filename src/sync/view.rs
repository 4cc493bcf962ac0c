//! Boundary to the scene and screens. The controller tells the view what
//! changed; how it is drawn is not its concern.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::game::state::{Room, Uid};
use crate::game::systems::spectator::SpectatorStatus;

/// Blocking notices shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The room finished or no longer exists
    RoomClosed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingPlayer {
    pub uid: Uid,
    pub name: String,
    pub is_host: bool,
}

/// What the waiting-room screen shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingRoom {
    pub name: String,
    pub players: Vec<WaitingPlayer>,
    pub can_start: bool,
}

impl WaitingRoom {
    /// Roster minus caught players; only the host may start
    pub fn from_room(room: &Room, local: &str) -> Self {
        Self {
            name: room.name.clone(),
            players: room
                .living_players()
                .map(|p| WaitingPlayer {
                    uid: p.uid.clone(),
                    name: p.name.clone(),
                    is_host: room.is_host(&p.uid),
                })
                .collect(),
            can_start: room.is_host(local),
        }
    }
}

pub trait GameView: Send {
    fn show_lobby(&mut self);
    fn show_waiting_room(&mut self, room: &WaitingRoom);
    /// Match scene is up
    fn show_game(&mut self, is_host: bool);
    fn show_notice(&mut self, notice: Notice);
    /// Persistent "key found" indicator
    fn show_key_found(&mut self, holder: Option<&str>);
    fn hide_key(&mut self);
    fn hide_player(&mut self, uid: &str);
    fn enter_spectator(&mut self);
    fn update_spectator(&mut self, status: &SpectatorStatus);
}

/// Everything a view was told, in order
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    Lobby,
    WaitingRoom(WaitingRoom),
    Game { is_host: bool },
    Notice(Notice),
    KeyFound(Option<Uid>),
    KeyHidden,
    PlayerHidden(Uid),
    SpectatorEntered,
    Spectating(SpectatorStatus),
}

/// View that records calls; clones share one log
#[derive(Debug, Clone, Default)]
pub struct RecordingView {
    events: Arc<Mutex<Vec<ViewEvent>>>,
}

impl RecordingView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ViewEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, matches: impl Fn(&ViewEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| matches(e)).count()
    }

    fn push(&self, event: ViewEvent) {
        self.events.lock().push(event);
    }
}

impl GameView for RecordingView {
    fn show_lobby(&mut self) {
        self.push(ViewEvent::Lobby);
    }

    fn show_waiting_room(&mut self, room: &WaitingRoom) {
        self.push(ViewEvent::WaitingRoom(room.clone()));
    }

    fn show_game(&mut self, is_host: bool) {
        self.push(ViewEvent::Game { is_host });
    }

    fn show_notice(&mut self, notice: Notice) {
        self.push(ViewEvent::Notice(notice));
    }

    fn show_key_found(&mut self, holder: Option<&str>) {
        self.push(ViewEvent::KeyFound(holder.map(str::to_string)));
    }

    fn hide_key(&mut self) {
        self.push(ViewEvent::KeyHidden);
    }

    fn hide_player(&mut self, uid: &str) {
        self.push(ViewEvent::PlayerHidden(uid.to_string()));
    }

    fn enter_spectator(&mut self) {
        self.push(ViewEvent::SpectatorEntered);
    }

    fn update_spectator(&mut self, status: &SpectatorStatus) {
        self.push(ViewEvent::Spectating(status.clone()));
    }
}

/// Headless view that logs screen changes
#[derive(Debug, Clone)]
pub struct LogView {
    label: String,
    last_spectating: Option<SpectatorStatus>,
}

impl LogView {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            last_spectating: None,
        }
    }
}

impl GameView for LogView {
    fn show_lobby(&mut self) {
        info!("[{}] back in the lobby", self.label);
    }

    fn show_waiting_room(&mut self, room: &WaitingRoom) {
        let names: Vec<&str> = room.players.iter().map(|p| p.name.as_str()).collect();
        info!("[{}] waiting in '{}': {}", self.label, room.name, names.join(", "));
    }

    fn show_game(&mut self, is_host: bool) {
        info!("[{}] match started (host: {})", self.label, is_host);
    }

    fn show_notice(&mut self, notice: Notice) {
        match notice {
            Notice::RoomClosed => {
                info!("[{}] the game has ended or the room was closed", self.label)
            }
        }
    }

    fn show_key_found(&mut self, holder: Option<&str>) {
        info!("[{}] key found by {}", self.label, holder.unwrap_or("someone"));
    }

    fn hide_key(&mut self) {}

    fn hide_player(&mut self, uid: &str) {
        info!("[{}] {} is out", self.label, uid);
    }

    fn enter_spectator(&mut self) {
        info!("[{}] caught, now spectating", self.label);
    }

    fn update_spectator(&mut self, status: &SpectatorStatus) {
        let changed = match (&self.last_spectating, status) {
            (
                Some(SpectatorStatus::Watching { target: a, mode: ma, .. }),
                SpectatorStatus::Watching { target: b, mode: mb, .. },
            ) => a != b || ma != mb,
            (Some(SpectatorStatus::NobodyLeft), SpectatorStatus::NobodyLeft) => false,
            _ => true,
        };
        if changed {
            match status {
                SpectatorStatus::Watching { target, mode, .. } => {
                    info!("[{}] watching {} ({:?})", self.label, target, mode)
                }
                SpectatorStatus::NobodyLeft => info!("[{}] nobody left to watch", self.label),
            }
        }
        self.last_spectating = Some(status.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::PlayerEntry;
    use crate::util::vec3::Vec3;

    #[test]
    fn test_waiting_room_view() {
        let mut room = Room::new("r".into(), "Hall".into(), PlayerEntry::new("h", "Host"), Vec3::ZERO);
        room.players.push(PlayerEntry::new("g", "Guest"));
        room.players.push(PlayerEntry::new("x", "Caught"));
        room.caught_players.push("x".into());

        let host_view = WaitingRoom::from_room(&room, "h");
        assert!(host_view.can_start);
        assert_eq!(host_view.players.len(), 2);
        assert!(host_view.players[0].is_host);
        assert!(!host_view.players[1].is_host);

        assert!(!WaitingRoom::from_room(&room, "g").can_start);
    }

    #[test]
    fn test_recording_view_shares_log() {
        let view = RecordingView::new();
        let mut handle = view.clone();
        handle.show_lobby();
        handle.hide_player("b");
        assert_eq!(
            view.events(),
            vec![ViewEvent::Lobby, ViewEvent::PlayerHidden("b".into())]
        );
        assert_eq!(view.count(|e| matches!(e, ViewEvent::Lobby)), 1);
    }
}
