use std::f32::consts::TAU;

use hashbrown::HashMap;

use crate::game::constants::{movement, room};
use crate::game::state::{PlayerEntry, Uid};
use crate::game::systems::ai::AiEngine;
use crate::game::systems::spectator::SpectatorView;
use crate::util::vec3::Vec3;

/// One player's avatar in the local scene
#[derive(Debug, Clone)]
pub struct Avatar {
    pub uid: Uid,
    pub name: String,
    pub position: Vec3,
    pub rotation_y: f32,
    /// Last pose received from the owning peer
    pub target_position: Vec3,
    pub target_rotation_y: f32,
    pub visible: bool,
    /// Left the roster mid-match
    pub departed: bool,
    pub is_local: bool,
}

impl Avatar {
    fn new(entry: &PlayerEntry, position: Vec3, is_local: bool) -> Self {
        Self {
            uid: entry.uid.clone(),
            name: entry.name.clone(),
            position,
            rotation_y: 0.0,
            target_position: position,
            target_rotation_y: 0.0,
            visible: true,
            departed: false,
            is_local,
        }
    }

    /// Counts toward the living pool
    pub fn is_active(&self) -> bool {
        self.visible && !self.departed
    }
}

/// Spawn point for the `index`-th of `count` roster members
pub fn spawn_position(index: usize, count: usize) -> Vec3 {
    let angle = TAU * index as f32 / count.max(1) as f32;
    Vec3::new(
        room::SPAWN_RING_RADIUS * angle.cos(),
        room::AVATAR_HEIGHT,
        room::SPAWN_RING_RADIUS * angle.sin(),
    )
}

/// The local simulation mirror owned by one client for one match
pub struct LocalWorld {
    pub local_uid: Uid,
    avatars: HashMap<Uid, Avatar>,
    /// Match roster in room order, frozen at match start
    roster: Vec<Uid>,
    key: Option<Vec3>,
    pub ai: AiEngine,
    pub spectator: SpectatorView,
}

impl LocalWorld {
    pub fn new(local_uid: Uid, roster: &[PlayerEntry], key_position: Vec3) -> Self {
        let mut avatars = HashMap::with_capacity(roster.len());
        for (i, entry) in roster.iter().enumerate() {
            let position = spawn_position(i, roster.len());
            let is_local = entry.uid == local_uid;
            avatars.insert(entry.uid.clone(), Avatar::new(entry, position, is_local));
        }

        Self {
            local_uid,
            avatars,
            roster: roster.iter().map(|p| p.uid.clone()).collect(),
            key: Some(key_position),
            ai: AiEngine::new(),
            spectator: SpectatorView::new(),
        }
    }

    pub fn roster(&self) -> &[Uid] {
        &self.roster
    }

    pub fn avatar(&self, uid: &str) -> Option<&Avatar> {
        self.avatars.get(uid)
    }

    pub fn avatar_mut(&mut self, uid: &str) -> Option<&mut Avatar> {
        self.avatars.get_mut(uid)
    }

    pub fn local_avatar(&self) -> Option<&Avatar> {
        self.avatars.get(&self.local_uid)
    }

    pub fn local_avatar_mut(&mut self) -> Option<&mut Avatar> {
        self.avatars.get_mut(&self.local_uid)
    }

    /// Avatars in roster order
    pub fn avatars(&self) -> impl Iterator<Item = &Avatar> {
        self.roster.iter().filter_map(|uid| self.avatars.get(uid))
    }

    pub fn key_position(&self) -> Option<Vec3> {
        self.key
    }

    /// Take the key out of the scene. Returns false if it was already gone.
    pub fn remove_key(&mut self) -> bool {
        self.key.take().is_some()
    }

    /// Record a pose received from a peer. The local avatar and players
    /// outside the match roster are ignored.
    pub fn set_remote_target(&mut self, uid: &str, position: Vec3, rotation_y: f32) {
        if let Some(avatar) = self.avatars.get_mut(uid) {
            if !avatar.is_local && position.is_finite() && rotation_y.is_finite() {
                avatar.target_position = position;
                avatar.target_rotation_y = rotation_y;
            }
        }
    }

    /// Per-frame blend of remote avatars toward their last received pose
    pub fn interpolate_remotes(&mut self) {
        for avatar in self.avatars.values_mut().filter(|a| !a.is_local) {
            avatar.position = avatar
                .position
                .lerp(avatar.target_position, movement::REMOTE_BLEND);
            avatar.rotation_y +=
                (avatar.target_rotation_y - avatar.rotation_y) * movement::REMOTE_BLEND;
        }
    }

    /// Hide avatars of match roster members no longer in the room.
    /// Returns the uids that departed with this call.
    pub fn sync_roster(&mut self, players: &[PlayerEntry]) -> Vec<Uid> {
        let mut departed = Vec::new();
        for avatar in self.avatars.values_mut() {
            if avatar.departed || avatar.is_local {
                continue;
            }
            if !players.iter().any(|p| p.uid == avatar.uid) {
                avatar.departed = true;
                avatar.visible = false;
                departed.push(avatar.uid.clone());
            }
        }
        departed.sort();
        departed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> LocalWorld {
        let roster = vec![
            PlayerEntry::new("a", "A"),
            PlayerEntry::new("b", "B"),
            PlayerEntry::new("c", "C"),
        ];
        LocalWorld::new("a".into(), &roster, Vec3::new(2.0, 1.0, 2.0))
    }

    #[test]
    fn test_spawn_ring_is_distinct() {
        let p0 = spawn_position(0, 3);
        let p1 = spawn_position(1, 3);
        assert!(p0.approx_eq(Vec3::new(room::SPAWN_RING_RADIUS, room::AVATAR_HEIGHT, 0.0), 1e-4));
        assert!((p0.distance_to(Vec3::new(0.0, room::AVATAR_HEIGHT, 0.0)) - room::SPAWN_RING_RADIUS).abs() < 1e-4);
        assert!(p0.distance_to(p1) > 1.0);
    }

    #[test]
    fn test_remove_key_idempotent() {
        let mut world = world();
        assert!(world.key_position().is_some());
        assert!(world.remove_key());
        assert!(!world.remove_key());
        assert!(world.key_position().is_none());
    }

    #[test]
    fn test_remote_interpolation() {
        let mut world = world();
        let start = world.avatar("b").unwrap().position;
        let goal = start + Vec3::new(10.0, 0.0, 0.0);
        world.set_remote_target("b", goal, 1.0);
        world.interpolate_remotes();
        let b = world.avatar("b").unwrap();
        assert!(b.position.approx_eq(start + Vec3::new(2.0, 0.0, 0.0), 1e-4));
        assert!((b.rotation_y - 0.2).abs() < 1e-5);
    }

    #[test]
    fn test_local_avatar_ignores_remote_pose() {
        let mut world = world();
        let before = world.local_avatar().unwrap().position;
        world.set_remote_target("a", Vec3::ZERO, 0.0);
        world.interpolate_remotes();
        assert_eq!(world.local_avatar().unwrap().position, before);
        // unknown uid is ignored
        world.set_remote_target("zed", Vec3::ZERO, 0.0);
    }

    #[test]
    fn test_sync_roster_marks_departed_once() {
        let mut world = world();
        let remaining = vec![PlayerEntry::new("a", "A"), PlayerEntry::new("c", "C")];
        assert_eq!(world.sync_roster(&remaining), vec!["b".to_string()]);
        assert!(world.sync_roster(&remaining).is_empty());
        let b = world.avatar("b").unwrap();
        assert!(b.departed && !b.visible);
    }

    #[test]
    fn test_avatars_in_roster_order() {
        let world = world();
        let order: Vec<_> = world.avatars().map(|a| a.uid.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }
}
