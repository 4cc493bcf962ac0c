use crate::game::constants::key::PICKUP_RADIUS;
use crate::util::vec3::Vec3;

/// Whether a player at `player` picks up a key still lying at `key`
pub fn check_pickup(key: Option<Vec3>, player: Vec3) -> bool {
    match key {
        Some(key) => player.distance_sq_to(key) < PICKUP_RADIUS * PICKUP_RADIUS,
        None => false,
    }
}
