/// Room geometry
pub mod room {
    /// Side length of the square play area
    pub const SIZE: f32 = 20.0;
    /// Avatars are kept this far inside the walls
    pub const HALF_EXTENT: f32 = SIZE / 2.0 - 0.5;
    /// Key spawn range on X and Z: `[-KEY_SPAWN_RANGE, KEY_SPAWN_RANGE)`
    pub const KEY_SPAWN_RANGE: f32 = 9.0;
    /// Key height above the floor
    pub const KEY_HEIGHT: f32 = 1.0;
    /// Maximum players per room
    pub const MAX_PLAYERS: usize = 5;
    /// Avatars spawn on a ring of this radius, by roster index
    pub const SPAWN_RING_RADIUS: f32 = 6.0;
    /// Avatar eye height
    pub const AVATAR_HEIGHT: f32 = 1.0;
}

/// AI pursuit constants
pub mod ai {
    use crate::util::vec3::Vec3;

    /// Hunting speed in units per second
    pub const SPEED: f32 = 1.5;
    /// Distance under which the target is caught
    pub const CAPTURE_RADIUS: f32 = 1.5;
    /// Blend factor applied to each relayed AI position
    pub const BROADCAST_BLEND: f32 = 0.3;
    /// Where the AI waits at the start of a match
    pub const SPAWN: Vec3 = Vec3::new(0.0, 1.25, 0.0);
}

/// Noise and escalation
pub mod threat {
    /// Threat level at which the AI starts hunting the last noise maker
    pub const HUNT_THRESHOLD: u32 = 5;
}

/// Key pickup
pub mod key {
    /// Pickup radius around the key
    pub const PICKUP_RADIUS: f32 = 1.5;
}

/// Local avatar movement
pub mod movement {
    /// Walk speed in units per second
    pub const SPEED: f32 = 4.0;
    /// Turn speed in radians per second of held turn input
    pub const TURN_SPEED: f32 = 2.5;
    /// Per-frame blend toward the last received remote position
    pub const REMOTE_BLEND: f32 = 0.2;
}

/// Spectator camera
pub mod spectator {
    use crate::util::vec3::Vec3;

    /// Third-person offset behind the target, in the target's local frame
    pub const THIRD_PERSON_OFFSET: Vec3 = Vec3::new(0.0, 2.0, 4.0);
    /// Per-frame camera blend in third-person mode
    pub const CAMERA_BLEND: f32 = 0.05;
}

/// Simulation timing
pub mod timing {
    /// Default frames per second of the local simulation
    pub const DEFAULT_TICK_RATE: u32 = 60;
    /// Longest frame the simulation will integrate in one step
    pub const MAX_FRAME_DT: f32 = 0.1;
}
