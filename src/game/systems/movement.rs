use crate::game::constants::{movement, room};
use crate::game::world::Avatar;
use crate::util::vec3::Vec3;

/// Controls sampled for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameInput {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
    /// -1.0 (right) to 1.0 (left)
    pub turn: f32,
    pub make_noise: bool,
    /// Spectator: next living player
    pub cycle_target: bool,
    /// Spectator: first/third person
    pub toggle_camera: bool,
}

impl FrameInput {
    pub fn is_moving(&self) -> bool {
        self.forward != self.back || self.left != self.right
    }
}

/// Walk the local avatar relative to its yaw, kept inside the room
pub fn apply_movement(avatar: &mut Avatar, input: &FrameInput, dt: f32) {
    let turn = input.turn.clamp(-1.0, 1.0);
    avatar.rotation_y += turn * movement::TURN_SPEED * dt;

    let mut local = Vec3::ZERO;
    if input.forward {
        local.z -= 1.0;
    }
    if input.back {
        local.z += 1.0;
    }
    if input.left {
        local.x -= 1.0;
    }
    if input.right {
        local.x += 1.0;
    }
    if local == Vec3::ZERO {
        return;
    }

    let step = local.normalize().rotate_y(avatar.rotation_y) * (movement::SPEED * dt);
    avatar.position = (avatar.position + step).clamp_horizontal(room::HALF_EXTENT);
}
