use crate::game::constants::spectator::{CAMERA_BLEND, THIRD_PERSON_OFFSET};
use crate::game::state::Uid;
use crate::util::vec3::Vec3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraMode {
    #[default]
    ThirdPerson,
    FirstPerson,
}

/// What the spectator camera is doing this frame
#[derive(Debug, Clone, PartialEq)]
pub enum SpectatorStatus {
    Watching {
        target: Uid,
        mode: CameraMode,
        camera: Vec3,
    },
    /// Living pool is empty
    NobodyLeft,
}

/// Spectator camera for a caught player
#[derive(Debug, Clone, Default)]
pub struct SpectatorView {
    active: bool,
    target_index: usize,
    mode: CameraMode,
    camera: Vec3,
}

impl SpectatorView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn mode(&self) -> CameraMode {
        self.mode
    }

    /// Detach from the local avatar. Returns false if already spectating.
    pub fn enter(&mut self, camera: Vec3) -> bool {
        if self.active {
            return false;
        }
        self.active = true;
        self.target_index = 0;
        self.camera = camera;
        true
    }

    /// Next player in the pool, wrapping
    pub fn cycle(&mut self, pool_len: usize) {
        if pool_len > 0 {
            self.target_index = (self.target_index + 1) % pool_len;
        }
    }

    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            CameraMode::ThirdPerson => CameraMode::FirstPerson,
            CameraMode::FirstPerson => CameraMode::ThirdPerson,
        };
    }

    /// Current target among `pool`; the index wraps if the pool shrank
    pub fn target<'a>(&self, pool: &'a [Uid]) -> Option<&'a Uid> {
        if pool.is_empty() {
            None
        } else {
            pool.get(self.target_index % pool.len())
        }
    }

    /// Move the camera toward the target pose
    pub fn follow(
        &mut self,
        pool: &[Uid],
        target_pose: impl Fn(&str) -> Option<(Vec3, f32)>,
    ) -> SpectatorStatus {
        let Some(target) = self.target(pool) else {
            return SpectatorStatus::NobodyLeft;
        };
        let Some((position, yaw)) = target_pose(target) else {
            return SpectatorStatus::NobodyLeft;
        };

        self.camera = match self.mode {
            CameraMode::FirstPerson => position,
            CameraMode::ThirdPerson => {
                let desired = position + THIRD_PERSON_OFFSET.rotate_y(yaw);
                self.camera.lerp(desired, CAMERA_BLEND)
            }
        };

        SpectatorStatus::Watching {
            target: target.clone(),
            mode: self.mode,
            camera: self.camera,
        }
    }
}
