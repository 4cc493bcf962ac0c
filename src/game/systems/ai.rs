use crate::game::constants::ai::*;
use crate::game::state::{AiSnapshot, AiState, Uid};
use crate::util::vec3::Vec3;

/// Outcome of one host simulation step
#[derive(Debug, Clone, PartialEq)]
pub enum AiStep {
    /// Nothing to do this frame
    Idle,
    /// Advanced toward the target; relay the new position
    Moved(Vec3),
    /// Target is within reach; run the capture procedure
    Capture(Uid),
    /// Target is gone; write dormancy back
    TargetLost,
}

/// Local mirror of the room's AI.
///
/// Every client reconciles it from snapshots and relayed positions. Only the
/// host calls [`AiEngine::step`], and only the host's steps produce writes.
#[derive(Debug, Clone)]
pub struct AiEngine {
    pub state: AiState,
    pub position: Vec3,
    pub target_uid: Option<Uid>,
    /// Dormancy write issued, waiting for the snapshot that reflects it
    dormancy_requested: bool,
    /// Capture issued for this uid, waiting for the snapshot that reflects it
    capture_requested: Option<Uid>,
}

impl Default for AiEngine {
    fn default() -> Self {
        Self {
            state: AiState::Dormant,
            position: SPAWN,
            target_uid: None,
            dormancy_requested: false,
            capture_requested: None,
        }
    }
}

impl AiEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dormant(&self) -> bool {
        self.state == AiState::Dormant
    }

    /// Adopt the authoritative AI fields. A dormant snapshot is a resync
    /// point and snaps the position; while hunting the locally simulated or
    /// interpolated position is kept.
    pub fn reconcile(&mut self, snapshot: &AiSnapshot) {
        self.state = snapshot.state;
        self.target_uid = snapshot.target_uid.clone();
        if snapshot.state == AiState::Dormant {
            self.position = snapshot.position;
        }
        self.dormancy_requested = false;
        self.capture_requested = None;
    }

    /// Blend toward a position relayed by the host
    pub fn apply_broadcast(&mut self, position: Vec3) {
        self.position = self.position.lerp(position, BROADCAST_BLEND);
    }

    /// Advance one frame on the host. `target_position` is the target's
    /// position if it is still a living, visible roster member.
    pub fn step(&mut self, dt: f32, target_position: Option<Vec3>) -> AiStep {
        if self.state != AiState::Hunting {
            return AiStep::Idle;
        }

        let (Some(target_uid), Some(target)) = (self.target_uid.clone(), target_position) else {
            if self.dormancy_requested {
                return AiStep::Idle;
            }
            self.dormancy_requested = true;
            return AiStep::TargetLost;
        };

        let (direction, distance) = (target - self.position).normalize_with_length();
        if distance < CAPTURE_RADIUS {
            if self.capture_requested.as_deref() == Some(target_uid.as_str()) {
                return AiStep::Idle;
            }
            self.capture_requested = Some(target_uid.clone());
            return AiStep::Capture(target_uid);
        }

        let advance = (SPEED * dt).min(distance);
        self.position += direction * advance;
        AiStep::Moved(self.position)
    }

    /// The dormancy write failed; issue it again next frame
    pub fn retry_dormancy(&mut self) {
        self.dormancy_requested = false;
    }

    /// The capture write failed; issue it again next frame
    pub fn retry_capture(&mut self) {
        self.capture_requested = None;
    }
}
