use std::f32::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::game::systems::movement::FrameInput;
use crate::game::world::LocalWorld;
use crate::sync::session::InputSource;

/// Seconds between behavior decisions, before personality variance
const DECISION_INTERVAL: f32 = 1.5;
/// Seconds a spectating bot watches one player
const SPECTATE_INTERVAL: f32 = 2.0;

/// What a bot is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotBehavior {
    /// Walk forward while turning slowly
    Wander,
    /// Head straight for the key
    SeekKey,
    /// Stand still and stay quiet
    Freeze,
}

/// Bot personality traits
#[derive(Debug, Clone)]
pub struct BotPersonality {
    /// Chance to go for the key on each decision (0.0-1.0)
    pub boldness: f32,
    /// Noise events per second
    pub noisiness: f32,
    /// Decision timing variance
    pub reaction_variance: f32,
}

impl BotPersonality {
    pub fn random(rng: &mut impl Rng) -> Self {
        Self {
            boldness: rng.gen_range(0.1..0.6),
            noisiness: rng.gen_range(0.2..1.5),
            reaction_variance: rng.gen_range(0.1..0.5),
        }
    }
}

impl Default for BotPersonality {
    fn default() -> Self {
        Self {
            boldness: 0.3,
            noisiness: 0.5,
            reaction_variance: 0.3,
        }
    }
}

/// Scripted player for the headless simulator
pub struct WanderBot {
    rng: StdRng,
    personality: BotPersonality,
    behavior: BotBehavior,
    decision_timer: f32,
    spectate_timer: f32,
    turn: f32,
}

impl WanderBot {
    /// Bot with a personality drawn from `seed`
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let personality = BotPersonality::random(&mut rng);
        Self::with_personality(rng, personality)
    }

    pub fn with_personality(rng: StdRng, personality: BotPersonality) -> Self {
        Self {
            rng,
            personality,
            behavior: BotBehavior::Wander,
            decision_timer: 0.0,
            spectate_timer: 0.0,
            turn: 0.0,
        }
    }

    pub fn behavior(&self) -> BotBehavior {
        self.behavior
    }

    pub fn personality(&self) -> &BotPersonality {
        &self.personality
    }

    fn decide(&mut self, world: &LocalWorld) {
        let roll: f32 = self.rng.gen();
        self.behavior = if world.key_position().is_some() && roll < self.personality.boldness {
            BotBehavior::SeekKey
        } else if roll > 0.85 {
            BotBehavior::Freeze
        } else {
            self.turn = self.rng.gen_range(-1.0..1.0);
            BotBehavior::Wander
        };

        let variance = self.personality.reaction_variance;
        let timing_factor = 1.0 + self.rng.gen_range(-variance..=variance);
        self.decision_timer = DECISION_INTERVAL * timing_factor;
    }

    /// Turn input that faces the avatar toward the key
    fn steer_to_key(world: &LocalWorld) -> Option<f32> {
        let avatar = world.local_avatar()?;
        let key = world.key_position()?;
        let to_key = key - avatar.position;
        if to_key.x == 0.0 && to_key.z == 0.0 {
            return Some(0.0);
        }
        // forward is -Z rotated by yaw
        let desired = (-to_key.x).atan2(-to_key.z);
        let mut diff = desired - avatar.rotation_y;
        while diff > PI {
            diff -= 2.0 * PI;
        }
        while diff < -PI {
            diff += 2.0 * PI;
        }
        Some((diff * 2.0).clamp(-1.0, 1.0))
    }

    fn spectate(&mut self, dt: f32) -> FrameInput {
        self.spectate_timer -= dt;
        if self.spectate_timer > 0.0 {
            return FrameInput::default();
        }
        self.spectate_timer = SPECTATE_INTERVAL;
        FrameInput {
            cycle_target: true,
            toggle_camera: self.rng.gen_bool(0.25),
            ..Default::default()
        }
    }
}

impl InputSource for WanderBot {
    fn sample(&mut self, world: Option<&LocalWorld>, spectating: bool, dt: f32) -> FrameInput {
        let Some(world) = world else {
            return FrameInput::default();
        };
        if spectating {
            return self.spectate(dt);
        }

        self.decision_timer -= dt;
        if self.decision_timer <= 0.0 {
            self.decide(world);
        }

        let mut input = FrameInput::default();
        match self.behavior {
            BotBehavior::Wander => {
                input.forward = true;
                input.turn = self.turn;
            }
            BotBehavior::SeekKey => match Self::steer_to_key(world) {
                Some(turn) => {
                    input.forward = true;
                    input.turn = turn;
                }
                None => self.behavior = BotBehavior::Wander,
            },
            BotBehavior::Freeze => return input,
        }

        let chance = (self.personality.noisiness * dt).clamp(0.0, 1.0);
        input.make_noise = self.rng.gen_bool(chance as f64);
        input
    }
}
