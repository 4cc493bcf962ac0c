//! Per-frame simulation of one match on one client.

use tracing::{debug, info, warn};

use crate::game::constants::timing::MAX_FRAME_DT;
use crate::game::state::{RoomPatch, RoomStatus, Uid};
use crate::game::systems::ai::AiStep;
use crate::game::systems::capture::{self, is_match_over, living_pool};
use crate::game::systems::key::check_pickup;
use crate::game::systems::movement::{apply_movement, FrameInput};
use crate::game::world::LocalWorld;
use crate::metrics::Metrics;
use crate::net::protocol::PeerMessage;
use crate::net::transport::PeerTransport;
use crate::sync::context::{Services, SessionContext};
use crate::sync::view::GameView;
use crate::util::vec3::Vec3;

/// What a frame needs to know about the session
pub struct FrameContext<'a> {
    pub session: &'a SessionContext,
    pub services: &'a Services,
    pub is_host: bool,
    pub spectating: bool,
}

/// Match-scoped state: the local world and the peer mesh
pub struct MatchRuntime {
    pub world: LocalWorld,
    pub transport: PeerTransport,
    finish_requested: bool,
}

impl MatchRuntime {
    pub fn new(world: LocalWorld, transport: PeerTransport) -> Self {
        Self {
            world,
            transport,
            finish_requested: false,
        }
    }

    /// Run one frame. Returns the uids of noise events to hand to the noise
    /// handler, the local player's own included.
    pub fn frame(
        &mut self,
        ctx: &FrameContext<'_>,
        input: &FrameInput,
        dt: f32,
        view: &mut dyn GameView,
    ) -> Vec<Uid> {
        let dt = dt.clamp(0.0, MAX_FRAME_DT);
        let mut noises = Vec::new();

        self.transport.pump_signals();

        if ctx.spectating {
            self.spectator_controls(input);
        } else {
            self.local_player(ctx, input, dt, view, &mut noises);
        }

        for (from, message) in self.transport.poll_messages() {
            match message {
                PeerMessage::Position(data) => {
                    self.world
                        .set_remote_target(&from, data.position, data.rotation.y);
                }
                PeerMessage::Noise(data) => noises.push(data.from),
                PeerMessage::AiPosition(position) => {
                    // the host simulates the AI itself
                    if !ctx.is_host {
                        self.world.ai.apply_broadcast(position);
                    }
                }
            }
        }
        self.world.interpolate_remotes();

        if ctx.is_host {
            self.step_ai(ctx, dt);
            self.check_match_end(ctx);
        }

        if ctx.spectating {
            self.follow_spectated(view);
        }

        noises
    }

    fn local_player(
        &mut self,
        ctx: &FrameContext<'_>,
        input: &FrameInput,
        dt: f32,
        view: &mut dyn GameView,
        noises: &mut Vec<Uid>,
    ) {
        let Some(avatar) = self.world.local_avatar_mut() else {
            return;
        };
        if !avatar.is_active() {
            return;
        }
        apply_movement(avatar, input, dt);
        let (position, yaw) = (avatar.position, avatar.rotation_y);

        if check_pickup(self.world.key_position(), position) {
            let uid = ctx.session.uid();
            let result = ctx
                .services
                .store
                .update(&ctx.session.room_id, &RoomPatch::key_found(uid.clone()));
            ctx.services.metrics.record_write(&result);
            match result {
                Ok(()) => {
                    info!("{} picked up the key", uid);
                    if self.world.remove_key() {
                        view.hide_key();
                    }
                }
                // key stays in the scene, so the next frame tries again
                Err(e) => warn!("Key pickup write failed: {}", e),
            }
        }

        self.transport.broadcast(&PeerMessage::position(position, yaw));

        if input.make_noise {
            let uid = ctx.session.uid().clone();
            self.transport.broadcast(&PeerMessage::noise(uid.clone()));
            noises.push(uid);
        }
    }

    fn spectator_controls(&mut self, input: &FrameInput) {
        if input.cycle_target {
            let pool_len = living_pool(&self.world).len();
            self.world.spectator.cycle(pool_len);
        }
        if input.toggle_camera {
            self.world.spectator.toggle_mode();
        }
    }

    fn follow_spectated(&mut self, view: &mut dyn GameView) {
        let pool = living_pool(&self.world);
        let pose = self
            .world
            .spectator
            .target(&pool)
            .and_then(|uid| self.world.avatar(uid))
            .map(|a| (a.position, a.rotation_y));
        let status = self.world.spectator.follow(&pool, move |_| pose);
        view.update_spectator(&status);
    }

    /// Position of the AI's target if it is still in play
    fn target_position(&self) -> Option<Vec3> {
        let target = self.world.ai.target_uid.as_deref()?;
        self.world
            .avatar(target)
            .filter(|a| a.is_active())
            .map(|a| a.position)
    }

    fn step_ai(&mut self, ctx: &FrameContext<'_>, dt: f32) {
        let target = self.target_position();
        let store = &ctx.services.store;
        let metrics = &ctx.services.metrics;
        let room_id = &ctx.session.room_id;

        match self.world.ai.step(dt, target) {
            AiStep::Idle => {}
            AiStep::Moved(position) => {
                self.transport.broadcast(&PeerMessage::AiPosition(position));
            }
            AiStep::Capture(uid) => {
                let result = capture::capture(store.as_ref(), room_id, &uid);
                metrics.record_write(&result);
                match result {
                    Ok(true) => {
                        Metrics::incr(&metrics.captures);
                        info!("AI caught {}", uid);
                    }
                    Ok(false) => debug!("{} was already caught", uid),
                    Err(e) => {
                        warn!("Capture write for {} failed: {}", uid, e);
                        self.world.ai.retry_capture();
                    }
                }
            }
            AiStep::TargetLost => {
                let patch = RoomPatch::go_dormant(self.world.ai.position);
                let result = store.update(room_id, &patch);
                metrics.record_write(&result);
                match result {
                    Ok(()) => info!("AI lost its target and went dormant"),
                    Err(e) => {
                        warn!("Dormancy write failed: {}", e);
                        self.world.ai.retry_dormancy();
                    }
                }
            }
        }
    }

    fn check_match_end(&mut self, ctx: &FrameContext<'_>) {
        if self.finish_requested || !is_match_over(&self.world) {
            return;
        }
        let result = ctx
            .services
            .store
            .update(&ctx.session.room_id, &RoomPatch::status(RoomStatus::Finished));
        ctx.services.metrics.record_write(&result);
        match result {
            Ok(()) => {
                self.finish_requested = true;
                Metrics::incr(&ctx.services.metrics.matches_finished);
                info!("Nobody left in play, match finished");
            }
            Err(e) => warn!("Match end write failed: {}", e),
        }
    }

    /// Release the peer mesh
    pub fn shutdown(&mut self) {
        self.transport.close();
    }
}
