//! Async driver for one client session: room-state notifications and the
//! frame ticker feed the same controller from one task.

use std::time::Duration;

use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::game::systems::movement::FrameInput;
use crate::game::world::LocalWorld;
use crate::sync::controller::RoomSyncController;

/// Supplies per-frame input for the local player
pub trait InputSource: Send {
    /// `world` is `None` until the match has started
    fn sample(&mut self, world: Option<&LocalWorld>, spectating: bool, dt: f32) -> FrameInput;
}

/// Input source that never does anything
#[derive(Debug, Default, Clone, Copy)]
pub struct IdleInput;

impl InputSource for IdleInput {
    fn sample(&mut self, _world: Option<&LocalWorld>, _spectating: bool, _dt: f32) -> FrameInput {
        FrameInput::default()
    }
}

/// How a session ended
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub uid: String,
    pub frames: u64,
    pub snapshots: u64,
    /// The room finished or disappeared under us
    pub forced: bool,
    pub timed_out: bool,
    pub was_caught: bool,
}

/// Run a session until the room closes or `timeout` elapses
pub async fn run_session(
    mut controller: RoomSyncController,
    mut input: impl InputSource,
    frame_interval: Duration,
    timeout: Duration,
) -> SessionReport {
    let mut report = SessionReport {
        uid: controller.context().uid().clone(),
        ..Default::default()
    };

    let initial = controller.current_snapshot();
    controller.on_snapshot(initial);
    report.snapshots += 1;

    let mut ticker = interval(frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let mut last_frame = Instant::now();

    while !controller.has_left() {
        tokio::select! {
            change = controller.next_change() => {
                report.snapshots += 1;
                controller.on_snapshot(change);
                if controller.has_left() {
                    report.forced = true;
                }
            }
            _ = ticker.tick() => {
                let now = Instant::now();
                let dt = now.duration_since(last_frame).as_secs_f32();
                last_frame = now;

                let frame_input = input.sample(controller.world(), controller.is_spectating(), dt);
                controller.frame(dt, &frame_input);
                report.frames += 1;
            }
            _ = &mut deadline => {
                warn!("{} timed out after {:?}", report.uid, timeout);
                report.timed_out = true;
                controller.leave();
            }
        }
        report.was_caught |= controller.is_spectating();
    }

    debug!("{} session loop exited after {} frame(s)", report.uid, report.frames);
    info!(
        "{} finished: caught={}, forced={}, timed_out={}",
        report.uid, report.was_caught, report.forced, report.timed_out
    );
    report
}
