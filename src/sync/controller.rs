//! Room synchronization controller.
//!
//! Every snapshot of the room document is fully re-derived into local state.
//! When the local player is the host, the same snapshot is checked against
//! the escalation rules and at most one corrective write per rule is issued.
//! Failed writes are logged and left for the next snapshot to repeat.

use std::sync::atomic::Ordering;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::game::constants::threat::HUNT_THRESHOLD;
use crate::game::state::{AiState, Room, RoomPatch, RoomStatus};
use crate::game::systems::capture::{apply_caught, record_noise};
use crate::game::systems::movement::FrameInput;
use crate::game::world::LocalWorld;
use crate::metrics::Metrics;
use crate::net::transport::PeerTransport;
use crate::store::{RoomSubscription, StoreError};
use crate::sync::context::{Services, SessionContext};
use crate::sync::runtime::{FrameContext, MatchRuntime};
use crate::sync::view::{GameView, Notice, WaitingRoom};

/// Where the session is in the room lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Subscribed, no snapshot seen yet
    Joining,
    Waiting,
    InGame,
    /// Unsubscribed and back in the lobby
    Left,
}

/// Host escalation rules for a snapshot. Only an in-game room with a
/// dormant AI can start a hunt: the key holder first, then the last noise
/// maker once threat reaches the threshold. Either target must be living.
pub fn evaluate_host_rules(room: &Room) -> Option<RoomPatch> {
    if room.status != RoomStatus::InGame || room.ai.state != AiState::Dormant {
        return None;
    }

    if room.key_found {
        return room
            .key_holder_uid
            .as_deref()
            .filter(|holder| room.is_living(holder))
            .map(RoomPatch::start_hunting);
    }

    if room.threat_level >= HUNT_THRESHOLD {
        return room
            .last_noise_maker
            .as_deref()
            .filter(|maker| room.is_living(maker))
            .map(RoomPatch::start_hunting);
    }

    None
}

pub struct RoomSyncController {
    ctx: SessionContext,
    services: Services,
    view: Box<dyn GameView>,
    subscription: Option<RoomSubscription>,
    phase: SessionPhase,
    is_host: bool,
    spectating: bool,
    key_notice_shown: bool,
    last_snapshot: Option<Room>,
    runtime: Option<MatchRuntime>,
}

impl RoomSyncController {
    /// Subscribe to the session's room
    pub fn attach(
        ctx: SessionContext,
        services: Services,
        view: Box<dyn GameView>,
    ) -> Result<Self, StoreError> {
        let subscription = services.store.subscribe(&ctx.room_id)?;
        Metrics::incr(&services.metrics.sessions_active);
        info!("{} following room {}", ctx.player.name, ctx.room_id);

        Ok(Self {
            ctx,
            services,
            view,
            subscription: Some(subscription),
            phase: SessionPhase::Joining,
            is_host: false,
            spectating: false,
            key_notice_shown: false,
            last_snapshot: None,
            runtime: None,
        })
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    pub fn is_spectating(&self) -> bool {
        self.spectating
    }

    pub fn has_left(&self) -> bool {
        self.phase == SessionPhase::Left
    }

    pub fn world(&self) -> Option<&LocalWorld> {
        self.runtime.as_ref().map(|r| &r.world)
    }

    pub fn transport(&self) -> Option<&PeerTransport> {
        self.runtime.as_ref().map(|r| &r.transport)
    }

    /// Latest document without waiting
    pub fn current_snapshot(&mut self) -> Option<Room> {
        self.subscription.as_mut().and_then(|s| s.current())
    }

    /// Wait for the next document change. `None` means the room is gone.
    /// Never resolves once the session has left.
    pub async fn next_change(&mut self) -> Option<Room> {
        match self.subscription.as_mut() {
            Some(sub) => {
                if sub.changed().await {
                    sub.current()
                } else {
                    None
                }
            }
            None => std::future::pending().await,
        }
    }

    /// Derive local state from a snapshot; `None` means the room no longer exists
    pub fn on_snapshot(&mut self, snapshot: Option<Room>) {
        if self.has_left() {
            return;
        }
        Metrics::incr(&self.services.metrics.snapshots_applied);

        let Some(room) = snapshot else {
            info!("Room {} no longer exists", self.ctx.room_id);
            self.force_leave();
            return;
        };
        if self.last_snapshot.as_ref() == Some(&room) {
            debug!("Snapshot unchanged, nothing to derive");
            return;
        }

        let uid = self.ctx.uid().clone();
        self.is_host = room.is_host(&uid);

        if room.is_caught(&uid) && !self.spectating {
            self.enter_spectator();
        }

        if room.status.is_terminal() {
            self.force_leave();
            return;
        }

        match room.status {
            RoomStatus::InGame if self.runtime.is_none() => self.start_match(&room),
            RoomStatus::Waiting => {
                self.phase = SessionPhase::Waiting;
                self.view
                    .show_waiting_room(&WaitingRoom::from_room(&room, &uid));
            }
            _ => {}
        }

        if room.key_found && !self.key_notice_shown {
            self.key_notice_shown = true;
            self.view.show_key_found(room.key_holder_uid.as_deref());
        }
        if room.key_found {
            if let Some(runtime) = self.runtime.as_mut() {
                if runtime.world.remove_key() {
                    self.view.hide_key();
                }
            }
        }

        if self.is_host {
            self.apply_host_rules(&room);
        }

        if let Some(runtime) = self.runtime.as_mut() {
            runtime.world.ai.reconcile(&room.ai);
            for hidden in apply_caught(&mut runtime.world, &room.caught_players) {
                info!("{} was caught", hidden);
                self.view.hide_player(&hidden);
            }
            for departed in runtime.world.sync_roster(&room.players) {
                info!("{} left the match", departed);
                self.view.hide_player(&departed);
            }
        }

        self.last_snapshot = Some(room);
    }

    fn start_match(&mut self, room: &Room) {
        let uid = self.ctx.uid().clone();
        let mut transport = PeerTransport::new(
            uid.clone(),
            self.ctx.room_id.clone(),
            self.services.relay.clone(),
            self.services.medium.clone(),
            self.services.metrics.clone(),
        );
        // peers stay unreachable; the match itself goes on
        if let Err(e) = transport.start(&room.players) {
            warn!("Peer transport failed to start: {}", e);
        }

        let mut world = LocalWorld::new(uid, &room.players, room.key_position);
        if self.spectating {
            let camera = world.local_avatar().map(|a| a.position).unwrap_or_default();
            world.spectator.enter(camera);
        }

        self.runtime = Some(MatchRuntime::new(world, transport));
        self.phase = SessionPhase::InGame;
        self.view.show_game(self.is_host);
        info!(
            "{} entered the match with {} player(s), host: {}",
            self.ctx.player.name,
            room.players.len(),
            self.is_host
        );
    }

    fn enter_spectator(&mut self) {
        self.spectating = true;
        if let Some(runtime) = self.runtime.as_mut() {
            let camera = runtime
                .world
                .local_avatar()
                .map(|a| a.position)
                .unwrap_or_default();
            runtime.world.spectator.enter(camera);
        }
        self.view.enter_spectator();
        info!("{} was caught and is now spectating", self.ctx.player.name);
    }

    fn apply_host_rules(&mut self, room: &Room) {
        let Some(patch) = evaluate_host_rules(room) else {
            return;
        };
        let result = self.services.store.update(&self.ctx.room_id, &patch);
        self.services.metrics.record_write(&result);
        match result {
            Ok(()) => {
                Metrics::incr(&self.services.metrics.hunts_started);
                if let Some(Some(target)) = &patch.ai_target_uid {
                    info!("AI is hunting {}", target);
                }
            }
            Err(e) => warn!("Hunt write failed, retrying on next snapshot: {}", e),
        }
    }

    /// Noise handler. Only the host accrues threat, and only while the AI
    /// is dormant.
    pub fn handle_noise(&mut self, from: &str) {
        if !self.is_host || self.has_left() {
            return;
        }
        let dormant = self
            .last_snapshot
            .as_ref()
            .map(|room| room.status == RoomStatus::InGame && room.ai.state == AiState::Dormant)
            .unwrap_or(false);
        if !dormant {
            return;
        }

        let result = record_noise(
            self.services.store.as_ref(),
            &self.ctx.room_id,
            from,
            self.ctx.threat_counting,
        );
        self.services.metrics.record_write(&result);
        match result {
            Ok(level) => {
                Metrics::incr(&self.services.metrics.noise_events);
                debug!("Noise from {}, threat now {}", from, level);
            }
            Err(e) => warn!("Threat write failed: {}", e),
        }
    }

    /// Advance the match by one frame
    pub fn frame(&mut self, dt: f32, input: &FrameInput) {
        if self.has_left() {
            return;
        }
        let Some(runtime) = self.runtime.as_mut() else {
            return;
        };
        let started = Instant::now();

        let ctx = FrameContext {
            session: &self.ctx,
            services: &self.services,
            is_host: self.is_host,
            spectating: self.spectating,
        };
        let noises = runtime.frame(&ctx, input, dt, self.view.as_mut());

        for from in noises {
            self.handle_noise(&from);
        }
        self.services.metrics.record_frame_time(started.elapsed());
    }

    /// Leave the room. Idempotent.
    pub fn leave(&mut self) {
        if self.has_left() {
            return;
        }
        self.phase = SessionPhase::Left;

        // caught players stay on the roster
        if !self.spectating {
            if let Err(e) = self
                .services
                .store
                .remove_player(&self.ctx.room_id, self.ctx.uid())
            {
                debug!("Could not remove {} from the roster: {}", self.ctx.uid(), e);
            }
        }

        self.subscription = None;
        if let Some(mut runtime) = self.runtime.take() {
            runtime.shutdown();
        }
        self.services
            .metrics
            .sessions_active
            .fetch_sub(1, Ordering::Relaxed);
        self.view.show_lobby();
        info!("{} left room {}", self.ctx.player.name, self.ctx.room_id);
    }

    fn force_leave(&mut self) {
        if self.has_left() {
            return;
        }
        Metrics::incr(&self.services.metrics.forced_leaves);
        self.view.show_notice(Notice::RoomClosed);
        self.leave();
    }
}

impl Drop for RoomSyncController {
    fn drop(&mut self) {
        self.leave();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::PlayerEntry;
    use crate::game::systems::capture::ThreatCounting;
    use crate::lobby::player::LocalPlayer;
    use crate::net::connection::LinkState;
    use crate::net::medium::LoopbackMedium;
    use crate::store::{MemoryStore, RoomStore};
    use crate::sync::view::{RecordingView, ViewEvent};
    use crate::util::vec3::Vec3;
    use std::sync::Arc;

    const DT: f32 = 1.0 / 60.0;

    struct Harness {
        store: Arc<MemoryStore>,
        services: Services,
    }

    impl Harness {
        fn new(players: &[&str]) -> Self {
            let store = Arc::new(MemoryStore::new());
            let mut room = Room::new(
                "r1".into(),
                "Hush".into(),
                PlayerEntry::new(players[0], players[0]),
                Vec3::new(8.0, 1.0, 8.0),
            );
            for uid in &players[1..] {
                room.players.push(PlayerEntry::new(*uid, *uid));
            }
            store.create_room(room).unwrap();
            let services = Services::in_process(
                store.clone(),
                Arc::new(LoopbackMedium::new()),
                Arc::new(Metrics::new()),
            );
            Self { store, services }
        }

        fn client(&self, uid: &str) -> (RoomSyncController, RecordingView) {
            let view = RecordingView::new();
            let ctx = SessionContext::new(LocalPlayer::new(uid), "r1".into(), ThreatCounting::Strict);
            let controller =
                RoomSyncController::attach(ctx, self.services.clone(), Box::new(view.clone())).unwrap();
            (controller, view)
        }

        fn room(&self) -> Room {
            self.store.fetch("r1").unwrap().unwrap()
        }

        fn start(&self) {
            self.store
                .update("r1", &RoomPatch::status(RoomStatus::InGame))
                .unwrap();
        }

        /// Deliver the current document to each controller
        fn sync(&self, controllers: &mut [&mut RoomSyncController]) {
            for c in controllers.iter_mut() {
                c.on_snapshot(self.store.fetch("r1").unwrap());
            }
        }
    }

    fn base_room() -> Room {
        let mut room = Room::new("r".into(), "Hush".into(), PlayerEntry::new("a", "A"), Vec3::ZERO);
        room.players.push(PlayerEntry::new("b", "B"));
        room.status = RoomStatus::InGame;
        room
    }

    #[test]
    fn test_rules_need_game_and_dormant_ai() {
        let mut room = base_room();
        room.threat_level = 9;
        room.last_noise_maker = Some("b".into());
        room.status = RoomStatus::Waiting;
        assert_eq!(evaluate_host_rules(&room), None);
        room.status = RoomStatus::InGame;
        room.ai.state = AiState::Hunting;
        assert_eq!(evaluate_host_rules(&room), None);
    }

    #[test]
    fn test_threat_rule_threshold() {
        let mut room = base_room();
        room.last_noise_maker = Some("b".into());
        room.threat_level = HUNT_THRESHOLD - 1;
        assert_eq!(evaluate_host_rules(&room), None);
        room.threat_level = HUNT_THRESHOLD;
        assert_eq!(evaluate_host_rules(&room), Some(RoomPatch::start_hunting("b")));
    }

    #[test]
    fn test_threat_rule_needs_living_maker() {
        let mut room = base_room();
        room.threat_level = 6;
        room.last_noise_maker = Some("b".into());
        room.caught_players.push("b".into());
        assert_eq!(evaluate_host_rules(&room), None);
        room.last_noise_maker = Some("gone".into());
        assert_eq!(evaluate_host_rules(&room), None);
    }

    #[test]
    fn test_key_rule_wins_over_threat() {
        let mut room = base_room();
        room.threat_level = 7;
        room.last_noise_maker = Some("b".into());
        room.key_found = true;
        room.key_holder_uid = Some("a".into());
        let patch = evaluate_host_rules(&room).unwrap();
        assert_eq!(patch.ai_target_uid, Some(Some("a".to_string())));
        assert_eq!(patch.threat_level, Some(0));
    }

    #[test]
    fn test_caught_key_holder_does_not_trigger() {
        let mut room = base_room();
        room.key_found = true;
        room.key_holder_uid = Some("a".into());
        room.caught_players.push("a".into());
        room.threat_level = 9;
        room.last_noise_maker = Some("b".into());
        assert_eq!(evaluate_host_rules(&room), None);
    }

    #[test]
    fn test_waiting_room_then_match_start() {
        let h = Harness::new(&["a", "b"]);
        let (mut a, view) = h.client("a");
        h.sync(&mut [&mut a]);
        assert_eq!(a.phase(), SessionPhase::Waiting);
        assert!(a.is_host());
        assert!(matches!(view.events()[0], ViewEvent::WaitingRoom(ref w) if w.can_start));

        h.start();
        h.sync(&mut [&mut a]);
        assert_eq!(a.phase(), SessionPhase::InGame);
        assert!(a.world().is_some());
        assert_eq!(view.count(|e| matches!(e, ViewEvent::Game { is_host: true })), 1);
    }

    #[test]
    fn test_scenario_threat_escalation() {
        let h = Harness::new(&["a", "b"]);
        let (mut a, _) = h.client("a");
        let (mut b, _) = h.client("b");
        h.start();
        h.sync(&mut [&mut a, &mut b]);

        for _ in 0..5 {
            a.handle_noise("b");
            // non-host handlers have no effect
            b.handle_noise("b");
            h.sync(&mut [&mut a, &mut b]);
        }

        let room = h.room();
        assert_eq!(room.ai.state, AiState::Hunting);
        assert_eq!(room.ai.target_uid.as_deref(), Some("b"));
        assert_eq!(room.threat_level, 0);
    }

    #[test]
    fn test_threat_counts_only_while_dormant() {
        let h = Harness::new(&["a", "b"]);
        let (mut a, _) = h.client("a");
        h.start();
        h.sync(&mut [&mut a]);
        a.handle_noise("b");
        h.sync(&mut [&mut a]);
        assert_eq!(h.room().threat_level, 1);

        h.store.update("r1", &RoomPatch::start_hunting("b")).unwrap();
        h.sync(&mut [&mut a]);
        a.handle_noise("b");
        assert_eq!(h.room().threat_level, 0);
    }

    #[test]
    fn test_scenario_key_pickup_triggers_hunt() {
        let h = Harness::new(&["a", "b"]);
        let (mut a, view) = h.client("a");
        h.start();
        h.store.increment_threat("r1", "b").unwrap();
        h.sync(&mut [&mut a]);

        h.store.update("r1", &RoomPatch::key_found("a")).unwrap();
        h.sync(&mut [&mut a]);

        let room = h.room();
        assert_eq!(room.ai.state, AiState::Hunting);
        assert_eq!(room.ai.target_uid.as_deref(), Some("a"));
        assert_eq!(room.threat_level, 0);
        assert!(a.world().unwrap().key_position().is_none());
        assert_eq!(view.count(|e| matches!(e, ViewEvent::KeyFound(Some(ref u)) if u == "a")), 1);
        assert_eq!(view.count(|e| matches!(e, ViewEvent::KeyHidden)), 1);
    }

    #[test]
    fn test_same_snapshot_twice_is_idempotent() {
        let h = Harness::new(&["a", "b"]);
        let (mut a, view) = h.client("a");
        h.start();
        h.store.update("r1", &RoomPatch::key_found("b")).unwrap();
        h.store.append_caught_if_absent("r1", "b").unwrap();
        let snapshot = h.room();

        a.on_snapshot(Some(snapshot.clone()));
        let writes = h.store.write_count();
        let events = view.events().len();
        a.on_snapshot(Some(snapshot));

        assert_eq!(h.store.write_count(), writes);
        assert_eq!(view.events().len(), events);
        assert_eq!(view.count(|e| matches!(e, ViewEvent::PlayerHidden(_))), 1);
    }

    #[test]
    fn test_failed_hunt_write_retried_on_next_snapshot() {
        let h = Harness::new(&["a", "b"]);
        let (mut a, _) = h.client("a");
        h.start();
        h.sync(&mut [&mut a]);

        h.store.update("r1", &RoomPatch::key_found("b")).unwrap();
        h.store.fail_next_writes(1);
        h.sync(&mut [&mut a]);
        assert_eq!(h.room().ai.state, AiState::Dormant);

        // any later change re-evaluates the same rule
        h.store.increment_threat("r1", "a").unwrap();
        h.sync(&mut [&mut a]);
        assert_eq!(h.room().ai.state, AiState::Hunting);
        assert_eq!(h.room().ai.target_uid.as_deref(), Some("b"));
    }

    #[test]
    fn test_scenario_capture_and_match_end() {
        let h = Harness::new(&["a", "b"]);
        let (mut a, a_view) = h.client("a");
        let (mut b, b_view) = h.client("b");
        h.start();
        h.sync(&mut [&mut a, &mut b]);
        for _ in 0..3 {
            a.frame(DT, &FrameInput::default());
            b.frame(DT, &FrameInput::default());
        }

        // b is the hunted target and the AI starts right next to b
        let b_pos = a.world().unwrap().avatar("b").unwrap().position;
        h.store.update("r1", &RoomPatch::start_hunting("b")).unwrap();
        h.store
            .update("r1", &RoomPatch { ai_position: Some(b_pos), ..Default::default() })
            .unwrap();
        h.sync(&mut [&mut a, &mut b]);
        a.runtime.as_mut().unwrap().world.ai.position = b_pos;

        a.frame(DT, &FrameInput::default());
        a.frame(DT, &FrameInput::default());
        assert_eq!(h.room().caught_players, vec!["b".to_string()]);

        h.sync(&mut [&mut a, &mut b]);
        assert!(b.is_spectating());
        assert_eq!(b_view.count(|e| matches!(e, ViewEvent::SpectatorEntered)), 1);
        assert!(!a.world().unwrap().avatar("b").unwrap().visible);
        assert!(!b.world().unwrap().avatar("b").unwrap().visible);
        assert_eq!(a_view.count(|e| matches!(e, ViewEvent::PlayerHidden(ref u) if u == "b")), 1);

        // target gone: host writes dormancy
        a.frame(DT, &FrameInput::default());
        assert_eq!(h.room().ai.state, AiState::Dormant);
        h.sync(&mut [&mut a, &mut b]);

        // host caught too: nobody is left and the host ends the match
        h.store.append_caught_if_absent("r1", "a").unwrap();
        h.sync(&mut [&mut a, &mut b]);
        a.frame(DT, &FrameInput::default());
        assert_eq!(h.room().status, RoomStatus::Finished);
        assert_eq!(h.room().caught_players.len(), 2);
    }

    #[test]
    fn test_scenario_finished_forces_single_leave() {
        let h = Harness::new(&["a", "b"]);
        let (mut a, _) = h.client("a");
        let (mut b, view) = h.client("b");
        h.start();
        h.sync(&mut [&mut a, &mut b]);
        for _ in 0..3 {
            a.frame(DT, &FrameInput::default());
            b.frame(DT, &FrameInput::default());
        }
        assert_eq!(b.transport().unwrap().link_state("a"), Some(LinkState::Open));

        h.store
            .update("r1", &RoomPatch::status(RoomStatus::Finished))
            .unwrap();
        h.sync(&mut [&mut b]);
        h.sync(&mut [&mut b]);
        b.leave();

        assert!(b.has_left());
        assert!(b.transport().is_none());
        assert_eq!(view.count(|e| matches!(e, ViewEvent::Lobby)), 1);
        assert_eq!(view.count(|e| matches!(e, ViewEvent::Notice(Notice::RoomClosed))), 1);
        assert_eq!(h.services.metrics.forced_leaves.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_deleted_room_forces_leave() {
        let h = Harness::new(&["a"]);
        let (mut a, view) = h.client("a");
        h.sync(&mut [&mut a]);
        h.store.delete_room("r1").unwrap();
        a.on_snapshot(None);
        assert!(a.has_left());
        assert_eq!(view.count(|e| matches!(e, ViewEvent::Notice(_))), 1);
    }

    #[test]
    fn test_leave_keeps_caught_players_on_roster() {
        let h = Harness::new(&["a", "b", "c"]);
        let (mut b, _) = h.client("b");
        let (mut c, _) = h.client("c");
        h.start();
        h.store.append_caught_if_absent("r1", "b").unwrap();
        h.sync(&mut [&mut b, &mut c]);

        b.leave();
        c.leave();
        c.leave();
        let room = h.room();
        assert!(room.has_player("b"));
        assert!(!room.has_player("c"));
    }

    #[test]
    fn test_departed_player_hidden() {
        let h = Harness::new(&["a", "b", "c"]);
        let (mut a, view) = h.client("a");
        h.start();
        h.sync(&mut [&mut a]);
        h.store.remove_player("r1", "c").unwrap();
        h.sync(&mut [&mut a]);

        let c = a.world().unwrap().avatar("c").unwrap();
        assert!(c.departed && !c.visible);
        assert_eq!(view.count(|e| matches!(e, ViewEvent::PlayerHidden(ref u) if u == "c")), 1);
    }

    #[tokio::test]
    async fn test_next_change_follows_store() {
        let h = Harness::new(&["a"]);
        let (mut a, _) = h.client("a");
        let first = a.current_snapshot();
        a.on_snapshot(first);

        h.store.increment_threat("r1", "a").unwrap();
        let next = a.next_change().await;
        assert_eq!(next.unwrap().threat_level, 1);
    }
}
