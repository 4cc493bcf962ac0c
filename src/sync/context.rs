use std::sync::Arc;

use crate::game::state::{RoomId, Uid};
use crate::game::systems::capture::ThreatCounting;
use crate::lobby::player::LocalPlayer;
use crate::metrics::Metrics;
use crate::net::medium::PeerMedium;
use crate::store::{RoomStore, SignalingRelay};

/// Who this session is and which room it follows. Built when a room is
/// entered and dropped when the session ends.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub player: LocalPlayer,
    pub room_id: RoomId,
    pub threat_counting: ThreatCounting,
}

impl SessionContext {
    pub fn new(player: LocalPlayer, room_id: RoomId, threat_counting: ThreatCounting) -> Self {
        Self {
            player,
            room_id,
            threat_counting,
        }
    }

    pub fn uid(&self) -> &Uid {
        &self.player.uid
    }
}

/// External collaborators a session talks to
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn RoomStore>,
    pub relay: Arc<dyn SignalingRelay>,
    pub medium: Arc<dyn PeerMedium>,
    pub metrics: Arc<Metrics>,
}

impl Services {
    pub fn new(
        store: Arc<dyn RoomStore>,
        relay: Arc<dyn SignalingRelay>,
        medium: Arc<dyn PeerMedium>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            relay,
            medium,
            metrics,
        }
    }

    /// One in-process backend serving as both store and relay
    pub fn in_process<S>(backend: Arc<S>, medium: Arc<dyn PeerMedium>, metrics: Arc<Metrics>) -> Self
    where
        S: RoomStore + SignalingRelay + 'static,
    {
        Self {
            store: backend.clone(),
            relay: backend,
            medium,
            metrics,
        }
    }
}
