//! Direct peer mesh for one match.
//!
//! One link per remote player in the roster snapshot taken at match start.
//! Links are negotiated over the signaling relay, never recreated, and a
//! link that fails is simply dropped: that peer's cosmetic updates are lost.

use std::sync::Arc;

use hashbrown::HashMap;
use tracing::{debug, info, warn};

use crate::game::state::{PlayerEntry, RoomId, Uid};
use crate::metrics::Metrics;
use crate::net::connection::{LinkRole, LinkState, PeerLink};
use crate::net::medium::PeerMedium;
use crate::net::protocol::{self, PeerMessage, ProtocolError};
use crate::net::signaling::{is_offerer, IceCandidate, SdpKind, Signal, SignalPayload};
use crate::store::{SignalCursor, SignalInbox, SignalingRelay, StoreError};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("Unknown peer")]
    UnknownPeer,
    #[error("Negotiation failed: {0}")]
    Negotiation(String),
    #[error("Channel closed")]
    ChannelClosed,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("Signaling failed: {0}")]
    Signaling(#[from] StoreError),
}

pub struct PeerTransport {
    local: Uid,
    room_id: RoomId,
    relay: Arc<dyn SignalingRelay>,
    medium: Arc<dyn PeerMedium>,
    metrics: Arc<Metrics>,
    links: HashMap<Uid, PeerLink>,
    inbox: Option<Box<dyn SignalInbox>>,
    closed: bool,
}

impl PeerTransport {
    pub fn new(
        local: Uid,
        room_id: RoomId,
        relay: Arc<dyn SignalingRelay>,
        medium: Arc<dyn PeerMedium>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            local,
            room_id,
            relay,
            medium,
            metrics,
            links: HashMap::new(),
            inbox: None,
            closed: false,
        }
    }

    /// Create a link for every other roster member. The lower uid of each
    /// pair publishes an offer; the other waits for it.
    pub fn start(&mut self, roster: &[PlayerEntry]) -> Result<(), TransportError> {
        if self.closed || self.inbox.is_some() {
            return Ok(());
        }

        // Offers published before this point must still reach us
        self.inbox = Some(self.relay.subscribe_signals(
            &self.room_id,
            &self.local,
            SignalCursor::Beginning,
        )?);

        for player in roster.iter().filter(|p| p.uid != self.local) {
            if self.links.contains_key(&player.uid) {
                continue;
            }
            let role = if is_offerer(&self.local, &player.uid) {
                LinkRole::Offerer
            } else {
                LinkRole::Answerer
            };
            let mut link = PeerLink::new(player.uid.clone(), role);

            if role == LinkRole::Offerer {
                if let Err(e) = self.send_offer(&mut link) {
                    warn!("Offer to {} failed: {}", player.uid, e);
                    self.release(&mut link);
                }
            }
            self.links.insert(player.uid.clone(), link);
        }

        info!(
            "Peer transport for {} started with {} link(s)",
            self.local,
            self.links.len()
        );
        Ok(())
    }

    fn send_offer(&self, link: &mut PeerLink) -> Result<(), TransportError> {
        let (handle, offer) = self.medium.create_offer()?;
        link.attach(handle);
        self.relay
            .publish(&self.room_id, Signal::sdp(&self.local, &link.remote, offer))?;
        self.send_candidates(link)
    }

    fn send_candidates(&self, link: &PeerLink) -> Result<(), TransportError> {
        let Some(handle) = link.handle else {
            return Ok(());
        };
        for candidate in self.medium.local_candidates(handle) {
            self.relay.publish(
                &self.room_id,
                Signal::candidate(&self.local, &link.remote, candidate),
            )?;
        }
        Ok(())
    }

    /// Process pending signals and pick up channels that opened
    pub fn pump_signals(&mut self) {
        if self.closed {
            return;
        }
        let signals = match self.inbox.as_mut() {
            Some(inbox) => inbox.drain(),
            None => return,
        };

        for signal in signals {
            let Some(mut link) = self.links.remove(&signal.from) else {
                debug!("Ignoring signal from {} outside the match roster", signal.from);
                continue;
            };
            if link.state != LinkState::Closed {
                if let Err(e) = self.handle_signal(&mut link, signal.payload) {
                    warn!("Negotiation with {} failed: {}", link.remote, e);
                    self.release(&mut link);
                }
            }
            self.links.insert(link.remote.clone(), link);
        }

        for link in self.links.values_mut() {
            if link.is_open() {
                continue;
            }
            let Some(handle) = link.handle else { continue };
            if let Some(channel) = self.medium.take_channel(handle) {
                link.open(channel);
                Metrics::incr(&self.metrics.peers_connected);
                info!("Peer channel {} <-> {} open", self.local, link.remote);
            }
        }
    }

    fn handle_signal(
        &self,
        link: &mut PeerLink,
        payload: SignalPayload,
    ) -> Result<(), TransportError> {
        match payload {
            SignalPayload::Sdp { sdp } => match (sdp.kind, link.role, link.state) {
                (SdpKind::Offer, LinkRole::Answerer, LinkState::AwaitingOffer) => {
                    let (handle, answer) = self.medium.accept_offer(&sdp)?;
                    link.attach(handle);
                    link.mark_connecting();
                    self.relay
                        .publish(&self.room_id, Signal::sdp(&self.local, &link.remote, answer))?;
                    self.send_candidates(link)?;
                    let pending: Vec<IceCandidate> = link.pending_candidates.drain(..).collect();
                    for candidate in &pending {
                        self.medium.add_candidate(handle, candidate)?;
                    }
                    Ok(())
                }
                (SdpKind::Answer, LinkRole::Offerer, LinkState::Offered) => {
                    let handle = link.handle.ok_or(TransportError::UnknownPeer)?;
                    self.medium.apply_answer(handle, &sdp)?;
                    link.mark_connecting();
                    Ok(())
                }
                (kind, role, state) => {
                    debug!(
                        "Ignoring {:?} from {} as {:?} in {:?}",
                        kind, link.remote, role, state
                    );
                    Ok(())
                }
            },
            SignalPayload::Candidate { candidate } => match link.handle {
                Some(handle) => self.medium.add_candidate(handle, &candidate),
                None => {
                    link.pending_candidates.push(candidate);
                    Ok(())
                }
            },
        }
    }

    fn release(&self, link: &mut PeerLink) {
        let was_open = link.is_open();
        if let Some(handle) = link.close() {
            self.medium.close(handle);
        }
        if was_open {
            self.metrics.peers_connected.fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
        }
    }

    /// Send to every open channel. A failed send drops that link.
    /// Returns how many peers the message went to.
    pub fn broadcast(&mut self, message: &PeerMessage) -> usize {
        if self.closed {
            return 0;
        }
        let text = match protocol::encode(message) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode {} message: {}", message.kind(), e);
                return 0;
            }
        };

        let mut sent = 0;
        let mut failed = Vec::new();
        for link in self.links.values_mut().filter(|l| l.is_open()) {
            let result = match &link.channel {
                Some(channel) => channel.send(text.clone()),
                None => Err(TransportError::ChannelClosed),
            };
            match result {
                Ok(()) => {
                    link.record_sent();
                    sent += 1;
                }
                Err(_) => failed.push(link.remote.clone()),
            }
        }

        for uid in failed {
            if let Some(mut link) = self.links.remove(&uid) {
                debug!("Peer {} unreachable, dropping link", uid);
                Metrics::incr(&self.metrics.peer_messages_dropped);
                self.release(&mut link);
                self.links.insert(uid, link);
            }
        }

        Metrics::add(&self.metrics.peer_messages_sent, sent);
        sent
    }

    /// Everything received since the last poll, tagged with the sender.
    /// Undecodable messages are skipped.
    pub fn poll_messages(&mut self) -> Vec<(Uid, PeerMessage)> {
        let mut out = Vec::new();
        if self.closed {
            return out;
        }

        for link in self.links.values_mut() {
            let Some(channel) = link.channel.as_mut() else { continue };
            let texts = channel.drain();
            link.record_received(texts.len());
            for text in texts {
                match protocol::decode(&text) {
                    Ok(message) => out.push((link.remote.clone(), message)),
                    Err(e) => {
                        debug!("Dropping message from {}: {}", link.remote, e);
                        Metrics::incr(&self.metrics.peer_messages_dropped);
                    }
                }
            }
        }

        Metrics::add(&self.metrics.peer_messages_received, out.len());
        out
    }

    pub fn link_state(&self, uid: &str) -> Option<LinkState> {
        self.links.get(uid).map(|l| l.state)
    }

    pub fn open_peers(&self) -> Vec<Uid> {
        let mut peers: Vec<Uid> = self
            .links
            .values()
            .filter(|l| l.is_open())
            .map(|l| l.remote.clone())
            .collect();
        peers.sort();
        peers
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Release every link and stop reading signals. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.inbox = None;
        let mut links: Vec<PeerLink> = self.links.drain().map(|(_, l)| l).collect();
        for link in links.iter_mut() {
            self.release(link);
        }
        info!("Peer transport for {} closed", self.local);
    }
}

impl Drop for PeerTransport {
    fn drop(&mut self) {
        self.close();
    }
}
