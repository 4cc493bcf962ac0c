use std::time::Instant;

use crate::game::state::Uid;
use crate::net::medium::{ConnectionHandle, DataChannel};
use crate::net::signaling::IceCandidate;

/// Link state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Waiting for the remote offer
    AwaitingOffer,
    /// Offer sent, waiting for the answer
    Offered,
    /// Descriptions exchanged, waiting for the channel to open
    Connecting,
    /// Data channel open
    Open,
    /// Released or failed, never reopened
    Closed,
}

/// Which side of the pair opens the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRole {
    Offerer,
    Answerer,
}

/// One direct connection to a remote peer
#[derive(Debug)]
pub struct PeerLink {
    pub remote: Uid,
    pub role: LinkRole,
    pub state: LinkState,
    pub handle: Option<ConnectionHandle>,
    pub channel: Option<DataChannel>,
    /// Remote candidates that arrived before the offer
    pub pending_candidates: Vec<IceCandidate>,
    pub created_at: Instant,
    pub opened_at: Option<Instant>,
    pub messages_sent: u64,
    pub messages_received: u64,
}

impl PeerLink {
    pub fn new(remote: Uid, role: LinkRole) -> Self {
        Self {
            remote,
            role,
            state: match role {
                LinkRole::Offerer => LinkState::Offered,
                LinkRole::Answerer => LinkState::AwaitingOffer,
            },
            handle: None,
            channel: None,
            pending_candidates: Vec::new(),
            created_at: Instant::now(),
            opened_at: None,
            messages_sent: 0,
            messages_received: 0,
        }
    }

    pub fn attach(&mut self, handle: ConnectionHandle) {
        self.handle = Some(handle);
    }

    /// Remote description is in place
    pub fn mark_connecting(&mut self) {
        if self.state != LinkState::Closed {
            self.state = LinkState::Connecting;
        }
    }

    pub fn open(&mut self, channel: DataChannel) {
        if self.state == LinkState::Closed {
            return;
        }
        self.channel = Some(channel);
        self.state = LinkState::Open;
        self.opened_at = Some(Instant::now());
    }

    pub fn is_open(&self) -> bool {
        self.state == LinkState::Open
    }

    /// Drop the channel. Safe to call more than once.
    pub fn close(&mut self) -> Option<ConnectionHandle> {
        self.channel = None;
        self.pending_candidates.clear();
        self.state = LinkState::Closed;
        self.handle.take()
    }

    pub fn record_sent(&mut self) {
        self.messages_sent += 1;
    }

    pub fn record_received(&mut self, count: usize) {
        self.messages_received += count as u64;
    }

    /// Time from creation until the channel opened
    pub fn setup_time(&self) -> Option<std::time::Duration> {
        self.opened_at.map(|t| t.duration_since(self.created_at))
    }
}
