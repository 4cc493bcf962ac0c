//! Peer connection negotiation, abstracted from any particular stack.
//!
//! The transport drives a medium through offer, answer and candidate
//! exchange; once both ends have a remote description and at least one
//! remote candidate the data channel opens. `LoopbackMedium` implements this
//! for peers living in the same process.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::net::signaling::{IceCandidate, SdpKind, SessionDescription};
use crate::net::transport::TransportError;

/// Opaque handle to one connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle(pub u64);

/// Bidirectional text channel between two peers
#[derive(Debug)]
pub struct DataChannel {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl DataChannel {
    /// Two connected ends
    pub fn pair() -> (DataChannel, DataChannel) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            DataChannel { tx: a_tx, rx: a_rx },
            DataChannel { tx: b_tx, rx: b_rx },
        )
    }

    pub fn send(&self, text: String) -> Result<(), TransportError> {
        self.tx.send(text).map_err(|_| TransportError::ChannelClosed)
    }

    /// Everything received so far, without waiting
    pub fn drain(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(text) = self.rx.try_recv() {
            out.push(text);
        }
        out
    }

    /// False once the remote end is dropped
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

pub trait PeerMedium: Send + Sync {
    /// Start an outgoing connection
    fn create_offer(&self) -> Result<(ConnectionHandle, SessionDescription), TransportError>;

    /// Answer a remote offer
    fn accept_offer(
        &self,
        offer: &SessionDescription,
    ) -> Result<(ConnectionHandle, SessionDescription), TransportError>;

    /// Complete an outgoing connection with the remote answer
    fn apply_answer(
        &self,
        handle: ConnectionHandle,
        answer: &SessionDescription,
    ) -> Result<(), TransportError>;

    /// Candidates to send to the remote side
    fn local_candidates(&self, handle: ConnectionHandle) -> Vec<IceCandidate>;

    fn add_candidate(
        &self,
        handle: ConnectionHandle,
        candidate: &IceCandidate,
    ) -> Result<(), TransportError>;

    /// Hands out the data channel once, when the connection is open
    fn take_channel(&self, handle: ConnectionHandle) -> Option<DataChannel>;

    /// Release the connection. Unknown handles are ignored.
    fn close(&self, handle: ConnectionHandle);
}

struct LoopbackConn {
    token: String,
    remote_description: bool,
    remote_candidates: usize,
    channel: Option<DataChannel>,
}

impl LoopbackConn {
    fn is_connected(&self) -> bool {
        self.remote_description && self.remote_candidates > 0
    }
}

#[derive(Default)]
struct LoopbackState {
    conns: HashMap<ConnectionHandle, LoopbackConn>,
    /// Answerer ends waiting for `accept_offer`, by offer token
    pending: HashMap<String, DataChannel>,
}

/// Medium for peers sharing one process
#[derive(Default)]
pub struct LoopbackMedium {
    state: Mutex<LoopbackState>,
    next_handle: AtomicU64,
}

const OFFER_PREFIX: &str = "loopback-offer:";
const ANSWER_PREFIX: &str = "loopback-answer:";

impl LoopbackMedium {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&self) -> ConnectionHandle {
        ConnectionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Connections not yet closed
    pub fn open_connections(&self) -> usize {
        self.state.lock().conns.len()
    }
}

impl PeerMedium for LoopbackMedium {
    fn create_offer(&self) -> Result<(ConnectionHandle, SessionDescription), TransportError> {
        let token = Uuid::new_v4().to_string();
        let (local, remote) = DataChannel::pair();
        let handle = self.allocate();

        let mut state = self.state.lock();
        state.pending.insert(token.clone(), remote);
        state.conns.insert(
            handle,
            LoopbackConn {
                token: token.clone(),
                remote_description: false,
                remote_candidates: 0,
                channel: Some(local),
            },
        );

        Ok((handle, SessionDescription::offer(format!("{OFFER_PREFIX}{token}"))))
    }

    fn accept_offer(
        &self,
        offer: &SessionDescription,
    ) -> Result<(ConnectionHandle, SessionDescription), TransportError> {
        if offer.kind != SdpKind::Offer {
            return Err(TransportError::Negotiation("expected an offer".into()));
        }
        let token = offer
            .sdp
            .strip_prefix(OFFER_PREFIX)
            .ok_or_else(|| TransportError::Negotiation("unrecognized offer".into()))?;

        let mut state = self.state.lock();
        let channel = state
            .pending
            .remove(token)
            .ok_or_else(|| TransportError::Negotiation("offer already answered".into()))?;
        let handle = self.allocate();
        state.conns.insert(
            handle,
            LoopbackConn {
                token: token.to_string(),
                remote_description: true,
                remote_candidates: 0,
                channel: Some(channel),
            },
        );

        Ok((handle, SessionDescription::answer(format!("{ANSWER_PREFIX}{token}"))))
    }

    fn apply_answer(
        &self,
        handle: ConnectionHandle,
        answer: &SessionDescription,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        let conn = state
            .conns
            .get_mut(&handle)
            .ok_or(TransportError::UnknownPeer)?;
        let matches = answer.kind == SdpKind::Answer
            && answer.sdp.strip_prefix(ANSWER_PREFIX) == Some(conn.token.as_str());
        if !matches {
            return Err(TransportError::Negotiation("answer does not match offer".into()));
        }
        conn.remote_description = true;
        Ok(())
    }

    fn local_candidates(&self, handle: ConnectionHandle) -> Vec<IceCandidate> {
        vec![IceCandidate {
            candidate: format!(
                "candidate:{} 1 udp 2130706431 127.0.0.1 {} typ host",
                handle.0,
                40000 + handle.0 % 20000
            ),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
        }]
    }

    fn add_candidate(
        &self,
        handle: ConnectionHandle,
        candidate: &IceCandidate,
    ) -> Result<(), TransportError> {
        if !candidate.candidate.starts_with("candidate:") {
            return Err(TransportError::Negotiation("malformed candidate".into()));
        }
        let mut state = self.state.lock();
        let conn = state
            .conns
            .get_mut(&handle)
            .ok_or(TransportError::UnknownPeer)?;
        conn.remote_candidates += 1;
        Ok(())
    }

    fn take_channel(&self, handle: ConnectionHandle) -> Option<DataChannel> {
        let mut state = self.state.lock();
        let conn = state.conns.get_mut(&handle)?;
        if conn.is_connected() {
            conn.channel.take()
        } else {
            None
        }
    }

    fn close(&self, handle: ConnectionHandle) {
        let mut state = self.state.lock();
        if let Some(conn) = state.conns.remove(&handle) {
            state.pending.remove(&conn.token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(medium: &LoopbackMedium) -> (DataChannel, DataChannel) {
        let (offerer, offer) = medium.create_offer().unwrap();
        let (answerer, answer) = medium.accept_offer(&offer).unwrap();
        medium.apply_answer(offerer, &answer).unwrap();
        for c in medium.local_candidates(offerer) {
            medium.add_candidate(answerer, &c).unwrap();
        }
        for c in medium.local_candidates(answerer) {
            medium.add_candidate(offerer, &c).unwrap();
        }
        (
            medium.take_channel(offerer).unwrap(),
            medium.take_channel(answerer).unwrap(),
        )
    }

    #[test]
    fn test_negotiated_channel_carries_text() {
        let medium = LoopbackMedium::new();
        let (a, mut b) = connect(&medium);
        a.send("hello".into()).unwrap();
        a.send("again".into()).unwrap();
        assert_eq!(b.drain(), vec!["hello", "again"]);
        assert!(b.drain().is_empty());
    }

    #[test]
    fn test_channel_waits_for_candidates() {
        let medium = LoopbackMedium::new();
        let (offerer, offer) = medium.create_offer().unwrap();
        let (answerer, answer) = medium.accept_offer(&offer).unwrap();
        medium.apply_answer(offerer, &answer).unwrap();
        assert!(medium.take_channel(offerer).is_none());
        assert!(medium.take_channel(answerer).is_none());
    }

    #[test]
    fn test_offer_answered_once() {
        let medium = LoopbackMedium::new();
        let (_, offer) = medium.create_offer().unwrap();
        medium.accept_offer(&offer).unwrap();
        assert!(matches!(
            medium.accept_offer(&offer),
            Err(TransportError::Negotiation(_))
        ));
    }

    #[test]
    fn test_mismatched_answer_rejected() {
        let medium = LoopbackMedium::new();
        let (first, _) = medium.create_offer().unwrap();
        let (_, other_offer) = medium.create_offer().unwrap();
        let (_, other_answer) = medium.accept_offer(&other_offer).unwrap();
        assert!(medium.apply_answer(first, &other_answer).is_err());
    }

    #[test]
    fn test_dropping_one_end_closes_channel() {
        let medium = LoopbackMedium::new();
        let (a, b) = connect(&medium);
        drop(b);
        assert!(!a.is_open());
        assert_eq!(a.send("lost".into()), Err(TransportError::ChannelClosed));
    }

    #[test]
    fn test_close_is_idempotent() {
        let medium = LoopbackMedium::new();
        let (handle, _) = medium.create_offer().unwrap();
        medium.close(handle);
        medium.close(handle);
        assert_eq!(medium.open_connections(), 0);
    }
}
