//! Peer-to-peer side of a match
//!
//! Small typed messages over one direct channel per peer pair, negotiated
//! through the signaling relay.

pub mod connection;
pub mod medium;
pub mod protocol;
pub mod signaling;
pub mod transport;
