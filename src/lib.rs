//! Hush Sync Library
//!
//! Coordination layer for a small multiplayer hide-and-seek game: a shared
//! room document as source of truth, one elected host driving the pursuit AI
//! and match end, and a peer mesh relaying per-frame positions.
//!
//! The `hush-sim` binary runs a whole match headless, every client in one
//! process against the in-memory store and loopback medium.

pub mod config;
pub mod game;
pub mod lobby;
pub mod metrics;
pub mod net;
pub mod sim;
pub mod store;
pub mod sync;
pub mod util;
