//! Lobby actions a user takes outside of a match
//!
//! Creating, listing, joining and starting rooms against the room store.

pub mod manager;
pub mod player;
