//! Room synchronization: snapshot derivation, host authority and the
//! per-session loop.

pub mod context;
pub mod controller;
pub mod runtime;
pub mod session;
pub mod view;
