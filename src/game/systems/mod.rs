pub mod ai;
pub mod capture;
pub mod key;
pub mod movement;
pub mod spectator;
