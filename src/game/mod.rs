pub mod constants;
pub mod state;
pub mod systems;
pub mod world;
