pub mod constants;
pub mod spatial;
pub mod state;
pub mod systems;
