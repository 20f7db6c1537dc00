pub mod camera;
pub mod pool;
pub mod resources;
