pub mod decay;
pub mod movement;
