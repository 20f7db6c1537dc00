//! Arena View
//!
//! Client-side reconciliation core for a snake arena visualization: mirrors
//! the authoritative event stream into pooled sprites, a spatial food index
//! and a batched food decay schedule.

pub mod config;
pub mod game;
pub mod metrics;
pub mod net;
pub mod render;
pub mod util;
pub mod visualization;
