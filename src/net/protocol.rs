//! Typed events delivered by the transport, and their codecs
//!
//! Message shapes are owned by the simulation; this module only mirrors them
//! so that replays and tests can encode and decode event streams.

use serde::{Deserialize, Serialize};

use crate::game::constants::snake::DEFAULT_SEGMENT_RADIUS;
use crate::game::state::{FoodId, SnakeId};
use crate::util::vec2::Vec2;

/// Snake description carried by snapshots and spawn events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotDescriptor {
    pub id: SnakeId,
    /// Persistent database id of the bot's owner
    #[serde(default)]
    pub db_id: Option<u64>,
    pub name: String,
    /// RGB color
    #[serde(default = "default_color")]
    pub color: u32,
    #[serde(default)]
    pub mass: f32,
    #[serde(default = "default_segment_radius")]
    pub segment_radius: f32,
    /// Body segment positions, head first
    #[serde(default)]
    pub segments: Vec<Vec2>,
}

fn default_color() -> u32 {
    0xFFFFFF
}

fn default_segment_radius() -> f32 {
    DEFAULT_SEGMENT_RADIUS
}

impl BotDescriptor {
    pub fn new(id: SnakeId, name: impl Into<String>) -> Self {
        Self {
            id,
            db_id: None,
            name: name.into(),
            color: default_color(),
            mass: 0.0,
            segment_radius: default_segment_radius(),
            segments: Vec::new(),
        }
    }
}

/// Food particle description
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FoodSpawn {
    pub id: FoodId,
    pub position: Vec2,
    pub value: f32,
}

impl FoodSpawn {
    pub fn new(id: FoodId, x: f32, y: f32, value: f32) -> Self {
        Self {
            id,
            position: Vec2::new(x, y),
            value,
        }
    }
}

/// Full authoritative world state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub bots: Vec<BotDescriptor>,
    pub food: Vec<FoodSpawn>,
}

/// Events consumed by the visualization, in arrival order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ViewEvent {
    /// World size and food decay rate; resets all food state
    WorldInfo {
        world_size_x: f32,
        world_size_y: f32,
        food_decay_rate: f32,
    },
    /// Full bot and food lists
    WorldUpdate(WorldSnapshot),
    /// Simulation heartbeat
    Tick { frame_id: u64 },
    BotSpawn(BotDescriptor),
    BotKilled { killer_id: SnakeId, victim_id: SnakeId },
    FoodSpawn(FoodSpawn),
    FoodConsumed { food_id: FoodId, consumer_id: SnakeId },
    FoodDecayed { food_id: FoodId },
    /// Legacy full-body movement payload
    BotMoved {
        bot_id: SnakeId,
        segments: Vec<Vec2>,
        length: f32,
        segment_radius: f32,
    },
    /// Incremental head movement payload
    BotMoveHead {
        bot_id: SnakeId,
        mass: f32,
        positions: Vec<Vec2>,
    },
}

impl ViewEvent {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ViewEvent::WorldInfo { .. } => "world_info",
            ViewEvent::WorldUpdate(_) => "world_update",
            ViewEvent::Tick { .. } => "tick",
            ViewEvent::BotSpawn(_) => "bot_spawn",
            ViewEvent::BotKilled { .. } => "bot_killed",
            ViewEvent::FoodSpawn(_) => "food_spawn",
            ViewEvent::FoodConsumed { .. } => "food_consumed",
            ViewEvent::FoodDecayed { .. } => "food_decayed",
            ViewEvent::BotMoved { .. } => "bot_moved",
            ViewEvent::BotMoveHead { .. } => "bot_move_head",
        }
    }
}

/// Encode an event using bincode
/// Uses legacy config for fixed-size integers
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(message, bincode::config::legacy())
        .map_err(|e| EncodeError(e.to_string()))
}

/// Decode an event using bincode
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::legacy())
        .map(|(msg, _)| msg)
        .map_err(|e| DecodeError(e.to_string()))
}

/// Decode one JSON-encoded event (replay files hold one per line)
pub fn decode_json_line(line: &str) -> Result<ViewEvent, DecodeError> {
    serde_json::from_str(line).map_err(|e| DecodeError(e.to_string()))
}

/// Encode one event as a single JSON line (no trailing newline)
pub fn encode_json_line(event: &ViewEvent) -> Result<String, EncodeError> {
    serde_json::to_string(event).map_err(|e| EncodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);
