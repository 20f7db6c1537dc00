use std::path::PathBuf;
use std::str::FromStr;

use crate::game::constants::{food, pool, schedule};
use crate::game::systems::decay::DecayModel;
use crate::game::systems::movement::MoveStrategy;

/// Visualization engine configuration
#[derive(Debug, Clone)]
pub struct ViewConfig {
    /// Ticks per decay sweep
    pub decay_rows: u32,
    /// Frames between visibility refreshes
    pub visibility_refresh_frames: u32,
    /// Food map grid columns
    pub grid_columns: u32,
    /// Food map grid rows
    pub grid_rows: u32,
    /// Minimum on-screen food size in pixels
    pub min_visible_food_size: f32,
    /// Food at or below this value is evicted by the next sweep
    pub removal_threshold: f32,
    pub decay_model: DecayModel,
    /// Margin around the camera rectangle included in the visible window
    pub overscan: f32,
    /// Sprites constructed up-front per high-churn pool
    pub pool_prewarm: usize,
    /// Ticks an eaten food sprite takes to reach the head
    pub eat_animation_ticks: u32,
    pub move_strategy: MoveStrategy,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            decay_rows: schedule::DECAY_ROWS,
            visibility_refresh_frames: schedule::VISIBILITY_REFRESH_FRAMES,
            grid_columns: food::GRID_COLUMNS,
            grid_rows: food::GRID_ROWS,
            min_visible_food_size: food::MIN_VISIBLE_SIZE,
            removal_threshold: food::REMOVAL_THRESHOLD,
            decay_model: DecayModel::Linear,
            overscan: 0.0,
            pool_prewarm: pool::PREWARM,
            eat_animation_ticks: schedule::EAT_ANIMATION_TICKS,
            move_strategy: MoveStrategy::Snap,
        }
    }
}

impl ViewConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_value("DECAY_ROWS", |v: &u32| (1..=1024).contains(v), "1-1024") {
            config.decay_rows = v;
        }
        if let Some(v) = env_value("VISIBILITY_REFRESH_FRAMES", |v: &u32| *v > 0, "> 0") {
            config.visibility_refresh_frames = v;
        }
        if let Some(v) = env_value("FOOD_GRID_COLUMNS", |v: &u32| (1..=4096).contains(v), "1-4096") {
            config.grid_columns = v;
        }
        if let Some(v) = env_value("FOOD_GRID_ROWS", |v: &u32| (1..=4096).contains(v), "1-4096") {
            config.grid_rows = v;
        }
        if let Some(v) = env_value("MIN_VISIBLE_FOOD_SIZE", |v: &f32| v.is_finite() && *v >= 0.0, ">= 0") {
            config.min_visible_food_size = v;
        }
        if let Some(v) = env_value("FOOD_REMOVAL_THRESHOLD", |v: &f32| v.is_finite(), "finite") {
            config.removal_threshold = v;
        }
        if let Ok(raw) = std::env::var("FOOD_DECAY_MODEL") {
            match DecayModel::parse(&raw) {
                Some(model) => config.decay_model = model,
                None => tracing::warn!("Invalid FOOD_DECAY_MODEL '{}', using default", raw),
            }
        }
        if let Some(v) = env_value("VIEW_OVERSCAN", |v: &f32| v.is_finite() && *v >= 0.0, ">= 0") {
            config.overscan = v;
        }
        if let Some(v) = env_value("POOL_PREWARM", |v: &usize| *v <= 1_000_000, "<= 1000000") {
            config.pool_prewarm = v;
        }
        if let Some(v) = env_value("EAT_ANIMATION_TICKS", |v: &u32| *v > 0, "> 0") {
            config.eat_animation_ticks = v;
        }
        if let Ok(raw) = std::env::var("MOVE_STRATEGY") {
            match raw.trim().to_ascii_lowercase().as_str() {
                "snap" => config.move_strategy = MoveStrategy::Snap,
                "smooth" => {
                    let blend = env_value("MOVE_BLEND", |v: &f32| *v > 0.0 && *v <= 1.0, "in (0, 1]")
                        .unwrap_or(0.5);
                    config.move_strategy = MoveStrategy::Smooth { blend };
                }
                _ => tracing::warn!("Invalid MOVE_STRATEGY '{}', using default", raw),
            }
        }

        config
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.decay_rows == 0 {
            return Err("decay_rows must be at least 1".to_string());
        }
        if self.visibility_refresh_frames == 0 {
            return Err("visibility_refresh_frames must be at least 1".to_string());
        }
        if self.grid_columns == 0 || self.grid_rows == 0 {
            return Err("food grid must have at least one column and row".to_string());
        }
        if !self.min_visible_food_size.is_finite() || self.min_visible_food_size < 0.0 {
            return Err("min_visible_food_size must be finite and >= 0".to_string());
        }
        if !self.overscan.is_finite() || self.overscan < 0.0 {
            return Err("overscan must be finite and >= 0".to_string());
        }
        if self.eat_animation_ticks == 0 {
            return Err("eat_animation_ticks must be at least 1".to_string());
        }
        if let MoveStrategy::Smooth { blend } = self.move_strategy {
            if !(blend > 0.0 && blend <= 1.0) {
                return Err("smooth move blend must be in (0, 1]".to_string());
            }
        }
        Ok(())
    }
}

/// Frame loop and feed configuration for the binary
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Rendered frames per second
    pub frame_rate: u32,
    pub event_buffer_capacity: usize,
    /// Port of the metrics endpoint
    pub metrics_port: u16,
    /// JSON-lines replay to play back instead of the synthetic feed
    pub replay_path: Option<PathBuf>,
    pub feed_seed: u64,
    pub feed_bots: usize,
    pub feed_food: usize,
    /// Side length of the square synthetic world
    pub feed_world_size: f32,
    pub screen_width: f32,
    pub screen_height: f32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            frame_rate: 60,
            event_buffer_capacity: 4096,
            metrics_port: 9090,
            replay_path: None,
            feed_seed: 42,
            feed_bots: 20,
            feed_food: 2000,
            feed_world_size: 4096.0,
            screen_width: 1280.0,
            screen_height: 720.0,
        }
    }
}

impl RunnerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_value("FRAME_RATE", |v: &u32| (1..=240).contains(v), "1-240") {
            config.frame_rate = v;
        }
        if let Some(v) = env_value("EVENT_BUFFER_CAPACITY", |v: &usize| *v > 0, "> 0") {
            config.event_buffer_capacity = v;
        }
        if let Some(v) = env_value("METRICS_PORT", |v: &u16| *v > 0, "> 0") {
            config.metrics_port = v;
        }
        if let Ok(path) = std::env::var("REPLAY_PATH") {
            config.replay_path = Some(PathBuf::from(path));
        }
        if let Some(v) = env_value("FEED_SEED", |_: &u64| true, "an integer") {
            config.feed_seed = v;
        }
        if let Some(v) = env_value("FEED_BOTS", |v: &usize| *v <= 10_000, "<= 10000") {
            config.feed_bots = v;
        }
        if let Some(v) = env_value("FEED_FOOD", |v: &usize| *v <= 1_000_000, "<= 1000000") {
            config.feed_food = v;
        }
        if let Some(v) = env_value("FEED_WORLD_SIZE", |v: &f32| v.is_finite() && *v > 0.0, "> 0") {
            config.feed_world_size = v;
        }
        if let Some(v) = env_value("SCREEN_WIDTH", |v: &f32| v.is_finite() && *v > 0.0, "> 0") {
            config.screen_width = v;
        }
        if let Some(v) = env_value("SCREEN_HEIGHT", |v: &f32| v.is_finite() && *v > 0.0, "> 0") {
            config.screen_height = v;
        }

        config
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.frame_rate == 0 {
            return Err("frame_rate must be at least 1".to_string());
        }
        if self.event_buffer_capacity == 0 {
            return Err("event_buffer_capacity must be at least 1".to_string());
        }
        if self.metrics_port == 0 {
            return Err("metrics_port cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Read and parse an environment variable, warning and returning `None`
/// when it is unparseable or rejected by `accept`
fn env_value<T, F>(name: &str, accept: F, requirement: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&T) -> bool,
{
    let raw = std::env::var(name).ok()?;
    parse_value(name, &raw, accept, requirement)
}

fn parse_value<T, F>(name: &str, raw: &str, accept: F, requirement: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&T) -> bool,
{
    match raw.trim().parse::<T>() {
        Ok(parsed) if accept(&parsed) => Some(parsed),
        Ok(_) => {
            tracing::warn!("{} must be {}, using default", name, requirement);
            None
        }
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", name, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ViewConfig::default();
        assert_eq!(config.decay_rows, 16);
        assert_eq!(config.visibility_refresh_frames, 25);
        assert_eq!(config.grid_columns, 64);
        assert_eq!(config.grid_rows, 64);
        assert_eq!(config.min_visible_food_size, 0.5);
        assert_eq!(config.decay_model, DecayModel::Linear);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_or_default() {
        let config = ViewConfig::load_or_default();
        assert!(config.decay_rows > 0);

        let runner = RunnerConfig::load_or_default();
        assert!(runner.frame_rate > 0);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ViewConfig::default();
        config.visibility_refresh_frames = 0;
        assert!(config.validate().is_err());

        let mut config = ViewConfig::default();
        config.move_strategy = MoveStrategy::Smooth { blend: 1.5 };
        assert!(config.validate().is_err());

        let mut runner = RunnerConfig::default();
        runner.metrics_port = 0;
        assert!(runner.validate().is_err());
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("X", "16", |v: &u32| *v > 0, "> 0"), Some(16));
        assert_eq!(parse_value("X", " 0 ", |v: &u32| *v > 0, "> 0"), None);
        assert_eq!(parse_value("X", "abc", |_: &u32| true, "any"), None);
        assert_eq!(parse_value("X", "0.25", |v: &f32| *v >= 0.0, ">= 0"), Some(0.25));
    }
}
