/// World defaults used until the first world-info event arrives
pub mod world {
    /// Default world width in world units
    pub const DEFAULT_SIZE_X: f32 = 1024.0;
    /// Default world height in world units
    pub const DEFAULT_SIZE_Y: f32 = 1024.0;
    /// Default food decay rate (value lost per tick)
    pub const DEFAULT_FOOD_DECAY_RATE: f32 = 0.001;
}

/// Food particle grid and visibility constants
/// All values can be overridden via environment variables (see `ViewConfig`)
pub mod food {
    /// Number of grid columns covering the world
    /// ENV: FOOD_GRID_COLUMNS
    pub const GRID_COLUMNS: u32 = 64;
    /// Number of grid rows covering the world
    /// ENV: FOOD_GRID_ROWS
    pub const GRID_ROWS: u32 = 64;
    /// Initial capacity of each grid cell bucket
    pub const CELL_INITIAL_CAPACITY: usize = 8;
    /// Food whose on-screen size falls below this (in pixels) is hidden.
    /// Threshold in world value units is `MIN_VISIBLE_SIZE / zoom`
    /// ENV: MIN_VISIBLE_FOOD_SIZE
    pub const MIN_VISIBLE_SIZE: f32 = 0.5;
    /// Food at or below this value is flagged for collection by the decay sweep
    /// ENV: FOOD_REMOVAL_THRESHOLD
    pub const REMOVAL_THRESHOLD: f32 = 0.0;
}

/// Frame and tick scheduling constants
pub mod schedule {
    /// Number of round-robin decay rows. A full decay sweep runs once every
    /// `DECAY_ROWS` ticks and applies `DECAY_ROWS` ticks worth of decay.
    /// ENV: DECAY_ROWS
    pub const DECAY_ROWS: u32 = 16;
    /// Visible window refresh interval in rendered frames
    /// ENV: VISIBILITY_REFRESH_FRAMES
    pub const VISIBILITY_REFRESH_FRAMES: u32 = 25;
    /// Ticks an eaten food sprite takes to reach the snake head
    /// ENV: EAT_ANIMATION_TICKS
    pub const EAT_ANIMATION_TICKS: u32 = 8;
}

/// Sprite pool constants
pub mod pool {
    /// Objects constructed up-front per sprite pool
    /// ENV: POOL_PREWARM
    pub const PREWARM: usize = 10_000;
}

/// Snake rendering constants
pub mod snake {
    /// Radius in pixels of the segment texture at scale 1.0
    pub const SEGMENT_TEXTURE_RADIUS: f32 = 32.0;
    /// Zoom applied when following with zoom change: `FOLLOW_ZOOM_FACTOR / sprite_scale`
    pub const FOLLOW_ZOOM_FACTOR: f32 = 0.25;
    /// Mass represented by one body segment when the payload carries mass only
    pub const MASS_PER_SEGMENT: f32 = 10.0;
    /// Minimum number of body segments (the head)
    pub const MIN_SEGMENTS: usize = 1;
    /// Default segment radius for descriptors that omit it
    pub const DEFAULT_SEGMENT_RADIUS: f32 = 4.0;
}

/// Number of segments that represents a snake of the given mass
#[inline]
pub fn segments_for_mass(mass: f32) -> usize {
    if !mass.is_finite() || mass <= 0.0 {
        return snake::MIN_SEGMENTS;
    }
    ((mass / snake::MASS_PER_SEGMENT).ceil() as usize).max(snake::MIN_SEGMENTS)
}
