//! Reconciliation engine
//!
//! Applies the authoritative event stream to the local mirror of the arena:
//! the entity registry, the food map and the pooled sprites. Runs on the
//! frame thread; every handler is synchronous.

use rustc_hash::FxHashSet;

use crate::config::ViewConfig;
use crate::game::constants::{snake::FOLLOW_ZOOM_FACTOR, world};
use crate::game::spatial::FoodMap;
use crate::game::state::{EntityRegistry, Food, FoodId, FoodKey, Snake, SnakeId, Upsert};
use crate::game::systems::decay::DecayScheduler;
use crate::game::systems::movement::MoveStrategy;
use crate::net::protocol::{BotDescriptor, FoodSpawn, ViewEvent, WorldSnapshot};
use crate::render::camera::{ScreenSize, Viewport, WorldSize};
use crate::render::pool::{PoolError, PoolHandle};
use crate::render::resources::{Layer, ResourceContext, Sprite};
use crate::util::vec2::{Rect, Vec2};

#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),
    #[error("invalid world info: size {size_x}x{size_y}, food decay rate {decay_rate}")]
    InvalidWorld {
        size_x: f32,
        size_y: f32,
        decay_rate: f32,
    },
}

/// World parameters announced by the simulation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldInfo {
    pub size_x: f32,
    pub size_y: f32,
    pub food_decay_rate: f32,
}

impl WorldInfo {
    fn is_valid(&self) -> bool {
        self.size_x.is_finite()
            && self.size_y.is_finite()
            && self.size_x > 0.0
            && self.size_y > 0.0
            && self.food_decay_rate.is_finite()
            && self.food_decay_rate >= 0.0
    }
}

impl Default for WorldInfo {
    fn default() -> Self {
        Self {
            size_x: world::DEFAULT_SIZE_X,
            size_y: world::DEFAULT_SIZE_Y,
            food_decay_rate: world::DEFAULT_FOOD_DECAY_RATE,
        }
    }
}

/// Counters exposed to metrics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewStats {
    pub events_handled: u64,
    pub ticks: u64,
    pub frames: u64,
    pub world_resets: u64,
    pub sweeps: u64,
    pub food_evicted: u64,
    pub snakes_removed: u64,
    pub eat_animations_finished: u64,
    pub visibility_refreshes: u64,
    /// Food sprites shown by the last visibility refresh
    pub visible_food: usize,
}

#[derive(Debug, Clone)]
struct FollowTarget {
    name: String,
    change_zoom: bool,
    /// Snake currently tracked by the viewport
    snake: Option<SnakeId>,
}

pub struct Visualization<V: Viewport> {
    config: ViewConfig,
    resources: ResourceContext,
    viewport: V,
    movement: MoveStrategy,
    registry: EntityRegistry,
    food_map: FoodMap,
    world: WorldInfo,
    decay: DecayScheduler,
    frames_since_refresh: u32,
    /// Food made visible by the last refresh (or spawned inside the window since)
    shown: Vec<FoodKey>,
    /// Size threshold at the zoom the current window was computed with
    window_min_value: f32,
    follow: Option<FollowTarget>,
    stats: ViewStats,
}

impl<V: Viewport> Visualization<V> {
    /// Build a visualization on top of an existing resource context
    pub fn new(config: ViewConfig, resources: ResourceContext, viewport: V) -> Self {
        let world = WorldInfo::default();
        let food_map = Self::build_food_map(&config, &world);
        Self {
            movement: config.move_strategy,
            decay: DecayScheduler::new(config.decay_rows),
            // The first frame refreshes
            frames_since_refresh: config.visibility_refresh_frames.saturating_sub(1),
            window_min_value: config.min_visible_food_size / viewport.zoom(),
            config,
            resources,
            viewport,
            registry: EntityRegistry::new(),
            food_map,
            world,
            shown: Vec::new(),
            follow: None,
            stats: ViewStats::default(),
        }
    }

    fn build_food_map(config: &ViewConfig, world: &WorldInfo) -> FoodMap {
        FoodMap::new(world.size_x, world.size_y, config.grid_columns, config.grid_rows)
            .with_overscan(config.overscan)
    }

    /// Apply one event from the transport
    pub fn handle(&mut self, event: ViewEvent) -> Result<(), ViewError> {
        self.stats.events_handled += 1;
        match event {
            ViewEvent::WorldInfo {
                world_size_x,
                world_size_y,
                food_decay_rate,
            } => self.on_world_info(WorldInfo {
                size_x: world_size_x,
                size_y: world_size_y,
                food_decay_rate,
            }),
            ViewEvent::WorldUpdate(snapshot) => self.on_world_update(&snapshot),
            ViewEvent::Tick { frame_id } => self.on_tick(frame_id),
            ViewEvent::BotSpawn(desc) => self.upsert_snake(&desc),
            ViewEvent::BotKilled { killer_id, victim_id } => {
                tracing::trace!("Bot {} killed by {}", victim_id, killer_id);
                self.remove_snake(victim_id)
            }
            ViewEvent::FoodSpawn(spawn) => self.add_food(&spawn),
            ViewEvent::FoodConsumed { food_id, consumer_id } => self.on_food_consumed(food_id, consumer_id),
            ViewEvent::FoodDecayed { food_id } => {
                self.on_food_decayed(food_id);
                Ok(())
            }
            ViewEvent::BotMoved {
                bot_id,
                segments,
                length,
                segment_radius,
            } => {
                let Some(snake) = self.registry.snake_mut(bot_id) else {
                    tracing::trace!("Move for unknown bot {}", bot_id);
                    return Ok(());
                };
                self.movement
                    .legacy_move(&mut snake.body, &segments, length, segment_radius);
                snake.sync_sprites(&mut self.resources)?;
                Ok(())
            }
            ViewEvent::BotMoveHead {
                bot_id,
                mass,
                positions,
            } => {
                let Some(snake) = self.registry.snake_mut(bot_id) else {
                    tracing::trace!("Head move for unknown bot {}", bot_id);
                    return Ok(());
                };
                self.movement.incremental_move(&mut snake.body, mass, &positions);
                snake.sync_sprites(&mut self.resources)?;
                self.viewport.update();
                Ok(())
            }
        }
    }

    fn on_world_info(&mut self, info: WorldInfo) -> Result<(), ViewError> {
        if !info.is_valid() {
            return Err(ViewError::InvalidWorld {
                size_x: info.size_x,
                size_y: info.size_y,
                decay_rate: info.food_decay_rate,
            });
        }

        tracing::info!(
            "World reset: {}x{}, food decay rate {}",
            info.size_x,
            info.size_y,
            info.food_decay_rate
        );

        // Release first, rebuild regardless, then surface any pool error
        let cleared = self.registry.clear_food(&mut self.resources);
        self.shown.clear();
        self.world = info;
        self.food_map = Self::build_food_map(&self.config, &self.world);
        self.decay.reset();
        self.stats.world_resets += 1;

        let screen = self.viewport.screen();
        self.viewport.resize(
            screen,
            WorldSize {
                width: info.size_x,
                height: info.size_y,
            },
        );
        self.viewport.fit_width();

        let cleared = cleared?;
        tracing::debug!("Released {} food sprites on world reset", cleared);
        Ok(())
    }

    fn on_world_update(&mut self, snapshot: &WorldSnapshot) -> Result<(), ViewError> {
        let mut present = FxHashSet::default();
        present.reserve(snapshot.bots.len());
        for bot in &snapshot.bots {
            present.insert(bot.id);
            self.upsert_snake(bot)?;
        }

        let removed = self.registry.reconcile_snapshot(&present, &mut self.resources)?;
        self.stats.snakes_removed += removed as u64;
        self.drop_follow_if_gone();

        let mut added = 0;
        for food in &snapshot.food {
            if self.registry.food(food.id).is_none() {
                self.add_food(food)?;
                added += 1;
            }
        }

        tracing::debug!(
            "World update: {} bots ({} removed), {} new food",
            snapshot.bots.len(),
            removed,
            added
        );
        Ok(())
    }

    fn on_tick(&mut self, frame_id: u64) -> Result<(), ViewError> {
        self.stats.ticks += 1;
        tracing::trace!("Tick {}", frame_id);

        let ticks = self.config.eat_animation_ticks;
        for snake in self.registry.snakes_mut() {
            let finished = snake.animate_eat(&mut self.resources, ticks)?;
            self.stats.eat_animations_finished += finished as u64;
        }

        if self.decay.advance() {
            self.sweep()?;
        }
        Ok(())
    }

    /// Batched decay of every particle, then eviction of flagged ones
    fn sweep(&mut self) -> Result<(), ViewError> {
        let flagged = self.registry.decay_all(
            self.config.decay_model,
            self.decay.ticks_per_sweep(),
            self.config.removal_threshold,
        );

        let registry = &mut self.registry;
        let resources = &mut self.resources;
        let mut failure = None;
        let evicted = self.food_map.garbage_collect(|key| {
            match registry.collect_food(key, resources) {
                Ok(evict) => evict,
                Err(e) => {
                    // The record is already gone; drop the entry with it
                    failure.get_or_insert(e);
                    true
                }
            }
        });

        self.stats.sweeps += 1;
        self.stats.food_evicted += evicted as u64;
        tracing::debug!(
            "Decay sweep {}: {} flagged, {} evicted, {} food left",
            self.decay.sweeps(),
            flagged,
            evicted,
            self.registry.food_count()
        );

        match failure {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn upsert_snake(&mut self, desc: &BotDescriptor) -> Result<(), ViewError> {
        let outcome = self.registry.upsert_snake(desc, &mut self.resources)?;
        if outcome == Upsert::Created {
            let follows = self.follow.as_ref().is_some_and(|f| f.name == desc.name);
            if follows {
                self.start_following(desc.id);
            }
        }
        Ok(())
    }

    fn remove_snake(&mut self, id: SnakeId) -> Result<(), ViewError> {
        if self.registry.remove_snake(id, &mut self.resources)? {
            self.stats.snakes_removed += 1;
            self.drop_follow_if_gone();
        }
        Ok(())
    }

    fn add_food(&mut self, spawn: &FoodSpawn) -> Result<(), ViewError> {
        let key = self.registry.add_food(
            spawn,
            self.world.food_decay_rate,
            &mut self.resources,
            &mut self.food_map,
        )?;

        // Food spawned inside the current window shows up before the next refresh
        if self.food_map.in_window(spawn.position) && spawn.value > self.window_min_value {
            if let Some(food) = self.registry.resolve(key) {
                if let Some(sprite) = self.resources.sprite_mut(Layer::Food, food.sprite()) {
                    sprite.visible = true;
                }
                self.shown.push(key);
            }
        }
        Ok(())
    }

    fn on_food_consumed(&mut self, food_id: FoodId, consumer_id: SnakeId) -> Result<(), ViewError> {
        let Some(food) = self.registry.take_food(food_id, &mut self.food_map) else {
            tracing::trace!("Consume of unknown food {}", food_id);
            return Ok(());
        };

        match self.registry.snake_mut(consumer_id) {
            Some(snake) => snake.eat(food, &self.resources),
            None => self.resources.release(Layer::Food, food.sprite())?,
        }
        Ok(())
    }

    fn on_food_decayed(&mut self, food_id: FoodId) {
        let Some(food) = self.registry.food_mut(food_id) else {
            tracing::trace!("Decay of unknown food {}", food_id);
            return;
        };
        food.mark_decayed();
        let sprite = food.sprite();
        if let Some(sprite) = self.resources.sprite_mut(Layer::Food, sprite) {
            sprite.visible = false;
        }
    }

    /// Call once per rendered frame
    pub fn frame(&mut self) {
        self.stats.frames += 1;
        self.frames_since_refresh += 1;
        if self.frames_since_refresh < self.config.visibility_refresh_frames {
            return;
        }
        self.frames_since_refresh = 0;
        self.refresh_visibility();
    }

    fn refresh_visibility(&mut self) {
        for key in self.shown.drain(..) {
            if let Some(food) = self.registry.resolve(key) {
                if let Some(sprite) = self.resources.sprite_mut(Layer::Food, food.sprite()) {
                    sprite.visible = false;
                }
            }
        }

        let bounds = self.viewport.bounds();
        self.food_map.update(bounds.center, bounds.width, bounds.height);

        let min_value = self.config.min_visible_food_size / self.viewport.zoom();
        self.window_min_value = min_value;
        let registry = &self.registry;
        let resources = &mut self.resources;
        let shown = &mut self.shown;
        self.food_map.iterate(|entry| {
            let Some(food) = registry.resolve(entry.key) else {
                return;
            };
            let visible = !food.decayed && food.value > min_value;
            if let Some(sprite) = resources.sprite_mut(Layer::Food, food.sprite()) {
                sprite.visible = visible;
                sprite.scale = food.value;
            }
            if visible {
                shown.push(entry.key);
            }
        });

        self.stats.visibility_refreshes += 1;
        self.stats.visible_food = self.shown.len();
    }

    /// Follow the snake with this name, now or once it appears
    pub fn follow_name(&mut self, name: &str, change_zoom: bool) {
        self.follow = Some(FollowTarget {
            name: name.to_string(),
            change_zoom,
            snake: None,
        });
        if let Some(id) = self.registry.snake_by_name(name).map(|s| s.id) {
            self.start_following(id);
        }
    }

    pub fn unfollow(&mut self) {
        self.follow = None;
        self.viewport.stop_following();
    }

    fn start_following(&mut self, id: SnakeId) {
        let Some(snake) = self.registry.snake(id) else {
            return;
        };
        let (head, scale) = (snake.head_handle(), snake.sprite_scale());
        let Some(follow) = self.follow.as_mut() else {
            return;
        };

        follow.snake = Some(id);
        self.viewport.follow(head);
        if follow.change_zoom && scale > 0.0 {
            self.viewport.set_zoom(FOLLOW_ZOOM_FACTOR / scale);
        }
        tracing::info!("Following '{}'", follow.name);
    }

    fn drop_follow_if_gone(&mut self) {
        let Some(follow) = self.follow.as_mut() else {
            return;
        };
        if let Some(id) = follow.snake {
            if self.registry.snake(id).is_none() {
                follow.snake = None;
                self.viewport.stop_following();
            }
        }
    }

    /// Forward a new screen size to the viewport
    pub fn resize(&mut self, width: f32, height: f32) {
        self.viewport.resize(
            ScreenSize { width, height },
            WorldSize {
                width: self.world.size_x,
                height: self.world.size_y,
            },
        );
    }

    /// Rectangle the snake layer is clipped to
    pub fn world_bounds(&self) -> Rect {
        Rect::new(Vec2::ZERO, Vec2::new(self.world.size_x, self.world.size_y))
    }

    pub fn world(&self) -> WorldInfo {
        self.world
    }

    #[inline]
    pub fn snake(&self, id: SnakeId) -> Option<&Snake> {
        self.registry.snake(id)
    }

    pub fn snake_by_name(&self, name: &str) -> Option<&Snake> {
        self.registry.snake_by_name(name)
    }

    #[inline]
    pub fn food(&self, id: FoodId) -> Option<&Food> {
        self.registry.food(id)
    }

    /// Sprite handles of visible food in the active window
    pub fn visible_food(&self) -> Vec<PoolHandle> {
        let mut handles = Vec::with_capacity(self.shown.len());
        self.food_map.iterate(|entry| {
            let Some(food) = self.registry.resolve(entry.key) else {
                return;
            };
            let visible = self
                .resources
                .sprite(Layer::Food, food.sprite())
                .is_some_and(|s| s.visible);
            if visible {
                handles.push(food.sprite());
            }
        });
        handles
    }

    pub fn sprite(&self, layer: Layer, handle: PoolHandle) -> Option<&Sprite> {
        self.resources.sprite(layer, handle)
    }

    pub fn stats(&self) -> &ViewStats {
        &self.stats
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn food_map(&self) -> &FoodMap {
        &self.food_map
    }

    pub fn resources(&self) -> &ResourceContext {
        &self.resources
    }

    pub fn viewport(&self) -> &V {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut V {
        &mut self.viewport
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    /// Tear down, keeping the pools for the next visualization.
    ///
    /// Every bound sprite goes back to its pool first.
    pub fn into_resources(mut self) -> Result<ResourceContext, ViewError> {
        let ids: Vec<SnakeId> = self.registry.snakes().map(|s| s.id).collect();
        for id in ids {
            self.registry.remove_snake(id, &mut self.resources)?;
        }
        self.registry.clear_food(&mut self.resources)?;
        self.viewport.stop_following();
        Ok(self.resources)
    }
}
