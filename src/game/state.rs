//! Entity registry: snakes and food keyed by server id
//!
//! The registry owns every entity and the pooled sprites bound to it. Derived
//! indices (the food map) only hold `FoodKey` back-references.

use hashbrown::HashMap;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::game::constants::snake::SEGMENT_TEXTURE_RADIUS;
use crate::game::spatial::FoodMap;
use crate::game::systems::decay::DecayModel;
use crate::net::protocol::{BotDescriptor, FoodSpawn};
use crate::render::pool::{PoolError, PoolHandle};
use crate::render::resources::{Layer, ResourceContext};
use crate::util::vec2::Vec2;

/// Server-assigned snake identifier
pub type SnakeId = u32;

/// Server-assigned food identifier
pub type FoodId = u32;

/// Food id plus the registry serial it was inserted under.
///
/// The server reuses ids; the serial tells a recycled id apart from the
/// particle that previously carried it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FoodKey {
    pub id: FoodId,
    pub serial: u64,
}

impl FoodKey {
    pub fn new(id: FoodId, serial: u64) -> Self {
        Self { id, serial }
    }
}

/// Geometry of a snake, mutated by the movement strategy
#[derive(Debug, Clone, PartialEq)]
pub struct SnakeBody {
    /// Segment positions, head first
    pub segments: Vec<Vec2>,
    pub segment_radius: f32,
    pub mass: f32,
    pub length: f32,
}

impl SnakeBody {
    pub fn from_descriptor(desc: &BotDescriptor) -> Self {
        Self {
            segments: desc.segments.clone(),
            segment_radius: desc.segment_radius,
            mass: desc.mass,
            length: desc.segments.len() as f32,
        }
    }

    #[inline]
    pub fn head(&self) -> Option<Vec2> {
        self.segments.first().copied()
    }
}

/// Food sprite gliding into a snake's head
#[derive(Debug, Clone)]
struct EatenFood {
    sprite: PoolHandle,
    start: Vec2,
    start_scale: f32,
    elapsed: u32,
}

#[derive(Debug)]
pub struct Snake {
    pub id: SnakeId,
    pub db_id: Option<u64>,
    pub name: String,
    /// RGB tint applied to every sprite
    pub color: u32,
    pub body: SnakeBody,
    serial: u64,
    head: PoolHandle,
    /// One sprite per body segment after the head
    segment_sprites: Vec<PoolHandle>,
    eaten: Vec<EatenFood>,
}

impl Snake {
    pub fn new(desc: &BotDescriptor, serial: u64, res: &mut ResourceContext) -> Result<Self, PoolError> {
        let mut snake = Self {
            id: desc.id,
            db_id: desc.db_id,
            name: desc.name.clone(),
            color: desc.color,
            body: SnakeBody::from_descriptor(desc),
            serial,
            head: res.acquire(Layer::SnakeHeads),
            segment_sprites: Vec::new(),
            eaten: Vec::new(),
        };
        snake.sync_sprites(res)?;
        Ok(snake)
    }

    /// Overwrite descriptor data in place, keeping the sprites already bound
    pub fn set_data(&mut self, desc: &BotDescriptor, res: &mut ResourceContext) -> Result<(), PoolError> {
        self.db_id = desc.db_id;
        self.name.clone_from(&desc.name);
        self.color = desc.color;
        self.body.mass = desc.mass;
        if desc.segment_radius.is_finite() && desc.segment_radius > 0.0 {
            self.body.segment_radius = desc.segment_radius;
        }
        if !desc.segments.is_empty() {
            self.body.segments.clone_from(&desc.segments);
            self.body.length = desc.segments.len() as f32;
        }
        self.sync_sprites(res)
    }

    /// Match the segment sprite count to the body and copy transforms over
    pub fn sync_sprites(&mut self, res: &mut ResourceContext) -> Result<(), PoolError> {
        let wanted = self.body.segments.len().saturating_sub(1);
        while self.segment_sprites.len() > wanted {
            if let Some(handle) = self.segment_sprites.pop() {
                res.release(Layer::SnakeSegments, handle)?;
            }
        }
        while self.segment_sprites.len() < wanted {
            self.segment_sprites.push(res.acquire(Layer::SnakeSegments));
        }

        let scale = self.sprite_scale();
        for (handle, position) in self.segment_sprites.iter().zip(self.body.segments.iter().skip(1)) {
            if let Some(sprite) = res.sprite_mut(Layer::SnakeSegments, *handle) {
                sprite.position = *position;
                sprite.scale = scale;
                sprite.tint = self.color;
                sprite.visible = true;
            }
        }
        self.update_head(res);
        Ok(())
    }

    /// Place the head sprite on the first segment, facing away from the second
    pub fn update_head(&self, res: &mut ResourceContext) {
        let scale = self.sprite_scale();
        let Some(sprite) = res.sprite_mut(Layer::SnakeHeads, self.head) else {
            return;
        };
        match self.body.segments.as_slice() {
            [] => sprite.visible = false,
            [head] => {
                sprite.position = *head;
                sprite.visible = true;
            }
            [head, neck, ..] => {
                sprite.position = *head;
                sprite.rotation = (*head - *neck).angle();
                sprite.visible = true;
            }
        }
        sprite.scale = scale;
        sprite.tint = self.color;
    }

    #[inline]
    pub fn sprite_scale(&self) -> f32 {
        self.body.segment_radius / SEGMENT_TEXTURE_RADIUS
    }

    /// Take ownership of a consumed food sprite and start its animation
    pub fn eat(&mut self, food: Food, res: &ResourceContext) {
        let start_scale = res
            .sprite(Layer::Food, food.sprite)
            .map(|s| s.scale)
            .unwrap_or(food.value);
        self.eaten.push(EatenFood {
            sprite: food.sprite,
            start: food.position,
            start_scale,
            elapsed: 0,
        });
    }

    /// Advance every eat animation by one tick. Returns how many finished.
    pub fn animate_eat(&mut self, res: &mut ResourceContext, total_ticks: u32) -> Result<usize, PoolError> {
        let total = total_ticks.max(1);
        let target = self.body.head();
        let mut finished = 0;
        let mut i = 0;

        while i < self.eaten.len() {
            let eaten = &mut self.eaten[i];
            eaten.elapsed += 1;
            if eaten.elapsed >= total {
                let done = self.eaten.swap_remove(i);
                res.release(Layer::Food, done.sprite)?;
                finished += 1;
                continue;
            }

            let t = eaten.elapsed as f32 / total as f32;
            if let Some(sprite) = res.sprite_mut(Layer::Food, eaten.sprite) {
                if let Some(head) = target {
                    sprite.position = eaten.start.lerp(head, t);
                }
                sprite.scale = eaten.start_scale * (1.0 - t);
            }
            i += 1;
        }

        Ok(finished)
    }

    /// Release every sprite bound to this snake. All sprites are attempted;
    /// the first failure is returned.
    pub fn destroy(mut self, res: &mut ResourceContext) -> Result<(), PoolError> {
        let mut result = res.release(Layer::SnakeHeads, self.head);
        for handle in self.segment_sprites.drain(..) {
            let released = res.release(Layer::SnakeSegments, handle);
            if result.is_ok() {
                result = released;
            }
        }
        for eaten in self.eaten.drain(..) {
            let released = res.release(Layer::Food, eaten.sprite);
            if result.is_ok() {
                result = released;
            }
        }
        result
    }

    #[inline]
    pub fn head_handle(&self) -> PoolHandle {
        self.head
    }

    pub fn segment_handles(&self) -> &[PoolHandle] {
        &self.segment_sprites
    }

    pub fn eaten_count(&self) -> usize {
        self.eaten.len()
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }
}

/// Food particle. Immobile once spawned.
#[derive(Debug, Clone)]
pub struct Food {
    pub key: FoodKey,
    pub position: Vec2,
    pub value: f32,
    /// Value lost per tick
    pub decay_rate: f32,
    /// Hidden by a decay event; never shown again
    pub decayed: bool,
    sprite: PoolHandle,
    collect: bool,
}

impl Food {
    #[inline]
    pub fn id(&self) -> FoodId {
        self.key.id
    }

    #[inline]
    pub fn sprite(&self) -> PoolHandle {
        self.sprite
    }

    /// True once the particle is waiting for the next sweep to evict it
    #[inline]
    pub fn is_flagged(&self) -> bool {
        self.collect
    }

    pub fn mark_decayed(&mut self) {
        self.decayed = true;
        self.collect = true;
    }

    /// Apply `ticks` ticks of decay; flags the particle once its value
    /// reaches `threshold`. Returns the flag.
    pub fn apply_decay(&mut self, model: DecayModel, ticks: u32, threshold: f32) -> bool {
        self.value = model.apply(self.value, self.decay_rate, ticks);
        if self.value <= threshold {
            self.collect = true;
        }
        self.collect
    }
}

/// Outcome of `EntityRegistry::upsert_snake`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,
}

/// Owns every live snake and food particle
#[derive(Debug, Default)]
pub struct EntityRegistry {
    snakes: HashMap<SnakeId, Snake>,
    food: HashMap<FoodId, Food>,
    next_serial: u64,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_serial(&mut self) -> u64 {
        self.next_serial += 1;
        self.next_serial
    }

    /// Create a snake, or update the existing one in place
    pub fn upsert_snake(&mut self, desc: &BotDescriptor, res: &mut ResourceContext) -> Result<Upsert, PoolError> {
        if let Some(snake) = self.snakes.get_mut(&desc.id) {
            snake.set_data(desc, res)?;
            return Ok(Upsert::Updated);
        }
        let serial = self.next_serial();
        let snake = Snake::new(desc, serial, res)?;
        self.snakes.insert(desc.id, snake);
        Ok(Upsert::Created)
    }

    /// Destroy a snake and release its sprites. Unknown ids are a no-op.
    pub fn remove_snake(&mut self, id: SnakeId, res: &mut ResourceContext) -> Result<bool, PoolError> {
        match self.snakes.remove(&id) {
            Some(snake) => {
                snake.destroy(res)?;
                Ok(true)
            }
            None => {
                tracing::trace!("Remove of unknown snake {}", id);
                Ok(false)
            }
        }
    }

    /// Remove every known snake whose id is absent from `present`
    pub fn reconcile_snapshot(
        &mut self,
        present: &FxHashSet<SnakeId>,
        res: &mut ResourceContext,
    ) -> Result<usize, PoolError> {
        let stale: SmallVec<[SnakeId; 8]> = self
            .snakes
            .keys()
            .filter(|id| !present.contains(*id))
            .copied()
            .collect();
        for id in &stale {
            self.remove_snake(*id, res)?;
        }
        Ok(stale.len())
    }

    /// Register a food particle and index it. A live particle with the same
    /// id is replaced.
    pub fn add_food(
        &mut self,
        spawn: &FoodSpawn,
        decay_rate: f32,
        res: &mut ResourceContext,
        map: &mut FoodMap,
    ) -> Result<FoodKey, PoolError> {
        if self.remove_food(spawn.id, res, map)? {
            tracing::debug!("Food {} respawned; replacing", spawn.id);
        }

        let key = FoodKey::new(spawn.id, self.next_serial());
        let sprite = res.acquire(Layer::Food);
        if let Some(s) = res.sprite_mut(Layer::Food, sprite) {
            s.position = spawn.position;
            s.scale = spawn.value;
            s.visible = false;
        }
        map.add(key, spawn.position);
        self.food.insert(
            spawn.id,
            Food {
                key,
                position: spawn.position,
                value: spawn.value,
                decay_rate,
                decayed: false,
                sprite,
                collect: false,
            },
        );
        Ok(key)
    }

    /// Remove a food particle and release its sprite. Unknown ids are a no-op.
    pub fn remove_food(&mut self, id: FoodId, res: &mut ResourceContext, map: &mut FoodMap) -> Result<bool, PoolError> {
        match self.take_food(id, map) {
            Some(food) => {
                res.release(Layer::Food, food.sprite)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Detach a food particle without releasing its sprite
    pub fn take_food(&mut self, id: FoodId, map: &mut FoodMap) -> Option<Food> {
        let food = self.food.remove(&id)?;
        map.remove(food.key, food.position);
        Some(food)
    }

    /// Eviction callback for the map's garbage collection.
    ///
    /// Returns true if the entry for `key` should leave the map: either the
    /// key no longer resolves, or the particle was flagged and has now been
    /// removed and released.
    pub fn collect_food(&mut self, key: FoodKey, res: &mut ResourceContext) -> Result<bool, PoolError> {
        let flagged = match self.food.get(&key.id) {
            Some(food) if food.key == key => food.collect,
            _ => return Ok(true),
        };
        if !flagged {
            return Ok(false);
        }
        if let Some(food) = self.food.remove(&key.id) {
            res.release(Layer::Food, food.sprite)?;
        }
        Ok(true)
    }

    /// Apply a batched decay step to every particle. Returns the number flagged.
    pub fn decay_all(&mut self, model: DecayModel, ticks: u32, threshold: f32) -> usize {
        self.food
            .values_mut()
            .map(|food| food.apply_decay(model, ticks, threshold))
            .filter(|flagged| *flagged)
            .count()
    }

    /// Release every food sprite and forget all food. The caller resets the map.
    pub fn clear_food(&mut self, res: &mut ResourceContext) -> Result<usize, PoolError> {
        let count = self.food.len();
        let mut result = Ok(());
        for (_, food) in self.food.drain() {
            let released = res.release(Layer::Food, food.sprite);
            if result.is_ok() {
                result = released;
            }
        }
        result.map(|_| count)
    }

    #[inline]
    pub fn snake(&self, id: SnakeId) -> Option<&Snake> {
        self.snakes.get(&id)
    }

    #[inline]
    pub fn snake_mut(&mut self, id: SnakeId) -> Option<&mut Snake> {
        self.snakes.get_mut(&id)
    }

    pub fn snake_by_name(&self, name: &str) -> Option<&Snake> {
        self.snakes.values().find(|s| s.name == name)
    }

    pub fn snakes(&self) -> impl Iterator<Item = &Snake> {
        self.snakes.values()
    }

    pub fn snakes_mut(&mut self) -> impl Iterator<Item = &mut Snake> {
        self.snakes.values_mut()
    }

    #[inline]
    pub fn food(&self, id: FoodId) -> Option<&Food> {
        self.food.get(&id)
    }

    #[inline]
    pub fn food_mut(&mut self, id: FoodId) -> Option<&mut Food> {
        self.food.get_mut(&id)
    }

    /// Resolve a back-reference; `None` if the id was removed or reused
    #[inline]
    pub fn resolve(&self, key: FoodKey) -> Option<&Food> {
        self.food.get(&key.id).filter(|f| f.key == key)
    }

    pub fn snake_count(&self) -> usize {
        self.snakes.len()
    }

    pub fn food_count(&self) -> usize {
        self.food.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bot(id: SnakeId, name: &str, segments: usize) -> BotDescriptor {
        let mut desc = BotDescriptor::new(id, name);
        desc.segments = (0..segments).map(|i| Vec2::new(100.0 - i as f32, 100.0)).collect();
        desc.mass = segments as f32 * 10.0;
        desc
    }

    fn map() -> FoodMap {
        FoodMap::new(1024.0, 1024.0, 64, 64)
    }

    #[test]
    fn test_upsert_creates_then_updates() {
        let mut res = ResourceContext::headless();
        let mut reg = EntityRegistry::new();

        assert_eq!(reg.upsert_snake(&bot(1, "a", 3), &mut res).unwrap(), Upsert::Created);
        let head = reg.snake(1).unwrap().head_handle();
        assert_eq!(reg.snake(1).unwrap().segment_handles().len(), 2);

        let mut renamed = bot(1, "b", 5);
        renamed.color = 0x00FF00;
        assert_eq!(reg.upsert_snake(&renamed, &mut res).unwrap(), Upsert::Updated);

        let snake = reg.snake(1).unwrap();
        assert_eq!(snake.head_handle(), head);
        assert_eq!(snake.name, "b");
        assert_eq!(snake.segment_handles().len(), 4);
        assert_eq!(res.sprite(Layer::SnakeHeads, head).unwrap().tint, 0x00FF00);
    }

    #[test]
    fn test_head_sprite_follows_body() {
        let mut res = ResourceContext::headless();
        let mut reg = EntityRegistry::new();
        let mut desc = BotDescriptor::new(1, "a");
        desc.segments = vec![Vec2::new(10.0, 20.0), Vec2::new(10.0, 10.0)];
        desc.segment_radius = 8.0;
        reg.upsert_snake(&desc, &mut res).unwrap();

        let snake = reg.snake(1).unwrap();
        let head = res.sprite(Layer::SnakeHeads, snake.head_handle()).unwrap();
        assert_eq!(head.position, Vec2::new(10.0, 20.0));
        assert!((head.rotation - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
        assert!((head.scale - 0.25).abs() < 1e-6);
        assert!(head.visible);
    }

    #[test]
    fn test_shrinking_body_releases_segments() {
        let mut res = ResourceContext::headless();
        let mut reg = EntityRegistry::new();
        reg.upsert_snake(&bot(1, "a", 6), &mut res).unwrap();
        assert_eq!(res.pool(Layer::SnakeSegments).in_use(), 5);

        reg.upsert_snake(&bot(1, "a", 2), &mut res).unwrap();
        assert_eq!(res.pool(Layer::SnakeSegments).in_use(), 1);
    }

    #[test]
    fn test_remove_snake_releases_everything() {
        let mut res = ResourceContext::headless();
        let mut reg = EntityRegistry::new();
        reg.upsert_snake(&bot(1, "a", 4), &mut res).unwrap();

        assert!(reg.remove_snake(1, &mut res).unwrap());
        assert_eq!(res.pool(Layer::SnakeHeads).in_use(), 0);
        assert_eq!(res.pool(Layer::SnakeSegments).in_use(), 0);
        assert!(!reg.remove_snake(1, &mut res).unwrap());
    }

    #[test]
    fn test_reconcile_snapshot() {
        let mut res = ResourceContext::headless();
        let mut reg = EntityRegistry::new();
        for id in 1..=3 {
            reg.upsert_snake(&bot(id, "s", 2), &mut res).unwrap();
        }
        let present: FxHashSet<SnakeId> = [2, 3, 4].into_iter().collect();
        assert_eq!(reg.reconcile_snapshot(&present, &mut res).unwrap(), 1);
        assert!(reg.snake(1).is_none());
        assert_eq!(reg.snake_count(), 2);
    }

    #[test]
    fn test_add_food_replaces_live_id() {
        let mut res = ResourceContext::headless();
        let mut reg = EntityRegistry::new();
        let mut map = map();

        let first = reg.add_food(&FoodSpawn::new(7, 10.0, 10.0, 1.0), 0.001, &mut res, &mut map).unwrap();
        let second = reg.add_food(&FoodSpawn::new(7, 500.0, 500.0, 2.0), 0.001, &mut res, &mut map).unwrap();

        assert_ne!(first, second);
        assert_eq!(map.len(), 1);
        assert_eq!(res.pool(Layer::Food).in_use(), 1);
        assert!(reg.resolve(first).is_none());
        assert_eq!(reg.resolve(second).unwrap().value, 2.0);
    }

    #[test]
    fn test_remove_unknown_food_is_noop() {
        let mut res = ResourceContext::headless();
        let mut reg = EntityRegistry::new();
        let mut map = map();
        assert!(!reg.remove_food(42, &mut res, &mut map).unwrap());
    }

    #[test]
    fn test_take_food_keeps_sprite_live() {
        let mut res = ResourceContext::headless();
        let mut reg = EntityRegistry::new();
        let mut map = map();
        reg.add_food(&FoodSpawn::new(1, 10.0, 10.0, 1.0), 0.0, &mut res, &mut map).unwrap();

        let food = reg.take_food(1, &mut map).unwrap();
        assert!(map.is_empty());
        assert!(res.pool(Layer::Food).is_live(food.sprite()));
        assert!(reg.food(1).is_none());
    }

    #[test]
    fn test_collect_food() {
        let mut res = ResourceContext::headless();
        let mut reg = EntityRegistry::new();
        let mut map = map();
        let key = reg.add_food(&FoodSpawn::new(1, 10.0, 10.0, 1.0), 0.0, &mut res, &mut map).unwrap();

        assert!(!reg.collect_food(key, &mut res).unwrap());
        reg.food_mut(1).unwrap().mark_decayed();
        assert!(reg.collect_food(key, &mut res).unwrap());
        assert!(reg.food(1).is_none());
        assert_eq!(res.pool(Layer::Food).in_use(), 0);

        // Stale keys are always evicted
        assert!(reg.collect_food(FoodKey::new(1, 999), &mut res).unwrap());
    }

    #[test]
    fn test_decay_all_flags_at_threshold() {
        let mut res = ResourceContext::headless();
        let mut reg = EntityRegistry::new();
        let mut map = map();
        reg.add_food(&FoodSpawn::new(1, 10.0, 10.0, 0.01), 0.001, &mut res, &mut map).unwrap();
        reg.add_food(&FoodSpawn::new(2, 20.0, 10.0, 1.0), 0.001, &mut res, &mut map).unwrap();

        assert_eq!(reg.decay_all(DecayModel::Linear, 16, 0.0), 1);
        assert!(reg.food(1).unwrap().is_flagged());
        assert!(!reg.food(2).unwrap().is_flagged());
        assert!((reg.food(2).unwrap().value - 0.984).abs() < 1e-6);
    }

    #[test]
    fn test_eat_animation_releases_sprite() {
        let mut res = ResourceContext::headless();
        let mut reg = EntityRegistry::new();
        let mut map = map();
        reg.upsert_snake(&bot(1, "a", 2), &mut res).unwrap();
        reg.add_food(&FoodSpawn::new(5, 0.0, 100.0, 1.0), 0.0, &mut res, &mut map).unwrap();

        let food = reg.take_food(5, &mut map).unwrap();
        let sprite = food.sprite();
        let snake = reg.snake_mut(1).unwrap();
        snake.eat(food, &res);
        assert_eq!(snake.eaten_count(), 1);

        assert_eq!(snake.animate_eat(&mut res, 4).unwrap(), 0);
        let s = res.sprite(Layer::Food, sprite).unwrap();
        assert!(s.position.approx_eq(Vec2::new(25.0, 100.0), 1e-4));
        assert!((s.scale - 0.75).abs() < 1e-6);

        for _ in 0..2 {
            snake.animate_eat(&mut res, 4).unwrap();
        }
        assert_eq!(snake.animate_eat(&mut res, 4).unwrap(), 1);
        assert_eq!(snake.eaten_count(), 0);
        assert_eq!(res.pool(Layer::Food).in_use(), 0);
    }

    #[test]
    fn test_destroy_releases_eaten_food() {
        let mut res = ResourceContext::headless();
        let mut reg = EntityRegistry::new();
        let mut map = map();
        reg.upsert_snake(&bot(1, "a", 2), &mut res).unwrap();
        reg.add_food(&FoodSpawn::new(5, 0.0, 100.0, 1.0), 0.0, &mut res, &mut map).unwrap();
        let food = reg.take_food(5, &mut map).unwrap();
        reg.snake_mut(1).unwrap().eat(food, &res);

        reg.remove_snake(1, &mut res).unwrap();
        assert_eq!(res.pool(Layer::Food).in_use(), 0);
    }

    #[test]
    fn test_clear_food() {
        let mut res = ResourceContext::headless();
        let mut reg = EntityRegistry::new();
        let mut map = map();
        for id in 0..5 {
            reg.add_food(&FoodSpawn::new(id, 10.0, 10.0, 1.0), 0.0, &mut res, &mut map).unwrap();
        }
        assert_eq!(reg.clear_food(&mut res).unwrap(), 5);
        assert_eq!(reg.food_count(), 0);
        assert_eq!(res.pool(Layer::Food).in_use(), 0);
    }

    #[test]
    fn test_snake_by_name() {
        let mut res = ResourceContext::headless();
        let mut reg = EntityRegistry::new();
        reg.upsert_snake(&bot(1, "viper", 1), &mut res).unwrap();
        reg.upsert_snake(&bot(2, "eel", 1), &mut res).unwrap();
        assert_eq!(reg.snake_by_name("eel").unwrap().id, 2);
        assert!(reg.snake_by_name("cobra").is_none());
    }
}
