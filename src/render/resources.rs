//! Sprite resources shared by every visualization instance
//!
//! A `ResourceContext` is created once at startup and handed to the
//! visualization that uses it. It owns the sprite pools and the scene-graph
//! collaborator, so pooled sprites survive across visualization instances
//! without any process-wide state.

use serde::{Deserialize, Serialize};

use crate::render::pool::{ObjectPool, PoolError, PoolHandle, Poolable};
use crate::util::vec2::Vec2;

/// Opaque texture identifier issued by the asset loader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureId(pub u32);

/// Textures used by the arena view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureSet {
    pub head: TextureId,
    pub body: TextureId,
    pub food: TextureId,
}

impl Default for TextureSet {
    fn default() -> Self {
        Self {
            head: TextureId(0),
            body: TextureId(1),
            food: TextureId(2),
        }
    }
}

/// Scene layer a sprite is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Food,
    SnakeHeads,
    SnakeSegments,
}

/// Renderable sprite state read by the renderer
#[derive(Debug, Clone, PartialEq)]
pub struct Sprite {
    pub texture: TextureId,
    pub position: Vec2,
    pub rotation: f32,
    pub scale: f32,
    pub tint: u32,
    pub alpha: f32,
    pub visible: bool,
}

impl Sprite {
    pub fn new(texture: TextureId) -> Self {
        Self {
            texture,
            position: Vec2::ZERO,
            rotation: 0.0,
            scale: 1.0,
            tint: 0xFFFFFF,
            alpha: 1.0,
            visible: false,
        }
    }
}

impl Poolable for Sprite {
    fn reset(&mut self) {
        // Texture is fixed per pool; everything else is entity state
        self.position = Vec2::ZERO;
        self.rotation = 0.0;
        self.scale = 1.0;
        self.tint = 0xFFFFFF;
        self.alpha = 1.0;
        self.visible = false;
    }
}

/// Scene-graph collaborator
///
/// `attach` is called exactly once for every sprite a pool constructs.
/// Reuse never re-attaches; only visibility and transform change afterwards.
pub trait SceneGraph {
    fn attach(&mut self, layer: Layer, handle: PoolHandle);
}

/// Scene graph that only records attachments (headless runs and tests)
#[derive(Debug, Default)]
pub struct HeadlessScene {
    pub food: usize,
    pub heads: usize,
    pub segments: usize,
}

impl HeadlessScene {
    pub fn total(&self) -> usize {
        self.food + self.heads + self.segments
    }
}

impl SceneGraph for HeadlessScene {
    fn attach(&mut self, layer: Layer, _handle: PoolHandle) {
        match layer {
            Layer::Food => self.food += 1,
            Layer::SnakeHeads => self.heads += 1,
            Layer::SnakeSegments => self.segments += 1,
        }
    }
}

/// Explicitly owned sprite pools plus the scene they are attached to
pub struct ResourceContext {
    textures: TextureSet,
    food: ObjectPool<Sprite>,
    heads: ObjectPool<Sprite>,
    segments: ObjectPool<Sprite>,
    scene: Box<dyn SceneGraph>,
}

impl ResourceContext {
    pub fn new(textures: TextureSet, scene: Box<dyn SceneGraph>) -> Self {
        let (food_tx, head_tx, body_tx) = (textures.food, textures.head, textures.body);
        Self {
            textures,
            food: ObjectPool::new(move || Sprite::new(food_tx)),
            heads: ObjectPool::new(move || Sprite::new(head_tx)),
            segments: ObjectPool::new(move || Sprite::new(body_tx)),
            scene,
        }
    }

    /// Headless context with default texture ids
    pub fn headless() -> Self {
        Self::new(TextureSet::default(), Box::new(HeadlessScene::default()))
    }

    /// Pre-construct food and segment sprites (the high-churn layers)
    pub fn prewarm(&mut self, count: usize) {
        for handle in self.food.prewarm(count) {
            self.scene.attach(Layer::Food, handle);
        }
        for handle in self.segments.prewarm(count) {
            self.scene.attach(Layer::SnakeSegments, handle);
        }
        tracing::debug!("Prewarmed sprite pools with {} objects each", count);
    }

    pub fn textures(&self) -> TextureSet {
        self.textures
    }

    /// Acquire a sprite, attaching it to the scene if it was just constructed
    pub fn acquire(&mut self, layer: Layer) -> PoolHandle {
        let (handle, fresh) = self.pool_mut(layer).acquire_tracked();
        if fresh {
            self.scene.attach(layer, handle);
        }
        handle
    }

    /// Return a sprite to its pool
    #[inline]
    pub fn release(&mut self, layer: Layer, handle: PoolHandle) -> Result<(), PoolError> {
        self.pool_mut(layer).release(handle)
    }

    #[inline]
    pub fn sprite(&self, layer: Layer, handle: PoolHandle) -> Option<&Sprite> {
        self.pool(layer).get(handle)
    }

    #[inline]
    pub fn sprite_mut(&mut self, layer: Layer, handle: PoolHandle) -> Option<&mut Sprite> {
        self.pool_mut(layer).get_mut(handle)
    }

    pub fn pool(&self, layer: Layer) -> &ObjectPool<Sprite> {
        match layer {
            Layer::Food => &self.food,
            Layer::SnakeHeads => &self.heads,
            Layer::SnakeSegments => &self.segments,
        }
    }

    fn pool_mut(&mut self, layer: Layer) -> &mut ObjectPool<Sprite> {
        match layer {
            Layer::Food => &mut self.food,
            Layer::SnakeHeads => &mut self.heads,
            Layer::SnakeSegments => &mut self.segments,
        }
    }
}
