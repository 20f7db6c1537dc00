//! Viewport collaborator contract and a headless implementation

use crate::render::pool::PoolHandle;
use crate::util::vec2::Vec2;

/// Screen size in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenSize {
    pub width: f32,
    pub height: f32,
}

/// World size in world units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldSize {
    pub width: f32,
    pub height: f32,
}

/// Visible rectangle reported by the viewport
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewBounds {
    pub center: Vec2,
    pub width: f32,
    pub height: f32,
}

/// Camera / viewport collaborator
pub trait Viewport {
    /// Currently visible world rectangle
    fn bounds(&self) -> ViewBounds;
    /// World-to-screen scale (1.0 = one pixel per world unit)
    fn zoom(&self) -> f32;
    fn screen(&self) -> ScreenSize;
    fn set_zoom(&mut self, zoom: f32);
    /// Track the given head sprite until `stop_following`
    fn follow(&mut self, target: PoolHandle);
    fn stop_following(&mut self);
    fn resize(&mut self, screen: ScreenSize, world: WorldSize);
    /// Zoom so the world width fills the screen
    fn fit_width(&mut self);
    /// Recompute bounds after the followed target moved
    fn update(&mut self);
}

/// Viewport without a window; its center is panned explicitly
#[derive(Debug, Clone)]
pub struct HeadlessViewport {
    screen: ScreenSize,
    world: WorldSize,
    center: Vec2,
    zoom: f32,
    follow_target: Option<PoolHandle>,
    updates: u64,
}

impl HeadlessViewport {
    pub fn new(screen: ScreenSize) -> Self {
        Self {
            screen,
            world: WorldSize {
                width: screen.width,
                height: screen.height,
            },
            center: Vec2::new(screen.width * 0.5, screen.height * 0.5),
            zoom: 1.0,
            follow_target: None,
            updates: 0,
        }
    }

    pub fn pan_to(&mut self, center: Vec2) {
        self.center = center;
    }

    pub fn follow_target(&self) -> Option<PoolHandle> {
        self.follow_target
    }

    /// Number of `update` calls received
    pub fn update_count(&self) -> u64 {
        self.updates
    }

    pub fn world(&self) -> WorldSize {
        self.world
    }
}

impl Default for HeadlessViewport {
    fn default() -> Self {
        Self::new(ScreenSize {
            width: 1280.0,
            height: 720.0,
        })
    }
}

impl Viewport for HeadlessViewport {
    fn bounds(&self) -> ViewBounds {
        ViewBounds {
            center: self.center,
            width: self.screen.width / self.zoom,
            height: self.screen.height / self.zoom,
        }
    }

    fn zoom(&self) -> f32 {
        self.zoom
    }

    fn screen(&self) -> ScreenSize {
        self.screen
    }

    fn set_zoom(&mut self, zoom: f32) {
        if zoom.is_finite() && zoom > 0.0 {
            self.zoom = zoom;
        }
    }

    fn follow(&mut self, target: PoolHandle) {
        self.follow_target = Some(target);
    }

    fn stop_following(&mut self) {
        self.follow_target = None;
    }

    fn resize(&mut self, screen: ScreenSize, world: WorldSize) {
        self.screen = screen;
        self.world = world;
    }

    fn fit_width(&mut self) {
        if self.world.width > 0.0 {
            self.set_zoom(self.screen.width / self.world.width);
        }
        self.center = Vec2::new(self.world.width * 0.5, self.world.height * 0.5);
    }

    fn update(&mut self) {
        self.updates += 1;
    }
}
