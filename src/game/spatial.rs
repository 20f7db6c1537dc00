//! Uniform grid over world space indexing food particles
//!
//! Answers "which food particles are inside the camera rectangle" without
//! scanning the whole population, and supports batched eviction sweeps.
//! Entries are non-owning back-references: the registry owns the food.

use crate::game::constants::food::CELL_INITIAL_CAPACITY;
use crate::game::state::FoodKey;
use crate::util::vec2::{Rect, Vec2};

/// Cell coordinates (column, row)
pub type CellKey = (u32, u32);

/// Back-reference stored in a grid cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FoodEntry {
    pub key: FoodKey,
    pub position: Vec2,
}

#[derive(Debug, Default)]
struct Cell {
    entries: Vec<FoodEntry>,
    active: bool,
}

/// Inclusive range of cells overlapping the camera rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CellWindow {
    min: CellKey,
    max: CellKey,
}

/// Spatial particle map
#[derive(Debug)]
pub struct FoodMap {
    width: f32,
    height: f32,
    columns: u32,
    rows: u32,
    /// Inverse cell extents for fast position-to-cell conversion
    inv_cell_width: f32,
    inv_cell_height: f32,
    cells: Vec<Cell>,
    /// Active window and the rectangle it was computed from
    window: Option<CellWindow>,
    window_rect: Rect,
    /// Extra margin (world units) added around the camera rectangle
    overscan: f32,
    len: usize,
}

impl FoodMap {
    /// Create a grid of `columns` x `rows` cells covering `width` x `height`
    pub fn new(width: f32, height: f32, columns: u32, rows: u32) -> Self {
        let columns = columns.max(1);
        let rows = rows.max(1);
        let mut cells = Vec::with_capacity((columns * rows) as usize);
        cells.resize_with((columns * rows) as usize, || Cell {
            entries: Vec::with_capacity(CELL_INITIAL_CAPACITY),
            active: false,
        });

        Self {
            width,
            height,
            columns,
            rows,
            inv_cell_width: columns as f32 / width,
            inv_cell_height: rows as f32 / height,
            cells,
            window: None,
            window_rect: Rect::default(),
            overscan: 0.0,
            len: 0,
        }
    }

    pub fn with_overscan(mut self, overscan: f32) -> Self {
        self.overscan = overscan.max(0.0);
        self
    }

    /// Convert world position to cell key, clamped to the grid
    #[inline]
    pub fn cell_of(&self, position: Vec2) -> CellKey {
        let cx = (position.x * self.inv_cell_width).floor();
        let cy = (position.y * self.inv_cell_height).floor();
        (
            (cx.max(0.0) as u32).min(self.columns - 1),
            (cy.max(0.0) as u32).min(self.rows - 1),
        )
    }

    #[inline]
    fn cell_index(&self, (cx, cy): CellKey) -> usize {
        (cy * self.columns + cx) as usize
    }

    /// Insert a food particle into the cell covering its position
    pub fn add(&mut self, key: FoodKey, position: Vec2) {
        let idx = self.cell_index(self.cell_of(position));
        self.cells[idx].entries.push(FoodEntry { key, position });
        self.len += 1;
    }

    /// Remove a food particle; returns true if it was present
    pub fn remove(&mut self, key: FoodKey, position: Vec2) -> bool {
        let idx = self.cell_index(self.cell_of(position));
        let cell = &mut self.cells[idx];
        if let Some(pos) = cell.entries.iter().position(|e| e.key == key) {
            cell.entries.swap_remove(pos);
            self.len -= 1;
            return true;
        }
        false
    }

    /// Recompute the active window for a camera rectangle
    pub fn update(&mut self, center: Vec2, width: f32, height: f32) {
        let rect = Rect::from_center(center, width, height).expand(self.overscan);
        let window = self.window_for(rect);

        if let Some(old) = self.window.take() {
            self.set_window_active(old, false);
        }
        if let Some(new) = window {
            self.set_window_active(new, true);
        }
        self.window = window;
        self.window_rect = rect;
    }

    fn window_for(&self, rect: Rect) -> Option<CellWindow> {
        let outside = rect.max.x <= 0.0
            || rect.max.y <= 0.0
            || rect.min.x >= self.width
            || rect.min.y >= self.height
            || !rect.min.is_finite()
            || !rect.max.is_finite();
        if outside {
            return None;
        }
        Some(CellWindow {
            min: self.cell_of(rect.min),
            max: self.cell_of(rect.max),
        })
    }

    fn set_window_active(&mut self, window: CellWindow, active: bool) {
        for cy in window.min.1..=window.max.1 {
            for cx in window.min.0..=window.max.0 {
                let idx = self.cell_index((cx, cy));
                self.cells[idx].active = active;
            }
        }
    }

    /// Visit every particle of the active window lying inside the window rectangle
    pub fn iterate<F>(&self, mut visitor: F)
    where
        F: FnMut(&FoodEntry),
    {
        let Some(window) = self.window else {
            return;
        };
        for cy in window.min.1..=window.max.1 {
            for cx in window.min.0..=window.max.0 {
                let cell = &self.cells[self.cell_index((cx, cy))];
                for entry in &cell.entries {
                    if self.window_rect.contains(entry.position) {
                        visitor(entry);
                    }
                }
            }
        }
    }

    /// Evict every entry for which `evict` returns true. Returns the number evicted.
    pub fn garbage_collect<F>(&mut self, mut evict: F) -> usize
    where
        F: FnMut(FoodKey) -> bool,
    {
        let mut evicted = 0;
        for cell in &mut self.cells {
            let before = cell.entries.len();
            cell.entries.retain(|e| !evict(e.key));
            evicted += before - cell.entries.len();
        }
        self.len -= evicted;
        evicted
    }

    /// True if the cell covering `position` is inside the active window
    #[inline]
    pub fn is_active(&self, position: Vec2) -> bool {
        self.cells[self.cell_index(self.cell_of(position))].active
    }

    /// True if `position` lies inside the current window rectangle
    #[inline]
    pub fn in_window(&self, position: Vec2) -> bool {
        self.window.is_some() && self.window_rect.contains(position)
    }

    /// Drop all entries and the active window
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.entries.clear();
            cell.active = false;
        }
        self.window = None;
        self.len = 0;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.columns, self.rows)
    }

    /// Get statistics about the grid
    pub fn stats(&self) -> FoodMapStats {
        FoodMapStats {
            non_empty_cells: self.cells.iter().filter(|c| !c.entries.is_empty()).count(),
            active_cells: self.cells.iter().filter(|c| c.active).count(),
            total_entries: self.len,
            max_per_cell: self.cells.iter().map(|c| c.entries.len()).max().unwrap_or(0),
        }
    }
}

/// Statistics about the food map
#[derive(Debug, Clone)]
pub struct FoodMapStats {
    pub non_empty_cells: usize,
    pub active_cells: usize,
    pub total_entries: usize,
    pub max_per_cell: usize,
}
