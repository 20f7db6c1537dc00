//! Snake movement strategies
//!
//! The strategy is picked once when the visualization is built. Both variants
//! understand both payload styles; they differ only in how body segments
//! reach their new positions.

use serde::{Deserialize, Serialize};

use crate::game::constants::segments_for_mass;
use crate::game::state::SnakeBody;
use crate::util::vec2::Vec2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MoveStrategy {
    /// Segments jump straight to the authoritative positions
    Snap,
    /// The head snaps; body segments move `blend` of the way each update
    Smooth { blend: f32 },
}

impl Default for MoveStrategy {
    fn default() -> Self {
        MoveStrategy::Snap
    }
}

impl MoveStrategy {
    /// Apply a legacy payload carrying the full body
    pub fn legacy_move(
        &self,
        body: &mut SnakeBody,
        segments: &[Vec2],
        length: f32,
        segment_radius: f32,
    ) {
        body.length = length;
        if segment_radius.is_finite() && segment_radius > 0.0 {
            body.segment_radius = segment_radius;
        }

        match *self {
            MoveStrategy::Snap => {
                body.segments.clear();
                body.segments.extend_from_slice(segments);
            }
            MoveStrategy::Smooth { blend } => {
                let shared = body.segments.len().min(segments.len());
                for (i, target) in segments.iter().enumerate().take(shared) {
                    body.segments[i] = if i == 0 {
                        *target
                    } else {
                        body.segments[i].lerp(*target, blend)
                    };
                }
                body.segments.truncate(segments.len());
                body.segments.extend_from_slice(&segments[shared..]);
            }
        }
    }

    /// Apply an incremental payload: new head positions, oldest first
    pub fn incremental_move(&self, body: &mut SnakeBody, mass: f32, positions: &[Vec2]) {
        body.mass = mass;
        let n = positions.len();
        if n == 0 {
            return;
        }

        match *self {
            MoveStrategy::Snap => {
                body.segments.splice(0..0, positions.iter().rev().copied());
            }
            MoveStrategy::Smooth { blend } => {
                let old_len = body.segments.len();
                let tail = body.segments.last().copied().unwrap_or(positions[0]);
                body.segments.resize(old_len + n, tail);
                // Back to front so lower indices still hold their old positions
                for k in (n..old_len + n).rev() {
                    let target = body.segments[k - n];
                    let from = if k < old_len { body.segments[k] } else { target };
                    body.segments[k] = from.lerp(target, blend);
                }
                for (k, p) in positions.iter().rev().enumerate() {
                    body.segments[k] = *p;
                }
            }
        }

        body.segments.truncate(segments_for_mass(mass));
    }
}
