//! Round-robin food decay scheduling
//!
//! Decaying every particle every tick costs O(particles) per frame. Instead a
//! counter cycles through `rows` ticks and a single sweep runs when it wraps,
//! applying `rows` ticks worth of decay at once. The long-run decay rate is
//! unchanged; the cost is up to `rows` ticks of decay latency.

use serde::{Deserialize, Serialize};

use crate::game::constants::schedule::DECAY_ROWS;

/// Shape of the food value decay curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DecayModel {
    /// `value - rate * ticks`
    #[default]
    Linear,
    /// `value * (1 - rate)^ticks`
    Exponential,
}

impl DecayModel {
    /// Apply `ticks` ticks of decay in one step
    #[inline]
    pub fn apply(self, value: f32, rate: f32, ticks: u32) -> f32 {
        match self {
            DecayModel::Linear => value - rate * ticks as f32,
            DecayModel::Exponential => value * (1.0 - rate).max(0.0).powi(ticks as i32),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Some(DecayModel::Linear),
            "exponential" | "exp" => Some(DecayModel::Exponential),
            _ => None,
        }
    }
}

/// Fixed-size round-robin tick counter
#[derive(Debug, Clone)]
pub struct DecayScheduler {
    row: u32,
    rows: u32,
    sweeps: u64,
}

impl DecayScheduler {
    pub fn new(rows: u32) -> Self {
        Self {
            row: 0,
            rows: rows.max(1),
            sweeps: 0,
        }
    }

    /// Advance one tick. Returns true when a sweep is due this tick.
    #[inline]
    pub fn advance(&mut self) -> bool {
        self.row = (self.row + 1) % self.rows;
        if self.row == 0 {
            self.sweeps += 1;
            true
        } else {
            false
        }
    }

    /// Ticks of decay a sweep must apply
    #[inline]
    pub fn ticks_per_sweep(&self) -> u32 {
        self.rows
    }

    pub fn row(&self) -> u32 {
        self.row
    }

    /// Sweeps triggered so far
    pub fn sweeps(&self) -> u64 {
        self.sweeps
    }

    pub fn reset(&mut self) {
        self.row = 0;
    }
}

impl Default for DecayScheduler {
    fn default() -> Self {
        Self::new(DECAY_ROWS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_every_n_ticks() {
        let mut scheduler = DecayScheduler::new(16);
        let due: Vec<u32> = (1..=64).filter(|_| scheduler.advance()).collect();
        assert_eq!(due, vec![16, 32, 48, 64]);
        assert_eq!(scheduler.sweeps(), 4);
    }

    #[test]
    fn test_no_sweep_before_full_cycle() {
        let mut scheduler = DecayScheduler::default();
        for _ in 0..15 {
            assert!(!scheduler.advance());
        }
        assert!(scheduler.advance());
        assert_eq!(scheduler.row(), 0);
    }

    #[test]
    fn test_single_row_sweeps_every_tick() {
        let mut scheduler = DecayScheduler::new(0);
        assert_eq!(scheduler.ticks_per_sweep(), 1);
        assert!(scheduler.advance());
        assert!(scheduler.advance());
    }

    #[test]
    fn test_linear_batched() {
        let v = DecayModel::Linear.apply(1.0, 0.001, 16);
        assert!((v - 0.984).abs() < 1e-6);
    }

    #[test]
    fn test_exponential_batched_differs_from_linear() {
        let exp = DecayModel::Exponential.apply(1.0, 0.1, 16);
        let expected = 0.9f32.powi(16);
        assert!((exp - expected).abs() < 1e-6);
        assert!((exp - DecayModel::Linear.apply(1.0, 0.1, 16)).abs() > 0.1);
    }

    #[test]
    fn test_exponential_never_negative() {
        assert_eq!(DecayModel::Exponential.apply(2.0, 1.5, 3), 0.0);
    }

    #[test]
    fn test_parse() {
        assert_eq!(DecayModel::parse("Linear"), Some(DecayModel::Linear));
        assert_eq!(DecayModel::parse(" exp "), Some(DecayModel::Exponential));
        assert_eq!(DecayModel::parse("cubic"), None);
    }
}
