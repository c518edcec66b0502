//! Swing and humanization applied to generated note events

use serde::{Deserialize, Serialize};

use crate::limits::{MAX_HUMANIZE_TIMING, MAX_HUMANIZE_VELOCITY, MAX_SWING_DELAY};

/// Grid that swing and humanization are measured against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Subdivision {
    Eighth,
    #[default]
    Sixteenth,
    ThirtySecond,
}

impl Subdivision {
    /// Length of one grid step in quarter-note beats
    pub fn beats(&self) -> f64 {
        match self {
            Self::Eighth => 0.5,
            Self::Sixteenth => 0.25,
            Self::ThirtySecond => 0.125,
        }
    }
}

/// Forward delay in beats for an event at `pattern_beat`.
///
/// Only events on an odd grid step move; even steps and swing 0 return 0.
pub fn swing_delay(pattern_beat: f64, swing: f32, subdivision: Subdivision) -> f64 {
    let swing = swing.clamp(0.0, 1.0) as f64;
    if swing == 0.0 || pattern_beat < 0.0 {
        return 0.0;
    }
    let step = subdivision.beats();
    let index = (pattern_beat / step + 1e-9).floor() as u64;
    if index % 2 == 1 {
        swing * MAX_SWING_DELAY * step
    } else {
        0.0
    }
}

/// Seedable random timing/velocity jitter
#[derive(Debug, Clone)]
pub struct Humanizer {
    rng: fastrand::Rng,
}

impl Default for Humanizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Humanizer {
    /// OS-seeded humanizer
    pub fn new() -> Self {
        Self { rng: fastrand::Rng::new() }
    }

    /// Deterministic humanizer for reproducible output
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: fastrand::Rng::with_seed(seed) }
    }

    fn bipolar(&mut self) -> f64 {
        self.rng.f64() * 2.0 - 1.0
    }

    /// Returns (timing offset in beats, velocity offset) for one note.
    ///
    /// Timing stays within ±amount × 10% of a subdivision, velocity within
    /// ±amount × 12.
    pub fn jitter(&mut self, amount: f32, subdivision_beats: f64) -> (f64, i32) {
        let amount = amount.clamp(0.0, 1.0);
        if amount == 0.0 {
            return (0.0, 0);
        }
        let timing = self.bipolar() * amount as f64 * MAX_HUMANIZE_TIMING * subdivision_beats;
        let velocity = (self.bipolar() * (amount * MAX_HUMANIZE_VELOCITY) as f64).round() as i32;
        (timing, velocity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_swing_is_identity() {
        for i in 0..64 {
            let beat = i as f64 * 0.25;
            assert_eq!(swing_delay(beat, 0.0, Subdivision::Sixteenth), 0.0);
        }
    }

    #[test]
    fn test_swing_moves_odd_steps_forward_only() {
        let sub = Subdivision::Sixteenth;
        for i in 0..32u32 {
            let beat = i as f64 * sub.beats();
            let delay = swing_delay(beat, 0.6, sub);
            if i % 2 == 0 {
                assert_eq!(delay, 0.0);
            } else {
                assert!(delay > 0.0);
                assert!((delay - 0.6 * MAX_SWING_DELAY * 0.25).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_swing_clamped_to_max() {
        let delay = swing_delay(0.5, 5.0, Subdivision::Eighth);
        assert!((delay - MAX_SWING_DELAY * 0.5).abs() < 1e-12);
        assert_eq!(swing_delay(0.5, -1.0, Subdivision::Eighth), 0.0);
    }

    #[test]
    fn test_humanize_bounds() {
        let mut humanizer = Humanizer::with_seed(7);
        for _ in 0..10_000 {
            let (timing, velocity) = humanizer.jitter(1.0, 0.25);
            assert!(timing.abs() <= MAX_HUMANIZE_TIMING * 0.25 + 1e-12);
            assert!(velocity.abs() <= MAX_HUMANIZE_VELOCITY as i32);
        }
        assert_eq!(humanizer.jitter(0.0, 0.25), (0.0, 0));
    }

    #[test]
    fn test_seeded_humanizers_agree() {
        let mut a = Humanizer::with_seed(42);
        let mut b = Humanizer::with_seed(42);
        for _ in 0..100 {
            assert_eq!(a.jitter(0.7, 0.25), b.jitter(0.7, 0.25));
        }
    }
}
