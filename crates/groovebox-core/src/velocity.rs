//! Velocity response curves

use serde::{Deserialize, Serialize};

use crate::limits::{DEFAULT_FIXED_VELOCITY, MAX_VELOCITY, MIN_VELOCITY};

/// How a generated velocity is reshaped before output
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum VelocityCurve {
    #[default]
    Linear,
    /// Soft notes get softer
    Exponential,
    /// Soft notes get louder
    Logarithmic,
    /// Pushes the extremes outward: soft notes softer, loud notes louder
    SCurve,
    /// Every note at the same level
    Fixed(u8),
}

impl VelocityCurve {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Linear => "Linear",
            Self::Exponential => "Exponential",
            Self::Logarithmic => "Logarithmic",
            Self::SCurve => "S-Curve",
            Self::Fixed(_) => "Fixed",
        }
    }

    pub fn all() -> [VelocityCurve; 5] {
        [
            Self::Linear,
            Self::Exponential,
            Self::Logarithmic,
            Self::SCurve,
            Self::Fixed(DEFAULT_FIXED_VELOCITY),
        ]
    }
}

/// Map a velocity through a curve. The result is always in 1..=127.
pub fn apply_velocity_curve(velocity: u8, curve: VelocityCurve) -> u8 {
    let min = MIN_VELOCITY as f64;
    let max = MAX_VELOCITY as f64;
    let x = (velocity.clamp(MIN_VELOCITY, MAX_VELOCITY) as f64 - min) / (max - min);

    let shaped = match curve {
        VelocityCurve::Linear => x,
        VelocityCurve::Exponential => x * x,
        VelocityCurve::Logarithmic => (1.0 + 9.0 * x).log10(),
        VelocityCurve::SCurve => x * x * (3.0 - 2.0 * x),
        VelocityCurve::Fixed(level) => return level.clamp(MIN_VELOCITY, MAX_VELOCITY),
    };

    (min + shaped.clamp(0.0, 1.0) * (max - min)).round() as u8
}
