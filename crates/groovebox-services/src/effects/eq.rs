//! Three-band equalizer built from fundsp state-variable filters

use std::fmt;

use fundsp::hacker::*;
use groovebox_core::limits::{EQ_GAIN_MAX_DB, EQ_GAIN_MIN_DB};

use super::{AudioEffect, EffectParam};

const LOW_SHELF_HZ: f32 = 100.0;
const MID_BELL_HZ: f32 = 1000.0;
const HIGH_SHELF_HZ: f32 = 8000.0;
const Q: f32 = 0.707;

/// Filter state for one channel
struct Bands {
    low: An<FixedSvf<f64, LowshelfMode<f64>>>,
    mid: An<FixedSvf<f64, BellMode<f64>>>,
    high: An<FixedSvf<f64, HighshelfMode<f64>>>,
}

impl Bands {
    fn new(sample_rate: f32) -> Self {
        let mut bands = Self {
            low: lowshelf_hz(LOW_SHELF_HZ, Q, 1.0),
            mid: bell_hz(MID_BELL_HZ, Q, 1.0),
            high: highshelf_hz(HIGH_SHELF_HZ, Q, 1.0),
        };
        bands.set_sample_rate(sample_rate);
        bands
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.low.set_sample_rate(sample_rate as f64);
        self.mid.set_sample_rate(sample_rate as f64);
        self.high.set_sample_rate(sample_rate as f64);
    }

    fn set_gains(&mut self, low_db: f32, mid_db: f32, high_db: f32) {
        self.low.set(Setting::center_q_gain(LOW_SHELF_HZ, Q, db_amp(low_db) as f32));
        self.mid.set(Setting::center_q_gain(MID_BELL_HZ, Q, db_amp(mid_db) as f32));
        self.high.set(Setting::center_q_gain(HIGH_SHELF_HZ, Q, db_amp(high_db) as f32));
    }

    fn reset(&mut self) {
        self.low.reset();
        self.mid.reset();
        self.high.reset();
    }

    fn tick(&mut self, sample: f32) -> f32 {
        let x = self.low.tick(&Frame::from([sample]))[0];
        let x = self.mid.tick(&Frame::from([x]))[0];
        self.high.tick(&Frame::from([x]))[0]
    }
}

/// Low shelf at 100 Hz, bell at 1 kHz and high shelf at 8 kHz.
///
/// A flat EQ (all gains 0 dB) passes audio through untouched.
pub struct ThreeBandEq {
    low_db: f32,
    mid_db: f32,
    high_db: f32,
    left: Bands,
    right: Bands,
    bypassed: bool,
}

impl ThreeBandEq {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            low_db: 0.0,
            mid_db: 0.0,
            high_db: 0.0,
            left: Bands::new(sample_rate),
            right: Bands::new(sample_rate),
            bypassed: false,
        }
    }

    /// Update band gains; filters are only recomputed when a value changes
    pub fn set_gains(&mut self, low_db: f32, mid_db: f32, high_db: f32) {
        let clamp = |db: f32| if db.is_finite() { db.clamp(EQ_GAIN_MIN_DB, EQ_GAIN_MAX_DB) } else { 0.0 };
        let (low_db, mid_db, high_db) = (clamp(low_db), clamp(mid_db), clamp(high_db));
        if low_db == self.low_db && mid_db == self.mid_db && high_db == self.high_db {
            return;
        }
        self.low_db = low_db;
        self.mid_db = mid_db;
        self.high_db = high_db;
        self.left.set_gains(low_db, mid_db, high_db);
        self.right.set_gains(low_db, mid_db, high_db);
    }

    pub fn is_flat(&self) -> bool {
        self.low_db == 0.0 && self.mid_db == 0.0 && self.high_db == 0.0
    }
}

impl fmt::Debug for ThreeBandEq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreeBandEq")
            .field("low_db", &self.low_db)
            .field("mid_db", &self.mid_db)
            .field("high_db", &self.high_db)
            .field("bypassed", &self.bypassed)
            .finish()
    }
}

impl AudioEffect for ThreeBandEq {
    fn name(&self) -> &str { "EQ" }

    fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        if self.is_flat() {
            return;
        }
        for sample in left.iter_mut() {
            *sample = self.left.tick(*sample);
        }
        for sample in right.iter_mut() {
            *sample = self.right.tick(*sample);
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "low" => self.set_gains(value, self.mid_db, self.high_db),
            "mid" => self.set_gains(self.low_db, value, self.high_db),
            "high" => self.set_gains(self.low_db, self.mid_db, value),
            _ => {}
        }
    }

    fn get_params(&self) -> Vec<EffectParam> {
        vec![
            EffectParam::new("low", self.low_db, EQ_GAIN_MIN_DB, EQ_GAIN_MAX_DB, "dB"),
            EffectParam::new("mid", self.mid_db, EQ_GAIN_MIN_DB, EQ_GAIN_MAX_DB, "dB"),
            EffectParam::new("high", self.high_db, EQ_GAIN_MIN_DB, EQ_GAIN_MAX_DB, "dB"),
        ]
    }

    fn set_bypass(&mut self, bypass: bool) { self.bypassed = bypass; }
    fn is_bypassed(&self) -> bool { self.bypassed }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.left.set_sample_rate(sample_rate);
        self.right.set_sample_rate(sample_rate);
    }

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (std::f32::consts::TAU * freq * i as f32 / sample_rate).sin() * 0.5)
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_flat_eq_passes_through() {
        let mut eq = ThreeBandEq::new(48000.0);
        let input = sine(440.0, 48000.0, 512);
        let mut left = input.clone();
        let mut right = input.clone();
        eq.process(&mut left, &mut right);
        assert_eq!(left, input);
    }

    #[test]
    fn test_low_cut_reduces_bass() {
        let mut eq = ThreeBandEq::new(48000.0);
        eq.set_gains(-24.0, 0.0, 0.0);
        let input = sine(40.0, 48000.0, 48000);
        let mut left = input.clone();
        let mut right = input.clone();
        eq.process(&mut left, &mut right);
        // skip the filter settling time
        assert!(rms(&left[24000..]) < rms(&input[24000..]) * 0.5);
    }

    #[test]
    fn test_gains_clamped() {
        let mut eq = ThreeBandEq::new(48000.0);
        eq.set_param("high", 100.0);
        eq.set_param("mid", f32::NAN);
        let params = eq.get_params();
        assert_eq!(params[2].value, EQ_GAIN_MAX_DB);
        assert_eq!(params[1].value, 0.0);
    }
}
