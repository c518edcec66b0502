//! Compressor and waveshaping distortion

use fundsp::hacker::{amp_db, db_amp};

use super::{AudioEffect, EffectParam};

const MIN_THRESHOLD_DB: f32 = -60.0;
const MAX_RATIO: f32 = 20.0;
const MAX_MAKEUP_DB: f32 = 24.0;
/// Envelope floor; anything quieter is treated as silence
const SILENCE: f32 = 1e-6;

/// Feed-forward compressor with a stereo-linked peak envelope
#[derive(Debug)]
pub struct Compressor {
    threshold_db: f32,
    ratio: f32,
    attack_ms: f32,
    release_ms: f32,
    makeup_db: f32,
    sample_rate: f32,
    attack_coeff: f32,
    release_coeff: f32,
    envelope: f32,
    bypassed: bool,
}

impl Compressor {
    pub fn new(sample_rate: f32) -> Self {
        let mut compressor = Self {
            threshold_db: 0.0,
            ratio: 1.0,
            attack_ms: 10.0,
            release_ms: 100.0,
            makeup_db: 0.0,
            sample_rate,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            envelope: 0.0,
            bypassed: false,
        };
        compressor.update_coefficients();
        compressor
    }

    fn update_coefficients(&mut self) {
        let coeff = |ms: f32| (-1.0 / (ms * 0.001 * self.sample_rate)).exp();
        self.attack_coeff = coeff(self.attack_ms);
        self.release_coeff = coeff(self.release_ms);
    }

    pub fn set_threshold_db(&mut self, db: f32) {
        if db.is_finite() {
            self.threshold_db = db.clamp(MIN_THRESHOLD_DB, 0.0);
        }
    }

    pub fn set_ratio(&mut self, ratio: f32) {
        if ratio.is_finite() {
            self.ratio = ratio.clamp(1.0, MAX_RATIO);
        }
    }

    pub fn set_times(&mut self, attack_ms: f32, release_ms: f32) {
        let attack_ms = if attack_ms.is_finite() { attack_ms.clamp(0.1, 100.0) } else { self.attack_ms };
        let release_ms = if release_ms.is_finite() { release_ms.clamp(10.0, 1000.0) } else { self.release_ms };
        if attack_ms != self.attack_ms || release_ms != self.release_ms {
            self.attack_ms = attack_ms;
            self.release_ms = release_ms;
            self.update_coefficients();
        }
    }

    pub fn set_makeup_db(&mut self, db: f32) {
        if db.is_finite() {
            self.makeup_db = db.clamp(0.0, MAX_MAKEUP_DB);
        }
    }

    /// Gain for the current envelope, never above the makeup gain
    fn gain(&self) -> f32 {
        if self.envelope <= SILENCE {
            return db_amp(self.makeup_db);
        }
        let level_db = amp_db(self.envelope);
        let over = level_db - self.threshold_db;
        let reduction = if over > 0.0 { over * (1.0 - 1.0 / self.ratio) } else { 0.0 };
        db_amp(self.makeup_db - reduction)
    }
}

impl AudioEffect for Compressor {
    fn name(&self) -> &str { "Compressor" }

    fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        if self.ratio <= 1.0 && self.makeup_db == 0.0 {
            return;
        }
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let peak = l.abs().max(r.abs());
            let coeff = if peak > self.envelope { self.attack_coeff } else { self.release_coeff };
            self.envelope = peak + coeff * (self.envelope - peak);
            if !self.envelope.is_finite() {
                self.envelope = 0.0;
            }
            let gain = self.gain();
            *l *= gain;
            *r *= gain;
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "threshold" => self.set_threshold_db(value),
            "ratio" => self.set_ratio(value),
            "attack" => self.set_times(value, self.release_ms),
            "release" => self.set_times(self.attack_ms, value),
            "makeup" => self.set_makeup_db(value),
            _ => {}
        }
    }

    fn get_params(&self) -> Vec<EffectParam> {
        vec![
            EffectParam::new("threshold", self.threshold_db, MIN_THRESHOLD_DB, 0.0, "dB"),
            EffectParam::new("ratio", self.ratio, 1.0, MAX_RATIO, ":1"),
            EffectParam::new("attack", self.attack_ms, 0.1, 100.0, "ms"),
            EffectParam::new("release", self.release_ms, 10.0, 1000.0, "ms"),
            EffectParam::new("makeup", self.makeup_db, 0.0, MAX_MAKEUP_DB, "dB"),
        ]
    }

    fn set_bypass(&mut self, bypass: bool) { self.bypassed = bypass; }
    fn is_bypassed(&self) -> bool { self.bypassed }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        if sample_rate > 0.0 {
            self.sample_rate = sample_rate;
            self.update_coefficients();
        }
    }

    fn reset(&mut self) {
        self.envelope = 0.0;
    }
}

/// tanh waveshaper normalized so full-scale input stays at full scale
#[derive(Debug)]
pub struct Distortion {
    drive: f32,
    mix: f32,
    bypassed: bool,
}

impl Distortion {
    pub fn new(drive: f32, mix: f32) -> Self {
        let mut distortion = Self { drive: 0.0, mix: 0.0, bypassed: false };
        distortion.set_drive(drive);
        distortion.set_mix(mix);
        distortion
    }

    pub fn set_drive(&mut self, drive: f32) {
        if drive.is_finite() {
            self.drive = drive.clamp(0.0, 1.0);
        }
    }

    pub fn set_mix(&mut self, mix: f32) {
        if mix.is_finite() {
            self.mix = mix.clamp(0.0, 1.0);
        }
    }
}

impl AudioEffect for Distortion {
    fn name(&self) -> &str { "Distortion" }

    fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        if self.mix == 0.0 {
            return;
        }
        let pre = 1.0 + self.drive * 24.0;
        let norm = 1.0 / pre.tanh();
        for sample in left.iter_mut().chain(right.iter_mut()) {
            let wet = (*sample * pre).tanh() * norm;
            *sample = *sample * (1.0 - self.mix) + wet * self.mix;
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "drive" => self.set_drive(value),
            "mix" => self.set_mix(value),
            _ => {}
        }
    }

    fn get_params(&self) -> Vec<EffectParam> {
        vec![
            EffectParam::new("drive", self.drive, 0.0, 1.0, ""),
            EffectParam::new("mix", self.mix, 0.0, 1.0, ""),
        ]
    }

    fn set_bypass(&mut self, bypass: bool) { self.bypassed = bypass; }
    fn is_bypassed(&self) -> bool { self.bypassed }
}
