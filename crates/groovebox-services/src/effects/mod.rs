//! Mixer effects: the closed set used on the send buses and master chain

mod dynamics;
mod eq;
mod time;

pub use dynamics::{Compressor, Distortion};
pub use eq::ThreeBandEq;
pub use time::{Reverb, StereoDelay};

use std::fmt::Debug;

/// Stereo effect processed in place on planar buffers
pub trait AudioEffect: Send + Debug {
    fn name(&self) -> &str;
    fn process(&mut self, left: &mut [f32], right: &mut [f32]);
    fn set_param(&mut self, name: &str, value: f32);
    fn get_params(&self) -> Vec<EffectParam>;
    fn set_bypass(&mut self, bypass: bool);
    fn is_bypassed(&self) -> bool;
    /// Update sample rate for effects that depend on it
    fn set_sample_rate(&mut self, _sample_rate: f32) {}
    /// Clear internal state such as delay lines and envelopes
    fn reset(&mut self) {}
}

#[derive(Debug, Clone, PartialEq)]
pub struct EffectParam {
    pub name: String,
    pub value: f32,
    pub min: f32,
    pub max: f32,
    pub unit: String,
}

impl EffectParam {
    pub fn new(name: &str, value: f32, min: f32, max: f32, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            value,
            min,
            max,
            unit: unit.to_string(),
        }
    }
}

/// Every effect the mixer can host
#[derive(Debug)]
pub enum Effect {
    Eq(ThreeBandEq),
    Compressor(Compressor),
    Distortion(Distortion),
    Delay(StereoDelay),
    Reverb(Reverb),
}

impl Effect {
    fn inner(&self) -> &dyn AudioEffect {
        match self {
            Self::Eq(e) => e,
            Self::Compressor(c) => c,
            Self::Distortion(d) => d,
            Self::Delay(d) => d,
            Self::Reverb(r) => r,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn AudioEffect {
        match self {
            Self::Eq(e) => e,
            Self::Compressor(c) => c,
            Self::Distortion(d) => d,
            Self::Delay(d) => d,
            Self::Reverb(r) => r,
        }
    }
}

impl AudioEffect for Effect {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        match self {
            Self::Eq(e) => e.process(left, right),
            Self::Compressor(c) => c.process(left, right),
            Self::Distortion(d) => d.process(left, right),
            Self::Delay(d) => d.process(left, right),
            Self::Reverb(r) => r.process(left, right),
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        self.inner_mut().set_param(name, value);
    }

    fn get_params(&self) -> Vec<EffectParam> {
        self.inner().get_params()
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.inner_mut().set_bypass(bypass);
    }

    fn is_bypassed(&self) -> bool {
        self.inner().is_bypassed()
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.inner_mut().set_sample_rate(sample_rate);
    }

    fn reset(&mut self) {
        self.inner_mut().reset();
    }
}

/// Effects run in order, skipping bypassed ones
#[derive(Debug, Default)]
pub struct EffectChain {
    effects: Vec<Effect>,
    bypass_all: bool,
}

impl EffectChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        if self.bypass_all {
            return;
        }
        for effect in &mut self.effects {
            if !effect.is_bypassed() {
                effect.process(left, right);
            }
        }
    }

    pub fn set_bypass_all(&mut self, bypass: bool) {
        self.bypass_all = bypass;
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn effects_mut(&mut self) -> &mut [Effect] {
        &mut self.effects
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        for effect in &mut self.effects {
            effect.set_sample_rate(sample_rate);
        }
    }

    pub fn reset(&mut self) {
        for effect in &mut self.effects {
            effect.reset();
        }
    }
}
