//! Eight-channel stereo mixer with reverb/delay sends and a master chain

use std::sync::Arc;
use std::sync::atomic::Ordering;

use groovebox_core::limits::PLAYER_COUNT;
use tracing::info;

use crate::effects::{
    AudioEffect, Compressor, Distortion, Effect, EffectChain, Reverb, StereoDelay, ThreeBandEq,
};
use crate::shared::{MasterParams, SharedParams};

/// Planar stereo scratch buffer sized at `prepare`
#[derive(Debug, Default)]
struct StereoBuffer {
    left: Vec<f32>,
    right: Vec<f32>,
}

impl StereoBuffer {
    fn resize(&mut self, frames: usize) {
        self.left = vec![0.0; frames];
        self.right = vec![0.0; frames];
    }

    fn clear(&mut self, frames: usize) {
        self.left[..frames].fill(0.0);
        self.right[..frames].fill(0.0);
    }
}

/// Balance pan: the far side is attenuated, the near side stays at unity
fn balance(volume: f32, pan: f32) -> (f32, f32) {
    let mut left = volume;
    let mut right = volume;
    if pan > 0.0 {
        left *= 1.0 - pan;
    } else if pan < 0.0 {
        right *= 1.0 + pan;
    }
    (left, right)
}

/// Mixes one interleaved stereo input per player into an interleaved output.
///
/// Levels come from `SharedParams::channels` and `SharedParams::master`, read
/// once per block.
#[derive(Debug)]
pub struct Mixer {
    shared: Arc<SharedParams>,
    sample_rate: f32,
    block_size: usize,
    channel_eqs: [ThreeBandEq; PLAYER_COUNT],
    channel: StereoBuffer,
    reverb_bus: StereoBuffer,
    delay_bus: StereoBuffer,
    master_bus: StereoBuffer,
    reverb: Effect,
    delay: Effect,
    master_chain: EffectChain,
}

impl Mixer {
    pub fn new(shared: Arc<SharedParams>, sample_rate: f32, block_size: usize) -> Self {
        let mut master_chain = EffectChain::new();
        master_chain.add(Effect::Eq(ThreeBandEq::new(sample_rate)));
        master_chain.add(Effect::Compressor(Compressor::new(sample_rate)));
        master_chain.add(Effect::Distortion(Distortion::new(0.0, 0.0)));

        let mut mixer = Self {
            shared,
            sample_rate,
            block_size: 0,
            channel_eqs: std::array::from_fn(|_| ThreeBandEq::new(sample_rate)),
            channel: StereoBuffer::default(),
            reverb_bus: StereoBuffer::default(),
            delay_bus: StereoBuffer::default(),
            master_bus: StereoBuffer::default(),
            reverb: Effect::Reverb(Reverb::new(0.5, 0.5, 1.0, sample_rate)),
            delay: Effect::Delay(StereoDelay::new(375.0, 0.35, 1.0, sample_rate)),
            master_chain,
        };
        mixer.prepare(sample_rate, block_size);
        mixer
    }

    /// Size buffers and effects for a stream. Call before the first block
    /// and whenever the device configuration changes.
    pub fn prepare(&mut self, sample_rate: f32, block_size: usize) {
        if sample_rate > 0.0 && sample_rate.is_finite() {
            self.sample_rate = sample_rate;
        }
        self.block_size = block_size;
        for buffer in [&mut self.channel, &mut self.reverb_bus, &mut self.delay_bus, &mut self.master_bus] {
            buffer.resize(block_size);
        }
        for eq in &mut self.channel_eqs {
            eq.set_sample_rate(self.sample_rate);
            eq.reset();
        }
        self.reverb.set_sample_rate(self.sample_rate);
        self.reverb.reset();
        self.delay.set_sample_rate(self.sample_rate);
        self.delay.reset();
        self.master_chain.set_sample_rate(self.sample_rate);
        self.master_chain.reset();
        info!(sample_rate = self.sample_rate, block_size, "Mixer prepared");
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Mix `inputs` (interleaved stereo, one per player) into `output`.
    ///
    /// Returns false and leaves `output` untouched when the buffers do not
    /// fit: empty or odd-length output, more frames than `prepare` allowed,
    /// too many inputs, or an input of a different length.
    pub fn process_block(&mut self, inputs: &[&[f32]], output: &mut [f32]) -> bool {
        if output.is_empty() || output.len() % 2 != 0 {
            return false;
        }
        let frames = output.len() / 2;
        if frames > self.block_size
            || inputs.len() > PLAYER_COUNT
            || inputs.iter().any(|input| input.len() != output.len())
        {
            return false;
        }

        self.reverb_bus.clear(frames);
        self.delay_bus.clear(frames);
        self.master_bus.clear(frames);

        let any_solo = self.shared.any_solo();
        for (index, input) in inputs.iter().enumerate() {
            self.mix_channel(index, input, frames, any_solo);
        }

        self.run_sends(frames);
        self.run_master(frames);

        let volume = self.shared.master.volume.load().clamp(0.0, 1.0);
        for (i, frame) in output.chunks_exact_mut(2).enumerate() {
            frame[0] = self.master_bus.left[i] * volume;
            frame[1] = self.master_bus.right[i] * volume;
        }
        true
    }

    fn mix_channel(&mut self, index: usize, input: &[f32], frames: usize, any_solo: bool) {
        let params = &self.shared.channels[index];
        if params.mute.load(Ordering::Relaxed) {
            return;
        }
        if any_solo && !params.solo.load(Ordering::Relaxed) {
            return;
        }

        let channel = &mut self.channel;
        for (i, frame) in input.chunks_exact(2).enumerate() {
            channel.left[i] = frame[0];
            channel.right[i] = frame[1];
        }
        let eq = &mut self.channel_eqs[index];
        eq.set_gains(params.eq_low_db.load(), params.eq_mid_db.load(), params.eq_high_db.load());
        eq.process(&mut channel.left[..frames], &mut channel.right[..frames]);

        let (left_gain, right_gain) = balance(params.volume.load().clamp(0.0, 1.0), params.pan.load().clamp(-1.0, 1.0));
        let reverb_send = params.reverb_send.load().clamp(0.0, 1.0);
        let delay_send = params.delay_send.load().clamp(0.0, 1.0);

        for i in 0..frames {
            let left = channel.left[i] * left_gain;
            let right = channel.right[i] * right_gain;
            self.master_bus.left[i] += left;
            self.master_bus.right[i] += right;
            self.reverb_bus.left[i] += left * reverb_send;
            self.reverb_bus.right[i] += right * reverb_send;
            self.delay_bus.left[i] += left * delay_send;
            self.delay_bus.right[i] += right * delay_send;
        }
    }

    fn run_sends(&mut self, frames: usize) {
        let master = &self.shared.master;
        if let Effect::Reverb(reverb) = &mut self.reverb {
            reverb.set_room_size(master.reverb_room.load());
        }
        if let Effect::Delay(delay) = &mut self.delay {
            delay.set_delay_ms(master.delay_ms.load());
            delay.set_feedback(master.delay_feedback.load());
        }

        self.reverb.process(&mut self.reverb_bus.left[..frames], &mut self.reverb_bus.right[..frames]);
        self.delay.process(&mut self.delay_bus.left[..frames], &mut self.delay_bus.right[..frames]);
        for i in 0..frames {
            self.master_bus.left[i] += self.reverb_bus.left[i] + self.delay_bus.left[i];
            self.master_bus.right[i] += self.reverb_bus.right[i] + self.delay_bus.right[i];
        }
    }

    fn run_master(&mut self, frames: usize) {
        apply_master_params(&self.shared.master, &mut self.master_chain);
        self.master_chain
            .process(&mut self.master_bus.left[..frames], &mut self.master_bus.right[..frames]);
    }
}

fn apply_master_params(master: &MasterParams, chain: &mut EffectChain) {
    for effect in chain.effects_mut() {
        match effect {
            Effect::Eq(eq) => eq.set_gains(master.eq_low_db.load(), master.eq_mid_db.load(), master.eq_high_db.load()),
            Effect::Compressor(compressor) => {
                compressor.set_threshold_db(master.comp_threshold_db.load());
                compressor.set_ratio(master.comp_ratio.load());
                compressor.set_times(master.comp_attack_ms.load(), master.comp_release_ms.load());
            }
            Effect::Distortion(distortion) => {
                distortion.set_drive(master.drive.load());
                distortion.set_mix(master.distortion_mix.load());
            }
            Effect::Delay(_) | Effect::Reverb(_) => {}
        }
    }
}
