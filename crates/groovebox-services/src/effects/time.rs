//! Delay and reverb for the send buses

use super::{AudioEffect, EffectParam};

const MAX_DELAY_MS: f32 = 2000.0;
const MAX_FEEDBACK: f32 = 0.95;

/// Feedback delay line per channel
#[derive(Debug)]
pub struct StereoDelay {
    delay_ms: f32,
    feedback: f32,
    mix: f32,
    buffers: [Vec<f32>; 2],
    write_pos: usize,
    sample_rate: f32,
    bypassed: bool,
}

impl StereoDelay {
    pub fn new(delay_ms: f32, feedback: f32, mix: f32, sample_rate: f32) -> Self {
        let mut delay = Self {
            delay_ms: 375.0,
            feedback: 0.0,
            mix: 1.0,
            buffers: [Vec::new(), Vec::new()],
            write_pos: 0,
            sample_rate,
            bypassed: false,
        };
        delay.allocate();
        delay.set_delay_ms(delay_ms);
        delay.set_feedback(feedback);
        delay.set_mix(mix);
        delay
    }

    fn allocate(&mut self) {
        let len = ((MAX_DELAY_MS * self.sample_rate / 1000.0) as usize).max(2);
        self.buffers = [vec![0.0; len], vec![0.0; len]];
        self.write_pos = 0;
    }

    pub fn set_delay_ms(&mut self, delay_ms: f32) {
        if delay_ms.is_finite() {
            self.delay_ms = delay_ms.clamp(1.0, MAX_DELAY_MS);
        }
    }

    pub fn set_feedback(&mut self, feedback: f32) {
        if feedback.is_finite() {
            self.feedback = feedback.clamp(0.0, MAX_FEEDBACK);
        }
    }

    pub fn set_mix(&mut self, mix: f32) {
        if mix.is_finite() {
            self.mix = mix.clamp(0.0, 1.0);
        }
    }
}

impl AudioEffect for StereoDelay {
    fn name(&self) -> &str { "Delay" }

    fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        let len = self.buffers[0].len();
        let delay_samples = ((self.delay_ms * self.sample_rate / 1000.0) as usize).clamp(1, len - 1);
        let start = self.write_pos;

        for (channel, samples) in [left, right].into_iter().enumerate() {
            let buffer = &mut self.buffers[channel];
            let mut write_pos = start;
            for sample in samples.iter_mut() {
                let read_pos = (write_pos + len - delay_samples) % len;
                let delayed = buffer[read_pos];
                buffer[write_pos] = *sample + delayed * self.feedback;
                write_pos = (write_pos + 1) % len;
                *sample = *sample * (1.0 - self.mix) + delayed * self.mix;
            }
            self.write_pos = write_pos;
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "delay" => self.set_delay_ms(value),
            "feedback" => self.set_feedback(value),
            "mix" => self.set_mix(value),
            _ => {}
        }
    }

    fn get_params(&self) -> Vec<EffectParam> {
        vec![
            EffectParam::new("delay", self.delay_ms, 1.0, MAX_DELAY_MS, "ms"),
            EffectParam::new("feedback", self.feedback, 0.0, MAX_FEEDBACK, ""),
            EffectParam::new("mix", self.mix, 0.0, 1.0, ""),
        ]
    }

    fn set_bypass(&mut self, bypass: bool) { self.bypassed = bypass; }
    fn is_bypassed(&self) -> bool { self.bypassed }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        if (sample_rate - self.sample_rate).abs() < 1.0 || sample_rate <= 0.0 {
            return;
        }
        self.sample_rate = sample_rate;
        self.allocate();
    }

    fn reset(&mut self) {
        for buffer in &mut self.buffers {
            buffer.fill(0.0);
        }
        self.write_pos = 0;
    }
}

/// Comb delay ratios relative to the base time
const COMB_RATIOS: [f32; 4] = [1.0, 1.13, 1.27, 1.41];
/// Right channel combs run slightly longer for width
const STEREO_SPREAD: usize = 23;

/// Schroeder reverb: four parallel feedback combs per channel.
///
/// Comb buffers are sized for the largest room up front; changing the room
/// only moves the wrap point.
#[derive(Debug)]
pub struct Reverb {
    room_size: f32,
    damping: f32,
    mix: f32,
    combs: [[Vec<f32>; 4]; 2],
    lengths: [[usize; 4]; 2],
    positions: [[usize; 4]; 2],
    sample_rate: f32,
    bypassed: bool,
}

impl Reverb {
    pub fn new(room_size: f32, damping: f32, mix: f32, sample_rate: f32) -> Self {
        let mut reverb = Self {
            room_size: 0.5,
            damping: 0.5,
            mix: 1.0,
            combs: Default::default(),
            lengths: [[1; 4]; 2],
            positions: [[0; 4]; 2],
            sample_rate,
            bypassed: false,
        };
        reverb.allocate();
        reverb.set_room_size(room_size);
        reverb.set_damping(damping);
        reverb.set_mix(mix);
        reverb
    }

    fn comb_samples(&self, room_size: f32, ratio: f32) -> usize {
        let base_ms = room_size * 50.0 + 10.0;
        ((base_ms * ratio * self.sample_rate / 1000.0) as usize).max(1)
    }

    fn allocate(&mut self) {
        for (channel, combs) in self.combs.iter_mut().enumerate() {
            for (i, comb) in combs.iter_mut().enumerate() {
                let base_ms = 60.0 * COMB_RATIOS[i];
                let len = (base_ms * self.sample_rate / 1000.0) as usize + 1 + channel * STEREO_SPREAD;
                *comb = vec![0.0; len];
            }
        }
        self.positions = [[0; 4]; 2];
        self.update_lengths();
    }

    fn update_lengths(&mut self) {
        for channel in 0..2 {
            for i in 0..4 {
                let len = self.comb_samples(self.room_size, COMB_RATIOS[i]) + channel * STEREO_SPREAD;
                let len = len.min(self.combs[channel][i].len());
                self.lengths[channel][i] = len;
                self.positions[channel][i] %= len;
            }
        }
    }

    pub fn set_room_size(&mut self, room_size: f32) {
        if !room_size.is_finite() {
            return;
        }
        let room_size = room_size.clamp(0.0, 1.0);
        if room_size != self.room_size {
            self.room_size = room_size;
            self.update_lengths();
        }
    }

    pub fn set_damping(&mut self, damping: f32) {
        if damping.is_finite() {
            self.damping = damping.clamp(0.0, 1.0);
        }
    }

    pub fn set_mix(&mut self, mix: f32) {
        if mix.is_finite() {
            self.mix = mix.clamp(0.0, 1.0);
        }
    }
}

impl AudioEffect for Reverb {
    fn name(&self) -> &str { "Reverb" }

    fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        let feedback = 0.7 * (1.0 - self.damping * 0.4);

        for (channel, samples) in [left, right].into_iter().enumerate() {
            let combs = &mut self.combs[channel];
            let lengths = &self.lengths[channel];
            let positions = &mut self.positions[channel];
            for sample in samples.iter_mut() {
                let dry = *sample;
                let mut wet = 0.0;
                for i in 0..4 {
                    let pos = positions[i];
                    let delayed = combs[i][pos];
                    wet += delayed;
                    combs[i][pos] = dry + delayed * feedback;
                    positions[i] = (pos + 1) % lengths[i];
                }
                wet *= 0.25;
                *sample = dry * (1.0 - self.mix) + wet * self.mix;
            }
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "room_size" => self.set_room_size(value),
            "damping" => self.set_damping(value),
            "mix" => self.set_mix(value),
            _ => {}
        }
    }

    fn get_params(&self) -> Vec<EffectParam> {
        vec![
            EffectParam::new("room_size", self.room_size, 0.0, 1.0, ""),
            EffectParam::new("damping", self.damping, 0.0, 1.0, ""),
            EffectParam::new("mix", self.mix, 0.0, 1.0, ""),
        ]
    }

    fn set_bypass(&mut self, bypass: bool) { self.bypassed = bypass; }
    fn is_bypassed(&self) -> bool { self.bypassed }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        if (sample_rate - self.sample_rate).abs() < 1.0 || sample_rate <= 0.0 {
            return;
        }
        self.sample_rate = sample_rate;
        self.allocate();
    }

    fn reset(&mut self) {
        for combs in &mut self.combs {
            for comb in combs.iter_mut() {
                comb.fill(0.0);
            }
        }
        self.positions = [[0; 4]; 2];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse(len: usize) -> Vec<f32> {
        let mut samples = vec![0.0; len];
        samples[0] = 1.0;
        samples
    }

    #[test]
    fn test_delay_echo_position() {
        let mut delay = StereoDelay::new(10.0, 0.0, 1.0, 48000.0);
        let mut left = impulse(1024);
        let mut right = impulse(1024);
        delay.process(&mut left, &mut right);
        // 10 ms at 48 kHz
        assert_eq!(left[480], 1.0);
        assert_eq!(left.iter().filter(|&&s| s != 0.0).count(), 1);
        assert_eq!(left, right);
    }

    #[test]
    fn test_delay_carries_across_blocks() {
        let mut delay = StereoDelay::new(10.0, 0.0, 1.0, 48000.0);
        let mut left = impulse(256);
        let mut right = impulse(256);
        delay.process(&mut left, &mut right);
        assert!(left.iter().all(|&s| s == 0.0));
        let mut left = vec![0.0; 256];
        let mut right = vec![0.0; 256];
        delay.process(&mut left, &mut right);
        assert_eq!(left[480 - 256], 1.0);
    }

    #[test]
    fn test_delay_feedback_is_capped() {
        let mut delay = StereoDelay::new(1.0, 4.0, 1.0, 48000.0);
        assert_eq!(delay.get_params()[1].value, MAX_FEEDBACK);
        let mut left = impulse(48000);
        let mut right = impulse(48000);
        delay.process(&mut left, &mut right);
        assert!(left.iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn test_reverb_tail_decays() {
        let mut reverb = Reverb::new(0.5, 0.5, 1.0, 48000.0);
        let mut left = impulse(96000);
        let mut right = impulse(96000);
        reverb.process(&mut left, &mut right);
        let early: f32 = left[..4800].iter().map(|s| s.abs()).sum();
        let late: f32 = left[91200..].iter().map(|s| s.abs()).sum();
        assert!(early > 0.0);
        assert!(late < early * 0.01);
    }

    #[test]
    fn test_room_change_keeps_buffers() {
        let mut reverb = Reverb::new(0.0, 0.5, 1.0, 48000.0);
        let capacity = reverb.combs[0][3].len();
        reverb.set_param("room_size", 1.0);
        assert_eq!(reverb.combs[0][3].len(), capacity);
        assert!(reverb.lengths[0][3] <= capacity);
        reverb.set_param("room_size", 0.2);
        let mut left = impulse(4096);
        let mut right = impulse(4096);
        reverb.process(&mut left, &mut right);
        assert!(left.iter().all(|s| s.is_finite()));
    }
}
