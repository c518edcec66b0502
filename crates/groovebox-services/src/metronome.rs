//! Click track for the stand-alone host

use groovebox_core::Span;

/// Clicks that can start inside one block; more than this means a block
/// longer than several beats
const MAX_CLICKS_PER_BLOCK: usize = 8;

fn click(sample_rate: f32, freq: f32, duration: f32, gain: f32) -> Vec<f32> {
    let len = (sample_rate * duration) as usize;
    (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate;
            (t * freq * std::f32::consts::TAU).sin() * (-t * 40.0).exp() * gain
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct Voice {
    accent: bool,
    position: usize,
}

/// Decaying sine clicks on every beat, accented on the bar downbeat
#[derive(Debug)]
pub struct Metronome {
    accent: Vec<f32>,
    beat: Vec<f32>,
    voice: Option<Voice>,
    gain: f32,
}

impl Metronome {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            accent: click(sample_rate, 1000.0, 0.015, 0.8),
            beat: click(sample_rate, 800.0, 0.012, 0.5),
            voice: None,
            gain: 1.0,
        }
    }

    pub fn set_gain(&mut self, gain: f32) {
        if gain.is_finite() {
            self.gain = gain.clamp(0.0, 1.0);
        }
    }

    /// Add clicks for `span` into interleaved stereo `output`
    pub fn render(&mut self, span: &Span, beats_per_bar: u32, output: &mut [f32]) {
        let mut starts = [(u32::MAX, false); MAX_CLICKS_PER_BLOCK];
        let mut count = 0;
        let mut beat = span.start.ceil().max(0.0);
        while beat < span.end && count < MAX_CLICKS_PER_BLOCK {
            let accent = (beat as u64) % beats_per_bar.max(1) as u64 == 0;
            starts[count] = (span.offset_of(beat), accent);
            count += 1;
            beat += 1.0;
        }

        let mut next = 0;
        for (i, frame) in output.chunks_exact_mut(2).enumerate() {
            while next < count && starts[next].0 as usize <= i {
                self.voice = Some(Voice { accent: starts[next].1, position: 0 });
                next += 1;
            }
            let Some(voice) = self.voice.as_mut() else {
                continue;
            };
            let samples = if voice.accent { &self.accent } else { &self.beat };
            match samples.get(voice.position) {
                Some(&s) => {
                    frame[0] += s * self.gain;
                    frame[1] += s * self.gain;
                    voice.position += 1;
                }
                None => self.voice = None,
            }
        }
    }

    /// Silence any click in progress
    pub fn reset(&mut self) {
        self.voice = None;
    }
}
