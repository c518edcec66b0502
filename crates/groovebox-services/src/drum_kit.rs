//! Synthesized drum kits that turn the engine's note stream into per-player
//! stereo audio for the mixer

use std::f64::consts::TAU;

use groovebox_core::limits::PLAYER_COUNT;
use groovebox_core::midi::ALL_NOTES_OFF_CC;
use groovebox_core::{MidiBuffer, MidiMessage};

/// General MIDI percussion notes the kit responds to
pub const BASS_DRUM: u8 = 35;
pub const KICK: u8 = 36;
pub const RIM_SHOT: u8 = 37;
pub const SNARE: u8 = 38;
pub const CLAP: u8 = 39;
pub const ELECTRIC_SNARE: u8 = 40;
pub const LOW_FLOOR_TOM: u8 = 41;
pub const CLOSED_HAT: u8 = 42;
pub const HIGH_FLOOR_TOM: u8 = 43;
pub const PEDAL_HAT: u8 = 44;
pub const LOW_TOM: u8 = 45;
pub const OPEN_HAT: u8 = 46;
pub const LOW_MID_TOM: u8 = 47;
pub const HIGH_MID_TOM: u8 = 48;
pub const CRASH: u8 = 49;
pub const HIGH_TOM: u8 = 50;
pub const RIDE: u8 = 51;
pub const COWBELL: u8 = 56;
pub const CRASH_2: u8 = 57;

const VOICES_PER_KIT: usize = 8;
/// Envelope level below which a voice is considered finished
const SILENCE: f64 = 1e-4;
const CLAP_BURSTS: u32 = 4;
const CLAP_BURST_SPACING: f64 = 0.017;
const DEFAULT_KIT_LEVEL: f32 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrumKind {
    Kick,
    RimShot,
    Snare,
    Clap,
    ClosedHat,
    OpenHat,
    LowTom,
    MidTom,
    HighTom,
    Cymbal,
    Cowbell,
}

impl DrumKind {
    pub fn from_note(note: u8) -> Option<Self> {
        match note {
            BASS_DRUM | KICK => Some(Self::Kick),
            RIM_SHOT => Some(Self::RimShot),
            SNARE | ELECTRIC_SNARE => Some(Self::Snare),
            CLAP => Some(Self::Clap),
            CLOSED_HAT | PEDAL_HAT => Some(Self::ClosedHat),
            OPEN_HAT => Some(Self::OpenHat),
            LOW_FLOOR_TOM | HIGH_FLOOR_TOM => Some(Self::LowTom),
            LOW_TOM | LOW_MID_TOM => Some(Self::MidTom),
            HIGH_MID_TOM | HIGH_TOM => Some(Self::HighTom),
            CRASH | RIDE | CRASH_2 => Some(Self::Cymbal),
            COWBELL => Some(Self::Cowbell),
            _ => None,
        }
    }

    fn is_hat(self) -> bool {
        matches!(self, Self::ClosedHat | Self::OpenHat)
    }
}

#[derive(Debug, Clone)]
struct DrumVoice {
    kind: DrumKind,
    active: bool,
    age: usize,
    phase: f64,
    phase2: f64,
    amp_env: f64,
    pitch_env: f64,
    noise_env: f64,
    filter_state: f64,
    filter_state2: f64,
    bursts_left: u32,
    burst_timer: f64,
    velocity: f64,
}

impl DrumVoice {
    fn new() -> Self {
        Self {
            kind: DrumKind::Kick,
            active: false,
            age: 0,
            phase: 0.0,
            phase2: 0.0,
            amp_env: 0.0,
            pitch_env: 0.0,
            noise_env: 0.0,
            filter_state: 0.0,
            filter_state2: 0.0,
            bursts_left: 0,
            burst_timer: 0.0,
            velocity: 0.0,
        }
    }

    fn trigger(&mut self, kind: DrumKind, velocity: u8) {
        *self = Self::new();
        self.kind = kind;
        self.active = true;
        self.velocity = velocity.min(127) as f64 / 127.0;
        self.pitch_env = 1.0;
        // only the envelopes a sound decays are armed, so every voice runs out
        match kind {
            DrumKind::Clap => {
                self.noise_env = 1.0;
                self.bursts_left = CLAP_BURSTS;
            }
            DrumKind::Snare | DrumKind::RimShot => {
                self.amp_env = 1.0;
                self.noise_env = 1.0;
            }
            _ => self.amp_env = 1.0,
        }
    }

    fn tick(&mut self, dt: f64, rng: &mut fastrand::Rng) -> f64 {
        if !self.active {
            return 0.0;
        }
        self.age += 1;
        let noise = rng.f64() * 2.0 - 1.0;

        let sample = match self.kind {
            DrumKind::Kick => self.tick_kick(dt),
            DrumKind::RimShot => self.tick_rim_shot(dt, noise),
            DrumKind::Snare => self.tick_snare(dt, noise),
            DrumKind::Clap => self.tick_clap(dt, noise),
            DrumKind::ClosedHat => self.tick_metal(dt, noise, 0.3, 0.03),
            DrumKind::OpenHat => self.tick_metal(dt, noise, 0.3, 0.3),
            DrumKind::LowTom => self.tick_tom(dt, 80.0),
            DrumKind::MidTom => self.tick_tom(dt, 120.0),
            DrumKind::HighTom => self.tick_tom(dt, 160.0),
            DrumKind::Cymbal => self.tick_metal(dt, noise, 0.25, 1.2),
            DrumKind::Cowbell => self.tick_cowbell(dt),
        };

        if self.amp_env < SILENCE && self.noise_env < SILENCE && self.bursts_left == 0 {
            self.active = false;
        }
        sample * self.velocity
    }

    fn tick_kick(&mut self, dt: f64) -> f64 {
        self.pitch_env *= (-dt / 0.035).exp();
        // pitch sweeps down from four times the base
        let freq = 60.0 * (1.0 + self.pitch_env * 3.0);
        self.phase += freq * dt;
        self.amp_env *= (-dt / 0.3).exp();
        (self.phase * TAU).sin() * self.amp_env * 0.9
    }

    fn tick_snare(&mut self, dt: f64, noise: f64) -> f64 {
        self.phase += 200.0 * dt;
        self.phase2 += 355.0 * dt;
        let tones = (self.phase * TAU).sin() * 0.6 + (self.phase2 * TAU).sin() * 0.4;
        self.amp_env *= (-dt / 0.028).exp();

        // two-pole band pass for the rattle
        self.filter_state += 0.15 * (noise - self.filter_state);
        self.filter_state2 += 0.105 * (self.filter_state - self.filter_state2);
        let rattle = self.filter_state - self.filter_state2;
        self.noise_env *= (-dt / 0.1).exp();

        (tones * self.amp_env * 0.4 + rattle * self.noise_env * 1.3) * 0.8
    }

    fn tick_clap(&mut self, dt: f64, noise: f64) -> f64 {
        if self.bursts_left > 0 {
            self.burst_timer += dt;
            if self.burst_timer >= CLAP_BURST_SPACING {
                self.burst_timer = 0.0;
                self.bursts_left -= 1;
                self.noise_env = 0.9;
            }
        }
        self.filter_state += 0.12 * (noise - self.filter_state);
        let band = noise - self.filter_state * 1.8;
        let decay = if self.bursts_left > 0 { 0.004 } else { 0.15 };
        self.noise_env *= (-dt / decay).exp();
        (band * 1.5).tanh() * self.noise_env * 0.7
    }

    fn tick_metal(&mut self, dt: f64, noise: f64, cutoff: f64, decay: f64) -> f64 {
        self.filter_state += cutoff * (noise - self.filter_state);
        let high = noise - self.filter_state;
        self.amp_env *= (-dt / decay).exp();
        high * self.amp_env * 0.6
    }

    fn tick_tom(&mut self, dt: f64, base: f64) -> f64 {
        self.pitch_env *= (-dt / 0.05).exp();
        self.phase += base * (1.0 + self.pitch_env * 0.5) * dt;
        self.amp_env *= (-dt / 0.3).exp();
        (self.phase * TAU).sin() * self.amp_env * 0.7
    }

    fn tick_rim_shot(&mut self, dt: f64, noise: f64) -> f64 {
        self.phase += 500.0 * dt;
        self.amp_env *= (-dt / 0.015).exp();
        self.noise_env *= (-dt / 0.005).exp();
        ((self.phase * TAU).sin() * 0.7 + noise * self.noise_env * 0.3) * self.amp_env * 0.7
    }

    fn tick_cowbell(&mut self, dt: f64) -> f64 {
        self.phase += 560.0 * dt;
        let square = |phase: f64| if (phase * TAU).sin() > 0.0 { 1.0 } else { -1.0 };
        let mix = (square(self.phase) + square(self.phase * 845.0 / 560.0)) * 0.3;
        self.amp_env *= (-dt / 0.15).exp();
        mix * self.amp_env * 0.7
    }
}

/// One player's drum voices
#[derive(Debug)]
pub struct DrumKit {
    voices: [DrumVoice; VOICES_PER_KIT],
    rng: fastrand::Rng,
    dt: f64,
    level: f32,
}

impl DrumKit {
    pub fn new(sample_rate: f32) -> Self {
        Self::with_rng(sample_rate, fastrand::Rng::new())
    }

    /// Deterministic noise for tests
    pub fn with_seed(sample_rate: f32, seed: u64) -> Self {
        Self::with_rng(sample_rate, fastrand::Rng::with_seed(seed))
    }

    fn with_rng(sample_rate: f32, rng: fastrand::Rng) -> Self {
        Self {
            voices: std::array::from_fn(|_| DrumVoice::new()),
            rng,
            dt: 1.0 / sample_rate.max(1.0) as f64,
            level: DEFAULT_KIT_LEVEL,
        }
    }

    pub fn is_active(&self) -> bool {
        self.voices.iter().any(|v| v.active)
    }

    pub fn note_on(&mut self, note: u8, velocity: u8) {
        let Some(kind) = DrumKind::from_note(note) else {
            return;
        };
        if velocity == 0 {
            return;
        }
        // open and closed hats choke each other
        if kind.is_hat() {
            for voice in self.voices.iter_mut().filter(|v| v.active && v.kind.is_hat()) {
                voice.active = false;
            }
        }
        let index = self
            .voices
            .iter()
            .position(|v| v.active && v.kind == kind)
            .or_else(|| self.voices.iter().position(|v| !v.active))
            .or_else(|| {
                self.voices
                    .iter()
                    .enumerate()
                    .max_by_key(|(_, v)| v.age)
                    .map(|(i, _)| i)
            })
            .unwrap_or(0);
        self.voices[index].trigger(kind, velocity);
    }

    pub fn all_notes_off(&mut self) {
        for voice in &mut self.voices {
            voice.active = false;
        }
    }

    fn handle(&mut self, message: MidiMessage) {
        match message {
            MidiMessage::NoteOn { note, velocity } => self.note_on(note, velocity),
            MidiMessage::ControlChange { controller: ALL_NOTES_OFF_CC, .. } => self.all_notes_off(),
            _ => {}
        }
    }

    /// Overwrite interleaved stereo `output` with this block's audio,
    /// starting the notes `midi` carries on `channel` at their offsets
    pub fn render(&mut self, midi: &MidiBuffer, channel: u8, output: &mut [f32]) {
        let mut events = midi
            .iter()
            .filter(|e| e.channel == channel && !e.message.is_realtime())
            .peekable();

        for (i, frame) in output.chunks_exact_mut(2).enumerate() {
            while let Some(event) = events.next_if(|e| e.sample_offset as usize <= i) {
                self.handle(event.message);
            }
            let mut mix = 0.0;
            for voice in self.voices.iter_mut().filter(|v| v.active) {
                mix += voice.tick(self.dt, &mut self.rng);
            }
            let out = (mix as f32 * self.level).tanh();
            frame[0] = out;
            frame[1] = out;
        }

        // offsets past a short output still start on the next block
        for event in events {
            self.handle(event.message);
        }
    }
}

/// A kit per player, each rendering into its own mixer strip.
///
/// A player plays the notes on its output channel. When several players
/// share a channel the lowest-numbered one renders them and the others
/// stay silent, so no note sounds twice.
#[derive(Debug)]
pub struct DrumRack {
    kits: Vec<DrumKit>,
    buffers: Vec<Vec<f32>>,
    max_block_size: usize,
}

impl DrumRack {
    pub fn new(sample_rate: f32, max_block_size: usize) -> Self {
        Self::from_kits((0..PLAYER_COUNT).map(|_| DrumKit::new(sample_rate)).collect(), max_block_size)
    }

    pub fn with_seed(sample_rate: f32, max_block_size: usize, seed: u64) -> Self {
        let kits = (0..PLAYER_COUNT)
            .map(|i| DrumKit::with_seed(sample_rate, seed.wrapping_add(i as u64)))
            .collect();
        Self::from_kits(kits, max_block_size)
    }

    fn from_kits(kits: Vec<DrumKit>, max_block_size: usize) -> Self {
        Self {
            kits,
            buffers: vec![vec![0.0; max_block_size * 2]; PLAYER_COUNT],
            max_block_size,
        }
    }

    /// Render `frames` of every player's kit. Returns false without
    /// rendering when `frames` exceeds the prepared block size.
    pub fn render(&mut self, midi: &MidiBuffer, channels: &[u8; PLAYER_COUNT], frames: usize) -> bool {
        if frames > self.max_block_size {
            return false;
        }
        for (player, (kit, buffer)) in self.kits.iter_mut().zip(self.buffers.iter_mut()).enumerate() {
            let channel = channels[player];
            let output = &mut buffer[..frames * 2];
            if channels[..player].contains(&channel) {
                output.fill(0.0);
                continue;
            }
            kit.render(midi, channel, output);
        }
        true
    }

    /// Per-player interleaved stereo from the last `render`
    pub fn outputs(&self, frames: usize) -> [&[f32]; PLAYER_COUNT] {
        let frames = frames.min(self.max_block_size);
        std::array::from_fn(|player| &self.buffers[player][..frames * 2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groovebox_core::MidiEvent;

    const SR: f32 = 48000.0;

    fn first_sound(output: &[f32]) -> Option<usize> {
        output.chunks_exact(2).position(|frame| frame[0] != 0.0)
    }

    fn buffer(events: &[MidiEvent]) -> MidiBuffer {
        let mut midi = MidiBuffer::default();
        for event in events {
            midi.push(*event);
        }
        midi
    }

    #[test]
    fn test_note_starts_at_its_offset() {
        let mut kit = DrumKit::with_seed(SR, 1);
        let midi = buffer(&[MidiEvent::note_on(100, 9, KICK, 110)]);
        let mut output = vec![0.0; 512];
        kit.render(&midi, 9, &mut output);
        assert_eq!(first_sound(&output), Some(100));
        assert!(output.chunks_exact(2).all(|frame| frame[0] == frame[1]));
    }

    #[test]
    fn test_other_channels_and_unknown_notes_are_silent() {
        let mut kit = DrumKit::with_seed(SR, 1);
        let midi = buffer(&[MidiEvent::note_on(0, 3, SNARE, 100), MidiEvent::note_on(0, 9, 100, 100)]);
        let mut output = vec![0.0; 512];
        kit.render(&midi, 9, &mut output);
        assert_eq!(first_sound(&output), None);
        assert!(!kit.is_active());
    }

    #[test]
    fn test_all_notes_off_silences_tails() {
        let mut kit = DrumKit::with_seed(SR, 1);
        let mut output = vec![0.0; 512];
        kit.render(&buffer(&[MidiEvent::note_on(0, 9, OPEN_HAT, 100)]), 9, &mut output);
        assert!(kit.is_active());

        let off = buffer(&[MidiEvent::control_change(0, 9, ALL_NOTES_OFF_CC, 0)]);
        kit.render(&off, 9, &mut output);
        assert_eq!(first_sound(&output), None);
    }

    #[test]
    fn test_voices_run_out() {
        let mut kit = DrumKit::with_seed(SR, 1);
        let mut output = vec![0.0; 2048];
        let notes = [KICK, SNARE, CLAP, CLOSED_HAT, LOW_TOM, RIM_SHOT, COWBELL, CRASH];
        let hits: Vec<MidiEvent> = notes.iter().map(|&note| MidiEvent::note_on(0, 0, note, 127)).collect();
        kit.render(&buffer(&hits), 0, &mut output);
        assert!(kit.is_active());

        let empty = MidiBuffer::default();
        // twelve seconds covers the longest cymbal decay
        for _ in 0..(12 * SR as usize / 1024) {
            kit.render(&empty, 0, &mut output);
        }
        assert!(!kit.is_active());
    }

    #[test]
    fn test_rack_routes_each_player_by_channel() {
        let mut rack = DrumRack::with_seed(SR, 256, 3);
        let channels: [u8; PLAYER_COUNT] = std::array::from_fn(|i| i as u8);
        let midi = buffer(&[MidiEvent::note_on(10, 2, KICK, 100), MidiEvent::note_on(20, 5, SNARE, 100)]);
        assert!(rack.render(&midi, &channels, 256));

        let outputs = rack.outputs(256);
        assert_eq!(outputs[2].len(), 512);
        assert_eq!(first_sound(outputs[2]), Some(10));
        assert_eq!(first_sound(outputs[5]), Some(20));
        for player in [0, 1, 3, 4, 6, 7] {
            assert_eq!(first_sound(outputs[player]), None);
        }
    }

    #[test]
    fn test_shared_channel_renders_once() {
        let mut rack = DrumRack::with_seed(SR, 256, 3);
        let midi = buffer(&[MidiEvent::note_on(0, 9, KICK, 100)]);
        assert!(rack.render(&midi, &[9; PLAYER_COUNT], 128));
        let outputs = rack.outputs(128);
        assert!(first_sound(outputs[0]).is_some());
        assert!(outputs[1..].iter().all(|output| first_sound(output).is_none()));
    }

    #[test]
    fn test_rack_rejects_oversized_blocks() {
        let mut rack = DrumRack::with_seed(SR, 64, 3);
        assert!(!rack.render(&MidiBuffer::default(), &[9; PLAYER_COUNT], 65));
    }
}
