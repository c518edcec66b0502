//! Lock-free parameters shared between the UI and the audio thread.
//!
//! The UI writes, the audio thread reads at the start of each block, except
//! for `TransportView` which only the audio thread writes.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, Ordering};

use groovebox_core::limits::{
    DEFAULT_ENERGY, DEFAULT_TEMPO, EQ_GAIN_MAX_DB, EQ_GAIN_MIN_DB, INACTIVE_SCENE, PAN_MAX, PAN_MIN,
    PLAYER_COUNT, VOLUME_MAX, VOLUME_MIN,
};

/// f32 stored as bits in an `AtomicU32`
#[derive(Debug)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// f64 stored as bits in an `AtomicU64`
#[derive(Debug)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Hot sequencer parameters for one player
#[derive(Debug)]
pub struct PlayerParams {
    pub swing: AtomicF32,
    pub energy: AtomicF32,
    pub humanize: AtomicF32,
    pub enabled: AtomicBool,
}

impl Default for PlayerParams {
    fn default() -> Self {
        Self {
            swing: AtomicF32::new(0.0),
            energy: AtomicF32::new(DEFAULT_ENERGY),
            humanize: AtomicF32::new(0.0),
            enabled: AtomicBool::new(true),
        }
    }
}

/// Mixer strip for one player
#[derive(Debug)]
pub struct ChannelParams {
    pub volume: AtomicF32,
    pub pan: AtomicF32,
    pub mute: AtomicBool,
    pub solo: AtomicBool,
    pub reverb_send: AtomicF32,
    pub delay_send: AtomicF32,
    pub eq_low_db: AtomicF32,
    pub eq_mid_db: AtomicF32,
    pub eq_high_db: AtomicF32,
}

impl Default for ChannelParams {
    fn default() -> Self {
        Self {
            volume: AtomicF32::new(1.0),
            pan: AtomicF32::new(0.0),
            mute: AtomicBool::new(false),
            solo: AtomicBool::new(false),
            reverb_send: AtomicF32::new(0.0),
            delay_send: AtomicF32::new(0.0),
            eq_low_db: AtomicF32::new(0.0),
            eq_mid_db: AtomicF32::new(0.0),
            eq_high_db: AtomicF32::new(0.0),
        }
    }
}

impl ChannelParams {
    pub fn set_volume(&self, volume: f32) {
        self.volume.store(clamp_finite(volume, VOLUME_MIN, VOLUME_MAX, 1.0));
    }

    pub fn set_pan(&self, pan: f32) {
        self.pan.store(clamp_finite(pan, PAN_MIN, PAN_MAX, 0.0));
    }

    pub fn set_sends(&self, reverb: f32, delay: f32) {
        self.reverb_send.store(clamp_finite(reverb, 0.0, 1.0, 0.0));
        self.delay_send.store(clamp_finite(delay, 0.0, 1.0, 0.0));
    }

    pub fn set_eq(&self, low_db: f32, mid_db: f32, high_db: f32) {
        self.eq_low_db.store(clamp_finite(low_db, EQ_GAIN_MIN_DB, EQ_GAIN_MAX_DB, 0.0));
        self.eq_mid_db.store(clamp_finite(mid_db, EQ_GAIN_MIN_DB, EQ_GAIN_MAX_DB, 0.0));
        self.eq_high_db.store(clamp_finite(high_db, EQ_GAIN_MIN_DB, EQ_GAIN_MAX_DB, 0.0));
    }
}

/// Master bus and its effect settings
#[derive(Debug)]
pub struct MasterParams {
    pub volume: AtomicF32,
    pub eq_low_db: AtomicF32,
    pub eq_mid_db: AtomicF32,
    pub eq_high_db: AtomicF32,
    pub comp_threshold_db: AtomicF32,
    pub comp_ratio: AtomicF32,
    pub comp_attack_ms: AtomicF32,
    pub comp_release_ms: AtomicF32,
    pub drive: AtomicF32,
    pub distortion_mix: AtomicF32,
    pub reverb_room: AtomicF32,
    pub delay_ms: AtomicF32,
    pub delay_feedback: AtomicF32,
}

impl Default for MasterParams {
    fn default() -> Self {
        Self {
            volume: AtomicF32::new(0.8),
            eq_low_db: AtomicF32::new(0.0),
            eq_mid_db: AtomicF32::new(0.0),
            eq_high_db: AtomicF32::new(0.0),
            comp_threshold_db: AtomicF32::new(0.0),
            comp_ratio: AtomicF32::new(1.0),
            comp_attack_ms: AtomicF32::new(10.0),
            comp_release_ms: AtomicF32::new(100.0),
            drive: AtomicF32::new(0.0),
            distortion_mix: AtomicF32::new(0.0),
            reverb_room: AtomicF32::new(0.5),
            delay_ms: AtomicF32::new(375.0),
            delay_feedback: AtomicF32::new(0.35),
        }
    }
}

/// Values published by the audio thread for display
#[derive(Debug)]
pub struct TransportView {
    pub beat: AtomicF64,
    pub bar: AtomicU64,
    pub tempo: AtomicF64,
    pub playing: AtomicBool,
    pub recording: AtomicBool,
    pub active_scene: AtomicI32,
    /// MIDI events lost to full buffers since start
    pub dropped_events: AtomicU64,
}

impl Default for TransportView {
    fn default() -> Self {
        Self {
            beat: AtomicF64::new(0.0),
            bar: AtomicU64::new(0),
            tempo: AtomicF64::new(DEFAULT_TEMPO),
            playing: AtomicBool::new(false),
            recording: AtomicBool::new(false),
            active_scene: AtomicI32::new(INACTIVE_SCENE),
            dropped_events: AtomicU64::new(0),
        }
    }
}

/// Everything shared between `EngineHandle`, `Engine` and `Mixer`
#[derive(Debug)]
pub struct SharedParams {
    pub players: [PlayerParams; PLAYER_COUNT],
    pub channels: [ChannelParams; PLAYER_COUNT],
    pub master: MasterParams,
    pub transport: TransportView,
    pub metronome: AtomicBool,
}

impl Default for SharedParams {
    fn default() -> Self {
        Self {
            players: std::array::from_fn(|_| PlayerParams::default()),
            channels: std::array::from_fn(|_| ChannelParams::default()),
            master: MasterParams::default(),
            transport: TransportView::default(),
            metronome: AtomicBool::new(false),
        }
    }
}

impl SharedParams {
    pub fn player(&self, index: usize) -> Option<&PlayerParams> {
        self.players.get(index)
    }

    pub fn channel(&self, index: usize) -> Option<&ChannelParams> {
        self.channels.get(index)
    }

    pub fn any_solo(&self) -> bool {
        self.channels.iter().any(|c| c.solo.load(Ordering::Relaxed))
    }
}

pub(crate) fn clamp_finite(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_finite() { value.clamp(min, max) } else { fallback }
}
