//! Engine-wide sizes and clamp ranges.
//!
//! Every value the UI or a persisted settings file can feed into the engine is
//! clamped against one of these bounds before it reaches the audio path.

/// Number of sequencer players (lanes)
pub const PLAYER_COUNT: usize = 8;
/// Pattern slots per player
pub const PATTERN_SLOTS: usize = 16;
/// Scene slots owned by the engine
pub const SCENE_SLOTS: usize = 8;
/// Sentinel published when no scene is active
pub const INACTIVE_SCENE: i32 = -1;

pub const MIN_TEMPO: f64 = 20.0;
pub const MAX_TEMPO: f64 = 300.0;
pub const DEFAULT_TEMPO: f64 = 120.0;

pub const MIN_BEATS_PER_BAR: u32 = 1;
pub const MAX_BEATS_PER_BAR: u32 = 16;

/// Swing, energy and humanization are normalized to 0.0..=1.0
pub const SWING_MIN: f32 = 0.0;
pub const SWING_MAX: f32 = 1.0;
/// Fraction of a subdivision an odd step is pushed at full swing
pub const MAX_SWING_DELAY: f64 = 0.5;
pub const DEFAULT_ENERGY: f32 = 0.5;
/// Fraction of a subdivision humanization may move a note at amount 1.0
pub const MAX_HUMANIZE_TIMING: f64 = 0.1;
/// Velocity steps humanization may add or remove at amount 1.0
pub const MAX_HUMANIZE_VELOCITY: f32 = 12.0;

pub const VOLUME_MIN: f32 = 0.0;
pub const VOLUME_MAX: f32 = 1.0;
pub const PAN_MIN: f32 = -1.0;
pub const PAN_MAX: f32 = 1.0;
pub const EQ_GAIN_MIN_DB: f32 = -24.0;
pub const EQ_GAIN_MAX_DB: f32 = 12.0;

pub const MIDI_CHANNELS: u8 = 16;
pub const MIN_VELOCITY: u8 = 1;
pub const MAX_VELOCITY: u8 = 127;
pub const DEFAULT_FIXED_VELOCITY: u8 = 100;

/// MIDI clock resolution
pub const CLOCKS_PER_BEAT: u32 = 24;
/// Resolution of exported MIDI files
pub const DEFAULT_PPQ: u16 = 480;

/// Shortest pattern the sequencer will loop
pub const MIN_PATTERN_BEATS: f64 = 0.25;

pub const MAX_QUEUED_CHANGES: usize = 64;
pub const MIDI_BUFFER_CAPACITY: usize = 1024;
pub const PENDING_EVENT_CAPACITY: usize = 256;
pub const MAX_RECORDED_EVENTS: usize = 8192;
pub const MAX_LOOP_RECORDING_BARS: u32 = 64;

/// Host offsets beyond this many beats relocate instead of catching up
pub const HOST_RELOCATE_THRESHOLD: f64 = 1.0;
/// Largest fraction of a block's length host catch-up may add or remove
pub const HOST_CATCH_UP_RATE: f64 = 0.05;
