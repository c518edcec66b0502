//! groovebox-services: Real-time engine, drum kits, mixer, effects and storage

pub mod audio_io;
pub mod commands;
pub mod drum_kit;
pub mod effects;
pub mod engine;
pub mod handle;
pub mod metronome;
pub mod mixer;
pub mod shared;
pub mod storage;

pub use audio_io::{AudioOutputError, RealtimeOutputStream, default_output_info};
pub use commands::{Command, EngineEvent, Retired};
pub use drum_kit::{DrumKind, DrumKit, DrumRack};
pub use effects::{AudioEffect, Compressor, Distortion, Effect, EffectChain, EffectParam, Reverb, StereoDelay, ThreeBandEq};
pub use engine::{Engine, HostPosition};
pub use handle::{EngineError, EngineHandle};
pub use metronome::Metronome;
pub use mixer::Mixer;
pub use shared::{AtomicF32, AtomicF64, ChannelParams, MasterParams, PlayerParams, SharedParams, TransportView};
pub use storage::StorageError;
