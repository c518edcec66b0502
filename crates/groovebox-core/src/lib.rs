//! groovebox-core: Domain types for the groovebox sequencing core

pub mod clock;
mod error;
pub mod groove;
pub mod limits;
pub mod midi;
pub mod midi_learn;
pub mod pattern;
pub mod player;
pub mod recorder;
pub mod scene;
pub mod scheduler;
pub mod settings;
mod smf;
pub mod transport;
pub mod velocity;

pub use clock::{ClockCommand, MidiClockGenerator, MidiClockReceiver};
pub use error::{GrooveError, Result};
pub use groove::{Humanizer, Subdivision, swing_delay};
pub use midi::{MidiBuffer, MidiEvent, MidiMessage};
pub use midi_learn::{LearnState, MappingOutcome, MappingTable, MidiMapping, Parameter};
pub use pattern::{Pattern, PatternBank, PatternEvent, PatternSlot};
pub use player::PlayerState;
pub use recorder::{LiveRecorder, RecordBuffer, RecordedEvent, RecorderState};
pub use scene::{ClipState, Scene, SceneBank};
pub use scheduler::{ChangeKind, PatternChangeScheduler, QueuedChange};
pub use settings::{EngineSettings, PlayerSettings};
pub use transport::{Span, TransportClock, TransportState};
pub use velocity::{VelocityCurve, apply_velocity_curve};
