//! Messages between the UI thread and the audio thread

use crossbeam_channel::Sender;
use groovebox_core::{
    ChangeKind, EngineSettings, MidiMapping, Parameter, PatternSlot, RecordBuffer, Scene, Subdivision,
    TransportState, VelocityCurve,
};

/// Commands drained by the engine at the start of every block
pub enum Command {
    // Transport
    Play,
    Stop,
    Pause,
    Continue,
    SetTempo(f64),
    SetBeatsPerBar(u32),
    Locate(f64),
    SetLoopEnabled(bool),
    SetHostSync(bool),
    SetSendClock(bool),
    SetReceiveClock(bool),

    // Players
    SelectPattern { player: usize, pattern: usize },
    TriggerFill { player: usize },
    SetVelocityCurve { player: usize, curve: VelocityCurve },
    SetSubdivision { player: usize, subdivision: Subdivision },
    SetOutputChannel { player: usize, channel: u8 },
    /// Swap a slot; an empty `PatternSlot` clears it
    LoadPattern { player: usize, slot: usize, pattern: Box<PatternSlot> },

    // Scheduler
    SchedulePatternChange { player: usize, pattern: usize, bar: u64 },
    QueuePatternChange { player: usize, pattern: usize, quantization_bars: u32 },
    ClearPendingChanges { player: Option<usize> },
    QueueClipLaunch { player: usize, pattern: usize, quantization_bars: u32 },
    QueueClipStop { player: usize, quantization_bars: u32 },

    // Scenes
    SaveScene { index: usize, name: String },
    LoadScene(usize),
    TriggerScene(usize),
    QueueScene { index: usize, quantization_bars: u32 },
    ClearScene(usize),

    // Recorder
    StartRecording { overdub: bool },
    StopRecording,
    SetLoopRecording { enabled: bool, bars: u32 },
    ClearRecording,
    SnapshotRecording(Sender<RecordBuffer>),

    // MIDI learn
    StartMidiLearn(Parameter),
    CancelMidiLearn,
    AddMapping(MidiMapping),
    RemoveMapping(Parameter),
    SetMappingFeedback { parameter: Parameter, enabled: bool },
    /// Set a parameter from the UI; mapped controllers receive feedback
    SetParameter { parameter: Parameter, value: f32 },

    // Session
    ApplySettings(Box<EngineSettings>),
    SnapshotSettings(Sender<EngineSettings>),
    Panic,
}

/// Notifications from the audio thread, drained by the UI
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    TransportChanged(TransportState),
    MidiLearnComplete { parameter: Parameter, channel: u8, cc: u8 },
    ParameterChanged { parameter: Parameter, value: f32 },
    SceneTriggered(usize),
    PatternChanged { player: usize, pattern: usize },
    ClipStopped { player: usize },
    /// A queued change that could not be applied, e.g. an empty slot
    ChangeDropped { kind: ChangeKind, player: Option<usize>, target: Option<usize> },
    /// Tempo recovered from incoming MIDI clock
    ExternalTempo(f64),
}

/// Objects replaced on the audio thread, handed back to be dropped elsewhere
#[derive(Debug)]
pub enum Retired {
    Pattern(Box<PatternSlot>),
    Scene(Scene),
    Mapping(MidiMapping),
    Settings(Box<EngineSettings>),
}
