//! UI-side control surface for the engine

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use groovebox_core::limits::{DEFAULT_ENERGY, SWING_MAX, SWING_MIN};
use groovebox_core::{
    EngineSettings, MidiMapping, Parameter, PatternSlot, RecordBuffer, Subdivision, VelocityCurve,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::commands::{Command, EngineEvent, Retired};
use crate::shared::{SharedParams, clamp_finite};
use crate::storage::{self, StorageError};

/// How long a snapshot request waits for the audio thread
const SNAPSHOT_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine command queue is full")]
    QueueFull,
    #[error("Engine is not running")]
    Disconnected,
    #[error("Timed out waiting for the audio thread")]
    Timeout,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl<T> From<TrySendError<T>> for EngineError {
    fn from(err: TrySendError<T>) -> Self {
        match err {
            TrySendError::Full(_) => Self::QueueFull,
            TrySendError::Disconnected(_) => Self::Disconnected,
        }
    }
}

/// Cloneable handle to a running `Engine`.
///
/// Structural changes are queued as commands and take effect at the start
/// of the next audio block. Hot parameters are written straight into the
/// shared atomics.
#[derive(Clone)]
pub struct EngineHandle {
    commands: Sender<Command>,
    events: Receiver<EngineEvent>,
    retired: Receiver<Retired>,
    shared: Arc<SharedParams>,
}

impl EngineHandle {
    pub(crate) fn new(
        commands: Sender<Command>,
        events: Receiver<EngineEvent>,
        retired: Receiver<Retired>,
        shared: Arc<SharedParams>,
    ) -> Self {
        Self { commands, events, retired, shared }
    }

    fn send(&self, command: Command) -> Result<(), EngineError> {
        self.commands.try_send(command)?;
        Ok(())
    }

    pub fn shared(&self) -> &Arc<SharedParams> {
        &self.shared
    }

    /// Drain pending engine notifications
    pub fn events(&self) -> impl Iterator<Item = EngineEvent> + '_ {
        self.events.try_iter()
    }

    /// Drop objects the audio thread has swapped out. Call from the UI loop.
    pub fn collect_garbage(&self) -> usize {
        self.retired.try_iter().count()
    }

    // Transport

    pub fn play(&self) -> Result<(), EngineError> {
        self.send(Command::Play)
    }

    pub fn stop(&self) -> Result<(), EngineError> {
        self.send(Command::Stop)
    }

    pub fn pause(&self) -> Result<(), EngineError> {
        self.send(Command::Pause)
    }

    pub fn continue_playback(&self) -> Result<(), EngineError> {
        self.send(Command::Continue)
    }

    pub fn set_tempo(&self, bpm: f64) -> Result<(), EngineError> {
        self.send(Command::SetTempo(bpm))
    }

    pub fn set_beats_per_bar(&self, beats: u32) -> Result<(), EngineError> {
        self.send(Command::SetBeatsPerBar(beats))
    }

    pub fn locate(&self, beat: f64) -> Result<(), EngineError> {
        self.send(Command::Locate(beat))
    }

    pub fn set_loop_enabled(&self, enabled: bool) -> Result<(), EngineError> {
        self.send(Command::SetLoopEnabled(enabled))
    }

    pub fn set_host_sync(&self, enabled: bool) -> Result<(), EngineError> {
        self.send(Command::SetHostSync(enabled))
    }

    pub fn set_send_clock(&self, enabled: bool) -> Result<(), EngineError> {
        self.send(Command::SetSendClock(enabled))
    }

    pub fn set_receive_clock(&self, enabled: bool) -> Result<(), EngineError> {
        self.send(Command::SetReceiveClock(enabled))
    }

    pub fn set_metronome(&self, enabled: bool) {
        self.shared.metronome.store(enabled, Ordering::Relaxed);
    }

    pub fn current_beat(&self) -> f64 {
        self.shared.transport.beat.load()
    }

    pub fn current_bar(&self) -> u64 {
        self.shared.transport.bar.load(Ordering::Relaxed)
    }

    pub fn tempo(&self) -> f64 {
        self.shared.transport.tempo.load()
    }

    pub fn is_playing(&self) -> bool {
        self.shared.transport.playing.load(Ordering::Relaxed)
    }

    pub fn is_recording(&self) -> bool {
        self.shared.transport.recording.load(Ordering::Relaxed)
    }

    pub fn active_scene(&self) -> i32 {
        self.shared.transport.active_scene.load(Ordering::Relaxed)
    }

    /// MIDI events lost to full output buffers
    pub fn dropped_events(&self) -> u64 {
        self.shared.transport.dropped_events.load(Ordering::Relaxed)
    }

    // Players

    pub fn set_swing(&self, player: usize, swing: f32) {
        if let Some(params) = self.shared.player(player) {
            params.swing.store(clamp_finite(swing, SWING_MIN, SWING_MAX, 0.0));
        }
    }

    pub fn set_energy(&self, player: usize, energy: f32) {
        if let Some(params) = self.shared.player(player) {
            params.energy.store(clamp_finite(energy, 0.0, 1.0, DEFAULT_ENERGY));
        }
    }

    pub fn set_humanization(&self, player: usize, amount: f32) {
        if let Some(params) = self.shared.player(player) {
            params.humanize.store(clamp_finite(amount, 0.0, 1.0, 0.0));
        }
    }

    pub fn set_player_enabled(&self, player: usize, enabled: bool) {
        if let Some(params) = self.shared.player(player) {
            params.enabled.store(enabled, Ordering::Relaxed);
        }
    }

    pub fn select_pattern(&self, player: usize, pattern: usize) -> Result<(), EngineError> {
        self.send(Command::SelectPattern { player, pattern })
    }

    pub fn trigger_fill(&self, player: usize) -> Result<(), EngineError> {
        self.send(Command::TriggerFill { player })
    }

    pub fn set_velocity_curve(&self, player: usize, curve: VelocityCurve) -> Result<(), EngineError> {
        self.send(Command::SetVelocityCurve { player, curve })
    }

    pub fn set_subdivision(&self, player: usize, subdivision: Subdivision) -> Result<(), EngineError> {
        self.send(Command::SetSubdivision { player, subdivision })
    }

    pub fn set_output_channel(&self, player: usize, channel: u8) -> Result<(), EngineError> {
        self.send(Command::SetOutputChannel { player, channel })
    }

    pub fn load_pattern(&self, player: usize, slot: usize, pattern: PatternSlot) -> Result<(), EngineError> {
        self.send(Command::LoadPattern { player, slot, pattern: Box::new(pattern) })
    }

    pub fn clear_pattern(&self, player: usize, slot: usize) -> Result<(), EngineError> {
        self.load_pattern(player, slot, PatternSlot::default())
    }

    /// Read a MIDI file into a player's slot. On failure the slot is left
    /// untouched and playback continues.
    pub fn load_pattern_file(&self, player: usize, slot: usize, path: &Path) -> Result<(), EngineError> {
        let pattern = storage::read_pattern_file(path).inspect_err(|e| {
            warn!(path = %path.display(), player, slot, error = %e, "Failed to load pattern file");
        })?;
        info!(path = %path.display(), player, slot, "Loaded pattern file");
        self.load_pattern(player, slot, pattern)
    }

    // Scheduler

    /// Switch pattern at the start of `bar`; bars already under way move to
    /// the next bar
    pub fn schedule_pattern_change(&self, player: usize, pattern: usize, bar: u64) -> Result<(), EngineError> {
        self.send(Command::SchedulePatternChange { player, pattern, bar })
    }

    pub fn queue_pattern_change(&self, player: usize, pattern: usize, quantization_bars: u32) -> Result<(), EngineError> {
        self.send(Command::QueuePatternChange { player, pattern, quantization_bars })
    }

    pub fn clear_pending_changes(&self, player: Option<usize>) -> Result<(), EngineError> {
        self.send(Command::ClearPendingChanges { player })
    }

    pub fn queue_clip_launch(&self, player: usize, pattern: usize, quantization_bars: u32) -> Result<(), EngineError> {
        self.send(Command::QueueClipLaunch { player, pattern, quantization_bars })
    }

    pub fn queue_clip_stop(&self, player: usize, quantization_bars: u32) -> Result<(), EngineError> {
        self.send(Command::QueueClipStop { player, quantization_bars })
    }

    // Scenes

    pub fn save_scene(&self, index: usize, name: &str) -> Result<(), EngineError> {
        self.send(Command::SaveScene { index, name: name.to_string() })
    }

    pub fn load_scene(&self, index: usize) -> Result<(), EngineError> {
        self.send(Command::LoadScene(index))
    }

    pub fn trigger_scene(&self, index: usize) -> Result<(), EngineError> {
        self.send(Command::TriggerScene(index))
    }

    pub fn queue_scene_change(&self, index: usize, quantization_bars: u32) -> Result<(), EngineError> {
        self.send(Command::QueueScene { index, quantization_bars })
    }

    pub fn clear_scene(&self, index: usize) -> Result<(), EngineError> {
        self.send(Command::ClearScene(index))
    }

    // Recorder

    pub fn start_live_recording(&self, overdub: bool) -> Result<(), EngineError> {
        self.send(Command::StartRecording { overdub })
    }

    pub fn stop_live_recording(&self) -> Result<(), EngineError> {
        self.send(Command::StopRecording)
    }

    pub fn set_loop_recording(&self, enabled: bool, bars: u32) -> Result<(), EngineError> {
        self.send(Command::SetLoopRecording { enabled, bars })
    }

    pub fn clear_record_buffer(&self) -> Result<(), EngineError> {
        self.send(Command::ClearRecording)
    }

    /// Copy of the record buffer, taken between two audio blocks
    pub fn recording_snapshot(&self) -> Result<RecordBuffer, EngineError> {
        let (tx, rx) = bounded(1);
        self.send(Command::SnapshotRecording(tx))?;
        rx.recv_timeout(SNAPSHOT_TIMEOUT).map_err(|_| EngineError::Timeout)
    }

    /// Write the recording to a standard MIDI file. `quantize` is
    /// (grid in beats, strength 0-1).
    pub fn export_recording(&self, path: &Path, quantize: Option<(f64, f64)>, channel: u8) -> Result<(), EngineError> {
        let buffer = self.recording_snapshot()?;
        let tempo = self.tempo();
        let pattern = buffer.to_pattern("recording", quantize);
        storage::write_pattern_file(path, &pattern, tempo, channel)?;
        info!(path = %path.display(), events = buffer.len(), "Exported recording");
        Ok(())
    }

    // MIDI learn

    pub fn start_midi_learn(&self, parameter: Parameter) -> Result<(), EngineError> {
        self.send(Command::StartMidiLearn(parameter))
    }

    pub fn cancel_midi_learn(&self) -> Result<(), EngineError> {
        self.send(Command::CancelMidiLearn)
    }

    pub fn add_midi_mapping(&self, mapping: MidiMapping) -> Result<(), EngineError> {
        self.send(Command::AddMapping(mapping))
    }

    pub fn remove_midi_mapping(&self, parameter: Parameter) -> Result<(), EngineError> {
        self.send(Command::RemoveMapping(parameter))
    }

    pub fn set_mapping_feedback(&self, parameter: Parameter, enabled: bool) -> Result<(), EngineError> {
        self.send(Command::SetMappingFeedback { parameter, enabled })
    }

    /// Set a parameter and echo it to its controller if feedback is on
    pub fn send_midi_feedback(&self, parameter: Parameter, value: f32) -> Result<(), EngineError> {
        self.send(Command::SetParameter { parameter, value })
    }

    // Session

    pub fn apply_settings(&self, settings: EngineSettings) -> Result<(), EngineError> {
        self.send(Command::ApplySettings(Box::new(settings.sanitized())))
    }

    pub fn settings_snapshot(&self) -> Result<EngineSettings, EngineError> {
        let (tx, rx) = bounded(1);
        self.send(Command::SnapshotSettings(tx))?;
        rx.recv_timeout(SNAPSHOT_TIMEOUT).map_err(|_| EngineError::Timeout)
    }

    pub fn save_settings(&self, path: &Path) -> Result<(), EngineError> {
        let settings = self.settings_snapshot()?;
        storage::save_settings(path, &settings)?;
        Ok(())
    }

    pub fn load_settings(&self, path: &Path) -> Result<(), EngineError> {
        let settings = storage::load_settings(path)?;
        self.apply_settings(settings)
    }

    pub fn panic(&self) -> Result<(), EngineError> {
        self.send(Command::Panic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use groovebox_core::MidiBuffer;

    #[test]
    fn test_full_queue_reports_error() {
        let (_engine, handle) = Engine::new(48000.0);
        let mut result = Ok(());
        for _ in 0..1000 {
            result = handle.set_tempo(100.0);
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(EngineError::QueueFull)));
    }

    #[test]
    fn test_dropped_engine_disconnects() {
        let (engine, handle) = Engine::new(48000.0);
        drop(engine);
        assert!(matches!(handle.play(), Err(EngineError::Disconnected)));
    }

    #[test]
    fn test_retired_patterns_are_collected() {
        let (mut engine, handle) = Engine::new(48000.0);
        handle.load_pattern(0, 0, PatternSlot::default()).unwrap();
        handle.clear_pattern(0, 0).unwrap();
        let mut out = MidiBuffer::default();
        engine.process_block(256, &[], None, &mut out);
        assert_eq!(handle.collect_garbage(), 2);
    }

    #[test]
    fn test_missing_pattern_file_is_an_error() {
        let (_engine, handle) = Engine::new(48000.0);
        let result = handle.load_pattern_file(0, 0, Path::new("/nonexistent/groove.mid"));
        assert!(matches!(result, Err(EngineError::Storage(_))));
    }

    #[test]
    fn test_hot_parameters_clamp() {
        let (_engine, handle) = Engine::new(48000.0);
        handle.set_swing(0, 5.0);
        handle.set_energy(1, -2.0);
        handle.set_swing(99, 1.0);
        assert_eq!(handle.shared().players[0].swing.load(), 1.0);
        assert_eq!(handle.shared().players[1].energy.load(), 0.0);
    }
}
