//! Real-time sequencing engine.
//!
//! `Engine` owns every piece of sequencer state and runs on the audio thread.
//! The UI talks to it through the `EngineHandle` returned by `Engine::new`:
//! structural changes travel over the command queue, hot parameters through
//! the shared atomics, and notifications come back as `EngineEvent`s.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use crossbeam_channel::{Receiver, Sender, bounded};
use groovebox_core::limits::{
    MIDI_CHANNELS, PATTERN_SLOTS, PLAYER_COUNT, SCENE_SLOTS, VOLUME_MAX, VOLUME_MIN,
};
use groovebox_core::midi::ALL_NOTES_OFF_CC;
use groovebox_core::{
    ChangeKind, ClipState, ClockCommand, EngineSettings, Humanizer, LiveRecorder, MappingOutcome,
    MappingTable, MidiBuffer, MidiClockGenerator, MidiClockReceiver, MidiEvent, MidiMessage, Parameter,
    PatternChangeScheduler, PlayerSettings, PlayerState, QueuedChange, Scene, SceneBank, Span,
    TransportClock, TransportState,
};
use tracing::{debug, info, trace, warn};

use crate::commands::{Command, EngineEvent, Retired};
use crate::handle::EngineHandle;
use crate::shared::{SharedParams, clamp_finite};

const COMMAND_QUEUE_SIZE: usize = 256;
const EVENT_QUEUE_SIZE: usize = 256;
const RETIRED_QUEUE_SIZE: usize = 64;
/// Smallest external tempo change worth reporting to the UI
const EXTERNAL_TEMPO_REPORT_DELTA: f64 = 0.5;

/// Host transport snapshot passed to `process_block` when running as a plugin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostPosition {
    pub tempo: f64,
    pub position_beats: f64,
    pub playing: bool,
}

pub struct Engine {
    transport: TransportClock,
    players: [PlayerState; PLAYER_COUNT],
    scheduler: PatternChangeScheduler,
    scenes: SceneBank,
    recorder: LiveRecorder,
    mappings: MappingTable,
    clock_out: MidiClockGenerator,
    clock_in: MidiClockReceiver,
    humanizer: Humanizer,
    shared: Arc<SharedParams>,
    commands: Receiver<Command>,
    events: Sender<EngineEvent>,
    retired: Sender<Retired>,
    loop_enabled: bool,
    send_clock: bool,
    receive_clock: bool,
    /// Frames processed since creation, the time base for incoming clock
    samples_processed: u64,
    last_reported_tempo: f64,
}

impl Engine {
    /// Create an engine and the handle the UI uses to drive it
    pub fn new(sample_rate: f64) -> (Self, EngineHandle) {
        Self::build(sample_rate, Humanizer::new())
    }

    /// Engine with a deterministic humanizer, for reproducible renders
    pub fn with_seed(sample_rate: f64, seed: u64) -> (Self, EngineHandle) {
        Self::build(sample_rate, Humanizer::with_seed(seed))
    }

    fn build(sample_rate: f64, humanizer: Humanizer) -> (Self, EngineHandle) {
        let (command_tx, command_rx) = bounded(COMMAND_QUEUE_SIZE);
        let (event_tx, event_rx) = bounded(EVENT_QUEUE_SIZE);
        let (retired_tx, retired_rx) = bounded(RETIRED_QUEUE_SIZE);
        let shared = Arc::new(SharedParams::default());

        let engine = Self {
            transport: TransportClock::new(sample_rate),
            players: std::array::from_fn(|_| PlayerState::new(9)),
            scheduler: PatternChangeScheduler::new(),
            scenes: SceneBank::new(),
            recorder: LiveRecorder::new(),
            mappings: MappingTable::new(),
            clock_out: MidiClockGenerator::new(),
            clock_in: MidiClockReceiver::new(),
            humanizer,
            shared: shared.clone(),
            commands: command_rx,
            events: event_tx,
            retired: retired_tx,
            loop_enabled: true,
            send_clock: false,
            receive_clock: false,
            samples_processed: 0,
            last_reported_tempo: 0.0,
        };
        info!(sample_rate, players = PLAYER_COUNT, "Sequencer engine created");

        let handle = EngineHandle::new(command_tx, event_rx, retired_rx, shared);
        (engine, handle)
    }

    pub fn shared(&self) -> Arc<SharedParams> {
        self.shared.clone()
    }

    pub fn transport(&self) -> &TransportClock {
        &self.transport
    }

    pub fn player(&self, index: usize) -> Option<&PlayerState> {
        self.players.get(index)
    }

    pub fn scenes(&self) -> &SceneBank {
        &self.scenes
    }

    pub fn scheduler(&self) -> &PatternChangeScheduler {
        &self.scheduler
    }

    pub fn mappings(&self) -> &MappingTable {
        &self.mappings
    }

    pub fn recorder(&self) -> &LiveRecorder {
        &self.recorder
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.transport.set_sample_rate(sample_rate);
        self.clock_in.reset();
    }

    /// Process one audio block.
    ///
    /// Fills `out` with this block's MIDI in sample-offset order and returns
    /// the transport span covered, or `None` while stopped.
    pub fn process_block(
        &mut self,
        frames: usize,
        midi_in: &[MidiEvent],
        host: Option<HostPosition>,
        out: &mut MidiBuffer,
    ) -> Option<Span> {
        out.clear();
        if frames == 0 {
            return None;
        }

        self.drain_commands(out);
        self.pull_shared(out);
        self.handle_input(midi_in, out);
        if let Some(host) = host {
            self.follow_host(host, out);
        }

        let span = self.transport.advance(frames);
        if let Some(span) = &span {
            self.render_span(span, out);
            if self.send_clock {
                self.clock_out.render(span, out);
            }
        }

        self.samples_processed += frames as u64;
        self.publish(out);
        span
    }

    /// Render one player over a whole span, ignoring bar boundaries
    pub fn process_player(&mut self, index: usize, span: &Span, out: &mut MidiBuffer) {
        let Some(player) = self.players.get_mut(index) else {
            return;
        };
        player.render(span, span.start, span.end, self.loop_enabled, &mut self.humanizer, out);
    }

    fn render_span(&mut self, span: &Span, out: &mut MidiBuffer) {
        let bar_len = self.transport.beats_per_bar() as f64;
        let mut seg_start = span.start;
        let mut bar = (span.start / bar_len).ceil().max(0.0) as u64;

        loop {
            let boundary = bar as f64 * bar_len;
            if boundary >= span.end {
                break;
            }
            if boundary > seg_start {
                self.render_players(span, seg_start, boundary, out);
                seg_start = boundary;
            }
            self.on_bar(bar, boundary, span.offset_of(boundary), out);
            bar += 1;
        }
        self.render_players(span, seg_start, span.end, out);
    }

    fn render_players(&mut self, span: &Span, from: f64, to: f64, out: &mut MidiBuffer) {
        for player in self.players.iter_mut() {
            player.render(span, from, to, self.loop_enabled, &mut self.humanizer, out);
        }
    }

    fn on_bar(&mut self, bar: u64, beat: f64, offset: u32, out: &mut MidiBuffer) {
        let matured = self.scheduler.collect_matured(bar);
        for i in 0..matured {
            if let Some(change) = self.scheduler.matured(i) {
                self.apply_change(change, beat, offset, out);
            }
        }
        let beats_per_bar = self.transport.beats_per_bar();
        for player in self.players.iter_mut() {
            player.on_bar_boundary(beat, beats_per_bar, offset, out);
        }
        trace!(bar, offset, matured, "bar boundary");
    }

    fn apply_change(&mut self, change: QueuedChange, beat: f64, offset: u32, out: &mut MidiBuffer) {
        let applied = match (change.kind, change.player_index, change.target_index) {
            (ChangeKind::Pattern, Some(p), Some(pattern)) => {
                let switched = self
                    .players
                    .get_mut(p)
                    .is_some_and(|player| player.switch_pattern(pattern, beat, offset, out));
                if switched {
                    self.emit(EngineEvent::PatternChanged { player: p, pattern });
                }
                switched
            }
            (ChangeKind::Clip, Some(p), Some(pattern)) => {
                let launched = self
                    .players
                    .get_mut(p)
                    .is_some_and(|player| player.launch(pattern, beat, offset, out));
                if launched {
                    self.emit(EngineEvent::PatternChanged { player: p, pattern });
                }
                launched
            }
            (ChangeKind::Clip, Some(p), None) => match self.players.get_mut(p) {
                Some(player) => {
                    player.stop_clip(offset, out);
                    self.emit(EngineEvent::ClipStopped { player: p });
                    true
                }
                None => false,
            },
            (ChangeKind::Scene, _, Some(index)) => self.apply_scene(index, true, beat, offset, out),
            _ => false,
        };

        if !applied {
            debug!(kind = ?change.kind, player = ?change.player_index, target = ?change.target_index, "Dropped queued change");
            if let Some(player) = change.player_index.and_then(|p| self.players.get_mut(p)) {
                player.queued_pattern = None;
            }
            self.emit(EngineEvent::ChangeDropped {
                kind: change.kind,
                player: change.player_index,
                target: change.target_index,
            });
        }
    }

    fn emit(&self, event: EngineEvent) {
        if self.events.try_send(event).is_err() {
            trace!("event queue full");
        }
    }

    fn retire(&self, object: Retired) {
        // a full queue drops here; that only happens if the UI stops collecting
        let _ = self.retired.try_send(object);
    }

    /// Beat of the current bar's first beat, used to keep immediate changes in phase
    fn current_bar_start(&self) -> f64 {
        self.transport.bar_start(self.transport.current_bar())
    }

    fn drain_commands(&mut self, out: &mut MidiBuffer) {
        while let Ok(command) = self.commands.try_recv() {
            self.handle_command(command, out);
        }
    }

    fn handle_command(&mut self, command: Command, out: &mut MidiBuffer) {
        match command {
            Command::Play => self.start_transport(out),
            Command::Stop => self.stop_transport(out),
            Command::Pause => self.pause_transport(out),
            Command::Continue => self.continue_transport(out),
            Command::SetTempo(bpm) => self.transport.set_tempo(bpm),
            Command::SetBeatsPerBar(beats) => self.transport.set_beats_per_bar(beats),
            Command::Locate(beat) => {
                self.flush_all(0, out);
                self.transport.locate(beat);
            }
            Command::SetLoopEnabled(enabled) => self.loop_enabled = enabled,
            Command::SetHostSync(enabled) => self.transport.set_host_sync(enabled),
            Command::SetSendClock(enabled) => self.send_clock = enabled,
            Command::SetReceiveClock(enabled) => {
                self.receive_clock = enabled;
                self.clock_in.reset();
            }

            Command::SelectPattern { player, pattern } => self.select_pattern(player, pattern, out),
            Command::TriggerFill { player } => {
                if let Some(p) = self.players.get_mut(player) {
                    p.trigger_fill();
                }
            }
            Command::SetVelocityCurve { player, curve } => {
                if let Some(p) = self.players.get_mut(player) {
                    p.velocity_curve = curve;
                }
            }
            Command::SetSubdivision { player, subdivision } => {
                if let Some(p) = self.players.get_mut(player) {
                    p.subdivision = subdivision;
                }
            }
            Command::SetOutputChannel { player, channel } => {
                if let Some(p) = self.players.get_mut(player) {
                    p.flush_notes(0, out);
                    p.output_channel = channel.min(MIDI_CHANNELS - 1);
                }
            }
            Command::LoadPattern { player, slot, mut pattern } => {
                let Some(p) = self.players.get_mut(player).filter(|_| slot < PATTERN_SLOTS) else {
                    self.retire(Retired::Pattern(pattern));
                    return;
                };
                if slot == p.selected_pattern {
                    p.flush_notes(0, out);
                }
                // the old slot goes back in the same box, so nothing is freed here
                std::mem::swap(&mut p.bank.slots[slot], &mut *pattern);
                self.retire(Retired::Pattern(pattern));
            }

            Command::SchedulePatternChange { player, pattern, bar } => {
                self.schedule_player_change(ChangeKind::Pattern, player, Some(pattern), 1, Some(bar));
            }
            Command::QueuePatternChange { player, pattern, quantization_bars } => {
                self.schedule_player_change(ChangeKind::Pattern, player, Some(pattern), quantization_bars, None);
            }
            Command::ClearPendingChanges { player } => {
                self.scheduler.clear(player);
                for (i, p) in self.players.iter_mut().enumerate() {
                    if player.is_none() || player == Some(i) {
                        p.queued_pattern = None;
                    }
                }
            }
            Command::QueueClipLaunch { player, pattern, quantization_bars } => {
                self.schedule_player_change(ChangeKind::Clip, player, Some(pattern), quantization_bars, None);
            }
            Command::QueueClipStop { player, quantization_bars } => {
                self.schedule_player_change(ChangeKind::Clip, player, None, quantization_bars, None);
            }

            Command::SaveScene { index, name } => self.save_scene(index, name),
            Command::LoadScene(index) => {
                let beat = self.current_bar_start();
                self.apply_scene(index, false, beat, 0, out);
            }
            Command::TriggerScene(index) => {
                let beat = self.current_bar_start();
                self.apply_scene(index, true, beat, 0, out);
            }
            Command::QueueScene { index, quantization_bars } => {
                if self.scenes.is_empty_slot(index) {
                    return;
                }
                let bar = self.scheduler.schedule_quantized(
                    ChangeKind::Scene,
                    Some(index),
                    None,
                    quantization_bars,
                    self.transport.current_bar(),
                );
                debug!(scene = index, ?bar, "Queued scene change");
            }
            Command::ClearScene(index) => {
                if let Some(old) = self.scenes.clear(index) {
                    self.retire(Retired::Scene(old));
                }
            }

            Command::StartRecording { overdub } => {
                self.recorder
                    .start(self.transport.current_beat(), self.transport.beats_per_bar(), overdub);
                debug!(overdub, "Recording started");
            }
            Command::StopRecording => self.recorder.stop(),
            Command::SetLoopRecording { enabled, bars } => {
                self.recorder.set_loop_mode(enabled);
                self.recorder.set_loop_bars(bars);
            }
            Command::ClearRecording => self.recorder.clear(),
            Command::SnapshotRecording(reply) => {
                let _ = reply.try_send(self.recorder.buffer().clone());
            }

            Command::StartMidiLearn(parameter) => self.mappings.start_learn(parameter),
            Command::CancelMidiLearn => self.mappings.cancel_learn(),
            Command::AddMapping(mapping) => self.mappings.add(mapping),
            Command::RemoveMapping(parameter) => {
                if let Some(old) = self.mappings.remove(parameter) {
                    self.retire(Retired::Mapping(old));
                }
            }
            Command::SetMappingFeedback { parameter, enabled } => {
                if let Some(mapping) = self.mappings.get_mut(parameter) {
                    mapping.send_feedback = enabled;
                }
            }
            Command::SetParameter { parameter, value } => {
                let value = self.apply_parameter(parameter, value);
                self.send_feedback(parameter, value, out);
            }

            Command::ApplySettings(settings) => {
                self.apply_settings(&settings, out);
                self.retire(Retired::Settings(settings));
            }
            Command::SnapshotSettings(reply) => {
                let _ = reply.try_send(self.snapshot_settings());
            }
            Command::Panic => self.panic(out),
        }
    }

    fn schedule_player_change(
        &mut self,
        kind: ChangeKind,
        player: usize,
        target: Option<usize>,
        quantization_bars: u32,
        bar: Option<u64>,
    ) {
        let Some(p) = self.players.get_mut(player) else {
            return;
        };
        let current = self.transport.current_bar();
        let scheduled = match bar {
            Some(bar) => self.scheduler.schedule(kind, target, Some(player), quantization_bars, bar, current),
            None => self.scheduler.schedule_quantized(kind, target, Some(player), quantization_bars, current),
        };
        match scheduled {
            Some(bar) => {
                if kind == ChangeKind::Pattern {
                    p.queued_pattern = target;
                }
                debug!(?kind, player, ?target, bar, "Scheduled change");
            }
            None => warn!(?kind, player, "Change queue full"),
        }
    }

    fn select_pattern(&mut self, player: usize, pattern: usize, out: &mut MidiBuffer) {
        let beat = self.current_bar_start();
        if let Some(p) = self.players.get_mut(player) {
            if p.switch_pattern(pattern, beat, 0, out) {
                self.emit(EngineEvent::PatternChanged { player, pattern });
            }
        }
    }

    fn start_transport(&mut self, out: &mut MidiBuffer) {
        if self.transport.is_playing() {
            return;
        }
        let from_beginning = self.transport.current_beat() == 0.0;
        self.transport.start_playback();
        if self.send_clock {
            self.clock_out.start(0, from_beginning, out);
        }
        self.emit(EngineEvent::TransportChanged(TransportState::Playing));
        info!(beat = self.transport.current_beat(), "Transport started");
    }

    fn continue_transport(&mut self, out: &mut MidiBuffer) {
        if self.transport.is_playing() {
            return;
        }
        self.transport.continue_playback();
        if self.send_clock {
            self.clock_out.start(0, false, out);
        }
        self.emit(EngineEvent::TransportChanged(TransportState::Playing));
    }

    fn pause_transport(&mut self, out: &mut MidiBuffer) {
        if !self.transport.is_playing() {
            return;
        }
        self.transport.pause();
        self.flush_all(0, out);
        if self.send_clock {
            self.clock_out.stop(0, out);
        }
        self.emit(EngineEvent::TransportChanged(TransportState::Paused));
    }

    fn stop_transport(&mut self, out: &mut MidiBuffer) {
        let was_running = self.transport.state != TransportState::Stopped;
        self.transport.stop_playback();
        for player in self.players.iter_mut() {
            player.reset(0, out);
        }
        self.recorder.stop();
        if was_running {
            if self.send_clock {
                self.clock_out.stop(0, out);
            }
            self.emit(EngineEvent::TransportChanged(TransportState::Stopped));
            info!("Transport stopped");
        }
    }

    fn flush_all(&mut self, offset: u32, out: &mut MidiBuffer) {
        for player in self.players.iter_mut() {
            player.flush_notes(offset, out);
        }
    }

    /// Note-offs for everything sounding plus all-notes-off on every channel;
    /// queued changes are discarded
    pub fn panic(&mut self, out: &mut MidiBuffer) {
        self.flush_all(0, out);
        for channel in 0..MIDI_CHANNELS {
            out.push(MidiEvent::control_change(0, channel, ALL_NOTES_OFF_CC, 0));
        }
        self.scheduler.clear(None);
        for player in self.players.iter_mut() {
            player.queued_pattern = None;
            player.fill_requested = false;
        }
        warn!("MIDI panic");
    }

    fn follow_host(&mut self, host: HostPosition, out: &mut MidiBuffer) {
        // free-run on the internal tempo unless host sync is enabled
        if !self.transport.host_sync() {
            return;
        }
        match (host.playing, self.transport.is_playing()) {
            (true, false) => {
                // relocate before starting so the first block begins at the host position
                self.transport.sync_to_host(host.tempo, host.position_beats);
                self.start_transport(out);
                return;
            }
            (false, true) => {
                self.pause_transport(out);
            }
            _ => {}
        }
        self.transport.sync_to_host(host.tempo, host.position_beats);
    }

    fn handle_input(&mut self, midi_in: &[MidiEvent], out: &mut MidiBuffer) {
        let samples_per_beat = self.transport.samples_per_beat();
        for event in midi_in {
            match event.message {
                MidiMessage::ControlChange { controller, value } => {
                    match self.mappings.handle_midi_cc(event.channel, controller, value) {
                        Some(MappingOutcome::Learned { parameter, channel, cc }) => {
                            info!(%parameter, channel, cc, "MIDI learn complete");
                            self.emit(EngineEvent::MidiLearnComplete { parameter, channel, cc });
                        }
                        Some(MappingOutcome::Changed { parameter, value }) => {
                            let value = self.apply_parameter(parameter, value);
                            self.emit(EngineEvent::ParameterChanged { parameter, value });
                        }
                        None => {
                            let beat = self.transport.current_beat() + event.sample_offset as f64 / samples_per_beat;
                            self.recorder.record(beat, event.channel, event.message);
                        }
                    }
                }
                MidiMessage::TimingClock if self.receive_clock => {
                    let at = self.samples_processed + event.sample_offset as u64;
                    let Some(tempo) = self.clock_in.on_clock(at, self.transport.sample_rate()) else {
                        continue;
                    };
                    if !self.transport.host_sync() {
                        self.transport.set_tempo(tempo);
                    }
                    if (tempo - self.last_reported_tempo).abs() >= EXTERNAL_TEMPO_REPORT_DELTA {
                        self.last_reported_tempo = tempo;
                        self.emit(EngineEvent::ExternalTempo(tempo));
                    }
                }
                MidiMessage::Start | MidiMessage::Continue | MidiMessage::Stop if self.receive_clock => {
                    match self.clock_in.on_message(event.message) {
                        Some(ClockCommand::Start) => {
                            self.stop_transport(out);
                            self.start_transport(out);
                        }
                        Some(ClockCommand::Continue) => self.continue_transport(out),
                        Some(ClockCommand::Stop) => self.pause_transport(out),
                        None => {}
                    }
                }
                MidiMessage::NoteOn { .. } | MidiMessage::NoteOff { .. } => {
                    let beat = self.transport.current_beat() + event.sample_offset as f64 / samples_per_beat;
                    self.recorder.record(beat, event.channel, event.message);
                }
                _ => {}
            }
        }
    }

    /// Apply a parameter value, returning it after clamping
    fn apply_parameter(&mut self, parameter: Parameter, value: f32) -> f32 {
        let (min, max) = parameter.range();
        let value = clamp_finite(value, min, max, min);
        let shared = &self.shared;
        match parameter {
            Parameter::Tempo => self.transport.set_tempo(value as f64),
            Parameter::MasterVolume => shared.master.volume.store(value),
            Parameter::Swing(p) => {
                if let Some(params) = shared.player(p as usize) {
                    params.swing.store(value);
                }
            }
            Parameter::Energy(p) => {
                if let Some(params) = shared.player(p as usize) {
                    params.energy.store(value);
                }
            }
            Parameter::Humanize(p) => {
                if let Some(params) = shared.player(p as usize) {
                    params.humanize.store(value);
                }
            }
            Parameter::Enabled(p) => {
                if let Some(params) = shared.player(p as usize) {
                    params.enabled.store(value >= 0.5, Ordering::Relaxed);
                }
            }
            Parameter::Volume(p) => {
                if let Some(channel) = shared.channel(p as usize) {
                    channel.set_volume(value);
                }
            }
            Parameter::Pan(p) => {
                if let Some(channel) = shared.channel(p as usize) {
                    channel.set_pan(value);
                }
            }
            Parameter::ReverbSend(p) => {
                if let Some(channel) = shared.channel(p as usize) {
                    channel.reverb_send.store(value);
                }
            }
            Parameter::DelaySend(p) => {
                if let Some(channel) = shared.channel(p as usize) {
                    channel.delay_send.store(value);
                }
            }
            Parameter::Mute(p) => {
                if let Some(channel) = shared.channel(p as usize) {
                    channel.mute.store(value >= 0.5, Ordering::Relaxed);
                }
            }
        }
        value
    }

    /// Echo a parameter value to its controller when the mapping asks for it
    fn send_feedback(&self, parameter: Parameter, value: f32, out: &mut MidiBuffer) {
        if let Some((channel, cc, value)) = self.mappings.feedback(parameter, value) {
            out.push(MidiEvent::control_change(0, channel, cc, value));
        }
    }

    /// Copy the UI-owned atomics into player state
    fn pull_shared(&mut self, out: &mut MidiBuffer) {
        for (i, player) in self.players.iter_mut().enumerate() {
            let params = &self.shared.players[i];
            let channel = &self.shared.channels[i];
            player.swing = params.swing.load();
            player.energy = params.energy.load();
            player.humanization_amount = params.humanize.load();
            player.volume = channel.volume.load();
            player.muted = channel.mute.load(Ordering::Relaxed);

            let enabled = params.enabled.load(Ordering::Relaxed);
            if player.enabled && !enabled {
                player.flush_notes(0, out);
            }
            player.enabled = enabled;
        }
    }

    fn publish(&mut self, out: &MidiBuffer) {
        let view = &self.shared.transport;
        view.beat.store(self.transport.current_beat());
        view.bar.store(self.transport.current_bar(), Ordering::Relaxed);
        view.tempo.store(self.transport.tempo());
        view.playing.store(self.transport.is_playing(), Ordering::Relaxed);
        view.recording.store(self.recorder.is_recording(), Ordering::Relaxed);
        view.active_scene.store(self.scenes.active_index(), Ordering::Relaxed);
        if out.dropped() > 0 {
            view.dropped_events.fetch_add(out.dropped() as u64, Ordering::Relaxed);
        }
    }

    fn save_scene(&mut self, index: usize, name: String) {
        if index >= SCENE_SLOTS {
            return;
        }
        let mut scene = Scene::new(&name, self.transport.tempo());
        for (i, (clip, player)) in scene.clips.iter_mut().zip(self.players.iter()).enumerate() {
            let channel = &self.shared.channels[i];
            *clip = ClipState {
                active: player.active,
                pattern_index: player.selected_pattern,
                midi_file_name: player
                    .bank
                    .slot(player.selected_pattern)
                    .and_then(|s| s.file_name.clone()),
                volume: channel.volume.load(),
                muted: channel.mute.load(Ordering::Relaxed),
            };
        }
        if let Some(Some(old)) = self.scenes.save(index, scene) {
            self.retire(Retired::Scene(old));
        }
        debug!(scene = index, "Scene saved");
    }

    /// Restore a scene. Triggering also launches or stops each player's clip
    /// and reports `SceneTriggered`; loading only restores selections and mix.
    fn apply_scene(&mut self, index: usize, trigger: bool, beat: f64, offset: u32, out: &mut MidiBuffer) -> bool {
        let Some(scene) = self.scenes.get(index) else {
            return false;
        };
        self.transport.set_tempo(scene.tempo);

        for (i, clip) in scene.clips.iter().enumerate() {
            let player = &mut self.players[i];
            let channel = &self.shared.channels[i];
            channel.set_volume(clamp_finite(clip.volume, VOLUME_MIN, VOLUME_MAX, 1.0));
            channel.mute.store(clip.muted, Ordering::Relaxed);
            player.volume = channel.volume.load();
            player.muted = clip.muted;

            if trigger && !clip.active {
                player.stop_clip(offset, out);
                continue;
            }
            let switched = if trigger {
                player.launch(clip.pattern_index, beat, offset, out)
            } else {
                player.switch_pattern(clip.pattern_index, beat, offset, out)
            };
            if !switched {
                debug!(scene = index, player = i, pattern = clip.pattern_index, "Scene clip slot is empty");
            }
        }

        self.scenes.set_active(index);
        if trigger {
            self.emit(EngineEvent::SceneTriggered(index));
        }
        info!(scene = index, trigger, "Scene applied");
        true
    }

    fn apply_settings(&mut self, settings: &EngineSettings, out: &mut MidiBuffer) {
        self.transport.set_tempo(settings.tempo);
        self.transport.set_host_sync(settings.host_sync);
        self.loop_enabled = settings.loop_enabled;
        self.send_clock = settings.send_midi_clock;
        self.receive_clock = settings.receive_midi_clock;
        self.shared.metronome.store(settings.metronome_enabled, Ordering::Relaxed);

        for (i, ps) in settings.players.iter().take(PLAYER_COUNT).enumerate() {
            let params = &self.shared.players[i];
            params.swing.store(ps.swing);
            params.energy.store(ps.energy);
            params.humanize.store(ps.humanize);
            params.enabled.store(ps.enabled, Ordering::Relaxed);
            self.shared.channels[i].set_volume(ps.volume);

            let beat = self.transport.bar_start(self.transport.current_bar());
            let player = &mut self.players[i];
            player.velocity_curve = ps.velocity_curve;
            player.fill_requested = ps.fill;
            if player.output_channel != ps.output_channel {
                player.flush_notes(0, out);
                player.output_channel = ps.output_channel.min(MIDI_CHANNELS - 1);
            }
            if !player.switch_pattern(ps.selected_pattern, beat, 0, out) {
                player.selected_pattern = ps.selected_pattern;
            }
        }
        info!(tempo = settings.tempo, "Settings applied");
    }

    fn snapshot_settings(&self) -> EngineSettings {
        let players = self
            .players
            .iter()
            .enumerate()
            .map(|(i, p)| PlayerSettings {
                swing: self.shared.players[i].swing.load(),
                energy: self.shared.players[i].energy.load(),
                volume: self.shared.channels[i].volume.load(),
                humanize: self.shared.players[i].humanize.load(),
                enabled: self.shared.players[i].enabled.load(Ordering::Relaxed),
                fill: p.fill_requested,
                velocity_curve: p.velocity_curve,
                output_channel: p.output_channel,
                selected_pattern: p.selected_pattern,
            })
            .collect();
        EngineSettings {
            tempo: self.transport.tempo(),
            loop_enabled: self.loop_enabled,
            metronome_enabled: self.shared.metronome.load(Ordering::Relaxed),
            host_sync: self.transport.host_sync(),
            send_midi_clock: self.send_clock,
            receive_midi_clock: self.receive_clock,
            players,
        }
    }
}
