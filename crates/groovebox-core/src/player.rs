//! Per-player sequencer state and event generation

use crate::groove::{Humanizer, Subdivision, swing_delay};
use crate::limits::{
    DEFAULT_ENERGY, MAX_VELOCITY, MIDI_CHANNELS, MIN_VELOCITY, PATTERN_SLOTS, PENDING_EVENT_CAPACITY,
};
use crate::midi::{MidiBuffer, MidiEvent, MidiMessage};
use crate::pattern::{Pattern, PatternBank, PatternSlot};
use crate::transport::Span;
use crate::velocity::{VelocityCurve, apply_velocity_curve};

/// An event pushed past the end of the block it was generated in
#[derive(Debug, Clone, Copy)]
struct PendingEvent {
    beat: f64,
    channel: u8,
    message: MidiMessage,
}

/// Settings that shape each generated note
#[derive(Debug, Clone, Copy)]
struct NoteShaping {
    channel: u8,
    swing: f32,
    energy: f32,
    humanization: f32,
    subdivision: Subdivision,
    velocity_curve: VelocityCurve,
    muted: bool,
}

/// One sequencer lane
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub bank: PatternBank,
    pub swing: f32,
    pub energy: f32,
    pub velocity_curve: VelocityCurve,
    pub humanization_amount: f32,
    pub subdivision: Subdivision,
    pub enabled: bool,
    /// MIDI channel 0-15
    pub output_channel: u8,
    pub selected_pattern: usize,
    /// Position inside the playing pattern, in beats
    pub playback_position: f64,
    pub queued_pattern: Option<usize>,
    pub volume: f32,
    pub muted: bool,
    /// Clip launched; inactive players only drain pending events
    pub active: bool,
    pub fill_requested: bool,
    pub fill_active: bool,
    fill_origin: f64,
    fill_until: f64,
    /// Absolute beat where cycle 0 of the selected pattern started
    cycle_origin: f64,
    sounding: [bool; 128],
    /// Swing plus humanize shift of each note's latest note-on, reused by its note-off
    note_shift: [f64; 128],
    pending: Vec<PendingEvent>,
}

impl PlayerState {
    pub fn new(output_channel: u8) -> Self {
        Self {
            bank: PatternBank::default(),
            swing: 0.0,
            energy: DEFAULT_ENERGY,
            velocity_curve: VelocityCurve::Linear,
            humanization_amount: 0.0,
            subdivision: Subdivision::Sixteenth,
            enabled: true,
            output_channel: output_channel.min(MIDI_CHANNELS - 1),
            selected_pattern: 0,
            playback_position: 0.0,
            queued_pattern: None,
            volume: 1.0,
            muted: false,
            active: true,
            fill_requested: false,
            fill_active: false,
            fill_origin: 0.0,
            fill_until: 0.0,
            cycle_origin: 0.0,
            sounding: [false; 128],
            note_shift: [0.0; 128],
            pending: Vec::with_capacity(PENDING_EVENT_CAPACITY),
        }
    }

    /// The pattern currently driving playback, fill included
    pub fn current_pattern(&self) -> Option<&Pattern> {
        if self.fill_active {
            if let Some(fill) = self.bank.fill(self.selected_pattern) {
                return Some(fill);
            }
        }
        self.bank.main(self.selected_pattern)
    }

    /// Replace a bank slot, returning the old contents for off-thread disposal
    pub fn set_slot(&mut self, index: usize, slot: PatternSlot) -> Option<PatternSlot> {
        self.bank.replace(index, slot)
    }

    pub fn is_sounding(&self, note: u8) -> bool {
        self.sounding.get(note as usize).copied().unwrap_or(false)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Switch the selected pattern, with cycle 0 starting at `at_beat`.
    /// Returns false, leaving playback untouched, if the slot is empty.
    pub fn switch_pattern(&mut self, index: usize, at_beat: f64, offset: u32, out: &mut MidiBuffer) -> bool {
        if index >= PATTERN_SLOTS || !self.bank.has_pattern(index) {
            return false;
        }
        self.flush_notes(offset, out);
        self.selected_pattern = index;
        self.queued_pattern = None;
        self.cycle_origin = at_beat;
        self.playback_position = 0.0;
        self.fill_active = false;
        true
    }

    /// Launch a clip: switch pattern and start playing
    pub fn launch(&mut self, index: usize, at_beat: f64, offset: u32, out: &mut MidiBuffer) -> bool {
        if !self.switch_pattern(index, at_beat, offset, out) {
            return false;
        }
        self.active = true;
        true
    }

    pub fn stop_clip(&mut self, offset: u32, out: &mut MidiBuffer) {
        self.flush_notes(offset, out);
        self.active = false;
        self.fill_active = false;
    }

    /// Queue a one-bar fill at the next bar boundary
    pub fn trigger_fill(&mut self) {
        self.fill_requested = true;
    }

    /// Bar-boundary housekeeping: ends a finished fill and starts a requested one
    pub fn on_bar_boundary(&mut self, bar_beat: f64, beats_per_bar: u32, offset: u32, out: &mut MidiBuffer) {
        if self.fill_active && bar_beat >= self.fill_until - 1e-9 {
            self.flush_notes(offset, out);
            self.fill_active = false;
        }
        if self.fill_requested {
            self.fill_requested = false;
            if self.bank.fill(self.selected_pattern).is_some() {
                self.flush_notes(offset, out);
                self.fill_active = true;
                self.fill_origin = bar_beat;
                self.fill_until = bar_beat + beats_per_bar as f64;
            }
        }
    }

    /// Note-off for every sounding note; pending events are discarded
    pub fn flush_notes(&mut self, offset: u32, out: &mut MidiBuffer) {
        self.pending.clear();
        for note in 0..128u8 {
            if self.sounding[note as usize] {
                self.sounding[note as usize] = false;
                out.push(MidiEvent::note_off(offset, self.output_channel, note));
            }
        }
    }

    /// Return to the song start after the transport stops
    pub fn reset(&mut self, offset: u32, out: &mut MidiBuffer) {
        self.flush_notes(offset, out);
        self.cycle_origin = 0.0;
        self.playback_position = 0.0;
        self.fill_active = false;
        self.fill_requested = false;
    }

    /// Generate events for `[seg_start, seg_end)`, a piece of `span` that
    /// never crosses a bar boundary.
    ///
    /// With `looping` off the player deactivates once its pattern has
    /// played through one cycle.
    pub fn render(
        &mut self,
        span: &Span,
        seg_start: f64,
        seg_end: f64,
        looping: bool,
        humanizer: &mut Humanizer,
        out: &mut MidiBuffer,
    ) {
        self.drain_pending(span, seg_end, out);
        if !self.enabled || !self.active || seg_end <= seg_start {
            return;
        }

        let shaping = NoteShaping {
            channel: self.output_channel,
            swing: self.swing,
            energy: self.energy,
            humanization: self.humanization_amount,
            subdivision: self.subdivision,
            velocity_curve: self.velocity_curve,
            muted: self.muted,
        };

        let (pattern, origin, is_fill) = match (self.fill_active, self.bank.fill(self.selected_pattern)) {
            (true, Some(fill)) => (fill, self.fill_origin, true),
            _ => match self.bank.main(self.selected_pattern) {
                Some(main) => (main, self.cycle_origin, false),
                None => return,
            },
        };
        let length = pattern.length_beats;

        let mut from = seg_start;
        while from < seg_end {
            let cycle = ((from - origin + 1e-9) / length).floor().max(0.0);
            if !looping && !is_fill && cycle >= 1.0 {
                self.active = false;
                break;
            }
            let cycle_start = origin + cycle * length;
            let to = (cycle_start + length).min(seg_end);
            if to <= from {
                break;
            }
            for event in pattern.events_in(from - cycle_start, to - cycle_start) {
                emit(
                    &shaping,
                    &mut self.sounding,
                    &mut self.note_shift,
                    &mut self.pending,
                    humanizer,
                    span,
                    seg_start,
                    seg_end,
                    cycle_start,
                    event.beat,
                    event.message,
                    out,
                );
            }
            from = to;
        }

        if !is_fill {
            let rel = (seg_end - self.cycle_origin).max(0.0);
            self.playback_position = rel % length;
        }
    }

    fn drain_pending(&mut self, span: &Span, seg_end: f64, out: &mut MidiBuffer) {
        if self.pending.is_empty() {
            return;
        }
        let sounding = &mut self.sounding;
        self.pending.retain(|event| {
            if event.beat >= seg_end {
                return true;
            }
            let offset = span.offset_of(event.beat);
            match event.message {
                MidiMessage::NoteOn { note, .. } => {
                    if out.push(MidiEvent::new(offset, event.channel, event.message)) {
                        sounding[note as usize & 0x7F] = true;
                    }
                }
                MidiMessage::NoteOff { note, .. } => {
                    if sounding[note as usize & 0x7F] {
                        sounding[note as usize & 0x7F] = false;
                        out.push(MidiEvent::new(offset, event.channel, event.message));
                    }
                }
                _ => {
                    out.push(MidiEvent::new(offset, event.channel, event.message));
                }
            }
            false
        });
    }
}

/// Shape one pattern event and either emit it or hold it for a later block
#[allow(clippy::too_many_arguments)]
fn emit(
    shaping: &NoteShaping,
    sounding: &mut [bool; 128],
    note_shift: &mut [f64; 128],
    pending: &mut Vec<PendingEvent>,
    humanizer: &mut Humanizer,
    span: &Span,
    seg_start: f64,
    seg_end: f64,
    cycle_start: f64,
    pattern_beat: f64,
    message: MidiMessage,
    out: &mut MidiBuffer,
) {
    let swing = swing_delay(pattern_beat, shaping.swing, shaping.subdivision);
    let beat = cycle_start + pattern_beat;

    let (when, message) = match message {
        MidiMessage::NoteOn { note, velocity } => {
            if shaping.muted {
                return;
            }
            let scaled = velocity as f32 * (0.5 + shaping.energy.clamp(0.0, 1.0));
            let (timing, velocity_offset) = humanizer.jitter(shaping.humanization, shaping.subdivision.beats());
            let velocity = (scaled.round() as i32 + velocity_offset).clamp(MIN_VELOCITY as i32, MAX_VELOCITY as i32);
            let velocity = apply_velocity_curve(velocity as u8, shaping.velocity_curve);
            let when = (beat + swing + timing).max(seg_start);
            note_shift[note as usize & 0x7F] = when - beat;
            (when, MidiMessage::NoteOn { note, velocity })
        }
        // same shift as the note-on so the pair keeps its length and order
        MidiMessage::NoteOff { note, .. } => ((beat + note_shift[note as usize & 0x7F]).max(seg_start), message),
        _ => (beat, message),
    };

    if when >= seg_end {
        hold(pending, when, shaping.channel, message);
        return;
    }

    let offset = span.offset_of(when);
    match message {
        MidiMessage::NoteOn { note, .. } => {
            if out.push(MidiEvent::new(offset, shaping.channel, message)) {
                sounding[note as usize & 0x7F] = true;
            }
        }
        MidiMessage::NoteOff { note, .. } => {
            let idx = note as usize & 0x7F;
            if sounding[idx] {
                sounding[idx] = false;
                out.push(MidiEvent::new(offset, shaping.channel, message));
            } else if let Some(on_beat) = pending_note_on(pending, note) {
                // the matching note-on was humanized past this block; keep the pair ordered
                hold(pending, on_beat.max(when), shaping.channel, message);
            }
        }
        _ => {
            out.push(MidiEvent::new(offset, shaping.channel, message));
        }
    }
}

fn hold(pending: &mut Vec<PendingEvent>, beat: f64, channel: u8, message: MidiMessage) {
    if pending.len() >= PENDING_EVENT_CAPACITY {
        return;
    }
    let idx = pending.partition_point(|e| e.beat <= beat);
    pending.insert(idx, PendingEvent { beat, channel, message });
}

fn pending_note_on(pending: &[PendingEvent], note: u8) -> Option<f64> {
    pending
        .iter()
        .rev()
        .find(|e| matches!(e.message, MidiMessage::NoteOn { note: n, .. } if n == note))
        .map(|e| e.beat)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn four_on_the_floor() -> Pattern {
        let mut pattern = Pattern::new("kick", 4.0);
        for beat in 0..4 {
            pattern.add_note(beat as f64, 36, 100, 0.25);
        }
        pattern
    }

    fn sixteenth_hats() -> Pattern {
        let mut pattern = Pattern::new("hats", 1.0);
        for step in 0..4 {
            pattern.add_note(step as f64 * 0.25, 42, 100, 0.1);
        }
        pattern
    }

    fn player_with(pattern: Pattern) -> PlayerState {
        let mut player = PlayerState::new(9);
        player.set_slot(0, PatternSlot::with_pattern(pattern));
        player
    }

    /// Render `beats` beats in 100-frame spans of 0.1 beat each
    fn run(player: &mut PlayerState, humanizer: &mut Humanizer, beats: usize) -> Vec<(f64, MidiMessage)> {
        let mut collected = Vec::new();
        let mut out = MidiBuffer::default();
        for i in 0..beats * 10 {
            let span = Span { start: i as f64 * 0.1, end: (i + 1) as f64 * 0.1, frames: 100 };
            out.clear();
            player.render(&span, span.start, span.end, true, humanizer, &mut out);
            for event in out.iter() {
                collected.push((span.beat_at(event.sample_offset), event.message));
            }
        }
        collected
    }

    fn note_ons(events: &[(f64, MidiMessage)]) -> Vec<(f64, u8)> {
        events
            .iter()
            .filter_map(|(beat, m)| match m {
                MidiMessage::NoteOn { velocity, .. } => Some((*beat, *velocity)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_plays_pattern_at_sample_offsets() {
        let mut player = player_with(four_on_the_floor());
        let span = Span { start: 0.0, end: 2.0, frames: 48000 };
        let mut out = MidiBuffer::default();
        player.render(&span, 0.0, 2.0, true, &mut Humanizer::with_seed(1), &mut out);

        let offsets: Vec<(u32, bool)> = out.iter().map(|e| (e.sample_offset, e.message.is_note_on())).collect();
        assert_eq!(offsets, vec![(0, true), (6000, false), (24000, true), (30000, false)]);
        assert!(out.iter().all(|e| e.channel == 9));
    }

    #[test]
    fn test_pattern_loops() {
        let mut player = player_with(sixteenth_hats());
        let events = run(&mut player, &mut Humanizer::with_seed(1), 4);
        assert_eq!(note_ons(&events).len(), 16);
        assert!((player.playback_position - 0.0).abs() < 1e-6 || (player.playback_position - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_swing_delays_odd_sixteenths() {
        let mut player = player_with(sixteenth_hats());
        player.swing = 1.0;
        let ons = note_ons(&run(&mut player, &mut Humanizer::with_seed(1), 1));
        let beats: Vec<f64> = ons.iter().map(|(b, _)| *b).collect();
        let expected = [0.0, 0.25 + 0.125, 0.5, 0.75 + 0.125];
        for (got, want) in beats.iter().zip(expected) {
            assert!((got - want).abs() < 0.002, "{got} vs {want}");
        }
    }

    #[test]
    fn test_swung_note_off_follows_its_note_on() {
        // on lands on an odd sixteenth, off on an even one
        let mut pattern = Pattern::new("ghost", 4.0);
        pattern.add_note(0.45, 38, 100, 0.1);
        let mut player = player_with(pattern);
        player.swing = 1.0;

        let span = Span { start: 0.0, end: 1.0, frames: 1000 };
        let mut out = MidiBuffer::default();
        player.render(&span, 0.0, 1.0, true, &mut Humanizer::with_seed(1), &mut out);

        let events: Vec<(u32, bool)> = out.iter().map(|e| (e.sample_offset, e.message.is_note_on())).collect();
        assert_eq!(events, vec![(575, true), (675, false)]);
        assert!(!player.is_sounding(38));
    }

    #[test]
    fn test_humanized_pairs_stay_ordered() {
        let mut pattern = Pattern::new("tight", 1.0);
        for step in 0..8u8 {
            pattern.add_note(step as f64 * 0.125, 40 + step, 100, 0.01);
        }
        let mut player = player_with(pattern);
        player.swing = 1.0;
        player.humanization_amount = 1.0;
        let events = run(&mut player, &mut Humanizer::with_seed(7), 8);

        let mut open = [false; 128];
        for (_, message) in &events {
            match *message {
                MidiMessage::NoteOn { note, .. } => {
                    assert!(!open[note as usize], "note {note} retriggered while sounding");
                    open[note as usize] = true;
                }
                MidiMessage::NoteOff { note, .. } => {
                    assert!(open[note as usize], "note {note} released before its note-on");
                    open[note as usize] = false;
                }
                _ => {}
            }
        }
        // the last swung step may spill past the final block
        assert!(note_ons(&events).len() >= 63);
    }

    #[test]
    fn test_energy_scales_velocity() {
        let mut player = player_with(four_on_the_floor());
        player.energy = 0.5;
        let unity = note_ons(&run(&mut player, &mut Humanizer::with_seed(1), 1));
        assert_eq!(unity[0].1, 100);

        let mut player = player_with(four_on_the_floor());
        player.energy = 1.0;
        let loud = note_ons(&run(&mut player, &mut Humanizer::with_seed(1), 1));
        assert_eq!(loud[0].1, 127);

        let mut player = player_with(four_on_the_floor());
        player.energy = 0.0;
        let soft = note_ons(&run(&mut player, &mut Humanizer::with_seed(1), 1));
        assert_eq!(soft[0].1, 50);
    }

    #[test]
    fn test_humanized_velocity_stays_in_range() {
        let mut pattern = Pattern::new("edge", 1.0);
        pattern.add_note(0.0, 36, 127, 0.1);
        pattern.add_note(0.5, 38, 1, 0.1);
        let mut player = player_with(pattern);
        player.humanization_amount = 1.0;
        player.energy = 1.0;
        let ons = note_ons(&run(&mut player, &mut Humanizer::with_seed(99), 32));
        assert_eq!(ons.len(), 64);
        assert!(ons.iter().all(|(_, v)| (1..=127).contains(v)));
    }

    #[test]
    fn test_late_events_carry_into_next_block() {
        let mut pattern = Pattern::new("late", 1.0);
        pattern.add_note(0.25, 42, 100, 0.5);
        let mut player = player_with(pattern);
        player.swing = 1.0;

        // swung note lands at 0.375, after this block ends
        let mut out = MidiBuffer::default();
        let mut humanizer = Humanizer::with_seed(3);
        let first = Span { start: 0.0, end: 0.3, frames: 300 };
        player.render(&first, 0.0, 0.3, true, &mut humanizer, &mut out);
        assert!(out.is_empty());
        assert_eq!(player.pending_len(), 1);

        out.clear();
        let second = Span { start: 0.3, end: 0.6, frames: 300 };
        player.render(&second, 0.3, 0.6, true, &mut humanizer, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out.events()[0].sample_offset, 75);
        assert!(player.is_sounding(42));
    }

    #[test]
    fn test_muted_player_sends_no_note_ons() {
        let mut player = player_with(four_on_the_floor());
        player.muted = true;
        let events = run(&mut player, &mut Humanizer::with_seed(1), 4);
        assert!(events.iter().all(|(_, m)| !m.is_note_on()));
    }

    #[test]
    fn test_switch_to_empty_slot_is_rejected() {
        let mut player = player_with(four_on_the_floor());
        let mut out = MidiBuffer::default();
        assert!(!player.switch_pattern(5, 4.0, 0, &mut out));
        assert_eq!(player.selected_pattern, 0);
        assert!(!player.switch_pattern(PATTERN_SLOTS, 4.0, 0, &mut out));
    }

    #[test]
    fn test_switch_flushes_sounding_notes() {
        let mut player = player_with(four_on_the_floor());
        player.set_slot(1, PatternSlot::with_pattern(sixteenth_hats()));
        let span = Span { start: 0.0, end: 0.1, frames: 100 };
        let mut out = MidiBuffer::default();
        player.render(&span, 0.0, 0.1, true, &mut Humanizer::with_seed(1), &mut out);
        assert!(player.is_sounding(36));

        out.clear();
        assert!(player.switch_pattern(1, 0.1, 0, &mut out));
        assert_eq!(out.events()[0].message, MidiMessage::NoteOff { note: 36, velocity: 0 });
        assert!(!player.is_sounding(36));
    }

    #[test]
    fn test_fill_replaces_one_bar() {
        let mut fill = Pattern::new("fill", 4.0);
        fill.add_note(0.0, 38, 100, 0.1);
        let mut player = PlayerState::new(0);
        player.set_slot(
            0,
            PatternSlot {
                main: Some(four_on_the_floor()),
                fill: Some(fill),
                file_name: None,
            },
        );
        player.trigger_fill();

        let mut out = MidiBuffer::default();
        let mut humanizer = Humanizer::with_seed(1);
        let mut notes = Vec::new();
        for bar in 0..3u32 {
            let start = bar as f64 * 4.0;
            let span = Span { start, end: start + 4.0, frames: 4000 };
            out.clear();
            player.on_bar_boundary(start, 4, 0, &mut out);
            player.render(&span, start, start + 4.0, true, &mut humanizer, &mut out);
            let ons: Vec<u8> = out
                .iter()
                .filter_map(|e| match e.message {
                    MidiMessage::NoteOn { note, .. } => Some(note),
                    _ => None,
                })
                .collect();
            notes.push(ons);
        }
        assert_eq!(notes[0], vec![38]);
        assert_eq!(notes[1], vec![36, 36, 36, 36]);
        assert!(!player.fill_active);
    }

    #[test]
    fn test_one_shot_deactivates_after_cycle() {
        let mut player = player_with(sixteenth_hats());
        let span = Span { start: 0.0, end: 3.0, frames: 3000 };
        let mut out = MidiBuffer::default();
        player.render(&span, 0.0, 3.0, false, &mut Humanizer::with_seed(1), &mut out);
        assert_eq!(out.iter().filter(|e| e.message.is_note_on()).count(), 4);
        assert!(!player.active);
    }
}
