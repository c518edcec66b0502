//! Drum patterns and the per-player pattern bank

use serde::{Deserialize, Serialize};

use crate::limits::{MIN_PATTERN_BEATS, PATTERN_SLOTS};
use crate::midi::MidiMessage;

/// One timestamped message inside a pattern
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternEvent {
    /// Position in beats from the pattern start
    pub beat: f64,
    pub message: MidiMessage,
}

/// A looping sequence of MIDI events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub name: String,
    /// Loop length in beats
    pub length_beats: f64,
    /// Kept sorted by beat
    events: Vec<PatternEvent>,
}

impl Default for Pattern {
    fn default() -> Self {
        Self::new("Pattern", 4.0)
    }
}

impl Pattern {
    pub fn new(name: &str, length_beats: f64) -> Self {
        Self {
            name: name.to_string(),
            length_beats: sanitize_length(length_beats),
            events: Vec::new(),
        }
    }

    pub fn events(&self) -> &[PatternEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn set_length(&mut self, length_beats: f64) {
        self.length_beats = sanitize_length(length_beats);
    }

    /// Insert an event, keeping beat order. Events outside the loop are ignored.
    pub fn add_event(&mut self, beat: f64, message: MidiMessage) {
        if !beat.is_finite() || beat < 0.0 || beat >= self.length_beats {
            return;
        }
        let idx = self.events.partition_point(|e| e.beat <= beat);
        self.events.insert(idx, PatternEvent { beat, message });
    }

    /// Add a note-on/note-off pair
    pub fn add_note(&mut self, beat: f64, note: u8, velocity: u8, duration_beats: f64) {
        self.add_event(beat, MidiMessage::NoteOn { note, velocity });
        let end = (beat + duration_beats.max(0.0)).min(self.length_beats - 1e-6);
        self.add_event(end, MidiMessage::NoteOff { note, velocity: 0 });
    }

    /// Events in `[from, to)` of pattern time
    pub fn events_in(&self, from: f64, to: f64) -> &[PatternEvent] {
        let start = self.events.partition_point(|e| e.beat < from);
        let end = self.events.partition_point(|e| e.beat < to);
        &self.events[start..end.max(start)]
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

fn sanitize_length(length_beats: f64) -> f64 {
    if length_beats.is_finite() {
        length_beats.max(MIN_PATTERN_BEATS)
    } else {
        4.0
    }
}

/// A single slot in a player's bank
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternSlot {
    pub main: Option<Pattern>,
    /// One-bar variation substituted when a fill is triggered
    pub fill: Option<Pattern>,
    /// Source MIDI file, if the slot was loaded from disk
    pub file_name: Option<String>,
}

impl PatternSlot {
    pub fn with_pattern(pattern: Pattern) -> Self {
        Self {
            main: Some(pattern),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.main.is_none()
    }
}

/// Pattern bank holding 16 patterns per player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternBank {
    pub slots: [PatternSlot; PATTERN_SLOTS],
}

impl Default for PatternBank {
    fn default() -> Self {
        Self {
            slots: std::array::from_fn(|_| PatternSlot::default()),
        }
    }
}

impl PatternBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, index: usize) -> Option<&PatternSlot> {
        self.slots.get(index)
    }

    pub fn main(&self, index: usize) -> Option<&Pattern> {
        self.slots.get(index)?.main.as_ref()
    }

    pub fn fill(&self, index: usize) -> Option<&Pattern> {
        self.slots.get(index)?.fill.as_ref()
    }

    pub fn has_pattern(&self, index: usize) -> bool {
        self.main(index).is_some()
    }

    /// Replace a slot, returning the previous contents
    pub fn replace(&mut self, index: usize, slot: PatternSlot) -> Option<PatternSlot> {
        let target = self.slots.get_mut(index)?;
        Some(std::mem::replace(target, slot))
    }

    /// Copy pattern from one slot to another
    pub fn copy_pattern(&mut self, from: usize, to: usize) {
        if from >= PATTERN_SLOTS || to >= PATTERN_SLOTS || from == to {
            return;
        }
        self.slots[to] = self.slots[from].clone();
    }

    /// Clear a pattern slot
    pub fn clear_pattern(&mut self, index: usize) -> Option<PatternSlot> {
        self.replace(index, PatternSlot::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_stay_sorted() {
        let mut pattern = Pattern::new("beat", 4.0);
        pattern.add_note(2.0, 38, 100, 0.1);
        pattern.add_note(0.0, 36, 100, 0.1);
        pattern.add_event(1.0, MidiMessage::ControlChange { controller: 1, value: 64 });
        pattern.add_event(4.0, MidiMessage::NoteOn { note: 42, velocity: 80 });

        let beats: Vec<f64> = pattern.events().iter().map(|e| e.beat).collect();
        assert_eq!(beats.len(), 5);
        assert!(beats.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_events_in_window() {
        let mut pattern = Pattern::new("hats", 2.0);
        for i in 0..8 {
            pattern.add_event(i as f64 * 0.25, MidiMessage::NoteOn { note: 42, velocity: 90 });
        }
        assert_eq!(pattern.events_in(0.0, 0.5).len(), 2);
        assert_eq!(pattern.events_in(0.5, 0.5).len(), 0);
        assert_eq!(pattern.events_in(1.9, 10.0).len(), 0);
        assert_eq!(pattern.events_in(1.75, 10.0).len(), 1);
    }

    #[test]
    fn test_length_has_a_floor() {
        let pattern = Pattern::new("tiny", 0.0);
        assert_eq!(pattern.length_beats, MIN_PATTERN_BEATS);
        assert_eq!(Pattern::new("nan", f64::NAN).length_beats, 4.0);
    }

    #[test]
    fn test_bank_copy_and_clear() {
        let mut bank = PatternBank::new();
        bank.replace(0, PatternSlot::with_pattern(Pattern::new("a", 4.0)));
        bank.copy_pattern(0, 3);
        assert!(bank.has_pattern(3));
        bank.copy_pattern(0, 99);

        let old = bank.clear_pattern(0).unwrap();
        assert_eq!(old.main.unwrap().name, "a");
        assert!(!bank.has_pattern(0));
        assert!(bank.clear_pattern(PATTERN_SLOTS).is_none());
    }
}
