//! Live and loop recording of incoming MIDI

use serde::{Deserialize, Serialize};

use crate::limits::{MAX_LOOP_RECORDING_BARS, MAX_RECORDED_EVENTS};
use crate::midi::MidiMessage;
use crate::pattern::Pattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecorderState {
    #[default]
    Idle,
    Recording,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Beats since the recording start
    pub beat: f64,
    pub channel: u8,
    pub message: MidiMessage,
}

/// Accumulated recording, ordered by time
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBuffer {
    events: Vec<RecordedEvent>,
    /// Absolute song beat that recorded times are measured from
    pub start_beat: f64,
    /// Fixed length while loop recording
    pub loop_length: Option<f64>,
    pub beats_per_bar: u32,
    dropped: usize,
}

impl Default for RecordBuffer {
    fn default() -> Self {
        Self {
            events: Vec::with_capacity(MAX_RECORDED_EVENTS),
            start_beat: 0.0,
            loop_length: None,
            beats_per_bar: 4,
            dropped: 0,
        }
    }
}

impl RecordBuffer {
    pub fn events(&self) -> &[RecordedEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events refused because the buffer was full
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.dropped = 0;
    }

    fn insert(&mut self, event: RecordedEvent) -> bool {
        if self.events.len() >= MAX_RECORDED_EVENTS {
            self.dropped += 1;
            return false;
        }
        let idx = self.events.partition_point(|e| e.beat <= event.beat);
        self.events.insert(idx, event);
        true
    }

    /// Convert to a pattern, optionally pulling events toward a grid.
    ///
    /// `quantize` is (grid in beats, strength 0-1). Loop recordings keep the
    /// loop length; free recordings round up to whole bars.
    pub fn to_pattern(&self, name: &str, quantize: Option<(f64, f64)>) -> Pattern {
        let bar = self.beats_per_bar.max(1) as f64;
        let length = match self.loop_length {
            Some(len) => len,
            None => {
                let last = self.events.last().map_or(0.0, |e| e.beat);
                ((last / bar).floor() + 1.0) * bar
            }
        };

        let mut pattern = Pattern::new(name, length);
        for event in &self.events {
            let mut beat = event.beat;
            if let Some((grid, strength)) = quantize {
                if grid > 0.0 && !matches!(event.message, MidiMessage::NoteOff { .. }) {
                    let target = (beat / grid).round() * grid;
                    beat += (target - beat) * strength.clamp(0.0, 1.0);
                }
            }
            let beat = match event.message {
                MidiMessage::NoteOff { .. } if beat >= length => length - 1e-6,
                _ => beat.rem_euclid(length),
            };
            pattern.add_event(beat, event.message);
        }
        pattern
    }
}

/// Recorder state machine: Idle -> Recording -> Idle
#[derive(Debug, Clone, Default)]
pub struct LiveRecorder {
    state: RecorderState,
    overdub: bool,
    loop_mode: bool,
    loop_bars: u32,
    buffer: RecordBuffer,
}

impl LiveRecorder {
    pub fn new() -> Self {
        Self {
            loop_bars: 4,
            ..Self::default()
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecorderState::Recording
    }

    pub fn set_loop_mode(&mut self, enabled: bool) {
        self.loop_mode = enabled;
    }

    pub fn loop_mode(&self) -> bool {
        self.loop_mode
    }

    pub fn set_loop_bars(&mut self, bars: u32) {
        self.loop_bars = bars.clamp(1, MAX_LOOP_RECORDING_BARS);
    }

    pub fn loop_bars(&self) -> u32 {
        self.loop_bars
    }

    /// Begin recording at `current_beat`. Overdub keeps earlier takes and
    /// their time reference; otherwise the buffer starts fresh.
    pub fn start(&mut self, current_beat: f64, beats_per_bar: u32, overdub: bool) {
        self.overdub = overdub;
        if !overdub || self.buffer.is_empty() {
            self.buffer.clear();
            self.buffer.start_beat = current_beat;
        }
        self.buffer.beats_per_bar = beats_per_bar.max(1);
        self.buffer.loop_length = self
            .loop_mode
            .then(|| (self.loop_bars.max(1) * self.buffer.beats_per_bar) as f64);
        self.state = RecorderState::Recording;
    }

    pub fn stop(&mut self) {
        self.state = RecorderState::Idle;
    }

    pub fn is_overdub(&self) -> bool {
        self.overdub
    }

    /// Record one message heard at absolute `beat`. Returns false when not
    /// recording, for realtime messages, or when the buffer is full.
    pub fn record(&mut self, beat: f64, channel: u8, message: MidiMessage) -> bool {
        if !self.is_recording() || message.is_realtime() || !beat.is_finite() {
            return false;
        }
        let mut t = (beat - self.buffer.start_beat).max(0.0);
        if let Some(len) = self.buffer.loop_length {
            t = t.rem_euclid(len);
        }
        self.buffer.insert(RecordedEvent { beat: t, channel, message })
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn buffer(&self) -> &RecordBuffer {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(note: u8) -> MidiMessage {
        MidiMessage::NoteOn { note, velocity: 100 }
    }

    #[test]
    fn test_records_relative_to_start() {
        let mut recorder = LiveRecorder::new();
        assert!(!recorder.record(1.0, 0, hit(36)));

        recorder.start(8.0, 4, false);
        assert!(recorder.record(9.5, 0, hit(36)));
        assert!(recorder.record(8.25, 0, hit(38)));
        assert!(!recorder.record(9.0, 0, MidiMessage::TimingClock));

        let beats: Vec<f64> = recorder.buffer().events().iter().map(|e| e.beat).collect();
        assert_eq!(beats, vec![0.25, 1.5]);
        recorder.stop();
        assert!(!recorder.record(10.0, 0, hit(36)));
    }

    #[test]
    fn test_loop_mode_wraps() {
        let mut recorder = LiveRecorder::new();
        recorder.set_loop_mode(true);
        recorder.set_loop_bars(1);
        recorder.start(0.0, 4, false);
        recorder.record(5.5, 0, hit(36));
        recorder.record(2.0, 0, hit(38));
        let beats: Vec<f64> = recorder.buffer().events().iter().map(|e| e.beat).collect();
        assert_eq!(beats, vec![1.5, 2.0]);
        assert_eq!(recorder.buffer().to_pattern("loop", None).length_beats, 4.0);
    }

    #[test]
    fn test_overdub_merges_in_time_order() {
        let mut recorder = LiveRecorder::new();
        recorder.start(0.0, 4, false);
        recorder.record(1.0, 0, hit(36));
        recorder.record(3.0, 0, hit(36));
        recorder.stop();

        recorder.start(0.0, 4, true);
        recorder.record(2.0, 0, hit(42));
        let notes: Vec<f64> = recorder.buffer().events().iter().map(|e| e.beat).collect();
        assert_eq!(notes, vec![1.0, 2.0, 3.0]);

        recorder.stop();
        recorder.start(16.0, 4, false);
        assert!(recorder.buffer().is_empty());
    }

    #[test]
    fn test_quantize_at_export() {
        let mut recorder = LiveRecorder::new();
        recorder.start(0.0, 4, false);
        recorder.record(0.27, 0, hit(36));
        recorder.record(0.47, 0, MidiMessage::NoteOff { note: 36, velocity: 0 });

        let pattern = recorder.buffer().to_pattern("take", Some((0.25, 1.0)));
        assert!((pattern.events()[0].beat - 0.25).abs() < 1e-9);
        assert_eq!(pattern.events()[1].beat, 0.47);

        let half = recorder.buffer().to_pattern("take", Some((0.25, 0.5)));
        assert!((half.events()[0].beat - 0.26).abs() < 1e-9);
        assert_eq!(pattern.length_beats, 4.0);
    }

    #[test]
    fn test_overflow_is_counted() {
        let mut recorder = LiveRecorder::new();
        recorder.start(0.0, 4, false);
        for i in 0..MAX_RECORDED_EVENTS + 3 {
            recorder.record(i as f64 * 0.001, 0, hit(36));
        }
        assert_eq!(recorder.buffer().len(), MAX_RECORDED_EVENTS);
        assert_eq!(recorder.buffer().dropped(), 3);
    }
}
