//! Transport clock: sample-accurate song position, tempo and host sync

use serde::{Deserialize, Serialize};

use crate::limits::{
    DEFAULT_TEMPO, HOST_CATCH_UP_RATE, HOST_RELOCATE_THRESHOLD, MAX_BEATS_PER_BAR, MAX_TEMPO,
    MIN_BEATS_PER_BAR, MIN_TEMPO,
};

/// Transport playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// The beat interval covered by one processed block.
///
/// `start` is always the previous span's `end`, so consecutive spans tile the
/// timeline without gaps or overlap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Span {
    pub start: f64,
    pub end: f64,
    pub frames: u32,
}

impl Span {
    pub fn len_beats(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, beat: f64) -> bool {
        beat >= self.start && beat < self.end
    }

    /// Frame offset of a beat inside this span, clamped to the block
    pub fn offset_of(&self, beat: f64) -> u32 {
        let len = self.len_beats();
        if self.frames == 0 || len <= 0.0 {
            return 0;
        }
        let offset = ((beat - self.start) / len * self.frames as f64).round();
        (offset.max(0.0) as u32).min(self.frames - 1)
    }

    /// Beat position of a frame offset inside this span
    pub fn beat_at(&self, offset: u32) -> f64 {
        if self.frames == 0 {
            return self.start;
        }
        self.start + self.len_beats() * (offset.min(self.frames) as f64 / self.frames as f64)
    }
}

/// Transport clock.
///
/// Position is derived from an absolute sample count since the last tempo
/// anchor, so long sessions do not accumulate per-block rounding error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportClock {
    pub state: TransportState,
    /// Sample rate for time conversion
    sample_rate: f64,
    /// Tempo in BPM
    tempo: f64,
    /// Quarter-note beats per bar
    beats_per_bar: u32,
    /// Beat position at the last tempo change or relocation
    anchor_beats: f64,
    /// Samples elapsed since the anchor
    samples_since_anchor: u64,
    /// Follow host tempo/position instead of free-running
    host_sync: bool,
    /// Host offset still to be absorbed, in beats
    pending_correction: f64,
}

impl Default for TransportClock {
    fn default() -> Self {
        Self {
            state: TransportState::Stopped,
            sample_rate: 44100.0,
            tempo: DEFAULT_TEMPO,
            beats_per_bar: 4,
            anchor_beats: 0.0,
            samples_since_anchor: 0,
            host_sync: false,
            pending_correction: 0.0,
        }
    }
}

impl TransportClock {
    pub fn new(sample_rate: f64) -> Self {
        let mut transport = Self::default();
        transport.set_sample_rate(sample_rate);
        transport
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return;
        }
        self.reanchor();
        self.sample_rate = sample_rate;
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Set tempo, clamped to the supported range. Non-finite values are ignored.
    pub fn set_tempo(&mut self, bpm: f64) {
        if !bpm.is_finite() {
            return;
        }
        let bpm = bpm.clamp(MIN_TEMPO, MAX_TEMPO);
        if bpm == self.tempo {
            return;
        }
        self.reanchor();
        self.tempo = bpm;
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    pub fn set_beats_per_bar(&mut self, beats: u32) {
        self.beats_per_bar = beats.clamp(MIN_BEATS_PER_BAR, MAX_BEATS_PER_BAR);
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar
    }

    pub fn set_host_sync(&mut self, enabled: bool) {
        self.host_sync = enabled;
        if !enabled {
            self.pending_correction = 0.0;
        }
    }

    pub fn host_sync(&self) -> bool {
        self.host_sync
    }

    pub fn start_playback(&mut self) {
        self.state = TransportState::Playing;
    }

    /// Stop and rewind to the beginning
    pub fn stop_playback(&mut self) {
        self.state = TransportState::Stopped;
        self.locate(0.0);
    }

    pub fn pause(&mut self) {
        if self.state == TransportState::Playing {
            self.state = TransportState::Paused;
        }
    }

    /// Resume from the paused position
    pub fn continue_playback(&mut self) {
        self.state = TransportState::Playing;
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    /// Jump to an absolute beat position
    pub fn locate(&mut self, beats: f64) {
        if !beats.is_finite() {
            return;
        }
        self.anchor_beats = beats.max(0.0);
        self.samples_since_anchor = 0;
        self.pending_correction = 0.0;
    }

    /// Samples per beat at current tempo
    pub fn samples_per_beat(&self) -> f64 {
        self.sample_rate * 60.0 / self.tempo
    }

    /// Absolute song position in beats
    pub fn current_beat(&self) -> f64 {
        self.anchor_beats + self.samples_since_anchor as f64 / self.samples_per_beat()
    }

    /// Position within the current bar, in beats
    pub fn beat_in_bar(&self) -> f64 {
        self.current_beat() % self.beats_per_bar as f64
    }

    /// Current bar number (0-indexed)
    pub fn current_bar(&self) -> u64 {
        (self.current_beat() / self.beats_per_bar as f64).floor() as u64
    }

    /// Beat at which the given bar starts
    pub fn bar_start(&self, bar: u64) -> f64 {
        bar as f64 * self.beats_per_bar as f64
    }

    /// Reconcile with the host transport.
    ///
    /// Small offsets are absorbed over the following blocks; large ones, or a
    /// stopped transport, relocate immediately. Returns false when host sync
    /// is disabled.
    pub fn sync_to_host(&mut self, bpm: f64, position_beats: f64) -> bool {
        if !self.host_sync || !position_beats.is_finite() {
            return false;
        }
        self.set_tempo(bpm);

        let offset = position_beats - self.current_beat();
        if !self.is_playing() || offset.abs() > HOST_RELOCATE_THRESHOLD {
            self.locate(position_beats);
        } else {
            self.pending_correction = offset;
        }
        true
    }

    /// Advance by one block. Returns the covered span while playing.
    pub fn advance(&mut self, frames: usize) -> Option<Span> {
        if !self.is_playing() || frames == 0 {
            return None;
        }
        let start = self.current_beat();
        self.samples_since_anchor += frames as u64;

        if self.pending_correction != 0.0 {
            let natural = self.current_beat() - start;
            let limit = natural * HOST_CATCH_UP_RATE;
            let step = self.pending_correction.clamp(-limit, limit);
            self.pending_correction -= step;
            if self.pending_correction.abs() < 1e-9 {
                self.pending_correction = 0.0;
            }
            self.anchor_beats += step;
        }

        Some(Span {
            start,
            end: self.current_beat().max(start),
            frames: frames as u32,
        })
    }

    fn reanchor(&mut self) {
        self.anchor_beats = self.current_beat();
        self.samples_since_anchor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_blocks(transport: &mut TransportClock, blocks: usize, frames: usize) {
        for _ in 0..blocks {
            transport.advance(frames);
        }
    }

    #[test]
    fn test_tempo_clamped() {
        let mut transport = TransportClock::new(48000.0);
        transport.set_tempo(1000.0);
        assert_eq!(transport.tempo(), MAX_TEMPO);
        transport.set_tempo(-5.0);
        assert_eq!(transport.tempo(), MIN_TEMPO);
        transport.set_tempo(f64::NAN);
        assert_eq!(transport.tempo(), MIN_TEMPO);
    }

    #[test]
    fn test_47_blocks_at_120_bpm() {
        let mut transport = TransportClock::new(48000.0);
        transport.set_tempo(120.0);
        transport.start_playback();
        run_blocks(&mut transport, 47, 512);
        assert!((transport.current_beat() - 1.002_666_6).abs() < 1e-4);
        assert_eq!(transport.current_bar(), 0);
    }

    #[test]
    fn test_long_session_does_not_drift() {
        for tempo in [MIN_TEMPO, 87.5, 120.0, 173.0, MAX_TEMPO] {
            let mut transport = TransportClock::new(44100.0);
            transport.set_tempo(tempo);
            transport.start_playback();
            let blocks = 200_000;
            run_blocks(&mut transport, blocks, 441);
            let seconds = blocks as f64 * 441.0 / 44100.0;
            let expected = seconds * tempo / 60.0;
            assert!((transport.current_beat() - expected).abs() < 1e-6, "tempo {tempo}");
        }
    }

    #[test]
    fn test_spans_tile_the_timeline() {
        let mut transport = TransportClock::new(48000.0);
        transport.start_playback();
        let first = transport.advance(512).unwrap();
        transport.set_tempo(140.0);
        let second = transport.advance(300).unwrap();
        assert_eq!(first.end, second.start);
        assert!(second.end > second.start);
    }

    #[test]
    fn test_stopped_transport_does_not_advance() {
        let mut transport = TransportClock::new(48000.0);
        assert!(transport.advance(512).is_none());
        assert_eq!(transport.current_beat(), 0.0);
    }

    #[test]
    fn test_stop_rewinds_pause_keeps_position() {
        let mut transport = TransportClock::new(48000.0);
        transport.start_playback();
        run_blocks(&mut transport, 100, 480);
        transport.pause();
        let paused_at = transport.current_beat();
        assert!(transport.advance(480).is_none());
        assert_eq!(transport.current_beat(), paused_at);
        transport.stop_playback();
        assert_eq!(transport.current_beat(), 0.0);
    }

    #[test]
    fn test_host_sync_disabled_is_ignored() {
        let mut transport = TransportClock::new(48000.0);
        assert!(!transport.sync_to_host(90.0, 8.0));
        assert_eq!(transport.tempo(), DEFAULT_TEMPO);
        assert_eq!(transport.current_beat(), 0.0);
    }

    #[test]
    fn test_host_sync_relocates_large_offsets() {
        let mut transport = TransportClock::new(48000.0);
        transport.set_host_sync(true);
        transport.start_playback();
        assert!(transport.sync_to_host(100.0, 16.0));
        assert_eq!(transport.tempo(), 100.0);
        assert_eq!(transport.current_beat(), 16.0);
    }

    #[test]
    fn test_host_sync_catches_up_smoothly() {
        let mut transport = TransportClock::new(48000.0);
        transport.set_host_sync(true);
        transport.start_playback();
        run_blocks(&mut transport, 10, 480);
        let target = transport.current_beat() + 0.05;
        transport.sync_to_host(120.0, target);

        // no jump: the next block only moves slightly faster than real time
        let span = transport.advance(480).unwrap();
        let natural = 480.0 / transport.samples_per_beat();
        assert!(span.len_beats() <= natural * (1.0 + HOST_CATCH_UP_RATE) + 1e-12);
        assert!(span.len_beats() > natural);

        run_blocks(&mut transport, 400, 480);
        let expected = target + 401.0 * natural;
        assert!((transport.current_beat() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_span_offsets() {
        let span = Span { start: 1.0, end: 2.0, frames: 1000 };
        assert_eq!(span.offset_of(1.0), 0);
        assert_eq!(span.offset_of(1.5), 500);
        assert_eq!(span.offset_of(0.5), 0);
        assert_eq!(span.offset_of(2.0), 999);
        assert_eq!(span.beat_at(250), 1.25);
    }
}
