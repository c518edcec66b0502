//! MIDI beat clock: generation from the transport and tempo recovery

use crate::limits::{CLOCKS_PER_BEAT, MAX_TEMPO, MIN_TEMPO};
use crate::midi::{MidiBuffer, MidiEvent, MidiMessage};
use crate::transport::Span;

/// Intervals averaged by the receiver
const RECEIVER_WINDOW: usize = CLOCKS_PER_BEAT as usize;
/// Intervals needed before a tempo is reported
const RECEIVER_MIN_INTERVALS: usize = 6;

/// Emits 24 clocks per quarter note at exact sample offsets.
///
/// Tick positions come from the absolute transport position, so the number
/// of clocks over any run of blocks depends only on the beats covered.
#[derive(Debug, Clone, Default)]
pub struct MidiClockGenerator {
    sent: u64,
}

impl MidiClockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clocks sent since creation
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Emit every clock whose tick lies in `[span.start, span.end)`
    pub fn render(&mut self, span: &Span, out: &mut MidiBuffer) {
        let ppq = CLOCKS_PER_BEAT as f64;
        let first = (span.start * ppq).ceil().max(0.0) as u64;
        let end = (span.end * ppq).ceil().max(0.0) as u64;
        for tick in first..end {
            let offset = span.offset_of(tick as f64 / ppq);
            out.push(MidiEvent::new(offset, 0, MidiMessage::TimingClock));
            self.sent += 1;
        }
    }

    /// Start from the song beginning, or Continue from elsewhere
    pub fn start(&self, offset: u32, from_beginning: bool, out: &mut MidiBuffer) {
        let message = if from_beginning { MidiMessage::Start } else { MidiMessage::Continue };
        out.push(MidiEvent::new(offset, 0, message));
    }

    pub fn stop(&self, offset: u32, out: &mut MidiBuffer) {
        out.push(MidiEvent::new(offset, 0, MidiMessage::Stop));
    }
}

/// Transport command carried by an incoming realtime message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockCommand {
    Start,
    Continue,
    Stop,
}

/// Recovers tempo from incoming clock ticks.
///
/// Keeps a sliding window of tick intervals. Ticks arriving much too early
/// are ignored as duplicates; a much longer gap restarts the window.
#[derive(Debug, Clone)]
pub struct MidiClockReceiver {
    intervals: [f64; RECEIVER_WINDOW],
    count: usize,
    next: usize,
    last_tick: Option<u64>,
    running: bool,
}

impl Default for MidiClockReceiver {
    fn default() -> Self {
        Self {
            intervals: [0.0; RECEIVER_WINDOW],
            count: 0,
            next: 0,
            last_tick: None,
            running: false,
        }
    }
}

impl MidiClockReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.next = 0;
        self.last_tick = None;
    }

    fn average(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(self.intervals[..self.count].iter().sum::<f64>() / self.count as f64)
    }

    /// Feed one tick at absolute sample time `at`. Returns the estimated
    /// tempo once enough intervals have been seen.
    pub fn on_clock(&mut self, at: u64, sample_rate: f64) -> Option<f64> {
        let Some(last) = self.last_tick else {
            self.last_tick = Some(at);
            return None;
        };
        if at <= last {
            return None;
        }
        let interval = (at - last) as f64;

        if let Some(avg) = self.average() {
            if interval < avg * 0.5 {
                return None;
            }
            if interval > avg * 2.0 {
                self.reset();
                self.last_tick = Some(at);
                return None;
            }
        }

        self.last_tick = Some(at);
        self.intervals[self.next] = interval;
        self.next = (self.next + 1) % RECEIVER_WINDOW;
        self.count = (self.count + 1).min(RECEIVER_WINDOW);
        self.tempo(sample_rate)
    }

    /// Current estimate, if the window holds enough intervals
    pub fn tempo(&self, sample_rate: f64) -> Option<f64> {
        if self.count < RECEIVER_MIN_INTERVALS {
            return None;
        }
        let avg = self.average()?;
        let bpm = 60.0 * sample_rate / (avg * CLOCKS_PER_BEAT as f64);
        bpm.is_finite().then(|| bpm.clamp(MIN_TEMPO, MAX_TEMPO))
    }

    /// Handle an incoming realtime message; returns a transport command for
    /// Start/Continue/Stop
    pub fn on_message(&mut self, message: MidiMessage) -> Option<ClockCommand> {
        match message {
            MidiMessage::Start => {
                self.running = true;
                self.reset();
                Some(ClockCommand::Start)
            }
            MidiMessage::Continue => {
                self.running = true;
                Some(ClockCommand::Continue)
            }
            MidiMessage::Stop => {
                self.running = false;
                Some(ClockCommand::Stop)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportClock;

    fn count_clocks(block_sizes: &[usize], blocks: usize, tempo: f64) -> (u64, f64) {
        let mut transport = TransportClock::new(48000.0);
        transport.set_tempo(tempo);
        transport.start_playback();
        let mut generator = MidiClockGenerator::new();
        let mut out = MidiBuffer::default();
        for i in 0..blocks {
            out.clear();
            if let Some(span) = transport.advance(block_sizes[i % block_sizes.len()]) {
                generator.render(&span, &mut out);
            }
            assert!(out.iter().all(|e| e.message == MidiMessage::TimingClock));
        }
        (generator.sent(), transport.current_beat())
    }

    #[test]
    fn test_24_clocks_per_beat_any_block_size() {
        for sizes in [&[512usize][..], &[64, 1000, 7, 333], &[1], &[4096, 17]] {
            let (sent, beats) = count_clocks(sizes, 3000, 133.0);
            let expected = (beats * 24.0).ceil() as u64;
            assert_eq!(sent, expected, "block sizes {sizes:?}");
        }
    }

    #[test]
    fn test_exact_count_over_whole_beats() {
        // 120 bpm at 48 kHz: 24000 samples per beat, 8 beats in 375 blocks of 512
        let (sent, beats) = count_clocks(&[512], 375, 120.0);
        assert!((beats - 8.0).abs() < 1e-9);
        assert_eq!(sent, 8 * 24);
    }

    #[test]
    fn test_clock_offsets() {
        let span = Span { start: 0.0, end: 1.0, frames: 24000 };
        let mut out = MidiBuffer::default();
        MidiClockGenerator::new().render(&span, &mut out);
        assert_eq!(out.len(), 24);
        assert_eq!(out.events()[0].sample_offset, 0);
        assert_eq!(out.events()[1].sample_offset, 1000);
        assert_eq!(out.events()[23].sample_offset, 23000);
    }

    #[test]
    fn test_receiver_recovers_tempo() {
        let mut receiver = MidiClockReceiver::new();
        // 100 bpm at 48 kHz = 1200 samples per clock
        let mut tempo = None;
        for i in 0..48u64 {
            tempo = receiver.on_clock(i * 1200, 48000.0).or(tempo);
        }
        assert!((tempo.unwrap() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_receiver_rejects_outliers() {
        let mut receiver = MidiClockReceiver::new();
        let mut t = 0u64;
        for _ in 0..30 {
            receiver.on_clock(t, 48000.0);
            t += 1000;
        }
        // a doubled tick just after a real one is ignored
        assert_eq!(receiver.on_clock(t - 1000 + 10, 48000.0), None);
        let bpm = receiver.on_clock(t, 48000.0).unwrap();
        assert!((bpm - 120.0).abs() < 1e-6);

        // a long dropout restarts the window
        assert_eq!(receiver.on_clock(t + 10_000, 48000.0), None);
        assert_eq!(receiver.tempo(48000.0), None);
    }

    #[test]
    fn test_receiver_transport_messages() {
        let mut receiver = MidiClockReceiver::new();
        assert_eq!(receiver.on_message(MidiMessage::Start), Some(ClockCommand::Start));
        assert!(receiver.is_running());
        assert_eq!(receiver.on_message(MidiMessage::Stop), Some(ClockCommand::Stop));
        assert!(!receiver.is_running());
        assert_eq!(receiver.on_message(MidiMessage::TimingClock), None);
    }
}
