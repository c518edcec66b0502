//! Standard MIDI file conversion for patterns

use midly::num::{u4, u7, u15, u24, u28};
use midly::{
    Format, Header, MetaMessage, MidiMessage as SmfMessage, Smf, Timing, TrackEvent, TrackEventKind,
};

use crate::error::{GrooveError, Result};
use crate::limits::DEFAULT_PPQ;
use crate::midi::MidiMessage;
use crate::pattern::Pattern;

/// Files without an end-of-track marker are rounded up to whole 4/4 bars
const IMPORT_BAR_BEATS: f64 = 4.0;
/// Largest delta a variable-length quantity can hold
const MAX_DELTA_TICKS: u64 = (1 << 28) - 1;

fn delta(ticks: u64) -> u28 {
    u28::from(ticks.min(MAX_DELTA_TICKS) as u32)
}

impl Pattern {
    /// Parse a standard MIDI file into a pattern.
    ///
    /// All tracks are merged and channels are discarded; the player's output
    /// channel applies on playback. Returns the first tempo meta event, if any.
    pub fn from_smf_bytes(bytes: &[u8], name: &str) -> Result<(Pattern, Option<f64>)> {
        let smf = Smf::parse(bytes).map_err(|e| GrooveError::MidiFile(e.to_string()))?;
        let ppq = match smf.header.timing {
            Timing::Metrical(ppq) if ppq.as_int() > 0 => ppq.as_int() as f64,
            Timing::Metrical(_) => {
                return Err(GrooveError::UnsupportedTiming("zero ticks per beat".to_string()));
            }
            Timing::Timecode(fps, sub) => {
                return Err(GrooveError::UnsupportedTiming(format!(
                    "SMPTE timecode {}fps/{}",
                    fps.as_f32(),
                    sub
                )));
            }
        };

        let mut tempo = None;
        let mut events = Vec::new();
        let mut end_tick: Option<u64> = None;
        for track in &smf.tracks {
            let mut tick = 0u64;
            for event in track {
                tick += event.delta.as_int() as u64;
                match event.kind {
                    TrackEventKind::Meta(MetaMessage::Tempo(us)) if tempo.is_none() => {
                        if us.as_int() > 0 {
                            tempo = Some(60_000_000.0 / us.as_int() as f64);
                        }
                    }
                    TrackEventKind::Meta(MetaMessage::EndOfTrack) => {
                        end_tick = Some(end_tick.map_or(tick, |end| end.max(tick)));
                    }
                    TrackEventKind::Midi { message, .. } => {
                        if let Some(message) = from_smf_message(message) {
                            events.push((tick as f64 / ppq, message));
                        }
                    }
                    _ => {}
                }
            }
        }
        // stable, so simultaneous events keep file order
        events.sort_by(|a, b| a.0.total_cmp(&b.0));

        let last_beat = events.last().map_or(0.0, |e| e.0);
        let length = match end_tick.map(|tick| tick as f64 / ppq) {
            Some(end) if end > 0.0 && end >= last_beat => end,
            _ => (last_beat / IMPORT_BAR_BEATS - 1e-9).ceil().max(1.0) * IMPORT_BAR_BEATS,
        };
        let mut pattern = Pattern::new(name, length);
        let end = pattern.length_beats;
        for (beat, message) in events {
            let beat = match message {
                MidiMessage::NoteOff { .. } if beat >= end => end - 1e-6,
                _ => beat,
            };
            pattern.add_event(beat, message);
        }
        Ok((pattern, tempo))
    }

    /// Encode as a format 0 MIDI file at 480 PPQ with a tempo meta event
    pub fn to_smf_bytes(&self, tempo: f64, channel: u8) -> Result<Vec<u8>> {
        let ppq = DEFAULT_PPQ as f64;
        let channel = u4::from(channel & 0x0F);
        let micros_per_quarter = (60_000_000.0 / tempo.max(1.0)).round() as u32;

        let mut track = Vec::with_capacity(self.events().len() + 2);
        track.push(TrackEvent {
            delta: u28::from(0_u32),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::from(micros_per_quarter))),
        });

        let mut previous_tick = 0u64;
        for event in self.events() {
            let Some(message) = to_smf_message(event.message) else {
                continue;
            };
            let tick = (event.beat * ppq).round().max(0.0) as u64;
            track.push(TrackEvent {
                delta: delta(tick.saturating_sub(previous_tick)),
                kind: TrackEventKind::Midi { channel, message },
            });
            previous_tick = tick;
        }

        let end_tick = (self.length_beats * ppq).round() as u64;
        track.push(TrackEvent {
            delta: delta(end_tick.saturating_sub(previous_tick)),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });

        let header = Header {
            format: Format::SingleTrack,
            timing: Timing::Metrical(u15::from(DEFAULT_PPQ)),
        };
        let mut bytes = Vec::new();
        Smf { header, tracks: vec![track] }
            .write_std(&mut bytes)
            .map_err(|e| GrooveError::MidiFile(e.to_string()))?;
        Ok(bytes)
    }
}

fn from_smf_message(message: SmfMessage) -> Option<MidiMessage> {
    match message {
        SmfMessage::NoteOn { key, vel } if vel.as_int() == 0 => Some(MidiMessage::NoteOff {
            note: key.as_int(),
            velocity: 0,
        }),
        SmfMessage::NoteOn { key, vel } => Some(MidiMessage::NoteOn {
            note: key.as_int(),
            velocity: vel.as_int(),
        }),
        SmfMessage::NoteOff { key, vel } => Some(MidiMessage::NoteOff {
            note: key.as_int(),
            velocity: vel.as_int(),
        }),
        SmfMessage::Controller { controller, value } => Some(MidiMessage::ControlChange {
            controller: controller.as_int(),
            value: value.as_int(),
        }),
        _ => None,
    }
}

fn to_smf_message(message: MidiMessage) -> Option<SmfMessage> {
    match message {
        MidiMessage::NoteOn { note, velocity } => Some(SmfMessage::NoteOn {
            key: u7::from(note & 0x7F),
            vel: u7::from(velocity & 0x7F),
        }),
        MidiMessage::NoteOff { note, velocity } => Some(SmfMessage::NoteOff {
            key: u7::from(note & 0x7F),
            vel: u7::from(velocity & 0x7F),
        }),
        MidiMessage::ControlChange { controller, value } => Some(SmfMessage::Controller {
            controller: u7::from(controller & 0x7F),
            value: u7::from(value & 0x7F),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groove() -> Pattern {
        let mut pattern = Pattern::new("groove", 8.0);
        for i in 0..8 {
            pattern.add_note(i as f64, 36, 110, 0.25);
            pattern.add_note(i as f64 + 0.5, 42, 70 + i as u8, 0.125);
        }
        pattern.add_event(3.0, MidiMessage::ControlChange { controller: 7, value: 100 });
        pattern
    }

    #[test]
    fn test_smf_round_trip() {
        let pattern = groove();
        let bytes = pattern.to_smf_bytes(96.0, 9).unwrap();
        let (decoded, tempo) = Pattern::from_smf_bytes(&bytes, "groove").unwrap();

        assert!((tempo.unwrap() - 96.0).abs() < 0.01);
        assert_eq!(decoded.length_beats, 8.0);
        assert_eq!(decoded.events().len(), pattern.events().len());
        for (a, b) in decoded.events().iter().zip(pattern.events()) {
            assert!((a.beat - b.beat).abs() <= 0.5 / DEFAULT_PPQ as f64);
            assert_eq!(a.message, b.message);
        }
    }

    #[test]
    fn test_import_keeps_exported_length() {
        let mut pattern = Pattern::new("short", 3.0);
        pattern.add_note(0.0, 36, 100, 0.5);
        pattern.add_note(2.5, 38, 100, 0.25);
        let bytes = pattern.to_smf_bytes(120.0, 0).unwrap();
        let (decoded, _) = Pattern::from_smf_bytes(&bytes, "short").unwrap();
        assert_eq!(decoded.length_beats, 3.0);

        // trailing silence survives too
        let mut sparse = Pattern::new("sparse", 8.0);
        sparse.add_note(0.0, 36, 100, 0.25);
        let bytes = sparse.to_smf_bytes(120.0, 0).unwrap();
        let (decoded, _) = Pattern::from_smf_bytes(&bytes, "sparse").unwrap();
        assert_eq!(decoded.length_beats, 8.0);
    }

    #[test]
    fn test_import_without_end_marker_rounds_to_bars() {
        let ppq = DEFAULT_PPQ as u32;
        let note = |delta: u32, vel: u8| TrackEvent {
            delta: u28::from(delta),
            kind: TrackEventKind::Midi {
                channel: u4::from(0_u8),
                message: SmfMessage::NoteOn { key: u7::from(38_u8), vel: u7::from(vel) },
            },
        };
        let track = vec![note(0, 100), note(ppq / 4, 0), note(ppq * 9 / 4, 100), note(ppq / 4, 0)];
        let smf = Smf {
            header: Header { format: Format::SingleTrack, timing: Timing::Metrical(u15::from(DEFAULT_PPQ)) },
            tracks: vec![track],
        };
        let mut bytes = Vec::new();
        smf.write_std(&mut bytes).unwrap();

        let (decoded, tempo) = Pattern::from_smf_bytes(&bytes, "bare").unwrap();
        assert_eq!(tempo, None);
        assert_eq!(decoded.length_beats, 4.0);
        assert_eq!(decoded.events().len(), 4);
    }

    #[test]
    fn test_long_gap_saturates_delta() {
        assert_eq!(delta(10).as_int(), 10);
        assert_eq!(delta(u64::MAX).as_int(), MAX_DELTA_TICKS as u32);
    }

    #[test]
    fn test_garbage_is_an_error() {
        let result = Pattern::from_smf_bytes(b"not a midi file", "x");
        assert!(matches!(result, Err(GrooveError::MidiFile(_))));
    }
}
