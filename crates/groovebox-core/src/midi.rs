//! MIDI messages and the per-block event buffer

use serde::{Deserialize, Serialize};

use crate::limits::MIDI_BUFFER_CAPACITY;

mod status {
    pub const NOTE_OFF: u8 = 0x80;
    pub const NOTE_ON: u8 = 0x90;
    pub const CONTROL_CHANGE: u8 = 0xB0;
    pub const TIMING_CLOCK: u8 = 0xF8;
    pub const START: u8 = 0xFA;
    pub const CONTINUE: u8 = 0xFB;
    pub const STOP: u8 = 0xFC;
}

/// CC 123, sent on every channel by `panic`
pub const ALL_NOTES_OFF_CC: u8 = 123;

/// Messages the sequencing core produces or reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MidiMessage {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8, velocity: u8 },
    ControlChange { controller: u8, value: u8 },
    TimingClock,
    Start,
    Continue,
    Stop,
}

impl MidiMessage {
    pub fn is_note_on(&self) -> bool {
        matches!(self, Self::NoteOn { .. })
    }

    pub fn is_realtime(&self) -> bool {
        matches!(self, Self::TimingClock | Self::Start | Self::Continue | Self::Stop)
    }
}

/// Sample-accurate MIDI event within one audio block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiEvent {
    /// Frame offset from the start of the block
    pub sample_offset: u32,
    /// MIDI channel 0-15, ignored for realtime messages
    pub channel: u8,
    pub message: MidiMessage,
}

impl MidiEvent {
    pub fn new(sample_offset: u32, channel: u8, message: MidiMessage) -> Self {
        Self { sample_offset, channel: channel & 0x0F, message }
    }

    pub fn note_on(sample_offset: u32, channel: u8, note: u8, velocity: u8) -> Self {
        Self::new(sample_offset, channel, MidiMessage::NoteOn { note, velocity })
    }

    pub fn note_off(sample_offset: u32, channel: u8, note: u8) -> Self {
        Self::new(sample_offset, channel, MidiMessage::NoteOff { note, velocity: 0 })
    }

    pub fn control_change(sample_offset: u32, channel: u8, controller: u8, value: u8) -> Self {
        Self::new(sample_offset, channel, MidiMessage::ControlChange { controller, value })
    }

    /// Parse raw MIDI bytes; note-on with velocity 0 becomes note-off
    pub fn from_bytes(sample_offset: u32, bytes: &[u8]) -> Option<Self> {
        let &status_byte = bytes.first()?;
        let channel = status_byte & 0x0F;

        let message = match status_byte {
            status::TIMING_CLOCK => MidiMessage::TimingClock,
            status::START => MidiMessage::Start,
            status::CONTINUE => MidiMessage::Continue,
            status::STOP => MidiMessage::Stop,
            _ if bytes.len() < 3 => return None,
            _ => {
                let data1 = bytes[1] & 0x7F;
                let data2 = bytes[2] & 0x7F;
                match status_byte & 0xF0 {
                    status::NOTE_OFF => MidiMessage::NoteOff { note: data1, velocity: data2 },
                    status::NOTE_ON if data2 == 0 => MidiMessage::NoteOff { note: data1, velocity: 0 },
                    status::NOTE_ON => MidiMessage::NoteOn { note: data1, velocity: data2 },
                    status::CONTROL_CHANGE => MidiMessage::ControlChange { controller: data1, value: data2 },
                    _ => return None,
                }
            }
        };

        let channel = if message.is_realtime() { 0 } else { channel };
        Some(Self { sample_offset, channel, message })
    }

    /// Encode to raw bytes, returning the buffer and the number of valid bytes
    pub fn to_bytes(&self) -> ([u8; 3], usize) {
        let ch = self.channel & 0x0F;
        match self.message {
            MidiMessage::NoteOn { note, velocity } => ([status::NOTE_ON | ch, note & 0x7F, velocity & 0x7F], 3),
            MidiMessage::NoteOff { note, velocity } => ([status::NOTE_OFF | ch, note & 0x7F, velocity & 0x7F], 3),
            MidiMessage::ControlChange { controller, value } => {
                ([status::CONTROL_CHANGE | ch, controller & 0x7F, value & 0x7F], 3)
            }
            MidiMessage::TimingClock => ([status::TIMING_CLOCK, 0, 0], 1),
            MidiMessage::Start => ([status::START, 0, 0], 1),
            MidiMessage::Continue => ([status::CONTINUE, 0, 0], 1),
            MidiMessage::Stop => ([status::STOP, 0, 0], 1),
        }
    }
}

/// Fixed-capacity MIDI output buffer kept sorted by sample offset.
///
/// Events with equal offsets keep insertion order. Once full, further events
/// are counted in `dropped` instead of growing the allocation.
#[derive(Debug, Clone)]
pub struct MidiBuffer {
    events: Vec<MidiEvent>,
    capacity: usize,
    dropped: usize,
}

impl Default for MidiBuffer {
    fn default() -> Self {
        Self::with_capacity(MIDI_BUFFER_CAPACITY)
    }
}

impl MidiBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    pub fn push(&mut self, event: MidiEvent) -> bool {
        if self.events.len() >= self.capacity {
            self.dropped += 1;
            return false;
        }
        let idx = self.events.partition_point(|e| e.sample_offset <= event.sample_offset);
        self.events.insert(idx, event);
        true
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.dropped = 0;
    }

    pub fn events(&self) -> &[MidiEvent] {
        &self.events
    }

    pub fn iter(&self) -> impl Iterator<Item = &MidiEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }
}
