//! MIDI learn and CC-to-parameter mapping

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GrooveError;
use crate::limits::{MAX_TEMPO, MIN_TEMPO, PAN_MAX, PAN_MIN, PLAYER_COUNT};

/// Automatable engine parameters. Player indices are 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Parameter {
    Tempo,
    MasterVolume,
    Swing(u8),
    Energy(u8),
    Humanize(u8),
    Volume(u8),
    Pan(u8),
    ReverbSend(u8),
    DelaySend(u8),
    Mute(u8),
    Enabled(u8),
}

impl Parameter {
    /// Natural value range of the parameter
    pub fn range(&self) -> (f32, f32) {
        match self {
            Self::Tempo => (MIN_TEMPO as f32, MAX_TEMPO as f32),
            Self::Pan(_) => (PAN_MIN, PAN_MAX),
            _ => (0.0, 1.0),
        }
    }

    pub fn player(&self) -> Option<usize> {
        match *self {
            Self::Tempo | Self::MasterVolume => None,
            Self::Swing(p)
            | Self::Energy(p)
            | Self::Humanize(p)
            | Self::Volume(p)
            | Self::Pan(p)
            | Self::ReverbSend(p)
            | Self::DelaySend(p)
            | Self::Mute(p)
            | Self::Enabled(p) => Some(p as usize),
        }
    }

    /// Toggle parameters switch at the midpoint of the CC range
    pub fn is_toggle(&self) -> bool {
        matches!(self, Self::Mute(_) | Self::Enabled(_))
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tempo => write!(f, "tempo"),
            Self::MasterVolume => write!(f, "master.volume"),
            Self::Swing(p) => write!(f, "player.{p}.swing"),
            Self::Energy(p) => write!(f, "player.{p}.energy"),
            Self::Humanize(p) => write!(f, "player.{p}.humanize"),
            Self::Volume(p) => write!(f, "player.{p}.volume"),
            Self::Pan(p) => write!(f, "player.{p}.pan"),
            Self::ReverbSend(p) => write!(f, "player.{p}.reverb_send"),
            Self::DelaySend(p) => write!(f, "player.{p}.delay_send"),
            Self::Mute(p) => write!(f, "player.{p}.mute"),
            Self::Enabled(p) => write!(f, "player.{p}.enabled"),
        }
    }
}

impl FromStr for Parameter {
    type Err = GrooveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || GrooveError::UnknownParameter(s.to_string());
        match s {
            "tempo" => return Ok(Self::Tempo),
            "master.volume" => return Ok(Self::MasterVolume),
            _ => {}
        }

        let mut parts = s.split('.');
        let (Some("player"), Some(index), Some(name), None) = (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(unknown());
        };
        let p: u8 = index.parse().map_err(|_| unknown())?;
        if p as usize >= PLAYER_COUNT {
            return Err(unknown());
        }
        match name {
            "swing" => Ok(Self::Swing(p)),
            "energy" => Ok(Self::Energy(p)),
            "humanize" => Ok(Self::Humanize(p)),
            "volume" => Ok(Self::Volume(p)),
            "pan" => Ok(Self::Pan(p)),
            "reverb_send" => Ok(Self::ReverbSend(p)),
            "delay_send" => Ok(Self::DelaySend(p)),
            "mute" => Ok(Self::Mute(p)),
            "enabled" => Ok(Self::Enabled(p)),
            _ => Err(unknown()),
        }
    }
}

impl From<Parameter> for String {
    fn from(parameter: Parameter) -> Self {
        parameter.to_string()
    }
}

impl TryFrom<String> for Parameter {
    type Error = GrooveError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A CC bound to a parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiMapping {
    pub cc: u8,
    pub channel: u8,
    pub parameter: Parameter,
    pub min: f32,
    pub max: f32,
    pub enabled: bool,
    pub learning: bool,
    pub send_feedback: bool,
}

impl MidiMapping {
    /// Mapping over the parameter's full range
    pub fn new(channel: u8, cc: u8, parameter: Parameter) -> Self {
        let (min, max) = parameter.range();
        Self {
            cc: cc & 0x7F,
            channel: channel & 0x0F,
            parameter,
            min,
            max,
            enabled: true,
            learning: false,
            send_feedback: false,
        }
    }

    /// Scale a 0-127 CC value into [min, max]
    pub fn scale(&self, value: u8) -> f32 {
        let t = value.min(127) as f32 / 127.0;
        if self.parameter.is_toggle() {
            return if t >= 0.5 { self.max } else { self.min };
        }
        self.min + (self.max - self.min) * t
    }

    /// Reverse of `scale`
    pub fn unscale(&self, value: f32) -> u8 {
        let span = self.max - self.min;
        if span.abs() < f32::EPSILON {
            return 0;
        }
        let t = ((value - self.min) / span).clamp(0.0, 1.0);
        (t * 127.0).round() as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LearnState {
    #[default]
    Idle,
    Learning(Parameter),
}

/// What a CC did to the mapping table
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MappingOutcome {
    Learned { parameter: Parameter, channel: u8, cc: u8 },
    Changed { parameter: Parameter, value: f32 },
}

/// Mapping table with an O(1) (channel, cc) index
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    mappings: Vec<MidiMapping>,
    index: HashMap<(u8, u8), usize>,
    learn: LearnState,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mappings(&self) -> &[MidiMapping] {
        &self.mappings
    }

    pub fn learn_state(&self) -> LearnState {
        self.learn
    }

    pub fn start_learn(&mut self, parameter: Parameter) {
        self.learn = LearnState::Learning(parameter);
    }

    pub fn cancel_learn(&mut self) {
        self.learn = LearnState::Idle;
    }

    /// Insert a mapping. Any mapping for the same parameter or the same
    /// (channel, cc) is replaced.
    pub fn add(&mut self, mapping: MidiMapping) {
        let key = (mapping.channel, mapping.cc);
        self.mappings.retain(|m| m.parameter != mapping.parameter && (m.channel, m.cc) != key);
        self.mappings.push(mapping);
        self.reindex();
    }

    pub fn remove(&mut self, parameter: Parameter) -> Option<MidiMapping> {
        let pos = self.mappings.iter().position(|m| m.parameter == parameter)?;
        let removed = self.mappings.remove(pos);
        self.reindex();
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.mappings.clear();
        self.index.clear();
    }

    pub fn get(&self, parameter: Parameter) -> Option<&MidiMapping> {
        self.mappings.iter().find(|m| m.parameter == parameter)
    }

    pub fn get_mut(&mut self, parameter: Parameter) -> Option<&mut MidiMapping> {
        self.mappings.iter_mut().find(|m| m.parameter == parameter)
    }

    pub fn lookup(&self, channel: u8, cc: u8) -> Option<&MidiMapping> {
        self.index.get(&(channel & 0x0F, cc & 0x7F)).and_then(|&i| self.mappings.get(i))
    }

    /// Route an incoming CC. While learning, the CC is bound to the pending
    /// parameter; otherwise an enabled mapping scales the value.
    pub fn handle_midi_cc(&mut self, channel: u8, cc: u8, value: u8) -> Option<MappingOutcome> {
        if let LearnState::Learning(parameter) = self.learn {
            self.learn = LearnState::Idle;
            self.add(MidiMapping::new(channel, cc, parameter));
            return Some(MappingOutcome::Learned {
                parameter,
                channel: channel & 0x0F,
                cc: cc & 0x7F,
            });
        }
        let mapping = self.lookup(channel, cc)?;
        if !mapping.enabled {
            return None;
        }
        Some(MappingOutcome::Changed {
            parameter: mapping.parameter,
            value: mapping.scale(value),
        })
    }

    /// CC to send back to a controller for a parameter change, as
    /// (channel, cc, value). Only mappings with feedback enabled answer.
    pub fn feedback(&self, parameter: Parameter, value: f32) -> Option<(u8, u8, u8)> {
        let mapping = self.get(parameter)?;
        if !mapping.enabled || !mapping.send_feedback {
            return None;
        }
        Some((mapping.channel, mapping.cc, mapping.unscale(value)))
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (i, m) in self.mappings.iter().enumerate() {
            self.index.insert((m.channel, m.cc), i);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_ids() {
        for parameter in [Parameter::Tempo, Parameter::MasterVolume, Parameter::Swing(3), Parameter::Pan(7)] {
            let id = parameter.to_string();
            assert_eq!(id.parse::<Parameter>().unwrap(), parameter);
        }
        assert_eq!(Parameter::Swing(3).to_string(), "player.3.swing");
        assert!("player.8.swing".parse::<Parameter>().is_err());
        assert!("player.1.wobble".parse::<Parameter>().is_err());
        assert!("player.1.swing.x".parse::<Parameter>().is_err());
    }

    #[test]
    fn test_learn_binds_next_cc() {
        let mut table = MappingTable::new();
        table.start_learn(Parameter::Swing(1));
        let outcome = table.handle_midi_cc(2, 74, 10);
        assert_eq!(
            outcome,
            Some(MappingOutcome::Learned { parameter: Parameter::Swing(1), channel: 2, cc: 74 })
        );
        assert_eq!(table.learn_state(), LearnState::Idle);

        let outcome = table.handle_midi_cc(2, 74, 127);
        assert_eq!(outcome, Some(MappingOutcome::Changed { parameter: Parameter::Swing(1), value: 1.0 }));
        assert_eq!(table.handle_midi_cc(3, 74, 127), None);
    }

    #[test]
    fn test_cancel_learn() {
        let mut table = MappingTable::new();
        table.start_learn(Parameter::Tempo);
        table.cancel_learn();
        assert_eq!(table.handle_midi_cc(0, 1, 64), None);
        assert!(table.mappings().is_empty());
    }

    #[test]
    fn test_mapping_replaces_duplicates() {
        let mut table = MappingTable::new();
        table.add(MidiMapping::new(0, 10, Parameter::Volume(0)));
        table.add(MidiMapping::new(0, 11, Parameter::Volume(0)));
        assert_eq!(table.mappings().len(), 1);
        assert!(table.lookup(0, 10).is_none());

        table.add(MidiMapping::new(0, 11, Parameter::Pan(0)));
        assert_eq!(table.mappings().len(), 1);
        assert_eq!(table.lookup(0, 11).unwrap().parameter, Parameter::Pan(0));

        assert!(table.remove(Parameter::Pan(0)).is_some());
        assert!(table.lookup(0, 11).is_none());
    }

    #[test]
    fn test_scaling_and_disabled() {
        let mut table = MappingTable::new();
        let mut tempo = MidiMapping::new(0, 20, Parameter::Tempo);
        tempo.min = 60.0;
        tempo.max = 180.0;
        table.add(tempo);
        let Some(MappingOutcome::Changed { value, .. }) = table.handle_midi_cc(0, 20, 0) else {
            panic!("expected change");
        };
        assert_eq!(value, 60.0);

        table.get_mut(Parameter::Tempo).unwrap().enabled = false;
        assert_eq!(table.handle_midi_cc(0, 20, 64), None);
    }

    #[test]
    fn test_feedback_only_when_enabled() {
        let mut table = MappingTable::new();
        table.add(MidiMapping::new(1, 30, Parameter::Energy(2)));
        assert_eq!(table.feedback(Parameter::Energy(2), 0.5), None);

        table.get_mut(Parameter::Energy(2)).unwrap().send_feedback = true;
        assert_eq!(table.feedback(Parameter::Energy(2), 0.5), Some((1, 30, 64)));
        assert_eq!(table.feedback(Parameter::Energy(2), 2.0), Some((1, 30, 127)));
        assert_eq!(table.feedback(Parameter::Swing(2), 0.5), None);
    }

    #[test]
    fn test_toggle_threshold() {
        let mapping = MidiMapping::new(0, 1, Parameter::Mute(0));
        assert_eq!(mapping.scale(63), 0.0);
        assert_eq!(mapping.scale(64), 1.0);
    }
}
