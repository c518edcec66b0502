//! Persisted engine settings

use serde::{Deserialize, Serialize};

use crate::limits::{
    DEFAULT_ENERGY, DEFAULT_TEMPO, MAX_TEMPO, MIDI_CHANNELS, MIN_TEMPO, PATTERN_SLOTS, PLAYER_COUNT,
    SWING_MAX, SWING_MIN, VOLUME_MAX, VOLUME_MIN,
};
use crate::velocity::VelocityCurve;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSettings {
    pub swing: f32,
    pub energy: f32,
    pub volume: f32,
    pub humanize: f32,
    pub enabled: bool,
    /// Fill armed for the next bar
    pub fill: bool,
    pub velocity_curve: VelocityCurve,
    pub output_channel: u8,
    pub selected_pattern: usize,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            swing: 0.0,
            energy: DEFAULT_ENERGY,
            volume: 1.0,
            humanize: 0.0,
            enabled: true,
            fill: false,
            velocity_curve: VelocityCurve::Linear,
            output_channel: 9,
            selected_pattern: 0,
        }
    }
}

impl PlayerSettings {
    pub fn sanitized(mut self) -> Self {
        self.swing = clamp_or(self.swing, SWING_MIN, SWING_MAX, 0.0);
        self.energy = clamp_or(self.energy, 0.0, 1.0, DEFAULT_ENERGY);
        self.volume = clamp_or(self.volume, VOLUME_MIN, VOLUME_MAX, 1.0);
        self.humanize = clamp_or(self.humanize, 0.0, 1.0, 0.0);
        self.output_channel = self.output_channel.min(MIDI_CHANNELS - 1);
        self.selected_pattern = self.selected_pattern.min(PATTERN_SLOTS - 1);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub tempo: f64,
    pub loop_enabled: bool,
    pub metronome_enabled: bool,
    pub host_sync: bool,
    pub send_midi_clock: bool,
    pub receive_midi_clock: bool,
    pub players: Vec<PlayerSettings>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tempo: DEFAULT_TEMPO,
            loop_enabled: true,
            metronome_enabled: false,
            host_sync: false,
            send_midi_clock: false,
            receive_midi_clock: false,
            players: vec![PlayerSettings::default(); PLAYER_COUNT],
        }
    }
}

impl EngineSettings {
    /// Clamp every field into range; the player list is padded or cut to
    /// exactly one entry per player
    pub fn sanitized(mut self) -> Self {
        self.tempo = if self.tempo.is_finite() {
            self.tempo.clamp(MIN_TEMPO, MAX_TEMPO)
        } else {
            DEFAULT_TEMPO
        };
        self.players.resize_with(PLAYER_COUNT, PlayerSettings::default);
        self.players = self.players.into_iter().map(PlayerSettings::sanitized).collect();
        self
    }
}

fn clamp_or(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_finite() { value.clamp(min, max) } else { fallback }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitized_clamps_everything() {
        let mut settings = EngineSettings {
            tempo: 999.0,
            players: vec![PlayerSettings {
                swing: 3.0,
                energy: -1.0,
                volume: f32::NAN,
                humanize: 2.0,
                output_channel: 40,
                selected_pattern: 99,
                ..PlayerSettings::default()
            }],
            ..EngineSettings::default()
        }
        .sanitized();

        assert_eq!(settings.tempo, MAX_TEMPO);
        assert_eq!(settings.players.len(), PLAYER_COUNT);
        let p = settings.players.remove(0);
        assert_eq!(p.swing, SWING_MAX);
        assert_eq!(p.energy, 0.0);
        assert_eq!(p.volume, 1.0);
        assert_eq!(p.humanize, 1.0);
        assert_eq!(p.output_channel, 15);
        assert_eq!(p.selected_pattern, PATTERN_SLOTS - 1);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let settings: EngineSettings = toml::from_str("tempo = 90.0\n").unwrap();
        assert_eq!(settings.tempo, 90.0);
        assert!(settings.loop_enabled);
        assert_eq!(settings.players.len(), PLAYER_COUNT);
    }

    #[test]
    fn test_toml_round_trip() {
        let mut settings = EngineSettings::default();
        settings.players[2].velocity_curve = VelocityCurve::Fixed(90);
        settings.players[2].swing = 0.4;
        let text = toml::to_string(&settings).unwrap();
        let decoded: EngineSettings = toml::from_str(&text).unwrap();
        assert_eq!(decoded, settings);
    }
}
