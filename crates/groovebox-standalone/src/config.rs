use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Frames per device callback; the device default when absent
    #[serde(default)]
    pub block_size: Option<u32>,
    /// Largest block the engine and mixer are prepared for
    #[serde(default = "default_max_block")]
    pub max_block_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self { block_size: None, max_block_size: default_max_block() }
    }
}

fn default_max_block() -> usize {
    1024
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct SessionConfig {
    /// Engine settings restored at startup
    #[serde(default)]
    pub settings_path: Option<PathBuf>,
    /// MIDI files loaded into slot 0 of players 1.. in order
    #[serde(default)]
    pub pattern_files: Vec<PathBuf>,
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("groovebox")
        .join("config.toml")
}

pub fn load_config() -> AppConfig {
    let path = config_path();
    std::fs::read_to_string(&path)
        .ok()
        .and_then(|s| parse(&s))
        .unwrap_or_default()
}

fn parse(text: &str) -> Option<AppConfig> {
    toml::from_str(text)
        .inspect_err(|e| tracing::warn!(error = %e, "Ignoring invalid config"))
        .ok()
}

pub fn save_config(config: &AppConfig) {
    let path = config_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let Ok(s) = toml::to_string_pretty(config) else { return };
    let _ = std::fs::write(&path, s);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = parse("[audio]\nblock_size = 256\n").unwrap();
        assert_eq!(config.audio.block_size, Some(256));
        assert_eq!(config.audio.max_block_size, 1024);
        assert!(config.session.pattern_files.is_empty());
    }

    #[test]
    fn test_session_paths() {
        let config = parse(
            "[session]\nsettings_path = \"/tmp/s.toml\"\npattern_files = [\"a.mid\", \"b.mid\"]\n",
        )
        .unwrap();
        assert_eq!(config.session.settings_path, Some(PathBuf::from("/tmp/s.toml")));
        assert_eq!(config.session.pattern_files.len(), 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(parse("[audio]\nblock_size = \"big\"\n").is_none());
    }
}
