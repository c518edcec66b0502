//! Pattern files and persisted settings

use std::fs;
use std::path::Path;

use groovebox_core::{EngineSettings, GrooveError, Pattern, PatternSlot};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid settings file: {0}")]
    TomlDe(#[from] toml::de::Error),
    #[error("Failed to serialize settings: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error(transparent)]
    Midi(#[from] GrooveError),
}

pub type Result<T> = std::result::Result<T, StorageError>;

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn read_pattern(path: &Path) -> Result<Pattern> {
    let bytes = fs::read(path)?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (pattern, _tempo) = Pattern::from_smf_bytes(&bytes, &name)?;
    Ok(pattern)
}

/// Load a standard MIDI file as the main pattern of a slot
pub fn read_pattern_file(path: &Path) -> Result<PatternSlot> {
    let mut slot = PatternSlot::with_pattern(read_pattern(path)?);
    slot.file_name = Some(file_name(path));
    Ok(slot)
}

/// Load a main pattern together with its one-bar fill
pub fn read_pattern_pair(main: &Path, fill: &Path) -> Result<PatternSlot> {
    let mut slot = read_pattern_file(main)?;
    slot.fill = Some(read_pattern(fill)?);
    Ok(slot)
}

/// Write a pattern as a single-track MIDI file
pub fn write_pattern_file(path: &Path, pattern: &Pattern, tempo: f64, channel: u8) -> Result<()> {
    let bytes = pattern.to_smf_bytes(tempo, channel)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    Ok(())
}

/// Read settings, clamping every value into range
pub fn load_settings(path: &Path) -> Result<EngineSettings> {
    let text = fs::read_to_string(path)?;
    let settings: EngineSettings = toml::from_str(&text)?;
    Ok(settings.sanitized())
}

pub fn save_settings(path: &Path, settings: &EngineSettings) -> Result<()> {
    let text = toml::to_string_pretty(settings)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("groovebox-{name}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_pattern_file_round_trip() {
        let dir = scratch_dir("pattern");
        let path = dir.join("beat.mid");
        let mut pattern = Pattern::new("beat", 4.0);
        pattern.add_note(0.0, 36, 110, 0.5);
        pattern.add_note(2.5, 38, 90, 0.25);
        write_pattern_file(&path, &pattern, 96.0, 9).unwrap();

        let slot = read_pattern_file(&path).unwrap();
        assert_eq!(slot.file_name.as_deref(), Some("beat.mid"));
        let loaded = slot.main.unwrap();
        assert_eq!(loaded.name, "beat");
        assert_eq!(loaded.length_beats, 4.0);
        assert_eq!(loaded.events().len(), 4);
        assert_eq!(loaded.events()[0].beat, 0.0);
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_pattern_pair_loads_fill() {
        let dir = scratch_dir("pair");
        let mut main = Pattern::new("main", 4.0);
        main.add_note(0.0, 36, 100, 0.25);
        let mut fill = Pattern::new("fill", 4.0);
        fill.add_note(3.0, 38, 100, 0.25);
        write_pattern_file(&dir.join("main.mid"), &main, 120.0, 9).unwrap();
        write_pattern_file(&dir.join("fill.mid"), &fill, 120.0, 9).unwrap();

        let slot = read_pattern_pair(&dir.join("main.mid"), &dir.join("fill.mid")).unwrap();
        assert!(slot.main.is_some());
        assert_eq!(slot.fill.unwrap().events()[0].beat, 3.0);
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_corrupt_pattern_file() {
        let dir = scratch_dir("corrupt");
        let path = dir.join("junk.mid");
        fs::write(&path, b"not a midi file").unwrap();
        assert!(matches!(read_pattern_file(&path), Err(StorageError::Midi(_))));
        assert!(matches!(read_pattern_file(&dir.join("missing.mid")), Err(StorageError::Io(_))));
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_settings_round_trip() {
        let dir = scratch_dir("settings");
        let path = dir.join("session.toml");
        let mut settings = EngineSettings::default();
        settings.tempo = 132.0;
        settings.players[5].energy = 0.9;
        save_settings(&path, &settings).unwrap();
        assert_eq!(load_settings(&path).unwrap(), settings);

        fs::write(&path, "tempo = 4000.0\n").unwrap();
        assert_eq!(load_settings(&path).unwrap().tempo, 300.0);
        fs::write(&path, "tempo = [").unwrap();
        assert!(matches!(load_settings(&path), Err(StorageError::TomlDe(_))));
        fs::remove_dir_all(dir).ok();
    }
}
