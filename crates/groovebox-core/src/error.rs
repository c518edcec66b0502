//! Error types for groovebox-core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GrooveError {
    #[error("MIDI file error: {0}")]
    MidiFile(String),
    #[error("Unsupported MIDI timing: {0}")]
    UnsupportedTiming(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unknown parameter id: {0}")]
    UnknownParameter(String),
}

pub type Result<T> = std::result::Result<T, GrooveError>;
