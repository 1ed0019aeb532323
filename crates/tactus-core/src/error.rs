//! Error types for tactus

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TactusError {
    #[error("Invalid clock config: {0}")]
    InvalidClock(String),
    #[error("Pattern shape mismatch: {0}")]
    PatternShape(String),
    #[error("Invalid scale: {0}")]
    InvalidScale(String),
    #[error("Invalid tempo: {0}")]
    InvalidTempo(String),
    #[error("Invalid note event: {0}")]
    InvalidNote(String),
    #[error("Unknown synth: {0}")]
    UnknownSynth(String),
    #[error("Synth {synth_id} failed to {action}: {reason}")]
    Synth {
        synth_id: String,
        action: &'static str,
        reason: String,
    },
    #[error("Part {0} offered a transition off the beat")]
    OffBeatTransition(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for TactusError {
    fn from(e: toml::de::Error) -> Self {
        TactusError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TactusError>;
