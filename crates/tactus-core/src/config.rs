//! Session configuration loaded from TOML

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub tempo: TempoConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoConfig {
    #[serde(default = "default_bpm")]
    pub bpm: f64,
    /// Shortest note value the song plays (16 = sixteenth notes); one tick per division
    #[serde(default = "default_max_division")]
    pub max_division: u32,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            bpm: default_bpm(),
            max_division: default_max_division(),
        }
    }
}

impl TempoConfig {
    pub fn new(bpm: f64, max_division: u32) -> Self {
        Self { bpm, max_division }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Prefix of the written file name
    #[serde(default = "default_label")]
    pub label: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            label: default_label(),
            output_dir: default_output_dir(),
        }
    }
}

impl RecordingConfig {
    pub fn to_dir(label: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            enabled: true,
            label: label.into(),
            output_dir: output_dir.into(),
        }
    }
}

fn default_bpm() -> f64 {
    120.0
}

fn default_max_division() -> u32 {
    16
}

fn default_label() -> String {
    "session".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl SessionConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&s)
    }
}
