//! Note events emitted by generators

use serde::{Deserialize, Serialize};

use crate::error::{Result, TactusError};

/// A note to start on one synth, stopped by the scheduler after `duration_subdivisions` ticks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub synth_id: String,
    /// MIDI note number (0-127)
    pub pitch: u8,
    /// 0.0 to 1.0
    pub amplitude: f32,
    pub duration_subdivisions: u32,
}

impl NoteEvent {
    pub fn new(synth_id: impl Into<String>, pitch: u8, amplitude: f32, duration_subdivisions: u32) -> Self {
        Self {
            synth_id: synth_id.into(),
            pitch,
            amplitude,
            duration_subdivisions,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.pitch > 127 {
            return Err(TactusError::InvalidNote(format!("pitch {} out of range", self.pitch)));
        }
        if !(0.0..=1.0).contains(&self.amplitude) {
            return Err(TactusError::InvalidNote(format!(
                "amplitude {} outside 0.0..=1.0",
                self.amplitude
            )));
        }
        if self.duration_subdivisions == 0 {
            return Err(TactusError::InvalidNote(format!(
                "note {} on {} has zero duration",
                self.pitch, self.synth_id
            )));
        }
        Ok(())
    }

    /// MIDI velocity for this note's amplitude
    pub fn velocity(&self) -> u8 {
        amplitude_to_velocity(self.amplitude)
    }
}

pub fn amplitude_to_velocity(amplitude: f32) -> u8 {
    (amplitude.clamp(0.0, 1.0) * 127.0).round() as u8
}
