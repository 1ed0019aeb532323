//! Pitch sets used by scale-aware generators

use serde::{Deserialize, Serialize};

use crate::error::{Result, TactusError};

const MAJOR_STEPS: [u8; 7] = [0, 2, 4, 5, 7, 9, 11];

/// Ordered, non-empty set of allowed MIDI pitches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct Scale {
    pitches: Vec<u8>,
}

impl Scale {
    pub fn new(pitches: Vec<u8>) -> Result<Self> {
        if pitches.is_empty() {
            return Err(TactusError::InvalidScale("scale has no pitches".into()));
        }
        if let Some(p) = pitches.iter().find(|&&p| p > 127) {
            return Err(TactusError::InvalidScale(format!("pitch {} out of range", p)));
        }
        Ok(Self { pitches })
    }

    /// One octave of the major scale starting at `root`
    pub fn major(root: u8) -> Result<Self> {
        let pitches = MAJOR_STEPS
            .iter()
            .map(|&step| root.checked_add(step).filter(|&p| p <= 127))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| TactusError::InvalidScale(format!("major scale on {} exceeds 127", root)))?;
        Ok(Self { pitches })
    }

    pub fn pitches(&self) -> &[u8] {
        &self.pitches
    }

    pub fn contains(&self, pitch: u8) -> bool {
        self.pitches.contains(&pitch)
    }

    /// Uniformly sample one pitch
    pub fn pick(&self, rng: &mut fastrand::Rng) -> u8 {
        self.pitches[rng.usize(..self.pitches.len())]
    }
}

impl TryFrom<Vec<u8>> for Scale {
    type Error = TactusError;

    fn try_from(pitches: Vec<u8>) -> Result<Self> {
        Self::new(pitches)
    }
}

impl From<Scale> for Vec<u8> {
    fn from(scale: Scale) -> Self {
        scale.pitches
    }
}
