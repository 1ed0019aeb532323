//! Note generators: strategies turning clock position into note events
//!
//! The scheduler calls `produce_next_events()` exactly once per tick and then
//! `part_ends()`. Generators that keep a clock advance it once per
//! `produce_next_events()` call and never anywhere else.

use serde::{Deserialize, Serialize};

use crate::clock::{ClockConfig, MusicalClock};
use crate::error::{Result, TactusError};
use crate::note::NoteEvent;
use crate::scale::Scale;

/// Trait for note generation strategies
pub trait NoteGenerator: Send {
    /// Advance one tick and return the notes to start on it
    fn produce_next_events(&mut self) -> Vec<NoteEvent>;

    /// Whether the owning part may hand over to the next one on this tick.
    /// Only meaningful right after `produce_next_events()`, and only ever true on a beat.
    fn part_ends(&self) -> bool;

    /// The generator's clock, for generators that keep one
    fn clock(&self) -> Option<&MusicalClock> {
        None
    }
}

// ============================================================================
// Random notes
// ============================================================================

/// One random note per tick, pitch uniform in 60..=72; never ends its part
pub struct RandomNotes {
    synth_id: String,
    amplitude: f32,
    duration_subdivisions: u32,
    rng: fastrand::Rng,
}

impl RandomNotes {
    pub const LOWEST_PITCH: u8 = 60;
    pub const HIGHEST_PITCH: u8 = 72;

    pub fn new(synth_id: impl Into<String>) -> Self {
        Self {
            synth_id: synth_id.into(),
            amplitude: 0.5,
            duration_subdivisions: 4,
            rng: fastrand::Rng::new(),
        }
    }

    pub fn with_duration(mut self, duration_subdivisions: u32) -> Self {
        self.duration_subdivisions = duration_subdivisions;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = fastrand::Rng::with_seed(seed);
        self
    }
}

impl NoteGenerator for RandomNotes {
    fn produce_next_events(&mut self) -> Vec<NoteEvent> {
        let pitch = self.rng.u8(Self::LOWEST_PITCH..=Self::HIGHEST_PITCH);
        vec![NoteEvent::new(
            self.synth_id.clone(),
            pitch,
            self.amplitude,
            self.duration_subdivisions,
        )]
    }

    fn part_ends(&self) -> bool {
        false
    }
}

// ============================================================================
// Pattern over a scale
// ============================================================================

/// Pitch of a pattern cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternPitch {
    Fixed(u8),
    /// Sampled from the generator's scale each time the cell plays
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternCell {
    pub pitch: PatternPitch,
    pub amplitude: f32,
}

impl PatternCell {
    pub fn fixed(pitch: u8, amplitude: f32) -> Self {
        Self { pitch: PatternPitch::Fixed(pitch), amplitude }
    }

    pub fn random(amplitude: f32) -> Self {
        Self { pitch: PatternPitch::Random, amplitude }
    }
}

/// Plays `pattern[bar][beat]` on every beat; offers a transition at the start of each repeat
pub struct PatternScale {
    synth_id: String,
    scale: Scale,
    pattern: Vec<Vec<PatternCell>>,
    clock: MusicalClock,
    rng: fastrand::Rng,
}

impl PatternScale {
    /// Build a generator whose clock layout is taken from the pattern shape
    pub fn from_pattern(
        synth_id: impl Into<String>,
        scale: Scale,
        pattern: Vec<Vec<PatternCell>>,
        note_value: u32,
        subdivision: u32,
    ) -> Result<Self> {
        let beats_per_bar = pattern.iter().map(|bar| bar.len() as u32).collect();
        Self::new(synth_id, scale, pattern, ClockConfig::new(beats_per_bar, note_value, subdivision))
    }

    pub fn new(
        synth_id: impl Into<String>,
        scale: Scale,
        pattern: Vec<Vec<PatternCell>>,
        clock: ClockConfig,
    ) -> Result<Self> {
        if pattern.len() != clock.beats_per_bar.len() {
            return Err(TactusError::PatternShape(format!(
                "pattern has {} bars, clock has {}",
                pattern.len(),
                clock.beats_per_bar.len()
            )));
        }
        for (i, (bar, &beats)) in pattern.iter().zip(&clock.beats_per_bar).enumerate() {
            if bar.len() != beats as usize {
                return Err(TactusError::PatternShape(format!(
                    "bar {} has {} cells, clock expects {} beats",
                    i + 1,
                    bar.len(),
                    beats
                )));
            }
        }
        for cell in pattern.iter().flatten() {
            if let PatternPitch::Fixed(p) = cell.pitch {
                if p > 127 {
                    return Err(TactusError::PatternShape(format!("pitch {} out of range", p)));
                }
            }
            if !(0.0..=1.0).contains(&cell.amplitude) {
                return Err(TactusError::PatternShape(format!(
                    "amplitude {} outside 0.0..=1.0",
                    cell.amplitude
                )));
            }
        }

        Ok(Self {
            synth_id: synth_id.into(),
            scale,
            pattern,
            clock: MusicalClock::new(clock)?,
            rng: fastrand::Rng::new(),
        })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = fastrand::Rng::with_seed(seed);
        self
    }

    pub fn scale(&self) -> &Scale {
        &self.scale
    }
}

impl NoteGenerator for PatternScale {
    fn produce_next_events(&mut self) -> Vec<NoteEvent> {
        let pos = self.clock.advance();
        if !pos.on_beat {
            return Vec::new();
        }

        let cell = self.pattern[(pos.bar - 1) as usize][(pos.beat - 1) as usize];
        let pitch = match cell.pitch {
            PatternPitch::Fixed(p) => p,
            PatternPitch::Random => self.scale.pick(&mut self.rng),
        };

        vec![NoteEvent::new(
            self.synth_id.clone(),
            pitch,
            cell.amplitude,
            self.clock.config().subdivision,
        )]
    }

    fn part_ends(&self) -> bool {
        // at least one full play-through before handing over
        self.clock.at_cycle_start()
    }

    fn clock(&self) -> Option<&MusicalClock> {
        Some(&self.clock)
    }
}
