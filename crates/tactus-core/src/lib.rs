//! tactus-core: Domain types for the tactus sequencing engine

pub mod clock;
pub mod config;
mod error;
pub mod generator;
mod note;
pub mod part;
mod scale;
mod song;
mod synth;

pub use clock::{ClockConfig, ClockPosition, ClockState, MusicalClock};
pub use config::{RecordingConfig, SessionConfig, TempoConfig};
pub use error::{Result, TactusError};
pub use generator::{NoteGenerator, PatternCell, PatternPitch, PatternScale, RandomNotes};
pub use note::{amplitude_to_velocity, NoteEvent};
pub use part::{NextPart, Part, PartFactory, PartList, PartSequencer, RepeatPart};
pub use scale::Scale;
pub use song::Song;
pub use synth::{Synth, SynthRack};
