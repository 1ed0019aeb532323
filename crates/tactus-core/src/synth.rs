//! Synth collaborator interface
//!
//! Sound generation lives outside this crate. A synth holds at most one active
//! note; starting a new one overrides the previous note.

use crate::error::{Result, TactusError};

/// Trait for sound sources driven by the scheduler
pub trait Synth: Send {
    fn start_note(&mut self, pitch: u8, amplitude: f32) -> Result<()>;
    fn stop_note(&mut self) -> Result<()>;
}

/// Synths keyed by identity, in registration order
#[derive(Default)]
pub struct SynthRack {
    synths: Vec<(String, Box<dyn Synth>)>,
}

impl SynthRack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a synth, replacing any synth with the same identity
    pub fn insert(&mut self, synth_id: impl Into<String>, synth: impl Synth + 'static) {
        let synth_id = synth_id.into();
        let synth: Box<dyn Synth> = Box::new(synth);
        match self.synths.iter_mut().find(|(id, _)| *id == synth_id) {
            Some(slot) => slot.1 = synth,
            None => self.synths.push((synth_id, synth)),
        }
    }

    pub fn with(mut self, synth_id: impl Into<String>, synth: impl Synth + 'static) -> Self {
        self.insert(synth_id, synth);
        self
    }

    pub fn contains(&self, synth_id: &str) -> bool {
        self.synths.iter().any(|(id, _)| id == synth_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.synths.iter().map(|(id, _)| id.as_str())
    }

    pub fn len(&self) -> usize {
        self.synths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.synths.is_empty()
    }

    pub fn get_mut(&mut self, synth_id: &str) -> Result<&mut dyn Synth> {
        self.synths
            .iter_mut()
            .find(|(id, _)| id == synth_id)
            .map(|(_, synth)| synth.as_mut() as &mut dyn Synth)
            .ok_or_else(|| TactusError::UnknownSynth(synth_id.to_string()))
    }

    pub fn start_note(&mut self, synth_id: &str, pitch: u8, amplitude: f32) -> Result<()> {
        self.get_mut(synth_id)?.start_note(pitch, amplitude)
    }

    pub fn stop_note(&mut self, synth_id: &str) -> Result<()> {
        self.get_mut(synth_id)?.stop_note()
    }
}
