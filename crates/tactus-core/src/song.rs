//! Song: tempo, synths, and the part sequencer behind one playback session

use std::time::Duration;

use crate::config::TempoConfig;
use crate::error::{Result, TactusError};
use crate::part::{NextPart, PartSequencer};
use crate::synth::{Synth, SynthRack};

pub struct Song {
    name: String,
    tempo: TempoConfig,
    update_interval: Duration,
    synths: SynthRack,
    sequencer: Box<dyn PartSequencer>,
    part_index: u64,
}

impl Song {
    pub fn new(
        name: impl Into<String>,
        tempo: TempoConfig,
        sequencer: impl PartSequencer + 'static,
    ) -> Result<Self> {
        if !tempo.bpm.is_finite() || tempo.bpm <= 0.0 {
            return Err(TactusError::InvalidTempo(format!("bpm must be positive, got {}", tempo.bpm)));
        }
        if tempo.max_division == 0 {
            return Err(TactusError::InvalidTempo("max division must be positive".into()));
        }

        Ok(Self {
            name: name.into(),
            update_interval: tick_interval(tempo),
            tempo,
            synths: SynthRack::new(),
            sequencer: Box::new(sequencer),
            part_index: 0,
        })
    }

    pub fn with_synth(mut self, synth_id: impl Into<String>, synth: impl Synth + 'static) -> Self {
        self.synths.insert(synth_id, synth);
        self
    }

    pub fn with_synths(mut self, synths: SynthRack) -> Self {
        self.synths = synths;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bpm(&self) -> f64 {
        self.tempo.bpm
    }

    pub fn tempo(&self) -> TempoConfig {
        self.tempo
    }

    /// Seconds per tick: 60 / bpm / (max_division / 4)
    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    pub fn synthesizers(&self) -> &SynthRack {
        &self.synths
    }

    pub fn synthesizers_mut(&mut self) -> &mut SynthRack {
        &mut self.synths
    }

    /// Calls to `next_part` so far, whatever their outcome
    pub fn part_index(&self) -> u64 {
        self.part_index
    }

    pub fn next_part(&mut self, current: Option<&str>) -> Result<NextPart> {
        self.part_index += 1;
        self.sequencer.next_part(current)
    }
}

fn tick_interval(tempo: TempoConfig) -> Duration {
    Duration::from_secs_f64(60.0 / tempo.bpm / (tempo.max_division as f64 / 4.0))
}
