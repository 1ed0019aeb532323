//! Concrete synth collaborators

use crossbeam_channel::{unbounded, Receiver, Sender};
use tactus_core::{Result, Synth, TactusError};
use tracing::debug;

/// Note command for an audio thread
#[derive(Debug, Clone, PartialEq)]
pub enum SynthCommand {
    Start { synth_id: String, pitch: u8, amplitude: f32 },
    Stop { synth_id: String },
}

/// Forwards note commands over a channel to whatever renders audio
pub struct ChannelSynth {
    synth_id: String,
    tx: Sender<SynthCommand>,
}

impl ChannelSynth {
    pub fn new(synth_id: impl Into<String>, tx: Sender<SynthCommand>) -> Self {
        Self { synth_id: synth_id.into(), tx }
    }

    /// Synth plus the receiving end for its commands
    pub fn pair(synth_id: impl Into<String>) -> (Self, Receiver<SynthCommand>) {
        let (tx, rx) = unbounded();
        (Self::new(synth_id, tx), rx)
    }

    fn send(&self, action: &'static str, cmd: SynthCommand) -> Result<()> {
        self.tx.send(cmd).map_err(|_| TactusError::Synth {
            synth_id: self.synth_id.clone(),
            action,
            reason: "audio thread disconnected".into(),
        })
    }
}

impl Synth for ChannelSynth {
    fn start_note(&mut self, pitch: u8, amplitude: f32) -> Result<()> {
        let cmd = SynthCommand::Start {
            synth_id: self.synth_id.clone(),
            pitch,
            amplitude,
        };
        self.send("start note", cmd)
    }

    fn stop_note(&mut self) -> Result<()> {
        let cmd = SynthCommand::Stop {
            synth_id: self.synth_id.clone(),
        };
        self.send("stop note", cmd)
    }
}

/// Headless synth that only logs; tracks the note it is holding
#[derive(Debug, Default)]
pub struct TracingSynth {
    synth_id: String,
    active: Option<u8>,
}

impl TracingSynth {
    pub fn new(synth_id: impl Into<String>) -> Self {
        Self {
            synth_id: synth_id.into(),
            active: None,
        }
    }

    pub fn active_note(&self) -> Option<u8> {
        self.active
    }
}

impl Synth for TracingSynth {
    fn start_note(&mut self, pitch: u8, amplitude: f32) -> Result<()> {
        if let Some(previous) = self.active.replace(pitch) {
            debug!(synth = %self.synth_id, previous, "Overriding held note");
        }
        debug!(synth = %self.synth_id, pitch, amplitude, "Note on");
        Ok(())
    }

    fn stop_note(&mut self) -> Result<()> {
        let pitch = self.active.take();
        debug!(synth = %self.synth_id, ?pitch, "Note off");
        Ok(())
    }
}
