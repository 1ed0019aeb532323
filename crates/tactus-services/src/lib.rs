//! tactus-services: Playback scheduler, MIDI recorder, and synth collaborators

pub mod playback;
pub mod recorder;
pub mod synth;

pub use playback::{
    Playback, PlaybackControl, PlaybackError, PlaybackHandle, PlaybackState, PlaybackSummary,
    PendingNoteOff, TickReport,
};
pub use recorder::{ChannelMap, MessageKind, MidiRecorder, RecordedMessage, RecorderError};
pub use recorder::{MAX_CHANNELS, TICKS_PER_BEAT};
pub use synth::{ChannelSynth, SynthCommand, TracingSynth};
