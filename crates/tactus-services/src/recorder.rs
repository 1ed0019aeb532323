//! MIDI recorder: timestamps dispatched notes and writes them as a Standard MIDI File
//!
//! One track at 480 ticks per beat, a single tempo event at time 0 fixed from
//! the BPM given at construction, then note-on/note-off messages with one MIDI
//! channel per synth identity.

use std::path::{Path, PathBuf};
use std::time::Instant;

use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use tactus_core::amplitude_to_velocity;
use thiserror::Error;
use tracing::{debug, info};

/// Standard MIDI resolution
pub const TICKS_PER_BEAT: u16 = 480;
/// Distinct synth identities a single recording can hold
pub const MAX_CHANNELS: usize = 16;

const MAX_TEMPO_MICROS: u32 = 0x00FF_FFFF;
const MAX_DELTA: u64 = 0x0FFF_FFFF;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("All 16 MIDI channels are taken, cannot assign synth {0}")]
    ChannelsExhausted(String),
    #[error("Pitch {0} is outside the MIDI range 0-127")]
    InvalidPitch(u8),
    #[error("Invalid tempo: {0} BPM")]
    InvalidTempo(f64),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Synth identity -> MIDI channel, first come first served
#[derive(Debug, Clone, Default)]
pub struct ChannelMap {
    /// Index is the channel number
    synths: Vec<String>,
}

impl ChannelMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, synth_id: &str) -> Option<u8> {
        self.synths.iter().position(|id| id == synth_id).map(|ch| ch as u8)
    }

    /// Look up the synth's channel, assigning the next free one on first sight
    pub fn channel_for(&mut self, synth_id: &str) -> Result<u8, RecorderError> {
        if let Some(channel) = self.get(synth_id) {
            return Ok(channel);
        }
        if self.synths.len() >= MAX_CHANNELS {
            return Err(RecorderError::ChannelsExhausted(synth_id.to_string()));
        }
        self.synths.push(synth_id.to_string());
        Ok((self.synths.len() - 1) as u8)
    }

    pub fn len(&self) -> usize {
        self.synths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.synths.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    NoteOn { pitch: u8, velocity: u8 },
    NoteOff { pitch: u8 },
}

/// A recorded message with its delta to the previous one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedMessage {
    pub delta_ticks: u32,
    pub channel: u8,
    pub kind: MessageKind,
}

pub struct MidiRecorder {
    tempo_micros: u32,
    channels: ChannelMap,
    messages: Vec<RecordedMessage>,
    started_at: Option<Instant>,
    last_tick: u64,
}

impl MidiRecorder {
    pub fn new(bpm: f64) -> Result<Self, RecorderError> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(RecorderError::InvalidTempo(bpm));
        }
        let tempo_micros = (60_000_000.0 / bpm).round().clamp(1.0, MAX_TEMPO_MICROS as f64) as u32;

        Ok(Self {
            tempo_micros,
            channels: ChannelMap::new(),
            messages: Vec::new(),
            started_at: None,
            last_tick: 0,
        })
    }

    /// Microseconds per beat written to the tempo event
    pub fn tempo_micros(&self) -> u32 {
        self.tempo_micros
    }

    pub fn messages(&self) -> &[RecordedMessage] {
        &self.messages
    }

    pub fn channel_map(&self) -> &ChannelMap {
        &self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn record_start(&mut self, synth_id: &str, pitch: u8, amplitude: f32) -> Result<(), RecorderError> {
        self.record_start_at(Instant::now(), synth_id, pitch, amplitude)
    }

    pub fn record_stop(&mut self, synth_id: &str, pitch: u8) -> Result<(), RecorderError> {
        self.record_stop_at(Instant::now(), synth_id, pitch)
    }

    pub fn record_start_at(
        &mut self,
        now: Instant,
        synth_id: &str,
        pitch: u8,
        amplitude: f32,
    ) -> Result<(), RecorderError> {
        let velocity = amplitude_to_velocity(amplitude);
        self.push(now, synth_id, MessageKind::NoteOn { pitch, velocity })
    }

    pub fn record_stop_at(&mut self, now: Instant, synth_id: &str, pitch: u8) -> Result<(), RecorderError> {
        self.push(now, synth_id, MessageKind::NoteOff { pitch })
    }

    fn push(&mut self, now: Instant, synth_id: &str, kind: MessageKind) -> Result<(), RecorderError> {
        let (MessageKind::NoteOn { pitch, .. } | MessageKind::NoteOff { pitch }) = kind;
        if pitch > 127 {
            return Err(RecorderError::InvalidPitch(pitch));
        }
        let channel = self.channels.channel_for(synth_id)?;

        // deltas come from absolute time so rounding never accumulates
        let started_at = *self.started_at.get_or_insert(now);
        let tick = self.seconds_to_ticks(now.saturating_duration_since(started_at).as_secs_f64());
        let delta = tick.saturating_sub(self.last_tick).min(MAX_DELTA) as u32;
        self.last_tick = self.last_tick.max(tick);

        self.messages.push(RecordedMessage {
            delta_ticks: delta,
            channel,
            kind,
        });
        Ok(())
    }

    fn seconds_to_ticks(&self, seconds: f64) -> u64 {
        let beats = seconds * 1_000_000.0 / self.tempo_micros as f64;
        (beats * TICKS_PER_BEAT as f64).round() as u64
    }

    /// Build the single-track MIDI file for everything recorded so far
    pub fn to_smf(&self) -> Smf<'static> {
        let mut track = Vec::with_capacity(self.messages.len() + 2);
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(self.tempo_micros))),
        });

        for msg in &self.messages {
            let message = match msg.kind {
                MessageKind::NoteOn { pitch, velocity } => MidiMessage::NoteOn {
                    key: u7::new(pitch),
                    vel: u7::new(velocity),
                },
                MessageKind::NoteOff { pitch } => MidiMessage::NoteOff {
                    key: u7::new(pitch),
                    vel: u7::new(0),
                },
            };
            track.push(TrackEvent {
                delta: u28::new(msg.delta_ticks),
                kind: TrackEventKind::Midi {
                    channel: u4::new(msg.channel),
                    message,
                },
            });
        }

        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });

        let mut smf = Smf::new(Header::new(
            Format::SingleTrack,
            Timing::Metrical(u15::new(TICKS_PER_BEAT)),
        ));
        smf.tracks.push(track);
        smf
    }

    /// Encode the recording as SMF bytes
    pub fn encode(&self) -> Result<Vec<u8>, RecorderError> {
        let mut bytes = Vec::new();
        self.to_smf().write_std(&mut bytes)?;
        Ok(bytes)
    }

    /// Write `<label>_<YYYYmmdd_HHMMSS>.mid` into `dir` and return its path
    pub fn finalize(&self, label: &str, dir: impl AsRef<Path>) -> Result<PathBuf, RecorderError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("{}_{}.mid", label, timestamp));

        debug!(messages = self.messages.len(), channels = self.channels.len(), "Encoding MIDI recording");
        std::fs::write(&path, self.encode()?)?;
        info!(path = %path.display(), "MIDI recording saved");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn note_events(smf: &Smf) -> Vec<(u32, u8, MidiMessage)> {
        smf.tracks[0]
            .iter()
            .filter_map(|e| match e.kind {
                TrackEventKind::Midi { channel, message } => {
                    Some((e.delta.as_int(), channel.as_int(), message))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_channel_assignment() {
        let mut map = ChannelMap::new();
        assert_eq!(map.channel_for("lead").unwrap(), 0);
        assert_eq!(map.channel_for("bass").unwrap(), 1);
        assert_eq!(map.channel_for("lead").unwrap(), 0);

        for i in 2..16 {
            assert_eq!(map.channel_for(&format!("synth{}", i)).unwrap(), i as u8);
        }
        assert!(matches!(map.channel_for("one_too_many"), Err(RecorderError::ChannelsExhausted(_))));
        assert_eq!(map.channel_for("bass").unwrap(), 1);
        assert_eq!(map.len(), 16);
    }

    #[test]
    fn test_out_of_range_pitch_rejected() {
        let mut recorder = MidiRecorder::new(120.0).unwrap();
        let t0 = Instant::now();

        assert!(matches!(
            recorder.record_start_at(t0, "lead", 200, 0.5),
            Err(RecorderError::InvalidPitch(200))
        ));
        assert!(matches!(
            recorder.record_stop_at(t0, "lead", 128),
            Err(RecorderError::InvalidPitch(128))
        ));
        assert!(recorder.is_empty());
        // a rejected note does not claim a channel
        assert!(recorder.channel_map().is_empty());

        recorder.record_start_at(t0, "lead", 127, 0.5).unwrap();
        let bytes = recorder.encode().unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(note_events(&smf)[0], (0, 0, MidiMessage::NoteOn { key: u7::new(127), vel: u7::new(64) }));
    }

    #[test]
    fn test_tempo_fixed_from_bpm() {
        assert_eq!(MidiRecorder::new(120.0).unwrap().tempo_micros(), 500_000);
        assert_eq!(MidiRecorder::new(250.0).unwrap().tempo_micros(), 240_000);
        assert!(MidiRecorder::new(0.0).is_err());
    }

    #[test]
    fn test_delta_ticks_from_elapsed_time() {
        let mut recorder = MidiRecorder::new(120.0).unwrap();
        let t0 = Instant::now();

        recorder.record_start_at(t0, "lead", 60, 0.5).unwrap();
        recorder.record_stop_at(t0 + Duration::from_millis(500), "lead", 60).unwrap();
        recorder.record_start_at(t0 + Duration::from_millis(500), "bass", 36, 1.0).unwrap();
        recorder.record_stop_at(t0 + Duration::from_millis(750), "bass", 36).unwrap();

        let msgs = recorder.messages();
        assert_eq!(msgs[0], RecordedMessage { delta_ticks: 0, channel: 0, kind: MessageKind::NoteOn { pitch: 60, velocity: 64 } });
        assert_eq!(msgs[1], RecordedMessage { delta_ticks: 480, channel: 0, kind: MessageKind::NoteOff { pitch: 60 } });
        assert_eq!(msgs[2], RecordedMessage { delta_ticks: 0, channel: 1, kind: MessageKind::NoteOn { pitch: 36, velocity: 127 } });
        assert_eq!(msgs[3], RecordedMessage { delta_ticks: 240, channel: 1, kind: MessageKind::NoteOff { pitch: 36 } });
    }

    #[test]
    fn test_no_rounding_drift() {
        let mut recorder = MidiRecorder::new(133.0).unwrap();
        let t0 = Instant::now();
        let step = Duration::from_micros(7_301);

        for i in 0..1000u32 {
            recorder.record_start_at(t0 + step * i, "lead", 60, 0.5).unwrap();
        }

        let total: u64 = recorder.messages().iter().map(|m| m.delta_ticks as u64).sum();
        let expected = recorder.seconds_to_ticks((step * 999).as_secs_f64());
        assert_eq!(total, expected);
    }

    #[test]
    fn test_encoded_file_round_trip() {
        let mut recorder = MidiRecorder::new(120.0).unwrap();
        let t0 = Instant::now();
        recorder.record_start_at(t0, "lead", 60, 0.5).unwrap();
        recorder.record_start_at(t0, "bass", 40, 0.25).unwrap();
        recorder.record_stop_at(t0 + Duration::from_millis(250), "lead", 60).unwrap();
        recorder.record_stop_at(t0 + Duration::from_millis(500), "bass", 40).unwrap();

        let bytes = recorder.encode().unwrap();
        let smf = Smf::parse(&bytes).unwrap();

        assert_eq!(smf.header.format, Format::SingleTrack);
        assert_eq!(smf.header.timing, Timing::Metrical(u15::new(480)));
        assert_eq!(smf.tracks.len(), 1);
        assert_eq!(
            smf.tracks[0][0].kind,
            TrackEventKind::Meta(MetaMessage::Tempo(u24::new(500_000)))
        );
        assert_eq!(
            smf.tracks[0].last().map(|e| e.kind),
            Some(TrackEventKind::Meta(MetaMessage::EndOfTrack))
        );

        let events = note_events(&smf);
        assert_eq!(events.len(), 4);
        assert_eq!(events[0], (0, 0, MidiMessage::NoteOn { key: u7::new(60), vel: u7::new(64) }));
        assert_eq!(events[1], (0, 1, MidiMessage::NoteOn { key: u7::new(40), vel: u7::new(32) }));
        assert_eq!(events[2], (240, 0, MidiMessage::NoteOff { key: u7::new(60), vel: u7::new(0) }));
        assert_eq!(events[3], (240, 1, MidiMessage::NoteOff { key: u7::new(40), vel: u7::new(0) }));
    }

    #[test]
    fn test_finalize_writes_labelled_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = MidiRecorder::new(90.0).unwrap();
        recorder.record_start("lead", 64, 0.8).unwrap();
        recorder.record_stop("lead", 64).unwrap();

        let path = recorder.finalize("demo_song", dir.path().join("out")).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("demo_song_"));
        assert!(name.ends_with(".mid"));
        assert_eq!(name.len(), "demo_song_".len() + 15 + ".mid".len());

        let bytes = std::fs::read(&path).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(note_events(&smf).len(), 2);
    }
}
