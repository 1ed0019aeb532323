//! Playback scheduler: the fixed-tick loop driving generators, synths and the recorder
//!
//! Each tick expires due note-offs, asks the active part's generator for new
//! notes, dispatches them, then lets the song pick the next part if the
//! generator offers to end. `run()` paces ticks to the song's update interval
//! on the calling thread; `spawn()` runs the same loop on a worker thread.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver};
use tactus_core::{NextPart, Part, RecordingConfig, Song, TactusError};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::recorder::{MidiRecorder, RecorderError};

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("Sequencing error: {0}")]
    Core(#[from] TactusError),
    #[error("Recorder error: {0}")]
    Recorder(#[from] RecorderError),
    #[error("Playback already running")]
    AlreadyRunning,
    #[error("Playback not running")]
    NotRunning,
    #[error("Song has no part to start from")]
    NoInitialPart,
    #[error("Playback worker panicked")]
    WorkerPanicked,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Running,
}

/// A note waiting for its stop instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingNoteOff {
    pub synth_id: String,
    pub pitch: u8,
    pub remaining_subdivisions: u32,
}

/// Flags shared between the playback worker and whoever controls it
#[derive(Debug, Default)]
pub struct PlaybackControl {
    running: AtomicBool,
    stop_requested: AtomicBool,
}

impl PlaybackControl {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the loop to stop before its next tick
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    fn clear_stop(&self) {
        self.stop_requested.store(false, Ordering::SeqCst);
    }
}

/// What one tick did
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub notes_started: usize,
    pub notes_stopped: usize,
    /// Name of the part adopted on this tick
    pub switched_to: Option<String>,
    pub replayed: bool,
    /// Set when the song ended on this tick
    pub finished: Option<PlaybackSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackSummary {
    pub ticks: u64,
    pub overruns: u64,
    pub part_transitions: u64,
    /// Calls made to the song's part sequencer
    pub part_index: u64,
    /// Note-offs still pending when playback stopped; their stops were never sent
    pub dropped_note_offs: usize,
    pub recording: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct SessionStats {
    ticks: u64,
    overruns: u64,
    part_transitions: u64,
}

pub struct Playback {
    song: Song,
    recording: Option<RecordingConfig>,
    recorder: Option<MidiRecorder>,
    active: Option<Part>,
    pending: Vec<PendingNoteOff>,
    control: Arc<PlaybackControl>,
    state: PlaybackState,
    stats: SessionStats,
}

impl Playback {
    pub fn new(song: Song) -> Self {
        Self {
            song,
            recording: None,
            recorder: None,
            active: None,
            pending: Vec::new(),
            control: Arc::new(PlaybackControl::default()),
            state: PlaybackState::Stopped,
            stats: SessionStats::default(),
        }
    }

    /// Record every session to a MIDI file when `config.enabled` is set
    pub fn with_recording(mut self, config: RecordingConfig) -> Self {
        self.recording = config.enabled.then_some(config);
        self
    }

    /// Shared control flags, usable from other threads
    pub fn control(&self) -> Arc<PlaybackControl> {
        self.control.clone()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn song(&self) -> &Song {
        &self.song
    }

    pub fn active_part(&self) -> Option<&Part> {
        self.active.as_ref()
    }

    pub fn pending_note_offs(&self) -> &[PendingNoteOff] {
        &self.pending
    }

    pub fn recorder(&self) -> Option<&MidiRecorder> {
        self.recorder.as_ref()
    }

    /// Stopped -> Running: pick the first part and reset session state
    pub fn start(&mut self) -> Result<(), PlaybackError> {
        if self.state == PlaybackState::Running {
            return Err(PlaybackError::AlreadyRunning);
        }

        self.pending.clear();
        self.stats = SessionStats::default();
        self.recorder = None;

        match self.song.next_part(None)? {
            NextPart::Switch(part) => self.active = Some(part),
            // resume the part left over from an earlier session
            NextPart::Replay if self.active.is_some() => {}
            NextPart::Replay => return Err(PlaybackError::NoInitialPart),
            NextPart::End => {
                info!(song = %self.song.name(), "Song has no parts to play");
                return Ok(());
            }
        }

        if self.recording.is_some() {
            self.recorder = Some(MidiRecorder::new(self.song.bpm())?);
        }
        self.state = PlaybackState::Running;
        self.control.set_running(true);
        info!(
            song = %self.song.name(),
            part = %self.active.as_ref().map(Part::name).unwrap_or_default(),
            interval_ms = self.song.update_interval().as_secs_f64() * 1000.0,
            "Starting playback"
        );
        Ok(())
    }

    /// Run one scheduler iteration without pacing
    pub fn tick(&mut self) -> Result<TickReport, PlaybackError> {
        if self.state != PlaybackState::Running {
            return Err(PlaybackError::NotRunning);
        }

        let mut report = TickReport::default();
        let synths = self.song.synthesizers_mut();

        for off in &mut self.pending {
            off.remaining_subdivisions = off.remaining_subdivisions.saturating_sub(1);
        }
        // an entry leaves the queue only once its stop went out
        while let Some(i) = self.pending.iter().position(|off| off.remaining_subdivisions == 0) {
            let off = &self.pending[i];
            synths.stop_note(&off.synth_id)?;
            if let Some(recorder) = self.recorder.as_mut() {
                recorder.record_stop(&off.synth_id, off.pitch)?;
            }
            self.pending.remove(i);
            report.notes_stopped += 1;
        }

        let part = self.active.as_mut().ok_or(PlaybackError::NoInitialPart)?;
        for event in part.generator_mut().produce_next_events() {
            event.validate()?;
            synths.start_note(&event.synth_id, event.pitch, event.amplitude)?;
            if let Some(recorder) = self.recorder.as_mut() {
                recorder.record_start(&event.synth_id, event.pitch, event.amplitude)?;
            }
            debug!(synth = %event.synth_id, pitch = event.pitch, "Note start");
            self.pending.push(PendingNoteOff {
                synth_id: event.synth_id,
                pitch: event.pitch,
                remaining_subdivisions: event.duration_subdivisions,
            });
            report.notes_started += 1;
        }
        self.stats.ticks += 1;

        let generator = part.generator();
        if !generator.part_ends() {
            return Ok(report);
        }
        if generator.clock().is_some_and(|clock| !clock.state().on_beat) {
            return Err(TactusError::OffBeatTransition(part.name().to_string()).into());
        }

        let current = part.name().to_string();
        match self.song.next_part(Some(&current))? {
            NextPart::Switch(next) => {
                info!(from = %current, to = %next.name(), "Transitioning to part");
                report.switched_to = Some(next.name().to_string());
                self.active = Some(next);
                self.stats.part_transitions += 1;
            }
            NextPart::Replay => {
                debug!(part = %current, "Replaying part");
                report.replayed = true;
            }
            NextPart::End => {
                info!(song = %self.song.name(), "Song has ended");
                report.finished = Some(self.stop()?);
            }
        }
        Ok(report)
    }

    /// Running -> Stopped: drop pending note-offs and write the recording
    pub fn stop(&mut self) -> Result<PlaybackSummary, PlaybackError> {
        if self.state != PlaybackState::Running {
            return Err(PlaybackError::NotRunning);
        }
        self.state = PlaybackState::Stopped;
        self.control.set_running(false);
        self.control.clear_stop();

        let dropped = self.drop_pending();
        let recording = match (self.recorder.take(), &self.recording) {
            (Some(recorder), Some(config)) => {
                let label = if config.label.is_empty() { self.song.name() } else { &config.label };
                Some(recorder.finalize(label, &config.output_dir)?)
            }
            _ => None,
        };

        info!(ticks = self.stats.ticks, overruns = self.stats.overruns, "Playback stopped");
        Ok(PlaybackSummary {
            dropped_note_offs: dropped,
            recording,
            ..self.summary()
        })
    }

    /// Synchronous mode: block until the song ends or a stop is requested
    pub fn run(&mut self) -> Result<PlaybackSummary, PlaybackError> {
        if let Err(e) = self.start() {
            self.control.set_running(false);
            return Err(e);
        }
        let interval = self.song.update_interval();

        loop {
            if self.state != PlaybackState::Running {
                self.control.set_running(false);
                return Ok(self.summary());
            }
            if self.control.is_stop_requested() {
                return self.stop();
            }

            let tick_start = Instant::now();
            match self.tick() {
                Ok(TickReport { finished: Some(summary), .. }) => return Ok(summary),
                Ok(_) => self.pace(tick_start, interval),
                Err(e) => {
                    self.abort(&e);
                    return Err(e);
                }
            }
        }
    }

    /// Asynchronous mode: run the loop on a worker thread
    pub fn spawn(self) -> Result<PlaybackHandle, PlaybackError> {
        let control = self.control.clone();
        control.set_running(true);

        let (done_tx, done_rx) = bounded(1);
        let mut playback = self;
        let worker = thread::Builder::new()
            .name("tactus-playback".into())
            .spawn(move || {
                let result = playback.run();
                let _ = done_tx.send(result);
            });

        match worker {
            Ok(worker) => Ok(PlaybackHandle {
                control,
                done_rx,
                worker: Some(worker),
            }),
            Err(e) => {
                control.set_running(false);
                Err(e.into())
            }
        }
    }

    fn pace(&mut self, tick_start: Instant, interval: Duration) {
        let elapsed = tick_start.elapsed();
        if elapsed < interval {
            thread::sleep(interval - elapsed);
        } else {
            self.stats.overruns += 1;
            warn!(
                overrun_ms = (elapsed - interval).as_secs_f64() * 1000.0,
                "Tick took longer than the update interval"
            );
        }
    }

    fn abort(&mut self, err: &PlaybackError) {
        error!(%err, "Playback aborted");
        self.state = PlaybackState::Stopped;
        self.control.set_running(false);
        self.control.clear_stop();
        self.drop_pending();
        self.recorder = None;
    }

    fn drop_pending(&mut self) -> usize {
        let dropped = self.pending.len();
        if dropped > 0 {
            warn!(dropped, "Dropping pending note-offs without sending them");
        }
        self.pending.clear();
        dropped
    }

    fn summary(&self) -> PlaybackSummary {
        PlaybackSummary {
            ticks: self.stats.ticks,
            overruns: self.stats.overruns,
            part_transitions: self.stats.part_transitions,
            part_index: self.song.part_index(),
            ..Default::default()
        }
    }
}

/// Handle to playback running on a worker thread
pub struct PlaybackHandle {
    control: Arc<PlaybackControl>,
    done_rx: Receiver<Result<PlaybackSummary, PlaybackError>>,
    worker: Option<JoinHandle<()>>,
}

impl PlaybackHandle {
    /// Request a stop; takes effect between ticks
    pub fn stop(&self) {
        self.control.request_stop();
    }

    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    pub fn is_done(&self) -> bool {
        !self.done_rx.is_empty()
    }

    /// Block until the worker finishes and return its result
    pub fn wait(mut self) -> Result<PlaybackSummary, PlaybackError> {
        let result = self.done_rx.recv().map_err(|_| PlaybackError::WorkerPanicked);
        if let Some(worker) = self.worker.take() {
            worker.join().map_err(|_| PlaybackError::WorkerPanicked)?;
        }
        result?
    }

    pub fn stop_and_wait(self) -> Result<PlaybackSummary, PlaybackError> {
        self.stop();
        self.wait()
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.control.request_stop();
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::{ChannelSynth, SynthCommand};
    use tactus_core::{
        PartList, PatternCell, PatternScale, RandomNotes, RepeatPart, Scale, Synth, TempoConfig,
    };

    fn one_beat_part(name: &str, synth_id: &str, pitch: u8) -> Part {
        let generator = PatternScale::from_pattern(
            synth_id,
            Scale::major(60).unwrap(),
            vec![vec![PatternCell::fixed(pitch, 1.0)]],
            4,
            4,
        )
        .unwrap();
        Part::new(name, generator)
    }

    #[test]
    fn test_note_offs_expire_after_duration() {
        let (synth, rx) = ChannelSynth::pair("lead");
        let part = Part::new("random", RandomNotes::new("lead").with_duration(2).with_seed(1));
        let song = Song::new("s", TempoConfig::default(), RepeatPart::new(part))
            .unwrap()
            .with_synth("lead", synth);
        let mut playback = Playback::new(song);
        playback.start().unwrap();

        let first = playback.tick().unwrap();
        assert_eq!((first.notes_started, first.notes_stopped), (1, 0));
        assert_eq!(playback.pending_note_offs()[0].remaining_subdivisions, 2);

        let second = playback.tick().unwrap();
        assert_eq!((second.notes_started, second.notes_stopped), (1, 0));

        let third = playback.tick().unwrap();
        assert_eq!((third.notes_started, third.notes_stopped), (1, 1));
        assert_eq!(playback.pending_note_offs().len(), 2);

        let cmds: Vec<_> = rx.try_iter().collect();
        assert!(matches!(cmds[0], SynthCommand::Start { .. }));
        assert!(matches!(cmds[1], SynthCommand::Start { .. }));
        // note-offs go out before the tick's new notes
        assert!(matches!(cmds[2], SynthCommand::Stop { .. }));
        assert!(matches!(cmds[3], SynthCommand::Start { .. }));
    }

    #[test]
    fn test_part_list_switches_then_ends() {
        let (synth, _rx) = ChannelSynth::pair("lead");
        let parts = PartList::new([one_beat_part("a", "lead", 60), one_beat_part("b", "lead", 62)]);
        let song = Song::new("s", TempoConfig::default(), parts).unwrap().with_synth("lead", synth);
        let mut playback = Playback::new(song);
        playback.start().unwrap();
        assert_eq!(playback.active_part().unwrap().name(), "a");

        assert!(playback.tick().unwrap().switched_to.is_none());
        assert_eq!(playback.tick().unwrap().switched_to.as_deref(), Some("b"));
        assert!(playback.tick().unwrap().finished.is_none());

        let last = playback.tick().unwrap();
        let summary = last.finished.unwrap();
        assert_eq!(playback.state(), PlaybackState::Stopped);
        assert_eq!(summary.ticks, 4);
        assert_eq!(summary.part_transitions, 1);
        assert_eq!(summary.part_index, 3);
        // every note lasts four subdivisions, so none had expired yet
        assert_eq!(summary.dropped_note_offs, 4);
        assert!(matches!(playback.tick(), Err(PlaybackError::NotRunning)));
    }

    #[test]
    fn test_replay_keeps_clock_state() {
        let (synth, _rx) = ChannelSynth::pair("lead");
        let song = Song::new("s", TempoConfig::default(), RepeatPart::new(one_beat_part("loop", "lead", 60)))
            .unwrap()
            .with_synth("lead", synth);
        let mut playback = Playback::new(song);
        playback.start().unwrap();

        playback.tick().unwrap();
        let report = playback.tick().unwrap();
        assert!(report.replayed);

        let clock = playback.active_part().unwrap().generator().clock().unwrap();
        let mut expected = tactus_core::MusicalClock::new(clock.config().clone()).unwrap();
        expected.advance();
        expected.advance();
        assert_eq!(clock.state(), expected.state());
        assert_eq!(playback.song().part_index(), 2);
    }

    #[test]
    fn test_unknown_synth_is_fatal() {
        let part = Part::new("random", RandomNotes::new("missing"));
        let song = Song::new("s", TempoConfig::default(), RepeatPart::new(part)).unwrap();
        let mut playback = Playback::new(song);
        playback.start().unwrap();

        let err = playback.tick().unwrap_err();
        assert!(matches!(err, PlaybackError::Core(TactusError::UnknownSynth(_))));
    }

    #[test]
    fn test_start_twice_rejected() {
        let part = Part::new("random", RandomNotes::new("lead"));
        let song = Song::new("s", TempoConfig::default(), RepeatPart::new(part)).unwrap();
        let mut playback = Playback::new(song);
        playback.start().unwrap();
        assert!(matches!(playback.start(), Err(PlaybackError::AlreadyRunning)));
        assert!(playback.control().is_running());
    }

    #[test]
    fn test_empty_song_never_runs() {
        let dir = tempfile::tempdir().unwrap();
        let song = Song::new("s", TempoConfig::default(), PartList::default()).unwrap();
        let mut playback =
            Playback::new(song).with_recording(RecordingConfig::to_dir("empty", dir.path()));

        let summary = playback.run().unwrap();
        assert_eq!(summary.ticks, 0);
        assert_eq!(summary.part_index, 1);
        assert_eq!(summary.recording, None);
        assert_eq!(playback.state(), PlaybackState::Stopped);
        assert!(playback.recorder().is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_recorder_created_once_part_adopted() {
        let dir = tempfile::tempdir().unwrap();
        let part = Part::new("random", RandomNotes::new("lead"));
        let song = Song::new("s", TempoConfig::default(), RepeatPart::new(part))
            .unwrap()
            .with_synth("lead", crate::synth::TracingSynth::new("lead"));
        let mut playback =
            Playback::new(song).with_recording(RecordingConfig::to_dir("take", dir.path()));

        assert!(playback.recorder().is_none());
        playback.start().unwrap();
        assert!(playback.recorder().is_some_and(|r| r.is_empty()));
    }

    /// Fails the first `failing_stops` stop calls
    struct StubbornStop {
        failing_stops: usize,
        stops: usize,
    }

    impl Synth for StubbornStop {
        fn start_note(&mut self, _pitch: u8, _amplitude: f32) -> tactus_core::Result<()> {
            Ok(())
        }

        fn stop_note(&mut self) -> tactus_core::Result<()> {
            self.stops += 1;
            if self.stops <= self.failing_stops {
                return Err(TactusError::Synth {
                    synth_id: "lead".into(),
                    action: "stop note",
                    reason: "device busy".into(),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn test_failed_stop_stays_pending() {
        let part = Part::new("random", RandomNotes::new("lead").with_duration(1).with_seed(5));
        let song = Song::new("s", TempoConfig::default(), RepeatPart::new(part))
            .unwrap()
            .with_synth("lead", StubbornStop { failing_stops: 1, stops: 0 });
        let mut playback = Playback::new(song);
        playback.start().unwrap();

        playback.tick().unwrap();
        let pitch = playback.pending_note_offs()[0].pitch;

        let err = playback.tick().unwrap_err();
        assert!(matches!(err, PlaybackError::Core(TactusError::Synth { .. })));
        assert_eq!(playback.pending_note_offs().len(), 1);
        assert_eq!(playback.pending_note_offs()[0].pitch, pitch);
        assert_eq!(playback.pending_note_offs()[0].remaining_subdivisions, 0);

        // the retried stop goes out before the new note starts
        let report = playback.tick().unwrap();
        assert_eq!((report.notes_stopped, report.notes_started), (1, 1));
        assert_eq!(playback.pending_note_offs().len(), 1);
        assert_eq!(playback.pending_note_offs()[0].remaining_subdivisions, 1);
    }

    struct OffBeatGenerator {
        clock: tactus_core::MusicalClock,
    }

    impl tactus_core::NoteGenerator for OffBeatGenerator {
        fn produce_next_events(&mut self) -> Vec<tactus_core::NoteEvent> {
            self.clock.advance();
            Vec::new()
        }

        fn part_ends(&self) -> bool {
            true
        }

        fn clock(&self) -> Option<&tactus_core::MusicalClock> {
            Some(&self.clock)
        }
    }

    #[test]
    fn test_off_beat_transition_rejected() {
        let clock = tactus_core::MusicalClock::new(tactus_core::ClockConfig::new(vec![4], 4, 16)).unwrap();
        let part = Part::new("sloppy", OffBeatGenerator { clock });
        let song = Song::new("s", TempoConfig::default(), RepeatPart::new(part)).unwrap();
        let mut playback = Playback::new(song);
        playback.start().unwrap();

        // first tick is on the beat
        assert!(playback.tick().unwrap().replayed);
        let err = playback.tick().unwrap_err();
        assert!(matches!(err, PlaybackError::Core(TactusError::OffBeatTransition(_))));
    }

    struct Rejecting;

    impl Synth for Rejecting {
        fn start_note(&mut self, _pitch: u8, _amplitude: f32) -> tactus_core::Result<()> {
            Err(TactusError::Synth {
                synth_id: "broken".into(),
                action: "start note",
                reason: "voice busy".into(),
            })
        }

        fn stop_note(&mut self) -> tactus_core::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_dispatch_failure_aborts_run() {
        let part = Part::new("random", RandomNotes::new("broken"));
        let song = Song::new("s", TempoConfig::new(6000.0, 16), RepeatPart::new(part))
            .unwrap()
            .with_synth("broken", Rejecting);
        let mut playback = Playback::new(song);

        let err = playback.run().unwrap_err();
        assert!(matches!(err, PlaybackError::Core(TactusError::Synth { .. })));
        assert_eq!(playback.state(), PlaybackState::Stopped);
        assert!(!playback.control().is_running());
    }
}
