//! Hierarchical musical clock: subdivision -> beat -> bar -> repetition
//!
//! The clock starts before the first subdivision. The first `advance()` lands
//! on beat 1 of bar 1 with `on_beat = true`; every `ticks_per_beat` advances
//! after that start a new beat.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TactusError};

/// Bar layout and rhythmic resolution of a clock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Beats in each bar of the repeating cycle
    pub beats_per_bar: Vec<u32>,
    /// Note value of one beat (4 = quarter note, 8 = eighth note)
    pub note_value: u32,
    /// Engine ticks per whole-note reference (16 = sixteenth-note ticks)
    pub subdivision: u32,
}

impl ClockConfig {
    pub fn new(beats_per_bar: Vec<u32>, note_value: u32, subdivision: u32) -> Self {
        Self { beats_per_bar, note_value, subdivision }
    }

    /// Subdivision ticks making up one beat
    pub fn ticks_per_beat(&self) -> Result<u32> {
        if self.note_value == 0 {
            return Err(TactusError::InvalidClock("note value must be positive".into()));
        }
        if self.subdivision == 0 || self.subdivision % self.note_value != 0 {
            return Err(TactusError::InvalidClock(format!(
                "subdivision {} is not a positive multiple of note value {}",
                self.subdivision, self.note_value
            )));
        }
        Ok(self.subdivision / self.note_value)
    }

    pub fn validate(&self) -> Result<()> {
        if self.beats_per_bar.is_empty() {
            return Err(TactusError::InvalidClock("at least one bar is required".into()));
        }
        if let Some(bar) = self.beats_per_bar.iter().position(|&b| b == 0) {
            return Err(TactusError::InvalidClock(format!("bar {} has no beats", bar + 1)));
        }
        self.ticks_per_beat().map(|_| ())
    }

    /// Beats in one full repetition of the bar cycle
    pub fn beats_per_cycle(&self) -> u64 {
        self.beats_per_bar.iter().map(|&b| b as u64).sum()
    }
}

/// Raw counters of a clock
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ClockState {
    /// Advances performed so far
    pub subdivision_counter: u64,
    pub beat_index: u32,
    pub bar_index: u32,
    /// Completed cycles; never wraps
    pub repetition_count: u64,
    pub on_beat: bool,
}

/// 1-based position reported after an advance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockPosition {
    pub on_beat: bool,
    pub beat: u32,
    pub bar: u32,
    pub repetition: u64,
    pub beats_in_bar: u32,
    pub total_bars: u32,
}

#[derive(Debug, Clone)]
pub struct MusicalClock {
    config: ClockConfig,
    ticks_per_beat: u64,
    state: ClockState,
}

impl MusicalClock {
    pub fn new(config: ClockConfig) -> Result<Self> {
        config.validate()?;
        let ticks_per_beat = config.ticks_per_beat()? as u64;
        Ok(Self {
            config,
            ticks_per_beat,
            state: ClockState::default(),
        })
    }

    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    pub fn ticks_per_beat(&self) -> u64 {
        self.ticks_per_beat
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    /// Move forward one subdivision and report the new position
    pub fn advance(&mut self) -> ClockPosition {
        let st = &mut self.state;
        st.on_beat = st.subdivision_counter % self.ticks_per_beat == 0;

        if st.on_beat && st.subdivision_counter > 0 {
            st.beat_index += 1;
            if st.beat_index == self.config.beats_per_bar[st.bar_index as usize] {
                st.beat_index = 0;
                st.bar_index += 1;
                if st.bar_index as usize == self.config.beats_per_bar.len() {
                    st.bar_index = 0;
                    st.repetition_count += 1;
                }
            }
        }

        st.subdivision_counter += 1;
        self.current()
    }

    /// Current position, `None` until the first advance
    pub fn position(&self) -> Option<ClockPosition> {
        (self.state.subdivision_counter > 0).then(|| self.current())
    }

    /// True on the first subdivision of a cycle other than the very first one
    pub fn at_cycle_start(&self) -> bool {
        let st = &self.state;
        st.on_beat && st.beat_index == 0 && st.bar_index == 0 && st.repetition_count > 0
    }

    fn current(&self) -> ClockPosition {
        let st = &self.state;
        ClockPosition {
            on_beat: st.on_beat,
            beat: st.beat_index + 1,
            bar: st.bar_index + 1,
            repetition: st.repetition_count,
            beats_in_bar: self.config.beats_per_bar[st.bar_index as usize],
            total_bars: self.config.beats_per_bar.len() as u32,
        }
    }
}
