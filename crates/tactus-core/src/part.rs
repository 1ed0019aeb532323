//! Parts and the strategies that chain them

use std::collections::VecDeque;
use std::fmt;

use crate::error::Result;
use crate::generator::NoteGenerator;

/// A named section of a song owning one note generator
pub struct Part {
    name: String,
    generator: Box<dyn NoteGenerator>,
}

impl Part {
    pub fn new(name: impl Into<String>, generator: impl NoteGenerator + 'static) -> Self {
        Self {
            name: name.into(),
            generator: Box::new(generator),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn generator(&self) -> &dyn NoteGenerator {
        self.generator.as_ref()
    }

    pub fn generator_mut(&mut self) -> &mut dyn NoteGenerator {
        self.generator.as_mut()
    }
}

impl fmt::Debug for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Part").field("name", &self.name).finish_non_exhaustive()
    }
}

/// What happens when the active part offers to end
#[derive(Debug)]
pub enum NextPart {
    /// Adopt a new part with its own generator and clock
    Switch(Part),
    /// Keep the active part and its clock exactly as they are
    Replay,
    /// Stop playback
    End,
}

/// Trait for part transition strategies
pub trait PartSequencer: Send {
    /// Resolve the part following `current` (`None` when playback starts)
    fn next_part(&mut self, current: Option<&str>) -> Result<NextPart>;
}

/// Fixed list of parts played once in order
#[derive(Debug, Default)]
pub struct PartList {
    parts: VecDeque<Part>,
}

impl PartList {
    pub fn new(parts: impl IntoIterator<Item = Part>) -> Self {
        Self {
            parts: parts.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.parts.len()
    }
}

impl PartSequencer for PartList {
    fn next_part(&mut self, _current: Option<&str>) -> Result<NextPart> {
        Ok(self.parts.pop_front().map_or(NextPart::End, NextPart::Switch))
    }
}

/// Builds a fresh part on every call; the closure receives the number of parts built so far
pub struct PartFactory {
    build: Box<dyn FnMut(u64) -> Result<NextPart> + Send>,
    built: u64,
}

impl PartFactory {
    /// Factory that never ends the song
    pub fn new<F>(mut build: F) -> Self
    where
        F: FnMut(u64) -> Result<Part> + Send + 'static,
    {
        Self::with_outcome(move |n| build(n).map(NextPart::Switch))
    }

    /// Factory that decides the full outcome itself, e.g. to end after some parts
    pub fn with_outcome<F>(build: F) -> Self
    where
        F: FnMut(u64) -> Result<NextPart> + Send + 'static,
    {
        Self {
            build: Box::new(build),
            built: 0,
        }
    }

    pub fn built(&self) -> u64 {
        self.built
    }
}

impl PartSequencer for PartFactory {
    fn next_part(&mut self, _current: Option<&str>) -> Result<NextPart> {
        let next = (self.build)(self.built)?;
        if matches!(next, NextPart::Switch(_)) {
            self.built += 1;
        }
        Ok(next)
    }
}

/// A single part replayed forever
#[derive(Debug)]
pub struct RepeatPart {
    part: Option<Part>,
}

impl RepeatPart {
    pub fn new(part: Part) -> Self {
        Self { part: Some(part) }
    }
}

impl PartSequencer for RepeatPart {
    fn next_part(&mut self, _current: Option<&str>) -> Result<NextPart> {
        Ok(match self.part.take() {
            Some(part) => NextPart::Switch(part),
            None => NextPart::Replay,
        })
    }
}
