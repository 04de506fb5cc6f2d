// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::audio::AudioBuffer;

/// The number of MIDI notes.
pub const NOTE_COUNT: usize = 128;

/// Where the buffer for a note came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NoteOrigin {
    /// Loaded from a sample file.
    Recorded,
    /// Pitch shifted from another note during the given completion stage.
    Shifted { source: u8, stage: usize },
    /// Nothing was close enough, so the note plays silence.
    Silence,
}

/// A note's buffer in a sample table.
#[derive(Clone)]
pub struct SampleEntry {
    buffer: Arc<AudioBuffer>,
    origin: NoteOrigin,
    duration: Duration,
}

impl SampleEntry {
    fn new(buffer: Arc<AudioBuffer>, origin: NoteOrigin) -> SampleEntry {
        let duration = buffer.duration();
        SampleEntry {
            buffer,
            origin,
            duration,
        }
    }

    pub fn buffer(&self) -> &Arc<AudioBuffer> {
        &self.buffer
    }

    pub fn origin(&self) -> NoteOrigin {
        self.origin
    }

    /// The playback length of the buffer in seconds, derived from its frame count and
    /// sample rate.
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl fmt::Debug for SampleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleEntry")
            .field("origin", &self.origin)
            .field("frames", &self.buffer.frames())
            .field("duration", &self.duration)
            .finish()
    }
}

/// A complete mapping of every MIDI note to a buffer.
#[derive(Clone, Debug)]
pub struct SampleTable {
    entries: Vec<SampleEntry>,
}

impl SampleTable {
    /// Returns the entry for the note, or None if the note is above 127.
    pub fn get(&self, note: u8) -> Option<&SampleEntry> {
        self.entries.get(usize::from(note))
    }

    /// Iterates over all notes in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &SampleEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(note, entry)| (note as u8, entry))
    }

    /// Counts the notes whose origin matches the predicate.
    pub fn count(&self, predicate: impl Fn(&NoteOrigin) -> bool) -> usize {
        self.entries
            .iter()
            .filter(|entry| predicate(&entry.origin))
            .count()
    }

    /// The total memory held by distinct buffers in the table.
    pub fn memory_size(&self) -> usize {
        let mut total = 0;
        for (index, entry) in self.entries.iter().enumerate() {
            let shared = self.entries[..index]
                .iter()
                .any(|earlier| Arc::ptr_eq(&earlier.buffer, &entry.buffer));
            if !shared {
                total += entry.buffer.samples().len() * std::mem::size_of::<f32>();
            }
        }
        total
    }
}

/// A sample table that is still being filled.
pub struct SampleTableBuilder {
    slots: Vec<Option<SampleEntry>>,
}

impl SampleTableBuilder {
    pub fn new() -> SampleTableBuilder {
        SampleTableBuilder {
            slots: vec![None; NOTE_COUNT],
        }
    }

    /// Fills the note if it's empty. Returns false if the note was already filled or out
    /// of range.
    pub fn insert(&mut self, note: u8, buffer: Arc<AudioBuffer>, origin: NoteOrigin) -> bool {
        match self.slots.get_mut(usize::from(note)) {
            Some(slot) if slot.is_none() => {
                *slot = Some(SampleEntry::new(buffer, origin));
                true
            }
            _ => false,
        }
    }

    pub fn is_filled(&self, note: u8) -> bool {
        self.slots
            .get(usize::from(note))
            .is_some_and(|slot| slot.is_some())
    }

    /// Returns the buffer for a filled note.
    pub fn buffer(&self, note: u8) -> Option<Arc<AudioBuffer>> {
        self.slots
            .get(usize::from(note))
            .and_then(|slot| slot.as_ref())
            .map(|entry| entry.buffer.clone())
    }

    /// The filled notes in ascending order.
    pub fn filled_notes(&self) -> Vec<u8> {
        (0..NOTE_COUNT as u8).filter(|n| self.is_filled(*n)).collect()
    }

    /// The number of notes without a buffer.
    pub fn missing_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_none()).count()
    }

    /// Fills every remaining note with the silence buffer and returns the finished table.
    pub fn finish(self, silence: Arc<AudioBuffer>) -> SampleTable {
        SampleTable {
            entries: self
                .slots
                .into_iter()
                .map(|slot| {
                    slot.unwrap_or_else(|| SampleEntry::new(silence.clone(), NoteOrigin::Silence))
                })
                .collect(),
        }
    }
}

impl Default for SampleTableBuilder {
    fn default() -> Self {
        SampleTableBuilder::new()
    }
}
