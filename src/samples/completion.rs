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

//! Sample set completion.
//!
//! A sparse set of recorded notes is expanded to all 128 MIDI notes in stages. In each
//! stage, every empty note within an octave of a filled note is pitch shifted from its
//! nearest filled neighbour. Notes filled in a stage become sources for the next one, so
//! an octave's reach is extended by another octave per stage. Anything still empty after
//! the last stage plays silence.

use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::audio::{AudioBuffer, NOMINAL_SAMPLE_RATE};
use crate::midi::note_name;

use super::error::PitchShiftError;
use super::pitch::PitchShifter;
use super::table::{NoteOrigin, SampleTable, SampleTableBuilder, NOTE_COUNT};

/// The default number of completion stages.
pub const DEFAULT_STAGE_LIMIT: usize = 11;

/// The furthest a note is ever shifted from its source, in semitones.
pub const MAX_TRANSPOSITION: u8 = 12;

/// The length of the generated silence buffer.
const SILENCE_SECONDS: usize = 10;

/// Generates the fallback buffer used when no silence file is configured.
pub fn generated_silence() -> AudioBuffer {
    AudioBuffer::silence(
        NOMINAL_SAMPLE_RATE,
        2,
        NOMINAL_SAMPLE_RATE as usize * SILENCE_SECONDS,
    )
}

/// A note to synthesize from another note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftJob {
    pub target: u8,
    pub source: u8,
}

/// Works out which empty notes can be filled from the given filled notes, which must be
/// sorted in ascending order.
///
/// Notes below the lowest or above the highest filled note use that note when it's
/// within an octave. A note between two filled notes uses the closer one, preferring the
/// upper note on a tie, as long as it's within an octave.
pub fn plan_stage(filled: &[u8]) -> Vec<ShiftJob> {
    let (Some(&lowest), Some(&highest)) = (filled.first(), filled.last()) else {
        return Vec::new();
    };

    let mut jobs = Vec::new();
    let mut upper_index = 0;
    for target in 0..NOTE_COUNT as u8 {
        while upper_index < filled.len() && filled[upper_index] < target {
            upper_index += 1;
        }
        if filled.get(upper_index) == Some(&target) {
            continue;
        }

        let source = if target < lowest {
            (lowest - target <= MAX_TRANSPOSITION).then_some(lowest)
        } else if target > highest {
            (target - highest <= MAX_TRANSPOSITION).then_some(highest)
        } else {
            let upper = filled[upper_index];
            let lower = filled[upper_index - 1];
            let upper_distance = upper - target;
            let lower_distance = target - lower;
            if upper_distance <= lower_distance && upper_distance <= MAX_TRANSPOSITION {
                Some(upper)
            } else if lower_distance < upper_distance && lower_distance <= MAX_TRANSPOSITION {
                Some(lower)
            } else {
                None
            }
        };

        if let Some(source) = source {
            jobs.push(ShiftJob { target, source });
        }
    }
    jobs
}

/// How a single note was filled.
#[derive(Debug, Clone, Serialize)]
pub struct NoteReport {
    pub note: u8,
    pub name: String,
    pub origin: NoteOrigin,
}

/// A summary of a completed sample set.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionReport {
    pub recorded: usize,
    pub shifted: usize,
    pub silent: usize,
    /// The number of notes filled in each stage that ran.
    pub stages: Vec<usize>,
    pub notes: Vec<NoteReport>,
}

impl CompletionReport {
    fn new(table: &SampleTable, stages: Vec<usize>) -> CompletionReport {
        CompletionReport {
            recorded: table.count(|origin| *origin == NoteOrigin::Recorded),
            shifted: table.count(|origin| matches!(origin, NoteOrigin::Shifted { .. })),
            silent: table.count(|origin| *origin == NoteOrigin::Silence),
            stages,
            notes: table
                .iter()
                .map(|(note, entry)| NoteReport {
                    note,
                    name: note_name(note),
                    origin: entry.origin(),
                })
                .collect(),
        }
    }
}

/// Completes sparse sample sets.
#[derive(Debug, Clone)]
pub struct CompletionEngine {
    shifter: Arc<PitchShifter>,
    stage_limit: usize,
}

impl CompletionEngine {
    /// Creates an engine with the default pitch shifter.
    pub fn new(stage_limit: usize) -> CompletionEngine {
        CompletionEngine::with_shifter(Arc::new(PitchShifter::new()), stage_limit)
    }

    pub fn with_shifter(shifter: Arc<PitchShifter>, stage_limit: usize) -> CompletionEngine {
        CompletionEngine {
            shifter,
            stage_limit,
        }
    }

    pub fn stage_limit(&self) -> usize {
        self.stage_limit
    }

    /// Builds a complete sample table from the supplied notes. If a note is supplied more
    /// than once, the first buffer is used. Notes left empty after the last stage share
    /// the silence buffer.
    pub fn complete(
        &self,
        supplied: Vec<(u8, AudioBuffer)>,
        silence: Arc<AudioBuffer>,
    ) -> Result<(SampleTable, CompletionReport), PitchShiftError> {
        let mut builder = SampleTableBuilder::new();
        for (note, buffer) in supplied {
            if !builder.insert(note, Arc::new(buffer), NoteOrigin::Recorded) {
                warn!(note, "Ignoring duplicate or out of range note");
            }
        }

        if builder.missing_count() == NOTE_COUNT {
            warn!("No samples supplied, every note will be silent");
        }

        let mut stages = Vec::new();
        for stage in 0..self.stage_limit {
            if builder.missing_count() == 0 {
                break;
            }

            let filled = builder.filled_notes();
            let jobs = plan_stage(&filled);
            if jobs.is_empty() {
                break;
            }

            // Sources only come from notes filled before this stage, so the jobs are
            // independent of each other.
            let jobs: Vec<(ShiftJob, Arc<AudioBuffer>)> = jobs
                .into_iter()
                .filter_map(|job| builder.buffer(job.source).map(|source| (job, source)))
                .collect();
            let shifted = jobs
                .par_iter()
                .map(|(job, source)| self.shifter.shift(source, job.source, job.target))
                .collect::<Result<Vec<AudioBuffer>, PitchShiftError>>()?;

            for ((job, _), buffer) in jobs.iter().zip(shifted) {
                debug!(
                    target_note = job.target,
                    source_note = job.source,
                    stage,
                    "Synthesized note"
                );
                builder.insert(
                    job.target,
                    Arc::new(buffer),
                    NoteOrigin::Shifted {
                        source: job.source,
                        stage,
                    },
                );
            }
            stages.push(jobs.len());
        }

        let missing = builder.missing_count();
        if missing > 0 && missing < NOTE_COUNT {
            warn!(
                notes = missing,
                "Notes could not be synthesized within the stage limit, using silence"
            );
        }

        let table = builder.finish(silence);
        let report = CompletionReport::new(&table, stages);
        info!(
            recorded = report.recorded,
            shifted = report.shifted,
            silent = report.silent,
            stages = report.stages.len(),
            memory_kb = table.memory_size() / 1024,
            "Sample set completed"
        );
        Ok((table, report))
    }
}
