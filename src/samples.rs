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

//! Sample sets and their playback.
//!
//! This module provides:
//! - Sample loading from folders of single note recordings
//! - Completion of sparse sample sets by staged pitch shifting
//! - Voice pools with stealing and release
//! - The renderer that mixes every module on the audio callback

mod completion;
mod decode;
mod error;
mod loader;
mod module;
mod pitch;
mod renderer;
mod table;
mod voice;

pub use completion::{
    generated_silence, plan_stage, CompletionEngine, CompletionReport, NoteReport, ShiftJob,
    DEFAULT_STAGE_LIMIT, MAX_TRANSPOSITION,
};
pub use decode::decode_file;
pub use error::{LoadError, PitchShiftError};
pub use loader::{
    load_stereo, wildcard_match, FilenameNoteParser, LoadedNote, NoteParser, SampleLoader,
    DEFAULT_FILTER,
};
pub use module::{load_modules, load_silence, ModuleChannel, SamplerModule};
pub use pitch::{semitone_ratio, PitchShifter, DEFAULT_FRAME_SIZE, DEFAULT_OVERSAMPLING};
pub use renderer::{release_frames, Renderer};
pub use table::{NoteOrigin, SampleEntry, SampleTable, SampleTableBuilder, NOTE_COUNT};
pub use voice::VoicePool;
