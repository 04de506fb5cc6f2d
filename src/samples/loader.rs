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

//! Sample loading for sampler modules.
//!
//! Samples are found by scanning a folder, decoded entirely into memory and normalized to
//! stereo at 44100Hz. The note each file plays is taken from its file name.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::audio::{AudioBuffer, NOMINAL_SAMPLE_RATE};

use super::decode::decode_file;
use super::error::LoadError;

/// The filter applied to sample file names when none is configured.
pub const DEFAULT_FILTER: &str = "*.wav";

/// A sample rate that is accepted and relabelled as 44100Hz without resampling.
const RELABELLED_SAMPLE_RATE: u32 = 48000;

/// Extracts a MIDI note number from a sample's file name.
pub trait NoteParser: Send + Sync {
    /// Returns the note for the given file name, or None if it can't be determined. The
    /// returned value isn't range checked.
    fn parse_note(&self, file_name: &str) -> Option<i32>;
}

/// Parses notes from file names like `piano_060.wav`, `strings-C4.wav` or `Bb2.flac`.
///
/// The last number in the file stem is used. If it's directly preceded by a note name
/// (`C`, `F#`, `Eb`, `cs`, ...), the note name and octave are used with middle C as C4.
/// Otherwise the number must stand on its own and is taken as the note number.
#[derive(Debug, Default, Clone, Copy)]
pub struct FilenameNoteParser;

impl NoteParser for FilenameNoteParser {
    fn parse_note(&self, file_name: &str) -> Option<i32> {
        let stem = Path::new(file_name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(file_name);
        let chars: Vec<char> = stem.chars().collect();

        let mut end = chars.len();
        while end > 0 {
            // Find the last run of digits before `end`.
            let Some(last_digit) = chars[..end].iter().rposition(|c| c.is_ascii_digit()) else {
                return None;
            };
            let mut start = last_digit;
            while start > 0 && chars[start - 1].is_ascii_digit() {
                start -= 1;
            }
            let number: i32 = chars[start..=last_digit]
                .iter()
                .collect::<String>()
                .parse()
                .ok()?;

            if let Some(note) = note_name_before(&chars, start, number) {
                return Some(note);
            }
            if is_boundary(&chars, start) {
                return Some(number);
            }
            end = start;
        }
        None
    }
}

/// Returns true if the character at `index` starts a new token.
fn is_boundary(chars: &[char], index: usize) -> bool {
    index == 0 || !chars[index - 1].is_alphanumeric()
}

fn pitch_class(letter: char) -> Option<i32> {
    match letter.to_ascii_lowercase() {
        'c' => Some(0),
        'd' => Some(2),
        'e' => Some(4),
        'f' => Some(5),
        'g' => Some(7),
        'a' => Some(9),
        'b' => Some(11),
        _ => None,
    }
}

/// Reads a note name ending directly before the digits at `digits_start`, with `octave`
/// being the value of those digits.
fn note_name_before(chars: &[char], digits_start: usize, octave: i32) -> Option<i32> {
    let (mut index, octave) = if digits_start > 0 && chars[digits_start - 1] == '-' {
        (digits_start - 1, -octave)
    } else {
        (digits_start, octave)
    };
    if index == 0 {
        return None;
    }
    index -= 1;

    let current = chars[index];
    let (letter_index, accidental) = match current {
        '#' if index > 0 => (index - 1, 1),
        's' | 'S' | 'b' if index > 0 && pitch_class(chars[index - 1]).is_some() => {
            let accidental = if current == 'b' { -1 } else { 1 };
            (index - 1, accidental)
        }
        _ => (index, 0),
    };

    let class = pitch_class(chars[letter_index])?;
    if !is_boundary(chars, letter_index) {
        return None;
    }
    Some((octave + 1) * 12 + class + accidental)
}

/// Matches a file name against a wildcard pattern with `*` and `?`, ignoring case.
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let name: Vec<char> = name.to_lowercase().chars().collect();

    let (mut p, mut n) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while n < name.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == name[n]) {
            p += 1;
            n += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, n));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            n = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}

/// A sample loaded for a specific note.
#[derive(Debug, Clone)]
pub struct LoadedNote {
    /// The MIDI note the sample plays.
    pub note: u8,
    /// Where the sample was loaded from.
    pub path: PathBuf,
    /// The stereo sample data.
    pub buffer: AudioBuffer,
}

/// Loads the samples in a folder.
pub struct SampleLoader {
    filter: String,
    parser: Arc<dyn NoteParser>,
}

impl SampleLoader {
    /// Creates a sample loader that matches files with the given wildcard filter and reads
    /// notes from file names.
    pub fn new(filter: &str) -> SampleLoader {
        SampleLoader::with_parser(filter, Arc::new(FilenameNoteParser))
    }

    /// Creates a sample loader with a custom note parser.
    pub fn with_parser(filter: &str, parser: Arc<dyn NoteParser>) -> SampleLoader {
        SampleLoader {
            filter: filter.to_string(),
            parser,
        }
    }

    /// Returns all files under the folder that match the filter, sorted by path.
    pub fn scan(&self, folder: &Path) -> Result<Vec<PathBuf>, LoadError> {
        if !folder.is_dir() {
            return Err(LoadError::MissingFolder(folder.to_path_buf()));
        }

        let mut paths = Vec::new();
        for entry in WalkDir::new(folder).sort_by_file_name() {
            let entry = entry.map_err(|source| LoadError::Scan {
                path: folder.to_path_buf(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let matches = entry
                .file_name()
                .to_str()
                .is_some_and(|name| wildcard_match(&self.filter, name));
            if matches {
                paths.push(entry.into_path());
            }
        }
        Ok(paths)
    }

    /// Loads every matching sample in the folder. Files are decoded in parallel but the
    /// result is in path order. If two files map to the same note, the first one wins.
    pub fn load_folder(&self, folder: &Path) -> Result<Vec<LoadedNote>, LoadError> {
        let paths = self.scan(folder)?;
        info!(folder = ?folder, files = paths.len(), "Loading samples");

        let loaded = paths
            .par_iter()
            .map(|path| self.load_note(path))
            .collect::<Result<Vec<LoadedNote>, LoadError>>()?;

        let mut seen = HashSet::new();
        let mut notes = Vec::with_capacity(loaded.len());
        for sample in loaded {
            if !seen.insert(sample.note) {
                warn!(
                    path = ?sample.path,
                    note = sample.note,
                    "Duplicate sample for note, ignoring"
                );
                continue;
            }
            notes.push(sample);
        }
        Ok(notes)
    }

    /// Loads a single sample and determines its note.
    pub fn load_note(&self, path: &Path) -> Result<LoadedNote, LoadError> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        let note = self
            .parser
            .parse_note(file_name)
            .and_then(|note| u8::try_from(note).ok())
            .filter(|note| *note <= 127)
            .ok_or_else(|| LoadError::UnknownNote {
                path: path.to_path_buf(),
            })?;

        let buffer = load_stereo(path)?;
        debug!(
            path = ?path,
            note,
            frames = buffer.frames(),
            duration_ms = buffer.duration().as_millis(),
            "Sample loaded"
        );
        Ok(LoadedNote {
            note,
            path: path.to_path_buf(),
            buffer,
        })
    }
}

impl std::fmt::Debug for SampleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleLoader")
            .field("filter", &self.filter)
            .finish()
    }
}

/// Decodes a file and applies the sample rate and channel policy: 44100Hz is accepted,
/// 48000Hz is relabelled as 44100Hz, mono is duplicated to stereo and anything else is an
/// error.
pub fn load_stereo(path: &Path) -> Result<AudioBuffer, LoadError> {
    let mut buffer = decode_file(path)?;

    match buffer.sample_rate() {
        NOMINAL_SAMPLE_RATE => {}
        RELABELLED_SAMPLE_RATE => {
            warn!(
                path = ?path,
                "48000Hz sample will be played as 44100Hz without resampling"
            );
            buffer.relabel(NOMINAL_SAMPLE_RATE);
        }
        sample_rate => {
            return Err(LoadError::UnsupportedSampleRate {
                path: path.to_path_buf(),
                sample_rate,
            })
        }
    }

    let channels = buffer.channels();
    buffer
        .into_stereo()
        .ok_or_else(|| LoadError::UnsupportedChannels {
            path: path.to_path_buf(),
            channels,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_wav;

    #[test]
    fn test_parse_note_numbers() {
        let parser = FilenameNoteParser;
        assert_eq!(parser.parse_note("60.wav"), Some(60));
        assert_eq!(parser.parse_note("piano_060.wav"), Some(60));
        assert_eq!(parser.parse_note("sample-60.wav"), Some(60));
        assert_eq!(parser.parse_note("piano_60_v2.wav"), Some(60));
        assert_eq!(parser.parse_note("piano_200.wav"), Some(200));
        assert_eq!(parser.parse_note("kick.wav"), None);
    }

    #[test]
    fn test_parse_note_names() {
        let parser = FilenameNoteParser;
        assert_eq!(parser.parse_note("C4.wav"), Some(60));
        assert_eq!(parser.parse_note("strings_F#3.wav"), Some(54));
        assert_eq!(parser.parse_note("Bb2.wav"), Some(46));
        assert_eq!(parser.parse_note("piano-cs4.wav"), Some(61));
        assert_eq!(parser.parse_note("b3.wav"), Some(59));
        assert_eq!(parser.parse_note("bass C-1.wav"), Some(0));
        assert_eq!(parser.parse_note("A0.flac"), Some(21));
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("*.wav", "piano_60.wav"));
        assert!(wildcard_match("*.wav", "PIANO_60.WAV"));
        assert!(!wildcard_match("*.wav", "piano_60.flac"));
        assert!(wildcard_match("piano_??.wav", "piano_60.wav"));
        assert!(!wildcard_match("piano_??.wav", "piano_100.wav"));
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("*_*.wav", "a_b_c.wav"));
    }

    #[test]
    fn test_load_folder() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("60.wav"), 2, 44100, &[0.5, -0.5, 0.25, -0.25]).unwrap();
        write_wav(&dir.path().join("72.wav"), 1, 44100, &[0.1, 0.2]).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not audio").unwrap();

        let notes = SampleLoader::new(DEFAULT_FILTER)
            .load_folder(dir.path())
            .unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].note, 60);
        assert_eq!(notes[1].note, 72);

        // Mono is duplicated into both channels.
        assert_eq!(notes[1].buffer.channels(), 2);
        assert_eq!(notes[1].buffer.samples(), &[0.1, 0.1, 0.2, 0.2]);
    }

    #[test]
    fn test_load_folder_recurses() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("layer");
        std::fs::create_dir(&nested).unwrap();
        write_wav(&nested.join("48.wav"), 2, 44100, &[0.0, 0.0]).unwrap();

        let notes = SampleLoader::new(DEFAULT_FILTER)
            .load_folder(dir.path())
            .unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].note, 48);
    }

    #[test]
    fn test_48k_is_relabelled() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("60.wav"), 2, 48000, &[0.5; 96]).unwrap();

        let notes = SampleLoader::new(DEFAULT_FILTER)
            .load_folder(dir.path())
            .unwrap();
        assert_eq!(notes[0].buffer.sample_rate(), 44100);
        // No resampling happens.
        assert_eq!(notes[0].buffer.frames(), 48);
    }

    #[test]
    fn test_unsupported_sample_rate() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("60.wav"), 2, 22050, &[0.5; 4]).unwrap();

        let result = SampleLoader::new(DEFAULT_FILTER).load_folder(dir.path());
        assert!(matches!(
            result,
            Err(LoadError::UnsupportedSampleRate {
                sample_rate: 22050,
                ..
            })
        ));
    }

    #[test]
    fn test_unsupported_channels() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("60.wav"), 3, 44100, &[0.5; 6]).unwrap();

        let result = SampleLoader::new(DEFAULT_FILTER).load_folder(dir.path());
        assert!(matches!(
            result,
            Err(LoadError::UnsupportedChannels { channels: 3, .. })
        ));
    }

    #[test]
    fn test_unknown_note() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("kick.wav"), 2, 44100, &[0.5; 4]).unwrap();

        let result = SampleLoader::new(DEFAULT_FILTER).load_folder(dir.path());
        assert!(matches!(result, Err(LoadError::UnknownNote { .. })));
    }

    #[test]
    fn test_note_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("128.wav"), 2, 44100, &[0.5; 4]).unwrap();

        let result = SampleLoader::new(DEFAULT_FILTER).load_folder(dir.path());
        assert!(matches!(result, Err(LoadError::UnknownNote { .. })));
    }

    #[test]
    fn test_duplicate_first_wins() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("a_60.wav"), 2, 44100, &[0.5, 0.5]).unwrap();
        write_wav(&dir.path().join("b_C4.wav"), 2, 44100, &[0.25, 0.25]).unwrap();

        let notes = SampleLoader::new(DEFAULT_FILTER)
            .load_folder(dir.path())
            .unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].buffer.samples(), &[0.5, 0.5]);
    }

    #[test]
    fn test_missing_folder() {
        let result = SampleLoader::new(DEFAULT_FILTER).load_folder(Path::new("/nonexistent"));
        assert!(matches!(result, Err(LoadError::MissingFolder(_))));
    }

    #[test]
    fn test_custom_parser() {
        struct Fixed;
        impl NoteParser for Fixed {
            fn parse_note(&self, _: &str) -> Option<i32> {
                Some(36)
            }
        }

        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("kick.wav"), 2, 44100, &[0.5; 4]).unwrap();

        let notes = SampleLoader::with_parser(DEFAULT_FILTER, Arc::new(Fixed))
            .load_folder(dir.path())
            .unwrap();
        assert_eq!(notes[0].note, 36);
    }
}
