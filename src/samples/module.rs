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
use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{info, span, Level};

use super::completion::{generated_silence, CompletionEngine, CompletionReport};
use super::error::LoadError;
use super::loader::{load_stereo, SampleLoader};
use super::table::SampleTable;
use crate::audio::AudioBuffer;
use crate::config::ModuleSpec;
use crate::dispatch::Routing;

/// The MIDI channel a module listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleChannel {
    Fixed(u8),
    /// The channel number equals the module index.
    ModuleIndex,
}

impl From<Routing> for ModuleChannel {
    fn from(routing: Routing) -> Self {
        match routing {
            Routing::FixedChannel(channel) => ModuleChannel::Fixed(channel),
            Routing::ChannelPerModule => ModuleChannel::ModuleIndex,
        }
    }
}

/// A completed sample table and the channel that plays it. Voices for the module live in
/// the renderer.
#[derive(Debug, Clone)]
pub struct SamplerModule {
    index: usize,
    table: Arc<SampleTable>,
    channel: ModuleChannel,
}

impl SamplerModule {
    pub fn new(index: usize, table: Arc<SampleTable>, channel: ModuleChannel) -> SamplerModule {
        SamplerModule {
            index,
            table,
            channel,
        }
    }

    /// Loads and completes the samples in a module folder.
    pub fn load(
        index: usize,
        spec: &ModuleSpec,
        channel: ModuleChannel,
        engine: &CompletionEngine,
        silence: Arc<AudioBuffer>,
    ) -> Result<(SamplerModule, CompletionReport), LoadError> {
        let span = span!(Level::INFO, "module", index);
        let _enter = span.enter();

        let loader = SampleLoader::new(&spec.filter);
        let supplied = loader
            .load_folder(&spec.folder)?
            .into_iter()
            .map(|loaded| (loaded.note, loaded.buffer))
            .collect();
        let (table, report) = engine.complete(supplied, silence)?;
        info!(folder = ?spec.folder, ?channel, "Module ready");
        Ok((SamplerModule::new(index, Arc::new(table), channel), report))
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn table(&self) -> &Arc<SampleTable> {
        &self.table
    }

    pub fn channel(&self) -> ModuleChannel {
        self.channel
    }
}

/// Loads every module in parallel. Module indices follow the order of the specs.
pub fn load_modules(
    specs: &[ModuleSpec],
    routing: Routing,
    engine: &CompletionEngine,
    silence: Arc<AudioBuffer>,
) -> Result<Vec<(SamplerModule, CompletionReport)>, LoadError> {
    specs
        .par_iter()
        .enumerate()
        .map(|(index, spec)| {
            SamplerModule::load(index, spec, routing.into(), engine, silence.clone())
        })
        .collect()
}

/// Loads the silence buffer used for notes that can't be synthesized. Without a file,
/// ten seconds of generated silence is used.
pub fn load_silence(path: Option<&Path>) -> Result<Arc<AudioBuffer>, LoadError> {
    match path {
        Some(path) => {
            info!(path = ?path, "Loading silence file");
            Ok(Arc::new(load_stereo(path)?))
        }
        None => Ok(Arc::new(generated_silence())),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use super::*;
    use crate::samples::{NoteOrigin, PitchShifter, NOTE_COUNT};
    use crate::testutil::{audio_test_utils::sine, write_wav};

    fn engine() -> CompletionEngine {
        CompletionEngine::with_shifter(Arc::new(PitchShifter::with_frame_size(256, 4)), 11)
    }

    #[test]
    fn test_load_modules() {
        let dir = tempfile::tempdir().unwrap();
        let piano = dir.path().join("piano");
        let strings = dir.path().join("strings");
        std::fs::create_dir_all(&piano).unwrap();
        std::fs::create_dir_all(&strings).unwrap();
        let tone = sine(440.0, 44100, 2048, 0.5);
        write_wav(&piano.join("piano_060.wav"), 1, 44100, &tone).unwrap();
        write_wav(&strings.join("strings_072.wav"), 1, 44100, &tone).unwrap();

        let specs = vec![
            ModuleSpec {
                folder: piano,
                filter: "*.wav".to_string(),
            },
            ModuleSpec {
                folder: strings,
                filter: "*.wav".to_string(),
            },
        ];
        let silence = Arc::new(AudioBuffer::silence(44100, 2, 16));
        let modules =
            load_modules(&specs, Routing::ChannelPerModule, &engine(), silence).unwrap();

        assert_eq!(modules.len(), 2);
        for (index, (module, report)) in modules.iter().enumerate() {
            assert_eq!(module.index(), index);
            assert_eq!(module.channel(), ModuleChannel::ModuleIndex);
            assert_eq!(report.recorded, 1);
            assert_eq!(report.recorded + report.shifted + report.silent, NOTE_COUNT);
            assert!(module.table().iter().count() == NOTE_COUNT);
        }
        assert_eq!(
            modules[0].0.table().get(60).map(|entry| entry.origin()),
            Some(NoteOrigin::Recorded)
        );
        assert_eq!(
            modules[1].0.table().get(72).map(|entry| entry.origin()),
            Some(NoteOrigin::Recorded)
        );
    }

    #[test]
    fn test_missing_folder_fails() {
        let specs = vec![ModuleSpec {
            folder: PathBuf::from("/does/not/exist"),
            filter: "*.wav".to_string(),
        }];
        let silence = Arc::new(AudioBuffer::silence(44100, 2, 16));
        assert!(matches!(
            load_modules(&specs, Routing::FixedChannel(0), &engine(), silence),
            Err(LoadError::MissingFolder(_))
        ));
    }

    #[test]
    fn test_load_silence() {
        let generated = load_silence(None).unwrap();
        assert_eq!(generated.channels(), 2);
        assert_eq!(generated.sample_rate(), 44100);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silence.wav");
        write_wav(&path, 2, 44100, &[0.0; 200]).unwrap();
        let loaded = load_silence(Some(&path)).unwrap();
        assert_eq!(loaded.frames(), 100);

        assert!(load_silence(Some(&dir.path().join("missing.wav"))).is_err());
    }
}
