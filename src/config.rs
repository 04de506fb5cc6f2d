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
use std::fs;
use std::path::{Path, PathBuf};

use config::{Config, File};
use rand::Rng;
use serde::Deserialize;
use tracing::{info, warn};

use crate::dispatch::Routing;
use crate::samples::{DEFAULT_FILTER, DEFAULT_STAGE_LIMIT};

pub mod error;
pub mod midi;

pub use error::ConfigError;

const DEFAULT_MAX_MODULES: usize = 16;
const DEFAULT_VOICES_PER_MODULE: usize = 8;
const DEFAULT_RELEASE_MS: u64 = 10;
const DEFAULT_COMMAND_QUEUE_CAPACITY: usize = 1024;

/// The highest MIDI channel number.
const MAX_CHANNEL: u8 = 15;

/// A sample folder that becomes one sampler module.
#[derive(Deserialize, Clone, Debug)]
pub struct Module {
    /// The folder to scan for samples.
    folder: String,

    /// Wildcard filter for sample file names (default: *.wav).
    filter: Option<String>,
}

impl Module {
    pub fn new(folder: &str, filter: Option<&str>) -> Module {
        Module {
            folder: folder.to_string(),
            filter: filter.map(|filter| filter.to_string()),
        }
    }

    pub fn folder(&self) -> &str {
        &self.folder
    }

    pub fn filter(&self) -> &str {
        self.filter.as_deref().unwrap_or(DEFAULT_FILTER)
    }
}

/// A module folder resolved against the config file location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleSpec {
    pub folder: PathBuf,
    pub filter: String,
}

/// Commands run around a session.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Hooks {
    /// Run before samples are loaded.
    begin: Option<String>,

    /// Run after everything has shut down.
    end: Option<String>,
}

impl Hooks {
    pub fn begin(&self) -> Option<&str> {
        self.begin.as_deref()
    }

    pub fn end(&self) -> Option<&str> {
        self.end.as_deref()
    }
}

/// A YAML representation of the sampler configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Sampler {
    /// MIDI input settings.
    #[serde(default)]
    midi: midi::Midi,

    /// The modules to load, in order. Module 0 is the first.
    #[serde(default)]
    modules: Vec<Module>,

    /// A text file listing one module folder per line. When set, each module listens on
    /// the channel matching its index.
    modules_file: Option<String>,

    /// The filter used for folders from the modules file (default: *.wav).
    modules_filter: Option<String>,

    /// The most modules a modules file may produce (default: 16). If it lists more, a
    /// random selection is used.
    max_modules: Option<usize>,

    /// The number of completion stages (default: 11).
    stage_limit: Option<usize>,

    /// Voices per module (default: 8).
    voices_per_module: Option<usize>,

    /// The note off release time in milliseconds (default: 10).
    release_ms: Option<u64>,

    /// The size of the queue between MIDI input and the renderer (default: 1024).
    command_queue_capacity: Option<usize>,

    /// A stereo 44100Hz file played for notes that can't be synthesized. When unset,
    /// ten seconds of generated silence is used.
    silence_file: Option<String>,

    #[serde(default)]
    hooks: Hooks,

    /// Relative paths are resolved against this.
    #[serde(skip)]
    base_path: PathBuf,
}

impl Sampler {
    /// Parses a sampler configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Sampler, ConfigError> {
        let mut sampler = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Sampler>()?;
        sampler.base_path = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        sampler.validate()?;
        Ok(sampler)
    }

    /// Creates a configuration for a single folder with default settings.
    pub fn for_folder(folder: &Path, filter: &str) -> Sampler {
        Sampler {
            midi: midi::Midi::default(),
            modules: vec![Module::new(&folder.to_string_lossy(), Some(filter))],
            modules_file: None,
            modules_filter: None,
            max_modules: None,
            stage_limit: None,
            voices_per_module: None,
            release_ms: None,
            command_queue_capacity: None,
            silence_file: None,
            hooks: Hooks::default(),
            base_path: PathBuf::new(),
        }
    }

    /// Checks values that serde can't.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(channel) = self.midi.channel() {
            if channel > MAX_CHANNEL {
                return Err(ConfigError::Invalid(format!(
                    "MIDI channel {} is out of range (0-15)",
                    channel
                )));
            }
        }
        if self.voices_per_module() == 0 {
            return Err(ConfigError::Invalid(
                "voices_per_module must be at least 1".to_string(),
            ));
        }
        if self.command_queue_capacity() == 0 {
            return Err(ConfigError::Invalid(
                "command_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.modules.is_empty() && self.modules_file.is_none() {
            return Err(ConfigError::Invalid(
                "either modules or modules_file must be set".to_string(),
            ));
        }
        if !self.modules.is_empty() && self.modules_file.is_some() {
            return Err(ConfigError::Invalid(
                "modules and modules_file can't both be set".to_string(),
            ));
        }
        self.midi.poll_interval()?;
        Ok(())
    }

    pub fn midi(&self) -> &midi::Midi {
        &self.midi
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn stage_limit(&self) -> usize {
        self.stage_limit.unwrap_or(DEFAULT_STAGE_LIMIT)
    }

    pub fn voices_per_module(&self) -> usize {
        self.voices_per_module.unwrap_or(DEFAULT_VOICES_PER_MODULE)
    }

    pub fn release_ms(&self) -> u64 {
        self.release_ms.unwrap_or(DEFAULT_RELEASE_MS)
    }

    pub fn command_queue_capacity(&self) -> usize {
        self.command_queue_capacity
            .unwrap_or(DEFAULT_COMMAND_QUEUE_CAPACITY)
    }

    pub fn max_modules(&self) -> usize {
        self.max_modules.unwrap_or(DEFAULT_MAX_MODULES).max(1)
    }

    /// Returns the silence file, resolved against the config location.
    pub fn silence_file(&self) -> Option<PathBuf> {
        self.silence_file.as_ref().map(|file| self.resolve(file))
    }

    /// Returns how MIDI channels map to modules. A modules file always maps channels to
    /// module indices.
    pub fn routing(&self) -> Routing {
        match (self.modules_file.is_some(), self.midi.channel()) {
            (false, Some(channel)) => Routing::FixedChannel(channel),
            _ => Routing::ChannelPerModule,
        }
    }

    /// Resolves the modules to load.
    pub fn module_specs(&self) -> Result<Vec<ModuleSpec>, ConfigError> {
        self.module_specs_with_rng(&mut rand::thread_rng())
    }

    /// Resolves the modules to load, using the given random source to pick folders when
    /// a modules file lists too many.
    pub fn module_specs_with_rng<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<Vec<ModuleSpec>, ConfigError> {
        let Some(modules_file) = &self.modules_file else {
            return Ok(self
                .modules
                .iter()
                .map(|module| ModuleSpec {
                    folder: self.resolve(module.folder()),
                    filter: module.filter().to_string(),
                })
                .collect());
        };

        let path = self.resolve(modules_file);
        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let folders: Vec<&str> = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .collect();
        if folders.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "modules file {} lists no folders",
                path.display()
            )));
        }

        let max_modules = self.max_modules();
        let selected: Vec<&str> = if folders.len() > max_modules {
            warn!(
                listed = folders.len(),
                max_modules, "Too many module folders, picking a random selection"
            );
            let mut indices = rand::seq::index::sample(rng, folders.len(), max_modules).into_vec();
            indices.sort_unstable();
            indices.into_iter().map(|index| folders[index]).collect()
        } else {
            folders
        };

        let filter = self.modules_filter.as_deref().unwrap_or(DEFAULT_FILTER);
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(selected
            .into_iter()
            .enumerate()
            .map(|(index, folder)| {
                info!(module = index, folder, "Module folder selected");
                ModuleSpec {
                    folder: resolve_against(&base, folder),
                    filter: filter.to_string(),
                }
            })
            .collect())
    }

    fn resolve(&self, path: &str) -> PathBuf {
        resolve_against(&self.base_path, path)
    }
}

fn resolve_against(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
