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
use std::sync::Arc;

use crossbeam_channel::Receiver;

use super::module::SamplerModule;
use super::table::SampleTable;
use super::voice::VoicePool;
use crate::audio::NOMINAL_SAMPLE_RATE;
use crate::dispatch::TriggerCommand;

/// Converts a release time to frames at the nominal sample rate.
pub fn release_frames(release_ms: u64) -> usize {
    (release_ms * u64::from(NOMINAL_SAMPLE_RATE) / 1000) as usize
}

/// Mixes every module's voices into the audio output. Lives on the audio callback and
/// only ever reads trigger commands from its queue.
pub struct Renderer {
    commands: Receiver<TriggerCommand>,
    tables: Vec<Arc<SampleTable>>,
    pools: Vec<VoicePool>,
}

impl Renderer {
    /// Creates a renderer with one voice pool per module.
    pub fn new(
        modules: &[SamplerModule],
        voices_per_module: usize,
        release_ms: u64,
        commands: Receiver<TriggerCommand>,
    ) -> Renderer {
        let release_frames = release_frames(release_ms);
        Renderer {
            commands,
            tables: modules.iter().map(|module| module.table().clone()).collect(),
            pools: modules
                .iter()
                .map(|_| VoicePool::new(voices_per_module, release_frames))
                .collect(),
        }
    }

    /// Returns the voice pool of the given module.
    pub fn pool(&self, module: usize) -> Option<&VoicePool> {
        self.pools.get(module)
    }

    /// Applies pending trigger commands, then renders into the interleaved output.
    pub fn render(&mut self, output: &mut [f32], channels: usize) {
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command);
        }

        output.fill(0.0);
        for pool in self.pools.iter_mut() {
            pool.mix_into(output, channels);
        }
    }

    fn apply(&mut self, command: TriggerCommand) {
        match command {
            TriggerCommand::NoteOn {
                module,
                note,
                velocity,
            } => {
                let (Some(table), Some(pool)) = (self.tables.get(module), self.pools.get_mut(module))
                else {
                    return;
                };
                if let Some(entry) = table.get(note) {
                    pool.note_on(note, velocity, entry.buffer().clone());
                }
            }
            TriggerCommand::NoteOff { module, note } => {
                if let Some(pool) = self.pools.get_mut(module) {
                    pool.note_off(note);
                }
            }
        }
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("modules", &self.pools.len())
            .field("pending_commands", &self.commands.len())
            .field(
                "stolen_voices",
                &self.pools.iter().map(VoicePool::stolen_count).sum::<u64>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioBuffer;
    use crate::dispatch::{SynthEngine, TriggerSender};
    use crate::samples::module::ModuleChannel;
    use crate::samples::{NoteOrigin, SampleTableBuilder};

    fn module(index: usize, value: f32) -> SamplerModule {
        let mut builder = SampleTableBuilder::new();
        builder.insert(
            60,
            Arc::new(AudioBuffer::new(44100, 2, vec![value; 2 * 64])),
            NoteOrigin::Recorded,
        );
        let table = builder.finish(Arc::new(AudioBuffer::silence(44100, 2, 64)));
        SamplerModule::new(index, Arc::new(table), ModuleChannel::ModuleIndex)
    }

    #[test]
    fn test_release_frames() {
        assert_eq!(release_frames(0), 0);
        assert_eq!(release_frames(10), 441);
        assert_eq!(release_frames(1000), 44100);
    }

    #[test]
    fn test_commands_applied_before_mixing() {
        let modules = vec![module(0, 0.5), module(1, 0.25)];
        let (sender, receiver) = TriggerSender::bounded(16);
        let mut renderer = Renderer::new(&modules, 4, 0, receiver);

        sender.note_on(0, 60, 127);
        sender.note_on(1, 60, 127);
        let mut output = vec![1.0; 4 * 2];
        renderer.render(&mut output, 2);
        assert!(output.iter().all(|sample| (*sample - 0.75).abs() < 1e-6));
        assert_eq!(renderer.pool(0).map(VoicePool::active_count), Some(1));

        sender.note_off(0, 60);
        renderer.render(&mut output, 2);
        assert!(output.iter().all(|sample| (*sample - 0.25).abs() < 1e-6));
        assert_eq!(renderer.pool(0).map(VoicePool::active_count), Some(0));
    }

    #[test]
    fn test_silent_output_without_commands() {
        let modules = vec![module(0, 0.5)];
        let (_sender, receiver) = TriggerSender::bounded(16);
        let mut renderer = Renderer::new(&modules, 4, 10, receiver);

        let mut output = vec![1.0; 16];
        renderer.render(&mut output, 2);
        assert!(output.iter().all(|sample| *sample == 0.0));
    }

    #[test]
    fn test_unknown_module_ignored() {
        let modules = vec![module(0, 0.5)];
        let (sender, receiver) = TriggerSender::bounded(16);
        let mut renderer = Renderer::new(&modules, 4, 10, receiver);

        sender.note_on(3, 60, 127);
        sender.note_off(3, 60);
        let mut output = vec![0.0; 16];
        renderer.render(&mut output, 2);
        assert!(output.iter().all(|sample| *sample == 0.0));
        assert_eq!(renderer.pool(3).map(VoicePool::active_count), None);
    }
}
