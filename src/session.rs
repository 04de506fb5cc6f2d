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

//! A running sampler: loaded modules, audio output, MIDI input and the poller between
//! them.

use std::process::Command;
use std::sync::Arc;

use tracing::{error, info, span, warn, Level};

use crate::audio::{self, Output, OutputError};
use crate::config::{ConfigError, Hooks, Sampler};
use crate::dispatch::{TriggerSender, VoiceDispatcher};
use crate::midi::{self, MidiDecoder, MidiError, TracingSink};
use crate::poller::MidiPoller;
use crate::samples::{
    load_modules, load_silence, CompletionEngine, CompletionReport, LoadError, Renderer,
    SamplerModule,
};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unable to load samples: {0}")]
    Load(#[from] LoadError),

    #[error(transparent)]
    Midi(#[from] MidiError),

    #[error("audio output failed: {0}")]
    Output(#[from] OutputError),

    #[error("no MIDI input device configured")]
    NoMidiDevice,
}

/// A started sampler. Stop it with [`Session::stop`]; dropping it also stops it.
pub struct Session {
    midi_device: Arc<dyn midi::Device>,
    poller: MidiPoller,
    output: Box<dyn Output>,
    trigger_sender: TriggerSender,
    modules: Vec<SamplerModule>,
    reports: Vec<CompletionReport>,
    hooks: Hooks,
    stopped: bool,
}

impl Session {
    /// Starts a session with the configured MIDI device and the default audio output.
    pub fn start(config: &Sampler) -> Result<Session, SessionError> {
        let device_name = config.midi().device().ok_or(SessionError::NoMidiDevice)?;
        let midi_device = midi::get_device(device_name)?;
        Session::start_with(config, midi_device, audio::start_default_output)
    }

    /// Starts a session with the given MIDI device and output.
    pub fn start_with<F>(
        config: &Sampler,
        midi_device: Arc<dyn midi::Device>,
        start_output: F,
    ) -> Result<Session, SessionError>
    where
        F: FnOnce(Renderer) -> Result<Box<dyn Output>, OutputError>,
    {
        let span = span!(Level::INFO, "session start");
        let _enter = span.enter();

        let poll_interval = config.midi().poll_interval()?;
        let specs = config.module_specs()?;

        if let Some(command) = config.hooks().begin() {
            run_hook("begin", command);
        }

        let silence = load_silence(config.silence_file().as_deref())?;
        let engine = CompletionEngine::new(config.stage_limit());
        let routing = config.routing();
        let (modules, reports): (Vec<SamplerModule>, Vec<CompletionReport>) =
            load_modules(&specs, routing, &engine, silence)?
                .into_iter()
                .unzip();
        info!(modules = modules.len(), ?routing, "Modules loaded");

        let (trigger_sender, commands) = TriggerSender::bounded(config.command_queue_capacity());
        let renderer = Renderer::new(
            &modules,
            config.voices_per_module(),
            config.release_ms(),
            commands,
        );
        let mut output = start_output(renderer)?;
        info!(output = %output, "Audio output started");

        let (word_tx, word_rx) = crossbeam_channel::unbounded();
        if let Err(e) = midi_device.watch_events(word_tx) {
            output.stop();
            return Err(e.into());
        }
        info!(device = %midi_device, "MIDI input opened");

        let poller = MidiPoller::start(
            word_rx,
            MidiDecoder::new(config.midi().trace_filter()),
            VoiceDispatcher::new(routing, modules.len()),
            Arc::new(trigger_sender.clone()),
            Arc::new(TracingSink),
            poll_interval,
        );

        Ok(Session {
            midi_device,
            poller,
            output,
            trigger_sender,
            modules,
            reports,
            hooks: config.hooks().clone(),
            stopped: false,
        })
    }

    pub fn modules(&self) -> &[SamplerModule] {
        &self.modules
    }

    pub fn reports(&self) -> &[CompletionReport] {
        &self.reports
    }

    /// The number of triggers dropped because the renderer fell behind.
    pub fn dropped_triggers(&self) -> u64 {
        self.trigger_sender.dropped()
    }

    /// Returns true while MIDI input is being processed.
    pub fn is_running(&self) -> bool {
        !self.stopped && self.poller.is_running()
    }

    /// Stops the session. MIDI input and the poller stop before the output and the sample
    /// tables are released, then the end hook runs.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        let span = span!(Level::INFO, "session stop");
        let _enter = span.enter();

        self.midi_device.stop_watch_events();
        match self.poller.stop() {
            Some(decoder) => info!(
                notes = decoder.total_note_count(),
                clocks = decoder.clock_count(),
                active_sense = decoder.active_sense_count(),
                dropped_triggers = self.trigger_sender.dropped(),
                "MIDI input stopped"
            ),
            None => error!("MIDI poller did not stop cleanly"),
        }

        self.output.stop();
        self.modules.clear();
        info!("Audio output stopped and samples released");

        if let Some(command) = self.hooks.end() {
            run_hook("end", command);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Runs a hook command through the shell and waits for it. Failures are logged and
/// otherwise ignored.
fn run_hook(name: &str, command: &str) {
    info!(hook = name, command, "Running hook");
    let status = if cfg!(windows) {
        Command::new("cmd").args(["/C", command]).status()
    } else {
        Command::new("sh").args(["-c", command]).status()
    };
    match status {
        Ok(status) if status.success() => {}
        Ok(status) => warn!(hook = name, command, %status, "Hook command failed"),
        Err(e) => warn!(hook = name, command, err = %e, "Unable to run hook command"),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use super::*;
    use crate::audio::mock;
    use crate::testutil::{audio_test_utils::sine, eventually, write_wav};

    fn write_config(dir: &std::path::Path, extra: &str) -> Sampler {
        let folder = dir.join("piano");
        fs::create_dir_all(&folder).unwrap();
        write_wav(
            &folder.join("piano_060.wav"),
            1,
            44100,
            &sine(261.6, 44100, 44100, 0.5),
        )
        .unwrap();

        let path = dir.join("sampler.yaml");
        fs::write(
            &path,
            format!(
                "midi:\n  device: mock-keys\n  channel: 0\nmodules:\n  - folder: piano\nstage_limit: 1\n{}",
                extra
            ),
        )
        .unwrap();
        Sampler::deserialize(&path).unwrap()
    }

    #[test]
    fn test_session_plays_notes() {
        let dir = tempfile::tempdir().unwrap();
        let begin = dir.path().join("begin.txt");
        let end = dir.path().join("end.txt");
        let config = write_config(
            dir.path(),
            &format!(
                "hooks:\n  begin: touch {}\n  end: touch {}\n",
                begin.display(),
                end.display()
            ),
        );

        let device = midi::test::Device::get("mock-keys");
        let meter_slot = Arc::new(parking_lot::Mutex::new(None));
        let mut session = {
            let meter_slot = meter_slot.clone();
            Session::start_with(&config, Arc::new(device.clone()), move |renderer| {
                let output =
                    mock::Output::start("mock-out", renderer, 2, Duration::from_millis(1));
                *meter_slot.lock() = Some(output.meter());
                Ok(Box::new(output) as Box<dyn Output>)
            })
            .unwrap()
        };
        let meter = meter_slot.lock().take().unwrap();

        #[cfg(unix)]
        assert!(begin.exists());
        assert!(session.is_running());
        assert!(device.is_watching());
        assert_eq!(session.modules().len(), 1);
        assert_eq!(session.reports()[0].recorded, 1);
        assert_eq!(session.reports()[0].shifted, 24);

        assert!(device.mock_event(&[0x90, 60, 127]));
        eventually(|| meter.peak() > 0.1, "Note never reached the output");

        session.stop();
        assert!(!session.is_running());
        assert!(!device.is_watching());
        assert!(session.modules().is_empty());
        #[cfg(unix)]
        assert!(end.exists());
    }

    #[test]
    fn test_session_fails_before_starting_on_bad_samples() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path(), "");
        fs::write(dir.path().join("piano").join("broken_061.wav"), "not audio").unwrap();

        let device = midi::test::Device::get("mock-keys");
        let result = Session::start_with(&config, Arc::new(device.clone()), |_| {
            panic!("Output started after a load failure")
        });
        assert!(matches!(result, Err(SessionError::Load(_))));
        assert!(!device.is_watching());
    }

    #[test]
    fn test_session_requires_device() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("piano");
        fs::create_dir_all(&folder).unwrap();
        let config = Sampler::for_folder(&folder, "*.wav");
        assert!(matches!(
            Session::start(&config),
            Err(SessionError::NoMidiDevice)
        ));
    }
}
