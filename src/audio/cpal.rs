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
use std::{fmt, thread};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info, span, Level};

use super::thread_priority::{
    callback_thread_priority, configure_audio_thread_priority, rt_audio_enabled,
};
use super::{OutputError, NOMINAL_SAMPLE_RATE};
use crate::playsync::CancelHandle;
use crate::samples::Renderer;

/// Plays a renderer through the default cpal output device.
pub struct Output {
    name: String,
    channels: usize,
    cancel_handle: CancelHandle,
    /// Owns the stream, which can't leave the thread that built it.
    output_thread: Option<thread::JoinHandle<()>>,
}

impl Output {
    /// Builds and starts the output stream. Returns once the stream is playing.
    pub fn start(renderer: Renderer) -> Result<Output, OutputError> {
        let cancel_handle = CancelHandle::new();
        let (started_tx, started_rx) = crossbeam_channel::bounded(1);

        let output_thread = {
            let cancel_handle = cancel_handle.clone();
            thread::spawn(move || {
                let span = span!(Level::INFO, "audio output (cpal)");
                let _enter = span.enter();

                let stream = match build_stream(renderer) {
                    Ok((stream, name, channels)) => {
                        let _ = started_tx.send(Ok((name, channels)));
                        stream
                    }
                    Err(e) => {
                        let _ = started_tx.send(Err(e));
                        return;
                    }
                };

                // Keep the stream alive until the output is stopped.
                cancel_handle.wait();
                drop(stream);
                info!("CPAL output stream stopped");
            })
        };

        match started_rx.recv() {
            Ok(Ok((name, channels))) => Ok(Output {
                name,
                channels,
                cancel_handle,
                output_thread: Some(output_thread),
            }),
            Ok(Err(e)) => {
                let _ = output_thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = output_thread.join();
                Err(OutputError::ThreadExited)
            }
        }
    }
}

fn build_stream(mut renderer: Renderer) -> Result<(cpal::Stream, String, usize), OutputError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(OutputError::NoDevice)?;
    let name = device
        .name()
        .unwrap_or_else(|_| "default output".to_string());

    let supported = device.default_output_config()?;
    if supported.sample_format() != cpal::SampleFormat::F32 {
        return Err(OutputError::UnsupportedFormat(supported.sample_format()));
    }
    let config = cpal::StreamConfig {
        channels: supported.channels(),
        sample_rate: NOMINAL_SAMPLE_RATE,
        buffer_size: cpal::BufferSize::Default,
    };
    let channels = usize::from(config.channels);

    let priority = callback_thread_priority();
    let rt_audio = rt_audio_enabled();
    let mut priority_set = false;

    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            if let Some(priority) = priority {
                configure_audio_thread_priority(priority, rt_audio, &mut priority_set);
            }
            renderer.render(data, channels);
        },
        |err| error!("CPAL output stream error: {}", err),
        None,
    )?;
    stream.play()?;
    info!(device = name, channels, "CPAL output stream started");

    Ok((stream, name, channels))
}

impl super::Output for Output {
    fn channels(&self) -> usize {
        self.channels
    }

    fn stop(&mut self) {
        self.cancel_handle.cancel();
        if let Some(thread) = self.output_thread.take() {
            if thread.join().is_err() {
                error!("Audio output thread panicked");
            }
        }
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        super::Output::stop(self);
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Channels={})", self.name, self.channels)
    }
}
