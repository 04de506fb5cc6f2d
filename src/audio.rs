// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
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

use crate::samples::Renderer;

mod buffer;
pub mod cpal;
pub mod mock;
pub mod thread_priority;

pub use buffer::{AudioBuffer, NOMINAL_SAMPLE_RATE};

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("no default audio output device")]
    NoDevice,

    #[error("unable to get the output configuration: {0}")]
    DefaultConfig(#[from] ::cpal::DefaultStreamConfigError),

    #[error("unsupported output sample format {0}, only f32 is supported")]
    UnsupportedFormat(::cpal::SampleFormat),

    #[error("unable to build the output stream: {0}")]
    Build(#[from] ::cpal::BuildStreamError),

    #[error("unable to start the output stream: {0}")]
    Play(#[from] ::cpal::PlayStreamError),

    #[error("the output thread exited before the stream started")]
    ThreadExited,
}

/// A running audio output that pulls audio from a renderer.
pub trait Output: fmt::Display + Send {
    /// The number of interleaved output channels.
    fn channels(&self) -> usize;

    /// Stops the output and releases the renderer. Safe to call more than once.
    fn stop(&mut self);
}

/// Starts output on the default audio device.
pub fn start_default_output(renderer: Renderer) -> Result<Box<dyn Output>, OutputError> {
    Ok(Box::new(cpal::Output::start(renderer)?))
}
