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
use std::path::PathBuf;

/// Errors raised while pitch-shifting a buffer.
#[derive(Debug, thiserror::Error)]
pub enum PitchShiftError {
    #[error("FFT processing failed: {0}")]
    Fft(#[from] realfft::FftError),
}

/// Errors raised while loading and completing a module's sample set. Any of these abort
/// loading of the module.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("sample folder {0} does not exist")]
    MissingFolder(PathBuf),

    #[error("unable to scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("IO error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: symphonia::core::errors::Error,
    },

    #[error("{path} has no audio track")]
    NoAudioTrack { path: PathBuf },

    #[error("{path}: sample rate {sample_rate}Hz is not supported (44100 or 48000 required)")]
    UnsupportedSampleRate { path: PathBuf, sample_rate: u32 },

    #[error("{path}: {channels} channels is not supported (mono or stereo required)")]
    UnsupportedChannels { path: PathBuf, channels: u16 },

    #[error("{path}: MIDI note unknown")]
    UnknownNote { path: PathBuf },

    #[error("pitch shift failed: {0}")]
    PitchShift(#[from] PitchShiftError),
}
