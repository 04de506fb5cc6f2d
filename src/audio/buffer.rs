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

//! In-memory audio buffers.

use std::fmt;
use std::time::Duration;

/// The nominal sample rate every sample table is labelled with.
pub const NOMINAL_SAMPLE_RATE: u32 = 44100;

/// A contiguous block of interleaved f32 samples.
///
/// The number of samples is always `frames * channels`.
#[derive(Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: u16,
    frames: usize,
    samples: Vec<f32>,
}

impl AudioBuffer {
    /// Creates a buffer from interleaved samples. Trailing samples that don't make up a
    /// whole frame are dropped.
    pub fn new(sample_rate: u32, channels: u16, mut samples: Vec<f32>) -> AudioBuffer {
        let channel_count = usize::from(channels.max(1));
        let frames = samples.len() / channel_count;
        samples.truncate(frames * channel_count);
        AudioBuffer {
            sample_rate,
            channels: channels.max(1),
            frames,
            samples,
        }
    }

    /// Creates a buffer of silence.
    pub fn silence(sample_rate: u32, channels: u16, frames: usize) -> AudioBuffer {
        let channels = channels.max(1);
        AudioBuffer {
            sample_rate,
            channels,
            frames,
            samples: vec![0.0; frames * usize::from(channels)],
        }
    }

    /// Builds a stereo buffer from separate left and right channels. The shorter channel
    /// determines the frame count.
    pub fn from_stereo(sample_rate: u32, left: &[f32], right: &[f32]) -> AudioBuffer {
        let frames = left.len().min(right.len());
        let mut samples = Vec::with_capacity(frames * 2);
        for (l, r) in left.iter().zip(right.iter()) {
            samples.push(*l);
            samples.push(*r);
        }
        AudioBuffer {
            sample_rate,
            channels: 2,
            frames,
            samples,
        }
    }

    /// The sample rate the buffer is labelled with.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Relabels the buffer with a new sample rate without touching the samples.
    pub fn relabel(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// The interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Returns the duration of the buffer at its labelled sample rate.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames as f64 / f64::from(self.sample_rate))
    }

    /// Returns a stereo version of this buffer. Mono is duplicated into both channels,
    /// stereo is returned unchanged. Returns None for any other channel count.
    pub fn into_stereo(self) -> Option<AudioBuffer> {
        match self.channels {
            2 => Some(self),
            1 => {
                let mut samples = Vec::with_capacity(self.frames * 2);
                for sample in self.samples.iter() {
                    samples.push(*sample);
                    samples.push(*sample);
                }
                Some(AudioBuffer {
                    sample_rate: self.sample_rate,
                    channels: 2,
                    frames: self.frames,
                    samples,
                })
            }
            _ => None,
        }
    }

    /// Splits a buffer into one vector per channel.
    pub fn deinterleave(&self) -> Vec<Vec<f32>> {
        let channels = usize::from(self.channels);
        let mut planes = vec![Vec::with_capacity(self.frames); channels];
        for frame in self.samples.chunks_exact(channels) {
            for (plane, sample) in planes.iter_mut().zip(frame.iter()) {
                plane.push(*sample);
            }
        }
        planes
    }

    /// Returns the sample for the given frame and channel, or silence past the end.
    #[inline]
    pub fn sample_at(&self, frame: usize, channel: usize) -> f32 {
        if frame >= self.frames {
            return 0.0;
        }
        let channel = channel.min(usize::from(self.channels) - 1);
        self.samples[frame * usize::from(self.channels) + channel]
    }
}

impl fmt::Debug for AudioBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioBuffer")
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("frames", &self.frames)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_drops_partial_frames() {
        let buffer = AudioBuffer::new(44100, 2, vec![0.1, 0.2, 0.3, 0.4, 0.5]);
        assert_eq!(buffer.frames(), 2);
        assert_eq!(buffer.samples().len(), 4);
    }

    #[test]
    fn test_duration() {
        let buffer = AudioBuffer::silence(44100, 2, 44100 / 2);
        assert_eq!(buffer.duration(), Duration::from_millis(500));
    }

    #[test]
    fn test_mono_to_stereo() {
        let buffer = AudioBuffer::new(44100, 1, vec![0.25, -0.5, 1.0]);
        let stereo = buffer.into_stereo().expect("mono converts");
        assert_eq!(stereo.channels(), 2);
        assert_eq!(stereo.frames(), 3);
        assert_eq!(stereo.samples(), &[0.25, 0.25, -0.5, -0.5, 1.0, 1.0]);
    }

    #[test]
    fn test_three_channels_not_stereo() {
        let buffer = AudioBuffer::new(44100, 3, vec![0.0; 9]);
        assert!(buffer.into_stereo().is_none());
    }

    #[test]
    fn test_deinterleave_and_rebuild() {
        let buffer = AudioBuffer::new(44100, 2, vec![1.0, -1.0, 2.0, -2.0]);
        let planes = buffer.deinterleave();
        assert_eq!(planes[0], vec![1.0, 2.0]);
        assert_eq!(planes[1], vec![-1.0, -2.0]);

        let rebuilt = AudioBuffer::from_stereo(44100, &planes[0], &planes[1]);
        assert_eq!(rebuilt, buffer);
    }

    #[test]
    fn test_sample_at_past_end() {
        let buffer = AudioBuffer::new(44100, 2, vec![1.0, -1.0]);
        assert_eq!(buffer.sample_at(0, 1), -1.0);
        assert_eq!(buffer.sample_at(1, 0), 0.0);
    }
}
