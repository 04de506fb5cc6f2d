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

//! Voice management for polyphonic sample playback.
//!
//! Handles voice allocation, stealing, and note-off release. Nothing here allocates after
//! the pool is created, so it is safe to drive from the audio callback.

use std::sync::Arc;

use crate::audio::AudioBuffer;

/// The highest MIDI velocity.
const MAX_VELOCITY: f32 = 127.0;

/// A single sample playback.
struct Voice {
    note: u8,
    /// The sample being played. None when the voice is free.
    buffer: Option<Arc<AudioBuffer>>,
    /// The next frame to play.
    position: usize,
    gain: f32,
    /// Frames left in the release ramp, if the note has been released.
    release_remaining: Option<usize>,
    /// Allocation order, used to find the oldest voice to steal.
    started: u64,
}

impl Voice {
    fn free() -> Voice {
        Voice {
            note: 0,
            buffer: None,
            position: 0,
            gain: 0.0,
            release_remaining: None,
            started: 0,
        }
    }

    fn is_active(&self) -> bool {
        self.buffer.is_some()
    }

    fn stop(&mut self) {
        self.buffer = None;
        self.release_remaining = None;
    }
}

/// A fixed number of voices for one sampler module.
pub struct VoicePool {
    voices: Vec<Voice>,
    /// Length of the note off release ramp. Zero cuts the note.
    release_frames: usize,
    next_start: u64,
    /// Voices restarted because the pool was full.
    stolen: u64,
}

impl VoicePool {
    /// Creates a pool of `size` voices with a release ramp of `release_frames`.
    pub fn new(size: usize, release_frames: usize) -> VoicePool {
        VoicePool {
            voices: (0..size.max(1)).map(|_| Voice::free()).collect(),
            release_frames,
            next_start: 0,
            stolen: 0,
        }
    }

    /// Returns the number of voices in the pool.
    pub fn size(&self) -> usize {
        self.voices.len()
    }

    /// Returns the number of voices stolen since the pool was created.
    pub fn stolen_count(&self) -> u64 {
        self.stolen
    }

    /// Returns the number of sounding voices, including releasing ones.
    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|voice| voice.is_active()).count()
    }

    /// Returns true if any voice is holding the given note without being released.
    pub fn is_held(&self, note: u8) -> bool {
        self.voices
            .iter()
            .any(|voice| voice.is_active() && voice.note == note && voice.release_remaining.is_none())
    }

    /// Starts a voice. A free voice is used if there is one, otherwise the oldest voice is
    /// stolen.
    pub fn note_on(&mut self, note: u8, velocity: u8, buffer: Arc<AudioBuffer>) {
        let index = match self.voices.iter().position(|voice| !voice.is_active()) {
            Some(index) => index,
            None => {
                let index = self
                    .voices
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, voice)| voice.started)
                    .map(|(index, _)| index)
                    .unwrap_or(0);
                self.stolen += 1;
                index
            }
        };

        self.next_start += 1;
        let voice = &mut self.voices[index];
        voice.note = note;
        voice.buffer = Some(buffer);
        voice.position = 0;
        voice.gain = f32::from(velocity) / MAX_VELOCITY;
        voice.release_remaining = None;
        voice.started = self.next_start;
    }

    /// Releases every voice playing the given note.
    pub fn note_off(&mut self, note: u8) {
        for voice in self
            .voices
            .iter_mut()
            .filter(|voice| voice.is_active() && voice.note == note)
        {
            if self.release_frames == 0 {
                voice.stop();
            } else if voice.release_remaining.is_none() {
                voice.release_remaining = Some(self.release_frames);
            }
        }
    }

    /// Stops every voice immediately.
    pub fn stop_all(&mut self) {
        self.voices.iter_mut().for_each(Voice::stop);
    }

    /// Adds every sounding voice to the interleaved output. Mono outputs get the average of
    /// left and right, channels past the second are left alone.
    pub fn mix_into(&mut self, output: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }
        let release_frames = self.release_frames.max(1) as f32;

        for voice in self.voices.iter_mut() {
            let Some(buffer) = voice.buffer.as_ref() else {
                continue;
            };
            let frames = buffer.frames();
            let stereo = buffer.channels() > 1;
            let mut finished = false;

            for frame in output.chunks_exact_mut(channels) {
                if voice.position >= frames {
                    finished = true;
                    break;
                }
                let envelope = match voice.release_remaining {
                    Some(0) => {
                        finished = true;
                        break;
                    }
                    Some(remaining) => {
                        voice.release_remaining = Some(remaining - 1);
                        remaining as f32 / release_frames
                    }
                    None => 1.0,
                };

                let gain = voice.gain * envelope;
                let left = buffer.sample_at(voice.position, 0) * gain;
                let right = if stereo {
                    buffer.sample_at(voice.position, 1) * gain
                } else {
                    left
                };
                if channels == 1 {
                    frame[0] += (left + right) * 0.5;
                } else {
                    frame[0] += left;
                    frame[1] += right;
                }
                voice.position += 1;
            }

            if finished || voice.position >= frames {
                voice.stop();
            }
        }
    }
}

impl std::fmt::Debug for VoicePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoicePool")
            .field("active_voices", &self.active_count())
            .field("max_voices", &self.voices.len())
            .field("release_frames", &self.release_frames)
            .field("stolen", &self.stolen)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(value: f32, frames: usize) -> Arc<AudioBuffer> {
        Arc::new(AudioBuffer::new(44100, 2, vec![value; frames * 2]))
    }

    #[test]
    fn test_free_voices_first() {
        let mut pool = VoicePool::new(3, 0);
        pool.note_on(60, 127, constant(0.5, 100));
        pool.note_on(62, 127, constant(0.5, 100));
        assert_eq!(pool.active_count(), 2);
        assert!(pool.is_held(60));
        assert!(pool.is_held(62));
    }

    #[test]
    fn test_steal_oldest() {
        let mut pool = VoicePool::new(2, 0);
        pool.note_on(60, 127, constant(0.5, 100));
        pool.note_on(62, 127, constant(0.5, 100));
        pool.note_on(64, 127, constant(0.5, 100));

        assert_eq!(pool.active_count(), 2);
        assert!(!pool.is_held(60));
        assert!(pool.is_held(62));
        assert!(pool.is_held(64));

        pool.note_on(65, 127, constant(0.5, 100));
        assert!(!pool.is_held(62));
        assert!(pool.is_held(64));
        assert_eq!(pool.stolen_count(), 2);
    }

    #[test]
    fn test_note_off_cuts_without_release() {
        let mut pool = VoicePool::new(4, 0);
        pool.note_on(60, 127, constant(0.5, 100));
        pool.note_on(60, 127, constant(0.5, 100));
        pool.note_on(62, 127, constant(0.5, 100));

        pool.note_off(60);
        assert_eq!(pool.active_count(), 1);
        assert!(pool.is_held(62));
    }

    #[test]
    fn test_release_ramp() {
        let mut pool = VoicePool::new(1, 4);
        pool.note_on(60, 127, constant(1.0, 100));
        pool.note_off(60);
        assert!(!pool.is_held(60));
        assert_eq!(pool.active_count(), 1);

        let mut output = vec![0.0; 8 * 2];
        pool.mix_into(&mut output, 2);
        let left: Vec<f32> = output.iter().step_by(2).copied().collect();
        assert_eq!(left, vec![1.0, 0.75, 0.5, 0.25, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn test_velocity_and_end_of_sample() {
        let mut pool = VoicePool::new(1, 0);
        pool.note_on(60, 127, constant(0.5, 3));

        let mut output = vec![0.0; 5 * 2];
        pool.mix_into(&mut output, 2);
        assert_eq!(output, vec![0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(pool.active_count(), 0);

        pool.note_on(60, 0, constant(0.5, 3));
        let mut output = vec![0.0; 2];
        pool.mix_into(&mut output, 2);
        assert_eq!(output, vec![0.0, 0.0]);
    }

    #[test]
    fn test_mono_and_wide_outputs() {
        let mut pool = VoicePool::new(1, 0);
        let buffer = Arc::new(AudioBuffer::new(44100, 2, vec![1.0, 0.0, 1.0, 0.0]));
        pool.note_on(60, 127, buffer.clone());
        let mut mono = vec![0.0; 2];
        pool.mix_into(&mut mono, 1);
        assert_eq!(mono, vec![0.5, 0.5]);

        pool.note_on(60, 127, buffer);
        let mut wide = vec![0.25; 2 * 4];
        pool.mix_into(&mut wide, 4);
        assert_eq!(wide, vec![1.25, 0.25, 0.25, 0.25, 1.25, 0.25, 0.25, 0.25]);
    }

    #[test]
    fn test_stop_all() {
        let mut pool = VoicePool::new(4, 100);
        pool.note_on(60, 127, constant(0.5, 100));
        pool.note_on(61, 127, constant(0.5, 100));
        pool.stop_all();
        assert_eq!(pool.active_count(), 0);
    }
}
