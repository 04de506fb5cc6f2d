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

//! Phase vocoder pitch shifting.
//!
//! Each channel is analysed with overlapping Hann-windowed frames, every bin's true
//! frequency is estimated from its phase advance, bins are moved to `k * ratio` and the
//! signal is resynthesized with overlap-add. Duration is unchanged.

use std::f32::consts::{PI, TAU};
use std::fmt;
use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::audio::AudioBuffer;

use super::error::PitchShiftError;

/// Analysis frame size in samples.
pub const DEFAULT_FRAME_SIZE: usize = 2048;

/// Number of overlapping frames per frame length.
pub const DEFAULT_OVERSAMPLING: usize = 4;

/// Returns the frequency ratio for a transposition in semitones.
pub fn semitone_ratio(semitones: i32) -> f32 {
    2f64.powf(f64::from(semitones) / 12.0) as f32
}

/// Pitch shifts audio buffers. The shifter holds only immutable FFT plans, so one
/// instance can be shared between threads; all scratch state lives in each call.
pub struct PitchShifter {
    frame_size: usize,
    oversampling: usize,
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
    window: Vec<f32>,
    output_scale: f32,
}

/// Per-channel analysis and synthesis state.
struct ChannelState {
    last_phase: Vec<f32>,
    sum_phase: Vec<f32>,
    analysis_magnitude: Vec<f32>,
    analysis_frequency: Vec<f32>,
    synthesis_magnitude: Vec<f32>,
    synthesis_frequency: Vec<f32>,
    frame: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    resynthesized: Vec<f32>,
}

impl PitchShifter {
    /// Creates a pitch shifter with a 2048 sample frame and 4x oversampling.
    pub fn new() -> PitchShifter {
        PitchShifter::with_frame_size(DEFAULT_FRAME_SIZE, DEFAULT_OVERSAMPLING)
    }

    /// Creates a pitch shifter with the given frame size and oversampling factor. The frame
    /// size should be a power of two divisible by the oversampling factor.
    pub fn with_frame_size(frame_size: usize, oversampling: usize) -> PitchShifter {
        let frame_size = frame_size.max(4);
        let oversampling = oversampling.clamp(1, frame_size);

        let mut planner = RealFftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(frame_size);
        let inverse = planner.plan_fft_inverse(frame_size);

        let window: Vec<f32> = (0..frame_size)
            .map(|k| 0.5 - 0.5 * (TAU * k as f32 / frame_size as f32).cos())
            .collect();

        // The analysis and synthesis windows overlap-add to a constant. Divide it out along
        // with the unnormalized inverse transform so an unshifted signal passes at unity gain.
        let step = frame_size / oversampling;
        let overlap = window.iter().map(|w| w * w).sum::<f32>() / step as f32;
        let output_scale = 1.0 / (frame_size as f32 * overlap);

        PitchShifter {
            frame_size,
            oversampling,
            forward,
            inverse,
            window,
            output_scale,
        }
    }

    /// The number of samples the vocoder lags its input by. Output is compensated for
    /// this, so callers never see it.
    pub fn latency(&self) -> usize {
        self.frame_size - self.step()
    }

    fn step(&self) -> usize {
        self.frame_size / self.oversampling
    }

    /// Shifts the buffer from the source note to the target note. Each channel is shifted
    /// independently. The output has the same sample rate, channel count and frame count
    /// as the input.
    pub fn shift(
        &self,
        buffer: &AudioBuffer,
        source_note: u8,
        target_note: u8,
    ) -> Result<AudioBuffer, PitchShiftError> {
        let semitones = i32::from(target_note) - i32::from(source_note);
        if semitones == 0 {
            return Ok(buffer.clone());
        }
        self.shift_by_ratio(buffer, semitone_ratio(semitones))
    }

    /// Shifts the buffer by an arbitrary frequency ratio.
    pub fn shift_by_ratio(
        &self,
        buffer: &AudioBuffer,
        ratio: f32,
    ) -> Result<AudioBuffer, PitchShiftError> {
        let planes = buffer
            .deinterleave()
            .iter()
            .map(|plane| self.shift_channel(plane, ratio))
            .collect::<Result<Vec<Vec<f32>>, PitchShiftError>>()?;

        let channels = planes.len();
        let mut samples = Vec::with_capacity(buffer.frames() * channels);
        for frame in 0..buffer.frames() {
            for plane in planes.iter() {
                samples.push(plane[frame]);
            }
        }

        Ok(AudioBuffer::new(
            buffer.sample_rate(),
            buffer.channels(),
            samples,
        ))
    }

    /// Runs one channel through the vocoder. The input is fed through a FIFO one sample at
    /// a time and a frame is processed every `step` samples. The input is padded by the
    /// latency and the first `latency` output samples are dropped.
    fn shift_channel(&self, input: &[f32], ratio: f32) -> Result<Vec<f32>, PitchShiftError> {
        let frame_size = self.frame_size;
        let step = self.step();
        let latency = self.latency();

        let mut state = self.channel_state();
        let mut in_fifo = vec![0.0f32; frame_size];
        let mut out_fifo = vec![0.0f32; step];
        let mut accumulator = vec![0.0f32; frame_size];
        let mut rover = latency;

        let mut output = Vec::with_capacity(input.len());
        for i in 0..input.len() + latency {
            in_fifo[rover] = input.get(i).copied().unwrap_or(0.0);
            if i >= latency {
                output.push(out_fifo[rover - latency]);
            }
            rover += 1;

            if rover >= frame_size {
                rover = latency;
                self.process_frame(&mut state, &in_fifo, &mut accumulator, ratio)?;

                out_fifo.copy_from_slice(&accumulator[..step]);
                accumulator.copy_within(step.., 0);
                accumulator[frame_size - step..].fill(0.0);
                in_fifo.copy_within(step.., 0);
            }
        }

        Ok(output)
    }

    fn channel_state(&self) -> ChannelState {
        let bins = self.frame_size / 2 + 1;
        ChannelState {
            last_phase: vec![0.0; bins],
            sum_phase: vec![0.0; bins],
            analysis_magnitude: vec![0.0; bins],
            analysis_frequency: vec![0.0; bins],
            synthesis_magnitude: vec![0.0; bins],
            synthesis_frequency: vec![0.0; bins],
            frame: self.forward.make_input_vec(),
            spectrum: self.forward.make_output_vec(),
            resynthesized: self.inverse.make_output_vec(),
        }
    }

    /// Analyses one frame, moves its bins and adds the resynthesized frame into the
    /// accumulator. Frequencies are tracked in bins, so the sample rate cancels out.
    fn process_frame(
        &self,
        state: &mut ChannelState,
        in_fifo: &[f32],
        accumulator: &mut [f32],
        ratio: f32,
    ) -> Result<(), PitchShiftError> {
        let half = self.frame_size / 2;
        let oversampling = self.oversampling as f32;
        let expected = TAU * self.step() as f32 / self.frame_size as f32;

        for ((dst, sample), window) in state
            .frame
            .iter_mut()
            .zip(in_fifo.iter())
            .zip(self.window.iter())
        {
            *dst = sample * window;
        }
        self.forward.process(&mut state.frame, &mut state.spectrum)?;

        // Analysis.
        for k in 0..=half {
            let bin = state.spectrum[k];
            let phase = bin.arg();
            let mut delta = phase - state.last_phase[k];
            state.last_phase[k] = phase;

            delta -= k as f32 * expected;
            delta = wrap_phase(delta);

            state.analysis_magnitude[k] = bin.norm();
            state.analysis_frequency[k] = k as f32 + oversampling * delta / TAU;
        }

        // Shift.
        state.synthesis_magnitude.fill(0.0);
        state.synthesis_frequency.fill(0.0);
        for k in 0..=half {
            let index = (k as f32 * ratio) as usize;
            if index <= half {
                state.synthesis_magnitude[index] += state.analysis_magnitude[k];
                state.synthesis_frequency[index] = state.analysis_frequency[k] * ratio;
            }
        }

        // Synthesis.
        for k in 0..=half {
            let deviation = state.synthesis_frequency[k] - k as f32;
            let advance = TAU * deviation / oversampling + k as f32 * expected;
            state.sum_phase[k] = (state.sum_phase[k] + advance).rem_euclid(TAU);
            state.spectrum[k] =
                Complex::from_polar(state.synthesis_magnitude[k], state.sum_phase[k]);
        }
        state.spectrum[0].im = 0.0;
        state.spectrum[half].im = 0.0;

        self.inverse
            .process(&mut state.spectrum, &mut state.resynthesized)?;

        for ((acc, sample), window) in accumulator
            .iter_mut()
            .zip(state.resynthesized.iter())
            .zip(self.window.iter())
        {
            *acc += window * sample * self.output_scale;
        }

        Ok(())
    }
}

impl Default for PitchShifter {
    fn default() -> Self {
        PitchShifter::new()
    }
}

impl fmt::Debug for PitchShifter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PitchShifter")
            .field("frame_size", &self.frame_size)
            .field("oversampling", &self.oversampling)
            .finish()
    }
}

/// Maps a phase difference into [-PI, PI].
fn wrap_phase(delta: f32) -> f32 {
    let mut qpd = (delta / PI) as i64;
    if qpd >= 0 {
        qpd += qpd & 1;
    } else {
        qpd -= qpd & 1;
    }
    delta - PI * qpd as f32
}
