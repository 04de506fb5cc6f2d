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

//! Whole-file audio decoding.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::{AudioBuffer as SymphoniaBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};

use crate::audio::AudioBuffer;

use super::error::LoadError;

/// Decodes an entire audio file (WAV, FLAC, etc.) into memory at its native sample rate
/// and channel count.
pub fn decode_file(path: &Path) -> Result<AudioBuffer, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let decode_error = |source: SymphoniaError| LoadError::Decode {
        path: path.to_path_buf(),
        source,
    };

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(decode_error)?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| LoadError::NoAudioTrack {
            path: path.to_path_buf(),
        })?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let mut decoder = get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(decode_error)?;

    let mut sample_rate = params.sample_rate.unwrap_or(0);
    let mut channels = params.channels.map(|c| c.count()).unwrap_or(0);
    let mut samples: Vec<f32> = Vec::new();

    while let Some(packet) = next_packet(format_reader.as_mut()).map_err(decode_error)? {
        if packet.track_id() != track_id {
            continue;
        }
        let (decoded, decoded_channels, decoded_rate) =
            decode_packet(decoder.as_mut(), &packet).map_err(decode_error)?;
        if channels == 0 {
            channels = decoded_channels;
        }
        if sample_rate == 0 {
            sample_rate = decoded_rate;
        }
        samples.extend_from_slice(&decoded);
    }

    if channels == 0 {
        return Err(LoadError::NoAudioTrack {
            path: path.to_path_buf(),
        });
    }

    Ok(AudioBuffer::new(
        sample_rate,
        u16::try_from(channels).unwrap_or(u16::MAX),
        samples,
    ))
}

/// Reads the next packet, treating end of stream as None.
fn next_packet(format_reader: &mut dyn FormatReader) -> Result<Option<Packet>, SymphoniaError> {
    match format_reader.next_packet() {
        Ok(packet) => Ok(Some(packet)),
        Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Ok(None)
        }
        // Some readers report the end of the stream as a decode error.
        Err(SymphoniaError::DecodeError(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Decodes one packet into interleaved f32 samples, resetting the decoder once if it asks.
fn decode_packet(
    decoder: &mut dyn Decoder,
    packet: &Packet,
) -> Result<(Vec<f32>, usize, u32), SymphoniaError> {
    let decoded = match decoder.decode(packet) {
        Ok(decoded) => decoded,
        Err(SymphoniaError::ResetRequired) => {
            decoder.reset();
            decoder.decode(packet)?
        }
        Err(e) => return Err(e),
    };
    let sample_rate = decoded.spec().rate;
    let (samples, channels) = buffer_to_f32(decoded);
    Ok((samples, channels, sample_rate))
}

fn buffer_to_f32(decoded: AudioBufferRef) -> (Vec<f32>, usize) {
    match decoded {
        AudioBufferRef::F32(buf) => interleave(&buf, |sample| sample),
        AudioBufferRef::F64(buf) => interleave(&buf, |sample| sample as f32),
        AudioBufferRef::S8(buf) => interleave(&buf, scale_s8),
        AudioBufferRef::S16(buf) => interleave(&buf, scale_s16),
        AudioBufferRef::S24(buf) => interleave(&buf, |sample| scale_s24(sample.inner())),
        AudioBufferRef::S32(buf) => interleave(&buf, scale_s32),
        AudioBufferRef::U8(buf) => interleave(&buf, scale_u8),
        AudioBufferRef::U16(buf) => interleave(&buf, scale_u16),
        AudioBufferRef::U24(buf) => interleave(&buf, |sample| scale_u24(sample.inner())),
        AudioBufferRef::U32(buf) => interleave(&buf, scale_u32),
    }
}

/// Interleaves planar samples, converting each with the given closure.
fn interleave<T, F>(buf: &SymphoniaBuffer<T>, convert: F) -> (Vec<f32>, usize)
where
    T: symphonia::core::sample::Sample,
    F: Fn(T) -> f32,
{
    let frames = buf.frames();
    let channels = buf.spec().channels.count();
    let planes = buf.planes();
    let mut samples = Vec::with_capacity(frames * channels);
    for frame in 0..frames {
        for plane in planes.planes().iter().take(channels) {
            samples.push(convert(plane[frame]));
        }
    }
    (samples, channels)
}

#[inline]
fn scale_s8(sample: i8) -> f32 {
    sample as f32 / (1i64 << 7) as f32
}

#[inline]
fn scale_s16(sample: i16) -> f32 {
    sample as f32 / (1i64 << 15) as f32
}

#[inline]
fn scale_s24(sample: i32) -> f32 {
    sample as f32 / (1i64 << 23) as f32
}

#[inline]
fn scale_s32(sample: i32) -> f32 {
    sample as f32 / (1i64 << 31) as f32
}

#[inline]
fn scale_u8(sample: u8) -> f32 {
    (sample as f32 / u8::MAX as f32) * 2.0 - 1.0
}

#[inline]
fn scale_u16(sample: u16) -> f32 {
    (sample as f32 / u16::MAX as f32) * 2.0 - 1.0
}

#[inline]
fn scale_u24(sample: u32) -> f32 {
    (sample as f32 / ((1u32 << 24) - 1) as f32) * 2.0 - 1.0
}

#[inline]
fn scale_u32(sample: u32) -> f32 {
    (sample as f32 / u32::MAX as f32) * 2.0 - 1.0
}
