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
use std::{
    fmt,
    sync::{
        atomic::{AtomicU32, AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use tracing::{info, span, Level};

use crate::playsync::CancelHandle;
use crate::samples::Renderer;

const BLOCK_FRAMES: usize = 256;

/// Measurements of what a mock output has rendered.
#[derive(Clone, Default)]
pub struct Meter {
    blocks: Arc<AtomicU64>,
    /// Peak absolute sample value, stored as f32 bits.
    peak: Arc<AtomicU32>,
}

impl Meter {
    /// The number of blocks rendered so far.
    pub fn blocks(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }

    /// The loudest sample rendered since the last reset.
    pub fn peak(&self) -> f32 {
        f32::from_bits(self.peak.load(Ordering::Relaxed))
    }

    pub fn reset_peak(&self) {
        self.peak.store(0.0f32.to_bits(), Ordering::Relaxed);
    }

    fn record(&self, block: &[f32]) {
        let peak = block.iter().fold(0.0f32, |peak, sample| peak.max(sample.abs()));
        if peak > self.peak() {
            self.peak.store(peak.to_bits(), Ordering::Relaxed);
        }
        self.blocks.fetch_add(1, Ordering::Relaxed);
    }
}

/// A mock output. Renders on a timer instead of an audio callback and throws the audio
/// away after metering it.
pub struct Output {
    name: String,
    channels: usize,
    meter: Meter,
    cancel_handle: CancelHandle,
    render_thread: Option<thread::JoinHandle<()>>,
}

impl Output {
    /// Starts rendering a block every `period`.
    pub fn start(name: &str, mut renderer: Renderer, channels: usize, period: Duration) -> Output {
        let meter = Meter::default();
        let cancel_handle = CancelHandle::new();

        let render_thread = {
            let meter = meter.clone();
            let cancel_handle = cancel_handle.clone();
            let name = name.to_string();
            thread::spawn(move || {
                let span = span!(Level::INFO, "audio output (mock)");
                let _enter = span.enter();
                info!(device = name, channels, "Mock output started");

                let mut block = vec![0.0f32; BLOCK_FRAMES * channels];
                while !cancel_handle.wait_timeout(period) {
                    renderer.render(&mut block, channels);
                    meter.record(&block);
                }
            })
        };

        Output {
            name: name.to_string(),
            channels,
            meter,
            cancel_handle,
            render_thread: Some(render_thread),
        }
    }

    pub fn meter(&self) -> Meter {
        self.meter.clone()
    }
}

impl super::Output for Output {
    fn channels(&self) -> usize {
        self.channels
    }

    fn stop(&mut self) {
        self.cancel_handle.cancel();
        if let Some(thread) = self.render_thread.take() {
            let _ = thread.join();
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
        write!(f, "{} (Mock)", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::super::Output as _;
    use super::*;
    use crate::audio::AudioBuffer;
    use crate::dispatch::{SynthEngine, TriggerSender};
    use crate::samples::{ModuleChannel, NoteOrigin, SampleTableBuilder, SamplerModule};
    use crate::testutil::eventually;

    #[test]
    fn test_mock_output_renders() {
        let mut builder = SampleTableBuilder::new();
        builder.insert(
            60,
            Arc::new(AudioBuffer::new(44100, 2, vec![0.5; 2 * 44100])),
            NoteOrigin::Recorded,
        );
        let table = Arc::new(builder.finish(Arc::new(AudioBuffer::silence(44100, 2, 16))));
        let modules = vec![SamplerModule::new(0, table, ModuleChannel::Fixed(0))];
        let (sender, receiver) = TriggerSender::bounded(16);
        let renderer = Renderer::new(&modules, 4, 10, receiver);

        let mut output = Output::start("mock-out", renderer, 2, Duration::from_millis(1));
        let meter = output.meter();
        eventually(|| meter.blocks() > 0, "Mock output never rendered");
        assert_eq!(meter.peak(), 0.0);

        sender.note_on(0, 60, 127);
        eventually(|| meter.peak() > 0.4, "Note never reached the output");

        output.stop();
        let blocks = meter.blocks();
        thread::sleep(Duration::from_millis(10));
        assert_eq!(meter.blocks(), blocks);
        assert_eq!(output.to_string(), "mock-out (Mock)");
    }
}
