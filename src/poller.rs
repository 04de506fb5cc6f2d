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

//! The MIDI polling loop. It is the only writer of voice triggers.

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, TryRecvError};
use tracing::{debug, error, info, span, Level};

use crate::dispatch::{Dispatch, SynthEngine, VoiceDispatcher};
use crate::midi::{MidiDecoder, MidiWord, TraceSink};
use crate::playsync::CancelHandle;

/// How often the note rate is logged.
const NOTE_RATE_PERIOD: Duration = Duration::from_secs(1);

/// Drains MIDI words on a fixed period, decoding and dispatching each one.
pub struct MidiPoller {
    cancel_handle: CancelHandle,
    join_handle: Option<thread::JoinHandle<MidiDecoder>>,
}

impl MidiPoller {
    /// Starts the polling thread. It runs until stopped or until every sender of `words`
    /// is gone.
    pub fn start(
        words: Receiver<MidiWord>,
        mut decoder: MidiDecoder,
        dispatcher: VoiceDispatcher,
        engine: Arc<dyn SynthEngine>,
        sink: Arc<dyn TraceSink>,
        interval: Duration,
    ) -> MidiPoller {
        let cancel_handle = CancelHandle::new();
        let join_handle = {
            let cancel_handle = cancel_handle.clone();
            thread::spawn(move || {
                let span = span!(Level::INFO, "midi poller");
                let _enter = span.enter();
                info!(
                    interval = ?interval,
                    routing = ?dispatcher.routing(),
                    modules = dispatcher.module_count(),
                    "MIDI poller started"
                );

                let mut next_tick = Instant::now();
                let mut next_rate_log = next_tick + NOTE_RATE_PERIOD;
                loop {
                    if cancel_handle.is_cancelled() {
                        break;
                    }
                    if !poll(&words, &mut decoder, &dispatcher, engine.as_ref(), sink.as_ref()) {
                        info!("MIDI input closed");
                        break;
                    }

                    let now = Instant::now();
                    if now >= next_rate_log {
                        let notes = decoder.take_note_count();
                        if notes > 0 {
                            debug!(notes, "Notes received");
                        }
                        next_rate_log = now + NOTE_RATE_PERIOD;
                    }

                    next_tick += interval;
                    spin_sleep::sleep(next_tick.saturating_duration_since(Instant::now()));
                }
                decoder
            })
        };

        MidiPoller {
            cancel_handle,
            join_handle: Some(join_handle),
        }
    }

    /// Returns true while the polling thread is running.
    pub fn is_running(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_some_and(|join_handle| !join_handle.is_finished())
    }

    /// Stops the polling thread and waits for it to exit. Returns the decoder so its
    /// counters can be reported.
    pub fn stop(&mut self) -> Option<MidiDecoder> {
        self.cancel_handle.cancel();
        let join_handle = self.join_handle.take()?;
        match join_handle.join() {
            Ok(decoder) => Some(decoder),
            Err(_) => {
                error!("MIDI poller thread panicked");
                None
            }
        }
    }
}

impl Drop for MidiPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Decodes and dispatches every pending word. Returns false once the input has been
/// disconnected.
fn poll(
    words: &Receiver<MidiWord>,
    decoder: &mut MidiDecoder,
    dispatcher: &VoiceDispatcher,
    engine: &dyn SynthEngine,
    sink: &dyn TraceSink,
) -> bool {
    loop {
        match words.try_recv() {
            Ok(word) => {
                let event = decoder.decode_and_trace(word, sink);
                if let Dispatch::Hook(hook) = dispatcher.dispatch(&event, engine) {
                    info!(?hook, "Hook event received");
                }
            }
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Disconnected) => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::dispatch::{Routing, TriggerCommand, TriggerSender};
    use crate::midi::TraceFilter;
    use crate::testutil::eventually;

    #[derive(Default)]
    struct CollectingSink {
        lines: Mutex<Vec<String>>,
    }

    impl TraceSink for CollectingSink {
        fn trace(&self, line: &str) {
            self.lines.lock().push(line.to_string());
        }
    }

    #[test]
    fn test_poller_dispatches() {
        let (word_tx, word_rx) = crossbeam_channel::unbounded();
        let (engine, commands) = TriggerSender::bounded(16);
        let sink = Arc::new(CollectingSink::default());
        let mut poller = MidiPoller::start(
            word_rx,
            MidiDecoder::new(TraceFilter::default()),
            VoiceDispatcher::new(Routing::ChannelPerModule, 2),
            Arc::new(engine),
            sink.clone(),
            Duration::from_millis(1),
        );

        word_tx.send(MidiWord::message(0x91, 60, 100)).unwrap();
        word_tx.send(MidiWord::message(0x95, 60, 100)).unwrap();
        word_tx.send(MidiWord::message(0x81, 60, 0)).unwrap();

        eventually(|| commands.len() == 2, "Triggers never dispatched");
        assert_eq!(
            commands.try_recv().unwrap(),
            TriggerCommand::NoteOn {
                module: 1,
                note: 60,
                velocity: 100
            }
        );
        assert_eq!(
            commands.try_recv().unwrap(),
            TriggerCommand::NoteOff { module: 1, note: 60 }
        );
        // The ignored channel 5 note is still traced.
        assert_eq!(sink.lines.lock().len(), 3);

        let decoder = poller.stop().unwrap();
        assert_eq!(decoder.total_note_count(), 2);
        assert!(!poller.is_running());
    }

    #[test]
    fn test_poller_exits_when_input_closes() {
        let (word_tx, word_rx) = crossbeam_channel::unbounded::<MidiWord>();
        let (engine, _commands) = TriggerSender::bounded(16);
        let mut poller = MidiPoller::start(
            word_rx,
            MidiDecoder::default(),
            VoiceDispatcher::new(Routing::FixedChannel(0), 1),
            Arc::new(engine),
            Arc::new(CollectingSink::default()),
            Duration::from_millis(1),
        );

        drop(word_tx);
        eventually(|| !poller.is_running(), "Poller never exited");
        assert!(poller.stop().is_some());
    }
}
