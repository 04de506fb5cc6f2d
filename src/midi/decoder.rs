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

//! Decoding of packed MIDI words into events.
//!
//! The decoder is a two state machine. In the normal state each word is one message. Once
//! a system exclusive message starts, every following word is sysex data until a word
//! containing the end of exclusive byte is seen.

use midly::num::{u14, u4, u7};

use super::trace::{format_event, TraceFilter, TraceSink};
use super::word::{MidiWord, EOX, SYSEX};

/// First controller number that is a channel mode message.
const FIRST_CHANNEL_MODE_CONTROLLER: u8 = 0x78;

/// Channel mode messages, sent as controllers 120-127.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelModeMessage {
    AllSoundOff,
    ResetAllControllers,
    LocalControl(bool),
    AllNotesOff,
    OmniOff,
    OmniOn,
    /// Mono mode for the given number of channels, zero meaning all.
    MonoOn(u7),
    PolyOn,
}

/// A decoded MIDI event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    NoteOn { channel: u4, key: u7, vel: u7 },
    /// A note off, or a note on with zero velocity.
    NoteOff { channel: u4, key: u7, vel: u7 },
    ControlChange { channel: u4, controller: u7, value: u7 },
    ChannelMode { channel: u4, message: ChannelModeMessage },
    ProgramChange { channel: u4, program: u7 },
    PolyTouch { channel: u4, key: u7, value: u7 },
    ChannelTouch { channel: u4, value: u7 },
    PitchBend { channel: u4, value: u14 },
    SongPointer(u14),
    SongSelect(u7),
    TuneRequest,
    TimeCodeQuarterFrame { message_type: u8, value: u8 },
    Start,
    Continue,
    Stop,
    SystemReset,
    Clock,
    ActiveSensing,
    /// A word of a system exclusive message. `complete` is set on the word that holds the
    /// end of exclusive byte, which is included in `bytes`.
    SystemExclusive { bytes: usize, complete: bool },
    /// An undefined status byte or a stray data byte.
    Unknown { status: u8 },
}

/// Decodes MIDI words for a single input connection.
#[derive(Debug, Clone)]
pub struct MidiDecoder {
    filter: TraceFilter,
    in_sysex: bool,
    clock_count: u64,
    active_sense_count: u64,
    note_count: u64,
    total_note_count: u64,
}

impl MidiDecoder {
    pub fn new(filter: TraceFilter) -> MidiDecoder {
        MidiDecoder {
            filter,
            in_sysex: false,
            clock_count: 0,
            active_sense_count: 0,
            note_count: 0,
            total_note_count: 0,
        }
    }

    pub fn filter(&self) -> &TraceFilter {
        &self.filter
    }

    /// Returns true while in the middle of a system exclusive message.
    pub fn in_sysex(&self) -> bool {
        self.in_sysex
    }

    /// Returns the number of note ons seen since the last call.
    pub fn take_note_count(&mut self) -> u64 {
        std::mem::take(&mut self.note_count)
    }

    /// Returns the number of note ons seen since the decoder was created or reset.
    pub fn total_note_count(&self) -> u64 {
        self.total_note_count
    }

    pub fn clock_count(&self) -> u64 {
        self.clock_count
    }

    pub fn active_sense_count(&self) -> u64 {
        self.active_sense_count
    }

    /// Returns the decoder to the normal state and clears the counters.
    pub fn reset(&mut self) {
        *self = MidiDecoder::new(self.filter);
    }

    /// Decodes a word, updating the sysex state and counters.
    pub fn decode(&mut self, word: MidiWord) -> Event {
        if self.in_sysex || word.status() == SYSEX {
            return self.decode_sysex(word);
        }

        let status = word.status();
        let channel = u4::from(status & 0x0F);
        let data1 = u7::from(word.data1());
        let data2 = u7::from(word.data2());

        match status & 0xF0 {
            0x80 => Event::NoteOff {
                channel,
                key: data1,
                vel: data2,
            },
            0x90 if data2.as_int() == 0 => Event::NoteOff {
                channel,
                key: data1,
                vel: data2,
            },
            0x90 => {
                self.note_count += 1;
                self.total_note_count += 1;
                Event::NoteOn {
                    channel,
                    key: data1,
                    vel: data2,
                }
            }
            0xA0 => Event::PolyTouch {
                channel,
                key: data1,
                value: data2,
            },
            0xB0 if data1.as_int() >= FIRST_CHANNEL_MODE_CONTROLLER => Event::ChannelMode {
                channel,
                message: channel_mode(data1.as_int(), data2),
            },
            0xB0 => Event::ControlChange {
                channel,
                controller: data1,
                value: data2,
            },
            0xC0 => Event::ProgramChange {
                channel,
                program: data1,
            },
            0xD0 => Event::ChannelTouch {
                channel,
                value: data1,
            },
            0xE0 => Event::PitchBend {
                channel,
                value: combine(data1, data2),
            },
            0xF0 => self.decode_system(status, data1, data2),
            _ => Event::Unknown { status },
        }
    }

    /// Decodes a word and sends its trace line, if any, to the sink.
    pub fn decode_and_trace(&mut self, word: MidiWord, sink: &dyn TraceSink) -> Event {
        let event = self.decode(word);
        if let Some(line) = self.trace(word, &event) {
            sink.trace(&line);
        }
        event
    }

    /// Renders the trace line for an event decoded from the word, or None if the filter
    /// suppresses it.
    pub fn trace(&self, word: MidiWord, event: &Event) -> Option<String> {
        self.filter
            .allows(event)
            .then(|| format_event(word, event, self.filter.verbose))
    }

    fn decode_sysex(&mut self, word: MidiWord) -> Event {
        match (0..4).find(|i| word.byte(*i) == EOX) {
            Some(end) => {
                self.in_sysex = false;
                Event::SystemExclusive {
                    bytes: end + 1,
                    complete: true,
                }
            }
            None => {
                self.in_sysex = true;
                Event::SystemExclusive {
                    bytes: 4,
                    complete: false,
                }
            }
        }
    }

    fn decode_system(&mut self, status: u8, data1: u7, data2: u7) -> Event {
        match status {
            0xF1 => Event::TimeCodeQuarterFrame {
                message_type: (data1.as_int() & 0x70) >> 4,
                value: data1.as_int() & 0x0F,
            },
            0xF2 => Event::SongPointer(combine(data1, data2)),
            0xF3 => Event::SongSelect(data1),
            0xF6 => Event::TuneRequest,
            0xF8 => {
                if self.filter.count_clock_and_sense {
                    self.clock_count += 1;
                }
                Event::Clock
            }
            0xFA => Event::Start,
            0xFB => Event::Continue,
            0xFC => Event::Stop,
            0xFE => {
                if self.filter.count_clock_and_sense {
                    self.active_sense_count += 1;
                }
                Event::ActiveSensing
            }
            0xFF => Event::SystemReset,
            _ => Event::Unknown { status },
        }
    }
}

impl Default for MidiDecoder {
    fn default() -> Self {
        MidiDecoder::new(TraceFilter::default())
    }
}

/// Combines two 7 bit data bytes, least significant first.
fn combine(lsb: u7, msb: u7) -> u14 {
    u14::from(u16::from(lsb.as_int()) | (u16::from(msb.as_int()) << 7))
}

fn channel_mode(controller: u8, value: u7) -> ChannelModeMessage {
    match controller {
        0x78 => ChannelModeMessage::AllSoundOff,
        0x79 => ChannelModeMessage::ResetAllControllers,
        0x7A => ChannelModeMessage::LocalControl(value.as_int() != 0),
        0x7B => ChannelModeMessage::AllNotesOff,
        0x7C => ChannelModeMessage::OmniOff,
        0x7D => ChannelModeMessage::OmniOn,
        0x7E => ChannelModeMessage::MonoOn(value),
        _ => ChannelModeMessage::PolyOn,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use midly::{live::LiveEvent, MidiMessage};

    use super::*;

    #[derive(Default)]
    struct CollectingSink {
        lines: Mutex<Vec<String>>,
    }

    impl TraceSink for CollectingSink {
        fn trace(&self, line: &str) {
            self.lines.lock().unwrap().push(line.to_string());
        }
    }

    fn word(event: LiveEvent) -> MidiWord {
        let mut buf = Vec::new();
        event.write(&mut buf).unwrap();
        MidiWord::pack(&buf)
    }

    fn midi(channel: u8, message: MidiMessage) -> MidiWord {
        word(LiveEvent::Midi {
            channel: u4::from(channel),
            message,
        })
    }

    #[test]
    fn test_note_on() {
        let mut decoder = MidiDecoder::default();
        let event = decoder.decode(midi(
            0,
            MidiMessage::NoteOn {
                key: u7::from(60),
                vel: u7::from(100),
            },
        ));
        assert_eq!(
            event,
            Event::NoteOn {
                channel: u4::from(0),
                key: u7::from(60),
                vel: u7::from(100)
            }
        );
        assert_eq!(decoder.total_note_count(), 1);
    }

    #[test]
    fn test_note_on_zero_velocity_is_note_off() {
        let mut decoder = MidiDecoder::default();
        // Built by hand since midly normalizes zero velocity note ons.
        let event = decoder.decode(MidiWord::message(0x90, 60, 0));
        assert_eq!(
            event,
            Event::NoteOff {
                channel: u4::from(0),
                key: u7::from(60),
                vel: u7::from(0)
            }
        );
        assert_eq!(decoder.total_note_count(), 0);
    }

    #[test]
    fn test_note_off() {
        let mut decoder = MidiDecoder::default();
        let event = decoder.decode(midi(
            9,
            MidiMessage::NoteOff {
                key: u7::from(36),
                vel: u7::from(64),
            },
        ));
        assert_eq!(
            event,
            Event::NoteOff {
                channel: u4::from(9),
                key: u7::from(36),
                vel: u7::from(64)
            }
        );
    }

    #[test]
    fn test_all_notes_off_is_channel_mode() {
        let mut decoder = MidiDecoder::default();
        let event = decoder.decode(midi(
            3,
            MidiMessage::Controller {
                controller: u7::from(123),
                value: u7::from(0),
            },
        ));
        assert_eq!(
            event,
            Event::ChannelMode {
                channel: u4::from(3),
                message: ChannelModeMessage::AllNotesOff
            }
        );
    }

    #[test]
    fn test_channel_mode_messages() {
        let mut decoder = MidiDecoder::default();
        let expected = [
            (0x78, 0, ChannelModeMessage::AllSoundOff),
            (0x79, 0, ChannelModeMessage::ResetAllControllers),
            (0x7A, 127, ChannelModeMessage::LocalControl(true)),
            (0x7A, 0, ChannelModeMessage::LocalControl(false)),
            (0x7C, 0, ChannelModeMessage::OmniOff),
            (0x7D, 0, ChannelModeMessage::OmniOn),
            (0x7E, 2, ChannelModeMessage::MonoOn(u7::from(2))),
            (0x7F, 0, ChannelModeMessage::PolyOn),
        ];
        for (controller, value, message) in expected {
            let event = decoder.decode(MidiWord::message(0xB0, controller, value));
            assert_eq!(
                event,
                Event::ChannelMode {
                    channel: u4::from(0),
                    message
                }
            );
        }
    }

    #[test]
    fn test_control_change() {
        let mut decoder = MidiDecoder::default();
        let event = decoder.decode(MidiWord::message(0xB5, 7, 100));
        assert_eq!(
            event,
            Event::ControlChange {
                channel: u4::from(5),
                controller: u7::from(7),
                value: u7::from(100)
            }
        );
    }

    #[test]
    fn test_channel_messages() {
        let mut decoder = MidiDecoder::default();
        assert_eq!(
            decoder.decode(midi(
                1,
                MidiMessage::ProgramChange {
                    program: u7::from(4)
                }
            )),
            Event::ProgramChange {
                channel: u4::from(1),
                program: u7::from(4)
            }
        );
        assert_eq!(
            decoder.decode(midi(
                1,
                MidiMessage::ChannelAftertouch {
                    vel: u7::from(30)
                }
            )),
            Event::ChannelTouch {
                channel: u4::from(1),
                value: u7::from(30)
            }
        );
        assert_eq!(
            decoder.decode(midi(
                1,
                MidiMessage::Aftertouch {
                    key: u7::from(60),
                    vel: u7::from(31)
                }
            )),
            Event::PolyTouch {
                channel: u4::from(1),
                key: u7::from(60),
                value: u7::from(31)
            }
        );
        assert_eq!(
            decoder.decode(MidiWord::message(0xE1, 0x01, 0x40)),
            Event::PitchBend {
                channel: u4::from(1),
                value: u14::from(8193)
            }
        );
    }

    #[test]
    fn test_system_common() {
        let mut decoder = MidiDecoder::default();
        assert_eq!(
            decoder.decode(MidiWord::message(0xF2, 0x10, 0x01)),
            Event::SongPointer(u14::from(0x90))
        );
        assert_eq!(
            decoder.decode(MidiWord::message(0xF3, 3, 0)),
            Event::SongSelect(u7::from(3))
        );
        assert_eq!(
            decoder.decode(MidiWord::message(0xF1, 0x35, 0)),
            Event::TimeCodeQuarterFrame {
                message_type: 3,
                value: 5
            }
        );
        assert_eq!(
            decoder.decode(MidiWord::message(0xF6, 0, 0)),
            Event::TuneRequest
        );
        assert_eq!(
            decoder.decode(MidiWord::message(0xF4, 0, 0)),
            Event::Unknown { status: 0xF4 }
        );
        assert_eq!(
            decoder.decode(MidiWord::message(0x40, 0, 0)),
            Event::Unknown { status: 0x40 }
        );
        assert_eq!(decoder.decode(MidiWord::message(0xFA, 0, 0)), Event::Start);
        assert_eq!(
            decoder.decode(MidiWord::message(0xFB, 0, 0)),
            Event::Continue
        );
        assert_eq!(decoder.decode(MidiWord::message(0xFC, 0, 0)), Event::Stop);
        assert_eq!(
            decoder.decode(MidiWord::message(0xFF, 0, 0)),
            Event::SystemReset
        );
    }

    #[test]
    fn test_sysex_split_across_messages() {
        let mut decoder = MidiDecoder::default();
        let mut events: Vec<Event> = MidiWord::from_message(&[0xF0, 0x43, 0x12, 0x00])
            .map(|word| decoder.decode(word))
            .collect();
        assert!(decoder.in_sysex());

        events.extend(
            MidiWord::from_message(&[0x01, 0x02, 0x03, 0x04, EOX]).map(|word| decoder.decode(word)),
        );
        assert_eq!(
            events.last(),
            Some(&Event::SystemExclusive {
                bytes: 1,
                complete: true
            })
        );
        assert!(!decoder.in_sysex());

        let note: Vec<Event> = MidiWord::from_message(&[0x90, 60, 100])
            .map(|word| decoder.decode(word))
            .collect();
        assert!(matches!(note[..], [Event::NoteOn { .. }]));
    }

    #[test]
    fn test_sysex_continuation() {
        let mut decoder = MidiDecoder::default();
        let words: Vec<MidiWord> =
            MidiWord::from_message(&[0xF0, 0x43, 0x12, 0x00, 0x01, 0x02, 0x03, 0x04, 0xF7])
                .collect();
        assert_eq!(words.len(), 3);

        assert_eq!(
            decoder.decode(words[0]),
            Event::SystemExclusive {
                bytes: 4,
                complete: false
            }
        );
        assert!(decoder.in_sysex());
        assert_eq!(
            decoder.decode(words[1]),
            Event::SystemExclusive {
                bytes: 4,
                complete: false
            }
        );
        assert_eq!(
            decoder.decode(words[2]),
            Event::SystemExclusive {
                bytes: 1,
                complete: true
            }
        );
        assert!(!decoder.in_sysex());

        // Back to normal decoding.
        assert!(matches!(
            decoder.decode(MidiWord::message(0x90, 60, 100)),
            Event::NoteOn { .. }
        ));
    }

    #[test]
    fn test_realtime_inside_sysex_is_sysex_data() {
        let mut decoder = MidiDecoder::default();
        decoder.decode(MidiWord::pack(&[0xF0, 0x01, 0x02, 0x03]));
        assert_eq!(
            decoder.decode(MidiWord::message(0xF8, 0, 0)),
            Event::SystemExclusive {
                bytes: 4,
                complete: false
            }
        );
        assert_eq!(decoder.clock_count(), 0);
    }

    #[test]
    fn test_short_sysex() {
        let mut decoder = MidiDecoder::default();
        assert_eq!(
            decoder.decode(MidiWord::pack(&[0xF0, 0x7D, EOX])),
            Event::SystemExclusive {
                bytes: 3,
                complete: true
            }
        );
        assert!(!decoder.in_sysex());
    }

    #[test]
    fn test_clock_and_sense_counting() {
        let mut decoder = MidiDecoder::default();
        for _ in 0..24 {
            assert_eq!(decoder.decode(MidiWord::message(0xF8, 0, 0)), Event::Clock);
        }
        decoder.decode(MidiWord::message(0xFE, 0, 0));
        assert_eq!(decoder.clock_count(), 24);
        assert_eq!(decoder.active_sense_count(), 1);

        let mut decoder = MidiDecoder::new(TraceFilter {
            count_clock_and_sense: false,
            ..TraceFilter::default()
        });
        decoder.decode(MidiWord::message(0xF8, 0, 0));
        assert_eq!(decoder.clock_count(), 0);
    }

    #[test]
    fn test_note_counts() {
        let mut decoder = MidiDecoder::default();
        decoder.decode(MidiWord::message(0x90, 60, 100));
        decoder.decode(MidiWord::message(0x90, 62, 100));
        decoder.decode(MidiWord::message(0x80, 60, 0));
        assert_eq!(decoder.take_note_count(), 2);
        assert_eq!(decoder.take_note_count(), 0);
        decoder.decode(MidiWord::message(0x91, 64, 1));
        assert_eq!(decoder.take_note_count(), 1);
        assert_eq!(decoder.total_note_count(), 3);

        decoder.reset();
        assert_eq!(decoder.total_note_count(), 0);
    }

    #[test]
    fn test_trace_gating() {
        let sink = CollectingSink::default();
        let mut decoder = MidiDecoder::new(TraceFilter {
            controls: false,
            ..TraceFilter::default()
        });

        decoder.decode_and_trace(MidiWord::message(0x90, 60, 100), &sink);
        decoder.decode_and_trace(MidiWord::message(0xB0, 7, 100), &sink);
        decoder.decode_and_trace(MidiWord::message(0xF8, 0, 0), &sink);
        decoder.decode_and_trace(MidiWord::message(0xF6, 0, 0), &sink);

        let lines = sink.lines.lock().unwrap();
        assert_eq!(
            *lines,
            vec![
                "903C64 NoteOn  Chan  0 Key  60 c4  Vel 100".to_string(),
                "F6 Tune Request".to_string(),
            ]
        );
    }

    #[test]
    fn test_trace_sysex() {
        let sink = CollectingSink::default();
        let mut decoder = MidiDecoder::default();
        for word in MidiWord::from_message(&[0xF0, 0x7E, 0x7F, 0x06, 0x01, EOX]) {
            decoder.decode_and_trace(word, &sink);
        }
        let lines = sink.lines.lock().unwrap();
        assert_eq!(
            *lines,
            vec![
                "F07E7F06 System Exclusive".to_string(),
                "01F7 System Exclusive".to_string(),
            ]
        );
    }
}
