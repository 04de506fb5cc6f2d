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

//! Human readable rendering of decoded MIDI events.

use std::fmt::Write;

use tracing::info;

use super::decoder::{ChannelModeMessage, Event};
use super::word::MidiWord;

const PITCH_NAMES: [&str; 12] = [
    "c", "cs", "d", "ef", "e", "f", "fs", "g", "gs", "a", "bf", "b",
];

/// Returns the name of a note with middle C (60) as `c4`.
pub fn note_name(note: u8) -> String {
    let octave = i32::from(note) / 12 - 1;
    format!("{}{}", PITCH_NAMES[usize::from(note % 12)], octave)
}

/// Selects which kinds of events are traced. Every flag defaults to on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceFilter {
    /// Note on and note off.
    pub notes: bool,
    /// Control changes other than channel mode messages.
    pub controls: bool,
    /// Pitch bend, channel aftertouch and polyphonic aftertouch.
    pub bender: bool,
    /// Append a text description to the hex dump.
    pub verbose: bool,
    /// Realtime and time code messages.
    pub realtime: bool,
    /// Count clock and active sensing instead of tracing them.
    pub count_clock_and_sense: bool,
    /// Channel mode messages (controllers 120-127).
    pub channel_mode: bool,
    pub program_changes: bool,
}

impl Default for TraceFilter {
    fn default() -> Self {
        TraceFilter {
            notes: true,
            controls: true,
            bender: true,
            verbose: true,
            realtime: true,
            count_clock_and_sense: true,
            channel_mode: true,
            program_changes: true,
        }
    }
}

impl TraceFilter {
    /// Returns true if the event should produce a trace line.
    pub fn allows(&self, event: &Event) -> bool {
        match event {
            Event::NoteOn { .. } | Event::NoteOff { .. } => self.notes,
            Event::ControlChange { .. } => self.controls,
            Event::ChannelMode { .. } => self.channel_mode,
            Event::ProgramChange { .. } => self.program_changes,
            Event::PolyTouch { .. } | Event::ChannelTouch { .. } | Event::PitchBend { .. } => {
                self.bender
            }
            Event::TimeCodeQuarterFrame { .. }
            | Event::Start
            | Event::Continue
            | Event::Stop
            | Event::SystemReset => self.realtime,
            Event::Clock | Event::ActiveSensing => {
                !self.count_clock_and_sense && self.realtime
            }
            Event::SongPointer(_)
            | Event::SongSelect(_)
            | Event::TuneRequest
            | Event::SystemExclusive { .. }
            | Event::Unknown { .. } => true,
        }
    }
}

/// Receives trace lines from a decoder.
pub trait TraceSink: Send + Sync {
    fn trace(&self, line: &str);
}

/// Logs trace lines through tracing on the `midi_trace` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn trace(&self, line: &str) {
        info!(target: "midi_trace", "{}", line);
    }
}

/// The number of bytes of the word the event was decoded from.
fn byte_count(event: &Event) -> usize {
    match event {
        Event::ProgramChange { .. }
        | Event::ChannelTouch { .. }
        | Event::SongSelect(_)
        | Event::TimeCodeQuarterFrame { .. } => 2,
        Event::TuneRequest
        | Event::Start
        | Event::Continue
        | Event::Stop
        | Event::SystemReset
        | Event::Clock
        | Event::ActiveSensing => 1,
        Event::SystemExclusive { bytes, .. } => *bytes,
        _ => 3,
    }
}

/// Renders a trace line: the consumed bytes in hex, first byte first, followed by a
/// description when `verbose` is set.
pub fn format_event(word: MidiWord, event: &Event, verbose: bool) -> String {
    let mut line = String::with_capacity(48);
    for i in 0..byte_count(event).min(4) {
        let _ = write!(line, "{:02X}", word.byte(i));
    }
    if verbose {
        if let Some(description) = describe(event) {
            line.push(' ');
            line.push_str(&description);
        }
    }
    line
}

fn describe(event: &Event) -> Option<String> {
    let description = match event {
        Event::NoteOn { channel, key, vel } => format!(
            "NoteOn  Chan {:2} Key {:3} {:<4}Vel {}",
            channel.as_int(),
            key.as_int(),
            note_name(key.as_int()),
            vel.as_int()
        ),
        Event::NoteOff { channel, key, vel } => format!(
            "NoteOff Chan {:2} Key {:3} {:<4}Vel {}",
            channel.as_int(),
            key.as_int(),
            note_name(key.as_int()),
            vel.as_int()
        ),
        Event::ProgramChange { channel, program } => format!(
            "ProgChg Chan {:2} Prog {:2}",
            channel.as_int(),
            u16::from(program.as_int()) + 1
        ),
        Event::ControlChange {
            channel,
            controller,
            value,
        } => format!(
            "CtrlChg Chan {:2} Ctrl {:2} Val {:2}",
            channel.as_int(),
            controller.as_int(),
            value.as_int()
        ),
        Event::ChannelMode { channel, message } => {
            let channel = channel.as_int();
            match message {
                ChannelModeMessage::AllSoundOff => format!("All Sound Off, Chan {:2}", channel),
                ChannelModeMessage::ResetAllControllers => {
                    format!("Reset All Controllers, Chan {:2}", channel)
                }
                ChannelModeMessage::LocalControl(on) => format!(
                    "LocCtrl Chan {:2} {}",
                    channel,
                    if *on { "On" } else { "Off" }
                ),
                ChannelModeMessage::AllNotesOff => format!("All Off Chan {:2}", channel),
                ChannelModeMessage::OmniOff => format!("OmniOff Chan {:2}", channel),
                ChannelModeMessage::OmniOn => format!("Omni On Chan {:2}", channel),
                ChannelModeMessage::MonoOn(channels) if channels.as_int() == 0 => {
                    format!("Mono On Chan {:2} to all received channels", channel)
                }
                ChannelModeMessage::MonoOn(channels) => format!(
                    "Mono On Chan {:2} to {} received channels",
                    channel,
                    channels.as_int()
                ),
                ChannelModeMessage::PolyOn => format!("Poly On Chan {:2}", channel),
            }
        }
        Event::PolyTouch {
            channel,
            key,
            value,
        } => format!(
            "P.Touch Chan {:2} Key {:2} {:<4}Val {}",
            channel.as_int(),
            key.as_int(),
            note_name(key.as_int()),
            value.as_int()
        ),
        Event::ChannelTouch { channel, value } => format!(
            "A.Touch Chan {:2} Val {:2}",
            channel.as_int(),
            value.as_int()
        ),
        Event::PitchBend { channel, value } => format!(
            "P.Bend  Chan {:2} Val {:2}",
            channel.as_int(),
            value.as_int()
        ),
        Event::SongPointer(position) => format!("Song Position {}", position.as_int()),
        Event::SongSelect(song) => format!("Song Select {}", song.as_int()),
        Event::TuneRequest => "Tune Request".to_string(),
        Event::TimeCodeQuarterFrame {
            message_type,
            value,
        } => format!(
            "Time Code Quarter Frame Type {} Values {}",
            message_type, value
        ),
        Event::Start => "Start".to_string(),
        Event::Continue => "Continue".to_string(),
        Event::Stop => "Stop".to_string(),
        Event::SystemReset => "System Reset".to_string(),
        Event::Clock => "Clock".to_string(),
        Event::ActiveSensing => "Active Sensing".to_string(),
        Event::SystemExclusive { .. } => "System Exclusive".to_string(),
        Event::Unknown { .. } => return None,
    };
    Some(description)
}
