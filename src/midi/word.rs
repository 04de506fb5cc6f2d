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
use std::fmt;

/// The status byte that starts a system exclusive message.
pub const SYSEX: u8 = 0xF0;

/// The status byte that ends a system exclusive message.
pub const EOX: u8 = 0xF7;

/// A packed MIDI message of up to four bytes. The first byte is in the low eight bits.
///
/// Channel and system messages fit in a single word with the status in byte 0 and the data
/// bytes in bytes 1 and 2. System exclusive messages are spread over as many words as
/// needed, four bytes each.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MidiWord(u32);

impl MidiWord {
    pub fn new(raw: u32) -> MidiWord {
        MidiWord(raw)
    }

    /// Packs a status byte and two data bytes.
    pub fn message(status: u8, data1: u8, data2: u8) -> MidiWord {
        MidiWord::pack(&[status, data1, data2])
    }

    /// Packs up to four bytes, first byte lowest.
    pub fn pack(bytes: &[u8]) -> MidiWord {
        MidiWord(
            bytes
                .iter()
                .take(4)
                .enumerate()
                .fold(0u32, |word, (i, byte)| word | (u32::from(*byte) << (8 * i))),
        )
    }

    /// Splits a raw MIDI message into words. A system exclusive message, or a continuation
    /// of one (leading data byte), produces one word per four bytes. Anything else produces
    /// a single word from its first three bytes.
    pub fn from_message(bytes: &[u8]) -> impl Iterator<Item = MidiWord> + '_ {
        let sysex = matches!(bytes.first(), Some(&first) if first == SYSEX || first < 0x80);
        let (chunk, count) = if sysex { (4, usize::MAX) } else { (3, 1) };
        bytes.chunks(chunk).take(count).map(MidiWord::pack)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    /// Returns byte `index` (0-3) of the word.
    pub fn byte(&self, index: usize) -> u8 {
        ((self.0 >> (8 * (index & 3))) & 0xFF) as u8
    }

    pub fn status(&self) -> u8 {
        self.byte(0)
    }

    pub fn data1(&self) -> u8 {
        self.byte(1)
    }

    pub fn data2(&self) -> u8 {
        self.byte(2)
    }
}

impl fmt::Debug for MidiWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MidiWord({:08X})", self.0)
    }
}

impl From<u32> for MidiWord {
    fn from(raw: u32) -> Self {
        MidiWord(raw)
    }
}
