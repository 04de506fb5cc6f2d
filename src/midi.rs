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
use std::{fmt, sync::Arc};

use crossbeam_channel::Sender;

mod decoder;
mod midir;
mod mock;
mod trace;
mod word;

pub use decoder::{ChannelModeMessage, Event, MidiDecoder};
pub use trace::{format_event, note_name, TraceFilter, TraceSink, TracingSink};
pub use word::MidiWord;

/// Errors from MIDI input devices.
#[derive(Debug, thiserror::Error)]
pub enum MidiError {
    #[error("unable to initialize MIDI input: {0}")]
    Init(#[from] ::midir::InitError),

    #[error("unable to read MIDI port info: {0}")]
    PortInfo(#[from] ::midir::PortInfoError),

    #[error("unable to connect to MIDI device {name}: {reason}")]
    Connect { name: String, reason: String },

    #[error("no MIDI input device found with name {name} (available: {available})")]
    NotFound { name: String, available: String },

    #[error("found too many MIDI devices that match ({0}), use a less ambiguous device name")]
    Ambiguous(String),

    #[error("already watching events on {0}")]
    AlreadyWatching(String),
}

/// A MIDI device that delivers input as packed words.
pub trait Device: fmt::Display + std::marker::Send + std::marker::Sync {
    /// Returns the name of the device.
    fn name(&self) -> String;

    /// Watches MIDI input for events and sends them to the given sender.
    fn watch_events(&self, sender: Sender<MidiWord>) -> Result<(), MidiError>;

    /// Stops watching events.
    fn stop_watch_events(&self);
}

/// Lists input devices known to midir.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, MidiError> {
    midir::list()
}

/// Gets a device with the given name. Names starting with `mock` produce a mock device.
pub fn get_device(name: &str) -> Result<Arc<dyn Device>, MidiError> {
    if name.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(name)));
    };

    Ok(Arc::new(midir::get(name)?))
}

pub mod test {
    pub use super::mock::Device;
}
