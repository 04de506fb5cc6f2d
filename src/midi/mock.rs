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
use parking_lot::Mutex;
use tracing::{info, warn};

use super::{MidiError, MidiWord};

/// A mock device. Events are injected with `mock_event` instead of coming from hardware.
#[derive(Clone)]
pub struct Device {
    name: String,
    sender: Arc<Mutex<Option<Sender<MidiWord>>>>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            sender: Arc::new(Mutex::new(None)),
        }
    }

    /// Sends a raw MIDI message through to the watcher, if there is one. Returns false if
    /// nothing is watching.
    pub fn mock_event(&self, event: &[u8]) -> bool {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            warn!(device = self.name, "Mock event sent while not watching");
            return false;
        };
        MidiWord::from_message(event).all(|word| sender.send(word).is_ok())
    }

    /// Returns true while events are being watched.
    pub fn is_watching(&self) -> bool {
        self.sender.lock().is_some()
    }
}

impl super::Device for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn watch_events(&self, sender: Sender<MidiWord>) -> Result<(), MidiError> {
        let mut current = self.sender.lock();
        if current.is_some() {
            return Err(MidiError::AlreadyWatching(self.name.clone()));
        }
        info!(device = self.name, "Watching mock MIDI events.");
        *current = Some(sender);
        Ok(())
    }

    fn stop_watch_events(&self) {
        self.sender.lock().take();
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
