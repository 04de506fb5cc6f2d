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
use std::{fmt, mem};

use crossbeam_channel::Sender;
use midir::{MidiInput, MidiInputConnection, MidiInputPort};
use parking_lot::Mutex;
use tracing::{error, info, span, trace, Level};

use super::{MidiError, MidiWord};

pub struct Device {
    name: String,
    input_port: MidiInputPort,
    event_connection: Mutex<Option<MidiInputConnection<()>>>,
}

impl super::Device for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn watch_events(&self, sender: Sender<MidiWord>) -> Result<(), MidiError> {
        let span = span!(Level::INFO, "wait for event (midir)");
        let _enter = span.enter();

        let mut event_connection = self.event_connection.lock();
        if event_connection.is_some() {
            return Err(MidiError::AlreadyWatching(self.name.clone()));
        }

        info!(device = self.name, "Watching MIDI events.");

        let input = MidiInput::new("polysampler input")?;
        let connection = input
            .connect(
                &self.input_port,
                "polysampler input watcher",
                move |_, raw_event, _| {
                    trace!(bytes = ?raw_event, "Received MIDI message.");
                    for word in MidiWord::from_message(raw_event) {
                        if let Err(e) = sender.send(word) {
                            error!(
                                err = format!("{:?}", e),
                                "Error sending MIDI word to receiver."
                            );
                            return;
                        }
                    }
                },
                (),
            )
            .map_err(|e| MidiError::Connect {
                name: self.name.clone(),
                reason: e.to_string(),
            })?;
        *event_connection = Some(connection);

        Ok(())
    }

    fn stop_watch_events(&self) {
        // Explicitly drop the connection.
        let event_connection = self.event_connection.lock().take();
        mem::drop(event_connection);
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Input)", self.name)
    }
}

/// Lists midir devices and produces the Device trait.
pub fn list() -> Result<Vec<Box<dyn super::Device>>, MidiError> {
    Ok(list_midir_devices()?
        .into_iter()
        .map(|device| {
            let device: Box<dyn super::Device> = Box::new(device);
            device
        })
        .collect())
}

/// Lists midir input devices, sorted by name.
fn list_midir_devices() -> Result<Vec<Device>, MidiError> {
    let input = MidiInput::new("polysampler input listing")?;

    let mut devices = Vec::new();
    for port in input.ports() {
        let name = input.port_name(&port)?;
        devices.push(Device {
            name,
            input_port: port,
            event_connection: Mutex::new(None),
        });
    }

    devices.sort_by_key(|device| device.name.to_string());
    Ok(devices)
}

/// Gets the input device whose name contains the given name.
pub fn get(name: &str) -> Result<Device, MidiError> {
    let devices = list_midir_devices()?;
    let available = devices
        .iter()
        .map(|device| device.name.clone())
        .collect::<Vec<String>>()
        .join(", ");

    let mut matches = devices
        .into_iter()
        .filter(|device| device.name.contains(name))
        .collect::<Vec<Device>>();

    if matches.is_empty() {
        return Err(MidiError::NotFound {
            name: name.to_string(),
            available,
        });
    }
    if matches.len() > 1 {
        return Err(MidiError::Ambiguous(
            matches
                .iter()
                .map(|device| device.name.clone())
                .collect::<Vec<String>>()
                .join(", "),
        ));
    }

    // We've verified that there's only one element in the vector, so this should be safe.
    Ok(matches.swap_remove(0))
}
