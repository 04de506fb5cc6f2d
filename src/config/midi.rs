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
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;

use crate::midi::TraceFilter;

use super::error::ConfigError;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A YAML representation of the MIDI input configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Midi {
    /// The input device name. A device is selected if its name contains this.
    device: Option<String>,

    /// The channel (0-15) every note is taken from. When unset, the channel selects the
    /// module instead.
    channel: Option<u8>,

    /// How often pending MIDI input is processed (default: 1ms).
    poll_interval: Option<String>,

    /// Which events are traced.
    #[serde(default)]
    trace: Trace,
}

impl Midi {
    /// Returns the device from the configuration.
    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn channel(&self) -> Option<u8> {
        self.channel
    }

    /// Returns the poll interval (default: 1ms).
    pub fn poll_interval(&self) -> Result<Duration, ConfigError> {
        match &self.poll_interval {
            Some(poll_interval) => Ok(DurationString::from_string(poll_interval.clone())
                .map_err(|e| ConfigError::Duration {
                    value: poll_interval.clone(),
                    reason: e.to_string(),
                })?
                .into()),
            None => Ok(DEFAULT_POLL_INTERVAL),
        }
    }

    /// Returns the trace filter.
    pub fn trace_filter(&self) -> TraceFilter {
        self.trace.filter()
    }
}

/// Trace settings. Every flag defaults to true.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Trace {
    notes: Option<bool>,
    controls: Option<bool>,
    bender: Option<bool>,
    verbose: Option<bool>,
    realtime: Option<bool>,
    count_clock_and_sense: Option<bool>,
    channel_mode: Option<bool>,
    program_changes: Option<bool>,
}

impl Trace {
    pub fn filter(&self) -> TraceFilter {
        TraceFilter {
            notes: self.notes.unwrap_or(true),
            controls: self.controls.unwrap_or(true),
            bender: self.bender.unwrap_or(true),
            verbose: self.verbose.unwrap_or(true),
            realtime: self.realtime.unwrap_or(true),
            count_clock_and_sense: self.count_clock_and_sense.unwrap_or(true),
            channel_mode: self.channel_mode.unwrap_or(true),
            program_changes: self.program_changes.unwrap_or(true),
        }
    }
}
