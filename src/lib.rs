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

//! A MIDI-triggered polyphonic sampler. Sparse folders of single note recordings are
//! completed to all 128 MIDI notes by pitch shifting, then played by MIDI input.

pub mod audio;
pub mod config;
pub mod dispatch;
pub mod midi;
pub mod playsync;
pub mod poller;
pub mod samples;
pub mod session;
#[cfg(test)]
mod testutil;
