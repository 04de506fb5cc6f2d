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

//! Routes decoded MIDI events to sampler modules.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::warn;

use crate::midi::Event;

/// How MIDI channels select modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// Only this channel produces triggers, all for module 0.
    FixedChannel(u8),
    /// The channel number is the module index.
    ChannelPerModule,
}

impl Routing {
    /// Returns the module an event on the given channel goes to, if any.
    pub fn module_for(&self, channel: u8, module_count: usize) -> Option<usize> {
        match *self {
            Routing::FixedChannel(fixed) => (fixed == channel && module_count > 0).then_some(0),
            Routing::ChannelPerModule => {
                let module = usize::from(channel);
                (module < module_count).then_some(module)
            }
        }
    }
}

/// The synthesis engine that plays notes.
pub trait SynthEngine: Send + Sync {
    fn note_on(&self, module: usize, note: u8, velocity: u8);

    fn note_off(&self, module: usize, note: u8);
}

/// A voice trigger on its way to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerCommand {
    NoteOn { module: usize, note: u8, velocity: u8 },
    NoteOff { module: usize, note: u8 },
}

/// Sends triggers to the renderer over a bounded queue. Never blocks: when the queue is
/// full the trigger is dropped and counted.
#[derive(Clone)]
pub struct TriggerSender {
    sender: Sender<TriggerCommand>,
    dropped: Arc<AtomicU64>,
}

impl TriggerSender {
    /// Creates a trigger queue with the given capacity.
    pub fn bounded(capacity: usize) -> (TriggerSender, Receiver<TriggerCommand>) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        (
            TriggerSender {
                sender,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            receiver,
        )
    }

    /// The number of triggers dropped because the queue was full or the renderer was
    /// gone.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn send(&self, command: TriggerCommand) {
        match self.sender.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(command)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(?command, "Trigger queue full, dropping command");
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl SynthEngine for TriggerSender {
    fn note_on(&self, module: usize, note: u8, velocity: u8) {
        self.send(TriggerCommand::NoteOn {
            module,
            note,
            velocity,
        });
    }

    fn note_off(&self, module: usize, note: u8) {
        self.send(TriggerCommand::NoteOff { module, note });
    }
}

/// Events that an external script could be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    ProgramChange { module: usize, program: u8 },
    /// Controller 0 with value 0.
    ControllerZero { module: usize },
}

/// What happened to a dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    NoteOn { module: usize, note: u8, velocity: u8 },
    NoteOff { module: usize, note: u8 },
    Hook(Hook),
    Ignored,
}

/// Turns note events into engine triggers.
#[derive(Debug, Clone)]
pub struct VoiceDispatcher {
    routing: Routing,
    module_count: usize,
}

impl VoiceDispatcher {
    pub fn new(routing: Routing, module_count: usize) -> VoiceDispatcher {
        VoiceDispatcher {
            routing,
            module_count,
        }
    }

    pub fn routing(&self) -> Routing {
        self.routing
    }

    pub fn module_count(&self) -> usize {
        self.module_count
    }

    /// Dispatches one event. Only notes reach the engine.
    pub fn dispatch<E: SynthEngine + ?Sized>(&self, event: &Event, engine: &E) -> Dispatch {
        match *event {
            Event::NoteOn { channel, key, vel } => {
                let Some(module) = self.route(channel.as_int()) else {
                    return Dispatch::Ignored;
                };
                let (note, velocity) = (key.as_int(), vel.as_int());
                // The decoder already turns zero velocity into a note off, but words built
                // elsewhere may not have been.
                if velocity == 0 {
                    engine.note_off(module, note);
                    return Dispatch::NoteOff { module, note };
                }
                engine.note_on(module, note, velocity);
                Dispatch::NoteOn {
                    module,
                    note,
                    velocity,
                }
            }
            Event::NoteOff { channel, key, .. } => {
                let Some(module) = self.route(channel.as_int()) else {
                    return Dispatch::Ignored;
                };
                let note = key.as_int();
                engine.note_off(module, note);
                Dispatch::NoteOff { module, note }
            }
            Event::ProgramChange { channel, program } => self
                .route(channel.as_int())
                .map(|module| {
                    Dispatch::Hook(Hook::ProgramChange {
                        module,
                        program: program.as_int(),
                    })
                })
                .unwrap_or(Dispatch::Ignored),
            Event::ControlChange {
                channel,
                controller,
                value,
            } if controller.as_int() == 0 && value.as_int() == 0 => self
                .route(channel.as_int())
                .map(|module| Dispatch::Hook(Hook::ControllerZero { module }))
                .unwrap_or(Dispatch::Ignored),
            _ => Dispatch::Ignored,
        }
    }

    fn route(&self, channel: u8) -> Option<usize> {
        self.routing.module_for(channel, self.module_count)
    }
}
