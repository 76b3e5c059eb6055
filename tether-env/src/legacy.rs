// This file is part of tether, a lifecycle event dispatcher for CLI processes.
// Copyright (C) 2026 The tether authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Capturing behavior bound before the dispatcher
//!
//! When the first handler is registered for an event, the dispatcher takes
//! over the event's binding. Whatever was bound before is not discarded: if
//! it is a behavior the dispatcher can run, it becomes the *legacy handler*
//! of the event, which runs before any explicitly registered handler.

use crate::event::Event;
use crate::handler::{Callable, Command, HandlerEntry, HandlerId};
use crate::system::{Binding, Foreign, System};
use std::sync::Arc;

/// Sequence number of every legacy handler
///
/// Explicitly registered handlers are numbered from 1.
pub const LEGACY_SEQUENCE: u64 = 0;

/// Result of [`capture_once`]
#[derive(Clone, Debug)]
pub struct Captured {
    /// Binding replaced by the dispatcher, to be restored on teardown
    pub original: Binding,
    /// Handler wrapping the original binding, if it was a runnable behavior
    pub legacy: Option<HandlerEntry>,
}

/// Installs the dispatcher binding for the event and captures the previous
/// binding.
///
/// A foreign native signal handler or Rust closure becomes a function
/// handler and a command string becomes a command handler. The default
/// action, an ignored event, and a binding already made by the dispatcher
/// yield no legacy handler.
///
/// The registry calls this function exactly once per event, on the first
/// registration.
pub fn capture_once<S: System + ?Sized>(
    system: &mut S,
    event: Event,
) -> std::io::Result<Captured> {
    let original = system.bind(event, Binding::Catch)?;
    let legacy = match &original {
        Binding::Default | Binding::Ignore | Binding::Catch => None,
        Binding::Foreign(foreign) => Some(HandlerEntry {
            id: HandlerId {
                sequence: LEGACY_SEQUENCE,
                label: format!("legacy:{event}").into(),
            },
            callable: legacy_callable(foreign),
            allow_duplicates: false,
            is_legacy: true,
        }),
    };
    Ok(Captured { original, legacy })
}

fn legacy_callable(foreign: &Foreign) -> Callable {
    match foreign {
        Foreign::Function(function) => Callable::Function(Arc::clone(function)),
        Foreign::Command(command) => Callable::Command(Arc::new(Command::Shell(command.clone()))),
        Foreign::Native { address, flags } => native_callable(*address, *flags),
    }
}

#[cfg(unix)]
fn native_callable(address: usize, flags: i32) -> Callable {
    use crate::handler::Context;
    use crate::status::ExitStatus;
    Callable::Function(Arc::new(move |context: &mut Context<'_>| {
        if let Some(signal) = context.event.signal() {
            // SAFETY: The address and flags were returned by sigaction for
            // this signal before the dispatcher replaced the handler.
            unsafe { crate::system::real::call_native(address, flags, signal) }
        }
        ExitStatus::SUCCESS
    }))
}

#[cfg(not(unix))]
fn native_callable(_address: usize, _flags: i32) -> Callable {
    use crate::status::ExitStatus;
    Callable::Function(Arc::new(|_: &mut crate::handler::Context<'_>| ExitStatus::FAILURE))
}
