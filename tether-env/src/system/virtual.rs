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

//! Simulated system for testing
//!
//! [`VirtualSystem`] keeps event bindings in memory. Signals are delivered
//! with [`VirtualSystem::raise`] instead of the operating system, so tests
//! can exercise the dispatcher without changing the dispositions of the test
//! process.

use super::{Binding, System};
use crate::event::Event;
use crate::signal::Name;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

/// State of the virtual system
#[derive(Debug, Default)]
pub struct SystemState {
    /// Current bindings
    ///
    /// Events not in the map have [`Binding::Default`].
    pub bindings: BTreeMap<Event, Binding>,
    /// Signals caught but not yet reported by
    /// [`caught_signals`](System::caught_signals)
    pub caught: Vec<Name>,
}

/// Simulated system
///
/// Clones of a `VirtualSystem` share the same state, so a test can keep a
/// clone to raise signals while the dispatcher owns another.
#[derive(Clone, Debug, Default)]
pub struct VirtualSystem {
    /// State of the system
    pub state: Arc<Mutex<SystemState>>,
}

impl VirtualSystem {
    /// Creates a virtual system with all events bound to the default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers a signal.
    ///
    /// If the signal is bound with [`Binding::Catch`], it is recorded so that
    /// the next call to [`caught_signals`](System::caught_signals) reports
    /// it. Returns the binding that received the signal.
    pub fn raise(&self, signal: Name) -> Binding {
        let mut state = self.state.lock();
        let binding = state
            .bindings
            .get(&Event::Signal(signal))
            .cloned()
            .unwrap_or_default();
        if binding == Binding::Catch && !state.caught.contains(&signal) {
            state.caught.push(signal);
        }
        binding
    }
}

impl System for VirtualSystem {
    fn binding(&self, event: Event) -> io::Result<Binding> {
        let state = self.state.lock();
        Ok(state.bindings.get(&event).cloned().unwrap_or_default())
    }

    fn bind(&mut self, event: Event, binding: Binding) -> io::Result<Binding> {
        if let Some(signal) = event.signal() {
            if !signal.is_catchable() && binding != Binding::Default {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("signal {signal} cannot be caught or ignored"),
                ));
            }
        }
        let mut state = self.state.lock();
        let old = match binding {
            Binding::Default => state.bindings.remove(&event),
            binding => state.bindings.insert(event, binding),
        };
        Ok(old.unwrap_or_default())
    }

    fn caught_signals(&mut self) -> Vec<Name> {
        std::mem::take(&mut self.state.lock().caught)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::Foreign;
    use assert_matches::assert_matches;

    #[test]
    fn bind_returns_previous_binding() {
        let mut system = VirtualSystem::new();
        let event = Event::Signal(Name::Term);
        assert_eq!(system.bind(event, Binding::Ignore).unwrap(), Binding::Default);
        assert_eq!(system.bind(event, Binding::Catch).unwrap(), Binding::Ignore);
        assert_eq!(system.binding(event).unwrap(), Binding::Catch);
        assert_eq!(system.bind(event, Binding::Default).unwrap(), Binding::Catch);
        assert!(system.state.lock().bindings.is_empty());
    }

    #[test]
    fn raise_records_caught_signals_once() {
        let mut system = VirtualSystem::new();
        system.bind(Name::Int.into(), Binding::Catch).unwrap();
        system
            .bind(Name::Hup.into(), Binding::Foreign(Foreign::Command("true".into())))
            .unwrap();

        assert_eq!(system.raise(Name::Int), Binding::Catch);
        assert_eq!(system.raise(Name::Int), Binding::Catch);
        assert_matches!(system.raise(Name::Hup), Binding::Foreign(_));
        assert_eq!(system.raise(Name::Term), Binding::Default);

        assert_eq!(system.caught_signals(), [Name::Int]);
        assert!(system.caught_signals().is_empty());
    }

    #[test]
    fn uncatchable_signals_stay_default() {
        let mut system = VirtualSystem::new();
        let result = system.bind(Name::Stop.into(), Binding::Catch);
        assert_matches!(result, Err(error) if error.kind() == io::ErrorKind::InvalidInput);
        assert_eq!(system.binding(Name::Stop.into()).unwrap(), Binding::Default);
    }
}
