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

//! Registry of handlers
//!
//! The [`Registry`] remembers, per event, the handlers registered by the
//! hosting program and the legacy handler captured on the first
//! registration. It acts as a decorator for a [`System`]: the first
//! registration for an event binds the event to the dispatcher, and
//! [`teardown`](Registry::teardown) restores the binding that was replaced.
//! Methods of `Registry` expect to be passed the same system instance in
//! every call.

use crate::event::{Event, ParseEventError};
use crate::handler::{Handler, HandlerEntry, HandlerId, Kind};
use crate::legacy::capture_once;
use crate::option::State;
use crate::system::{Binding, System};
use std::collections::BTreeMap;
use thiserror::Error;

/// Lifecycle phase of an event
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Phase {
    /// No handler has ever been registered for the event.
    Uninitialized,
    /// The dispatcher is bound to the event.
    Initialized,
    /// Handlers for the event are running.
    ///
    /// The value is the nesting depth, starting from 1.
    Dispatching(usize),
}

/// Error in registering a handler
#[derive(Debug, Error)]
pub enum RegisterError {
    /// The event name is invalid.
    #[error(transparent)]
    Event(#[from] ParseEventError),
    /// An identical handler is already registered for the event.
    #[error("handler `{existing}` is already registered for {event}")]
    Duplicate {
        /// Event the handler was to be registered for
        event: Event,
        /// Handler already registered
        existing: HandlerId,
    },
    /// The system refused to bind the event.
    #[error("cannot bind {event}: {source}")]
    Bind {
        /// Event that could not be bound
        event: Event,
        /// Error from the system
        source: std::io::Error,
    },
    /// The process-wide dispatcher has not been initialized.
    #[error("the dispatcher is not initialized")]
    Uninitialized,
}

/// Options for [`Registry::register`]
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct RegisterOptions {
    /// Whether to accept a handler identical to one already registered
    pub allow_duplicates: bool,
}

/// Description of a handler returned by [`Registry::list`]
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct HandlerInfo {
    /// Identifier of the handler
    pub id: HandlerId,
    /// Kind of the handler
    pub kind: Kind,
    /// Sequence number assigned on registration
    pub registration_sequence: u64,
    /// Whether [`Registry::unregister`] can remove the handler
    ///
    /// This is false for the legacy handler.
    pub removable: bool,
}

impl From<&HandlerEntry> for HandlerInfo {
    fn from(entry: &HandlerEntry) -> Self {
        HandlerInfo {
            id: entry.id.clone(),
            kind: entry.kind(),
            registration_sequence: entry.id.sequence,
            removable: !entry.is_legacy,
        }
    }
}

/// Registration state of one event
#[derive(Clone, Debug)]
struct EventState {
    /// Binding replaced by the dispatcher
    original: Binding,
    legacy: Option<HandlerEntry>,
    handlers: Vec<HandlerEntry>,
    /// Number of dispatch passes in progress
    depth: usize,
}

impl EventState {
    fn entries(&self) -> impl Iterator<Item = &HandlerEntry> {
        self.legacy.iter().chain(&self.handlers)
    }
}

/// Collection of registered handlers
#[derive(Clone, Debug, Default)]
pub struct Registry {
    events: BTreeMap<Event, EventState>,
    last_sequence: u64,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for the event.
    ///
    /// On the first registration for the event, this function binds the event
    /// to the dispatcher and captures the previous binding as the legacy
    /// handler (see [`capture_once`]). The new handler is appended with the
    /// next registration sequence number.
    ///
    /// Unless `options.allow_duplicates` is true, registering a handler
    /// identical to one already registered for the event fails with
    /// [`RegisterError::Duplicate`] and leaves the registry unchanged.
    pub fn register<S: System + ?Sized>(
        &mut self,
        system: &mut S,
        event: Event,
        handler: Handler,
        options: RegisterOptions,
    ) -> Result<HandlerId, RegisterError> {
        if !options.allow_duplicates {
            if let Some(state) = self.events.get(&event) {
                if let Some(existing) = state
                    .handlers
                    .iter()
                    .find(|entry| entry.callable.is_same(&handler.callable))
                {
                    return Err(RegisterError::Duplicate {
                        event,
                        existing: existing.id.clone(),
                    });
                }
            }
        }

        if !self.events.contains_key(&event) {
            let captured = capture_once(system, event)
                .map_err(|source| RegisterError::Bind { event, source })?;
            if let Some(legacy) = &captured.legacy {
                tracing::debug!(%event, legacy = %legacy.id, "captured legacy handler");
            }
            let state = EventState {
                original: captured.original,
                legacy: captured.legacy,
                handlers: Vec::new(),
                depth: 0,
            };
            self.events.insert(event, state);
            tracing::debug!(%event, "event initialized");
        }

        self.last_sequence += 1;
        let id = HandlerId {
            sequence: self.last_sequence,
            label: handler.label,
        };
        let entry = HandlerEntry {
            id: id.clone(),
            callable: handler.callable,
            allow_duplicates: options.allow_duplicates,
            is_legacy: false,
        };
        tracing::debug!(%event, handler = %id, kind = %entry.kind(), "registered handler");
        if let Some(state) = self.events.get_mut(&event) {
            state.handlers.push(entry);
        }
        Ok(id)
    }

    /// Removes a handler.
    ///
    /// Returns true if the handler was found and removed. Unknown identifiers,
    /// identifiers of already removed handlers, and identifiers of legacy
    /// handlers yield false.
    pub fn unregister(&mut self, id: &HandlerId) -> bool {
        let mut removed = false;
        for (event, state) in &mut self.events {
            let count = state.handlers.len();
            state.handlers.retain(|entry| entry.id != *id);
            if state.handlers.len() != count {
                tracing::debug!(%event, handler = %id, "unregistered handler");
                removed = true;
            }
        }
        removed
    }

    /// Describes the handlers registered for the event.
    ///
    /// The legacy handler, if any, comes first, followed by the explicit
    /// handlers in registration order.
    #[must_use]
    pub fn list(&self, event: Event) -> Vec<HandlerInfo> {
        self.events
            .get(&event)
            .map(|state| state.entries().map(HandlerInfo::from).collect())
            .unwrap_or_default()
    }

    /// Returns the events that have been initialized.
    pub fn events(&self) -> impl Iterator<Item = Event> + '_ {
        self.events.keys().copied()
    }

    /// Returns the handlers to run for the event, in execution order.
    ///
    /// The legacy handler always comes first. The explicit handlers follow
    /// in registration order, or in reverse registration order if `lifo` is
    /// on.
    #[must_use]
    pub fn snapshot(&self, event: Event, lifo: State) -> Vec<HandlerEntry> {
        let Some(state) = self.events.get(&event) else {
            return Vec::new();
        };
        let mut entries = Vec::with_capacity(state.handlers.len() + 1);
        entries.extend(state.legacy.iter().cloned());
        match lifo {
            State::Off => entries.extend(state.handlers.iter().cloned()),
            State::On => entries.extend(state.handlers.iter().rev().cloned()),
        }
        entries
    }

    /// Returns the current phase of the event.
    #[must_use]
    pub fn phase(&self, event: Event) -> Phase {
        match self.events.get(&event) {
            None => Phase::Uninitialized,
            Some(state) if state.depth == 0 => Phase::Initialized,
            Some(state) => Phase::Dispatching(state.depth),
        }
    }

    /// Marks the start of a dispatch pass for the event.
    ///
    /// Returns the new nesting depth, or `None` if the event is not
    /// initialized.
    pub fn enter(&mut self, event: Event) -> Option<usize> {
        let state = self.events.get_mut(&event)?;
        state.depth += 1;
        Some(state.depth)
    }

    /// Marks the end of a dispatch pass for the event.
    pub fn leave(&mut self, event: Event) {
        if let Some(state) = self.events.get_mut(&event) {
            state.depth = state.depth.saturating_sub(1);
        }
    }

    /// Restores the original bindings and forgets all handlers.
    ///
    /// All events are restored even if some fail. The first error is
    /// returned.
    pub fn teardown<S: System + ?Sized>(&mut self, system: &mut S) -> std::io::Result<()> {
        let mut result = Ok(());
        for (event, state) in std::mem::take(&mut self.events) {
            match system.bind(event, state.original) {
                Ok(_) => tracing::debug!(%event, "restored original binding"),
                Err(error) => {
                    tracing::warn!(%event, %error, "cannot restore original binding");
                    if result.is_ok() {
                        result = Err(error);
                    }
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Name;
    use crate::status::ExitStatus;
    use crate::system::{Foreign, VirtualSystem};
    use assert_matches::assert_matches;

    fn ids(entries: &[HandlerEntry]) -> Vec<&str> {
        entries.iter().map(|entry| &*entry.id.label).collect()
    }

    #[test]
    fn first_registration_initializes_event() {
        let mut system = VirtualSystem::new();
        let mut registry = Registry::new();
        assert_eq!(registry.phase(Event::Exit), Phase::Uninitialized);

        let handler = Handler::function("a", |_| ExitStatus::SUCCESS);
        let id = registry
            .register(&mut system, Event::Exit, handler, RegisterOptions::default())
            .unwrap();
        assert_eq!(id.sequence, 1);
        assert_eq!(registry.phase(Event::Exit), Phase::Initialized);
        assert_eq!(system.binding(Event::Exit).unwrap(), Binding::Catch);
    }

    #[test]
    fn legacy_handler_is_listed_first_and_not_removable() {
        let mut system = VirtualSystem::new();
        let foreign = Foreign::Command("echo legacy".into());
        system.bind(Name::Term.into(), Binding::Foreign(foreign)).unwrap();
        let mut registry = Registry::new();

        let handler = Handler::shell("a", "echo a");
        registry
            .register(&mut system, Name::Term.into(), handler, RegisterOptions::default())
            .unwrap();

        let list = registry.list(Name::Term.into());
        assert_eq!(list.len(), 2);
        assert!(!list[0].removable);
        assert_eq!(list[0].kind, Kind::Command);
        assert!(list[1].removable);
        assert_eq!(list[1].registration_sequence, 1);

        assert!(!registry.unregister(&list[0].id));
        assert_eq!(registry.list(Name::Term.into()).len(), 2);
    }

    #[test]
    fn legacy_handler_is_captured_only_once() {
        let mut system = VirtualSystem::new();
        system
            .bind(Event::Exit, Binding::Foreign(Foreign::Command("x".into())))
            .unwrap();
        let mut registry = Registry::new();
        let options = RegisterOptions::default();
        registry
            .register(&mut system, Event::Exit, Handler::shell("a", "a"), options)
            .unwrap();
        registry
            .register(&mut system, Event::Exit, Handler::shell("b", "b"), options)
            .unwrap();

        let entries = registry.snapshot(Event::Exit, State::Off);
        assert_eq!(ids(&entries), ["legacy:EXIT", "a", "b"]);
    }

    #[test]
    fn duplicate_is_rejected_without_opt_in() {
        let mut system = VirtualSystem::new();
        let mut registry = Registry::new();
        let handler = Handler::function("f", |_| ExitStatus::SUCCESS);
        let first = registry
            .register(&mut system, Event::Exit, handler.clone(), RegisterOptions::default())
            .unwrap();

        let result = registry.register(
            &mut system,
            Event::Exit,
            handler.clone(),
            RegisterOptions::default(),
        );
        assert_matches!(result, Err(RegisterError::Duplicate { event: Event::Exit, existing }) => {
            assert_eq!(existing, first);
        });
        assert_eq!(registry.list(Event::Exit).len(), 1);

        let options = RegisterOptions {
            allow_duplicates: true,
        };
        let second = registry
            .register(&mut system, Event::Exit, handler, options)
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(registry.list(Event::Exit).len(), 2);
    }

    #[test]
    fn same_handler_can_be_registered_for_different_events() {
        let mut system = VirtualSystem::new();
        let mut registry = Registry::new();
        let handler = Handler::shell("cleanup", "rm -f lock");
        let options = RegisterOptions::default();
        registry
            .register(&mut system, Event::Exit, handler.clone(), options)
            .unwrap();
        registry
            .register(&mut system, Name::Int.into(), handler, options)
            .unwrap();
        assert_eq!(registry.events().collect::<Vec<_>>(), [Event::Exit, Name::Int.into()]);
    }

    #[test]
    fn snapshot_order_follows_lifo_option() {
        let mut system = VirtualSystem::new();
        let mut registry = Registry::new();
        let options = RegisterOptions::default();
        for label in ["h1", "h2", "h3"] {
            let handler = Handler::shell(label, label);
            registry
                .register(&mut system, Event::Exit, handler, options)
                .unwrap();
        }
        assert_eq!(ids(&registry.snapshot(Event::Exit, State::Off)), ["h1", "h2", "h3"]);
        assert_eq!(ids(&registry.snapshot(Event::Exit, State::On)), ["h3", "h2", "h1"]);
        assert!(registry.snapshot(Event::Error, State::Off).is_empty());
    }

    #[test]
    fn unregister_is_idempotent() {
        let mut system = VirtualSystem::new();
        let mut registry = Registry::new();
        let options = RegisterOptions::default();
        let a = registry
            .register(&mut system, Event::Exit, Handler::shell("a", "a"), options)
            .unwrap();
        registry
            .register(&mut system, Event::Exit, Handler::shell("b", "b"), options)
            .unwrap();

        assert!(registry.unregister(&a));
        assert!(!registry.unregister(&a));
        let unknown = HandlerId {
            sequence: 42,
            label: "x".into(),
        };
        assert!(!registry.unregister(&unknown));
        assert_eq!(ids(&registry.snapshot(Event::Exit, State::Off)), ["b"]);
    }

    #[test]
    fn phase_tracks_nested_dispatch() {
        let mut system = VirtualSystem::new();
        let mut registry = Registry::new();
        assert_eq!(registry.enter(Event::Exit), None);
        let handler = Handler::shell("a", "a");
        registry
            .register(&mut system, Event::Exit, handler, RegisterOptions::default())
            .unwrap();

        assert_eq!(registry.enter(Event::Exit), Some(1));
        assert_eq!(registry.enter(Event::Exit), Some(2));
        assert_eq!(registry.phase(Event::Exit), Phase::Dispatching(2));
        registry.leave(Event::Exit);
        registry.leave(Event::Exit);
        assert_eq!(registry.phase(Event::Exit), Phase::Initialized);
    }

    #[test]
    fn teardown_restores_original_bindings() {
        let mut system = VirtualSystem::new();
        system.bind(Name::Hup.into(), Binding::Ignore).unwrap();
        let mut registry = Registry::new();
        let options = RegisterOptions::default();
        registry
            .register(&mut system, Name::Hup.into(), Handler::shell("a", "a"), options)
            .unwrap();
        registry
            .register(&mut system, Event::Exit, Handler::shell("b", "b"), options)
            .unwrap();

        registry.teardown(&mut system).unwrap();
        assert_eq!(system.binding(Name::Hup.into()).unwrap(), Binding::Ignore);
        assert_eq!(system.binding(Event::Exit).unwrap(), Binding::Default);
        assert_eq!(registry.phase(Event::Exit), Phase::Uninitialized);
    }

    #[test]
    fn bind_failure_is_reported() {
        let mut system = VirtualSystem::new();
        let mut registry = Registry::new();
        let handler = Handler::shell("a", "a");
        let result = registry.register(
            &mut system,
            Name::Kill.into(),
            handler,
            RegisterOptions::default(),
        );
        assert_matches!(result, Err(RegisterError::Bind { event, .. }) => {
            assert_eq!(event, Event::Signal(Name::Kill));
        });
        assert_eq!(registry.phase(Name::Kill.into()), Phase::Uninitialized);
    }
}
