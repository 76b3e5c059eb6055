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

//! Interface to the underlying system
//!
//! The [`System`] trait abstracts how lifecycle events are bound. A binding
//! decides what happens when an event occurs: nothing special
//! ([`Binding::Default`]), nothing at all ([`Binding::Ignore`]), the
//! dispatcher is notified ([`Binding::Catch`]), or some behavior installed by
//! code outside the dispatcher runs ([`Binding::Foreign`]).
//!
//! [`RealSystem`] binds signals with `sigaction` and keeps bindings for the
//! `EXIT` and `ERR` pseudo-events in a process-wide table.
//! [`VirtualSystem`] keeps all bindings in memory and lets tests raise
//! signals without involving the operating system.

#[cfg(unix)]
pub mod real;
pub mod r#virtual;

#[cfg(unix)]
pub use self::real::RealSystem;
pub use self::r#virtual::VirtualSystem;

use crate::event::Event;
use crate::handler::FunctionFn;
use crate::signal::Name;
use std::sync::Arc;

/// Behavior installed for an event by code outside the dispatcher
#[derive(Clone)]
pub enum Foreign {
    /// Native signal handler function
    Native {
        /// Address of the handler function
        address: usize,
        /// `sa_flags` the handler was installed with
        flags: i32,
    },
    /// Rust closure
    Function(Arc<FunctionFn>),
    /// Command string to be run by `sh -c`
    Command(String),
}

impl std::fmt::Debug for Foreign {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Foreign::Native { address, flags } => f
                .debug_struct("Native")
                .field("address", &format_args!("{address:#x}"))
                .field("flags", flags)
                .finish(),
            Foreign::Function(function) => f
                .debug_tuple("Function")
                .field(&Arc::as_ptr(function))
                .finish(),
            Foreign::Command(command) => f.debug_tuple("Command").field(command).finish(),
        }
    }
}

impl PartialEq for Foreign {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Foreign::Native { address, flags },
                Foreign::Native {
                    address: other_address,
                    flags: other_flags,
                },
            ) => address == other_address && flags == other_flags,
            (Foreign::Function(a), Foreign::Function(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            (Foreign::Command(a), Foreign::Command(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Foreign {}

/// How an event is handled
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum Binding {
    /// Default action of the system
    #[default]
    Default,
    /// The event is ignored.
    Ignore,
    /// The event is reported to the dispatcher.
    Catch,
    /// Behavior installed by other code runs.
    Foreign(Foreign),
}

/// Abstraction of the system that delivers lifecycle events
pub trait System {
    /// Returns the current binding for the event.
    fn binding(&self, event: Event) -> std::io::Result<Binding>;

    /// Changes the binding for the event.
    ///
    /// Returns the binding that was replaced.
    fn bind(&mut self, event: Event, binding: Binding) -> std::io::Result<Binding>;

    /// Returns signals caught since the last call.
    ///
    /// Only signals bound with [`Binding::Catch`] are reported. Each signal is
    /// reported at most once per call even if it was delivered more than once.
    fn caught_signals(&mut self) -> Vec<Name>;
}

impl<S: System + ?Sized> System for Box<S> {
    fn binding(&self, event: Event) -> std::io::Result<Binding> {
        (**self).binding(event)
    }
    fn bind(&mut self, event: Event, binding: Binding) -> std::io::Result<Binding> {
        (**self).bind(event, binding)
    }
    fn caught_signals(&mut self) -> Vec<Name> {
        (**self).caught_signals()
    }
}
