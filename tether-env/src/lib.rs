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

//! This crate defines the data model of the tether lifecycle event
//! dispatcher.
//!
//! A lifecycle [`Event`](event::Event) is a point in the life of a process
//! where cleanup or response logic may run: normal exit, an error, or the
//! delivery of a signal. [`Handler`](handler::Handler)s are registered
//! against events in a [`Registry`](registry::Registry), which binds each
//! event to the dispatcher through the [`System`](system::System) interface
//! and preserves whatever was bound before as a legacy handler.
//!
//! The [`Env`](env::Env) is the state of the dispatching process that
//! handlers can observe. Function handlers receive a copy of it; only
//! source-mode handlers and the middleware can change the original.
//!
//! Running handlers is the job of the `tether-dispatch` crate.

pub mod env;
pub mod event;
pub mod handler;
pub mod legacy;
pub mod option;
pub mod registry;
pub mod signal;
pub mod status;
pub mod system;
pub mod timeline;

pub use self::env::Env;
pub use self::event::Event;
pub use self::status::ExitStatus;
