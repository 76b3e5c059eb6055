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

//! This crate runs the handlers registered for lifecycle events.
//!
//! The [`Dispatcher`] is the entry point. It is generic over the
//! [`System`](tether_env::system::System) that delivers events, so tests can
//! drive it with a [`VirtualSystem`](tether_env::system::VirtualSystem)
//! while programs use the [`global`] dispatcher backed by the real system.
//!
//! ```
//! use tether_dispatch::Dispatcher;
//! use tether_dispatch::replay::MemorySink;
//! use tether_env::handler::Handler;
//! use tether_env::registry::RegisterOptions;
//! use tether_env::system::VirtualSystem;
//! use tether_env::{Env, Event, ExitStatus};
//!
//! let dispatcher = Dispatcher::with_sink(VirtualSystem::new(), MemorySink::new());
//! let cleanup = Handler::function("cleanup", |_| ExitStatus::SUCCESS);
//! dispatcher.register(Event::Exit, cleanup, RegisterOptions::default()).unwrap();
//!
//! let mut env = Env::new();
//! let report = dispatcher.dispatch(&mut env, Event::Exit, ExitStatus::SUCCESS, &[]);
//! assert_eq!(report.status, ExitStatus::SUCCESS);
//! assert_eq!(report.outcomes.len(), 1);
//! ```

pub mod capture;
pub mod dispatcher;
#[cfg(unix)]
pub mod global;
pub mod middleware;
pub mod replay;
pub mod report;
pub mod source;

pub use self::dispatcher::Dispatcher;
pub use self::middleware::{Middleware, PassThrough};
pub use self::report::Report;
