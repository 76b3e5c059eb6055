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

//! Process-wide dispatcher
//!
//! Lifecycle events are process-wide, so any part of a program may want to
//! register handlers without passing a [`Dispatcher`] around. This module
//! provides a single dispatcher backed by the [`RealSystem`] together with
//! the [`Env`] it dispatches in.
//!
//! The singleton has an explicit lifecycle: [`init`] creates it and
//! [`teardown`] restores every binding the dispatcher replaced and destroys
//! it. Other functions fail with [`RegisterError::Uninitialized`] or do
//! nothing when called outside this lifecycle.
//!
//! [`dispatch`] runs the handlers with a copy of the shared environment and
//! stores the copy back when the pass ends. If a handler dispatches another
//! event through this module, the outer pass overwrites the environment
//! changes made by the inner pass.

use crate::dispatcher::Dispatcher;
use crate::middleware::Middleware;
use crate::replay::{Sink, StdSink};
use crate::report::Report;
use parking_lot::Mutex;
use std::sync::Arc;
use tether_env::Env;
use tether_env::Event;
use tether_env::ExitStatus;
use tether_env::handler::{Handler, HandlerId};
use tether_env::registry::{HandlerInfo, RegisterError, RegisterOptions};
use tether_env::system::RealSystem;
use thiserror::Error;

/// Error in initializing the process-wide dispatcher
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum InitError {
    /// [`init`] was called twice without [`teardown`] in between.
    #[error("the dispatcher is already initialized")]
    AlreadyInitialized,
}

struct Global {
    dispatcher: Arc<Dispatcher<RealSystem>>,
    env: Arc<Mutex<Env>>,
}

static GLOBAL: Mutex<Option<Global>> = Mutex::new(None);

fn dispatcher() -> Result<Arc<Dispatcher<RealSystem>>, RegisterError> {
    GLOBAL
        .lock()
        .as_ref()
        .map(|global| Arc::clone(&global.dispatcher))
        .ok_or(RegisterError::Uninitialized)
}

fn shared_env() -> Result<Arc<Mutex<Env>>, RegisterError> {
    GLOBAL
        .lock()
        .as_ref()
        .map(|global| Arc::clone(&global.env))
        .ok_or(RegisterError::Uninitialized)
}

/// Creates the process-wide dispatcher.
///
/// Output of handlers is replayed to the standard output and standard error.
pub fn init(env: Env) -> Result<(), InitError> {
    init_with_sink(env, StdSink)
}

/// Creates the process-wide dispatcher with a custom sink.
pub fn init_with_sink<K: Sink + 'static>(env: Env, sink: K) -> Result<(), InitError> {
    let mut global = GLOBAL.lock();
    if global.is_some() {
        return Err(InitError::AlreadyInitialized);
    }
    *global = Some(Global {
        dispatcher: Arc::new(Dispatcher::with_sink(RealSystem::new(), sink)),
        env: Arc::new(Mutex::new(env)),
    });
    tracing::debug!("dispatcher initialized");
    Ok(())
}

/// Destroys the process-wide dispatcher.
///
/// All bindings replaced by the dispatcher are restored. Returns the
/// environment the dispatcher was using, or `None` if it was not
/// initialized.
pub fn teardown() -> std::io::Result<Option<Env>> {
    let Some(global) = GLOBAL.lock().take() else {
        return Ok(None);
    };
    global.dispatcher.teardown()?;
    tracing::debug!("dispatcher torn down");
    let env = global.env.lock().clone();
    Ok(Some(env))
}

/// Whether the process-wide dispatcher exists.
#[must_use]
pub fn is_initialized() -> bool {
    GLOBAL.lock().is_some()
}

/// Registers a handler.
///
/// See [`Dispatcher::register`].
pub fn register(
    event: Event,
    handler: Handler,
    options: RegisterOptions,
) -> Result<HandlerId, RegisterError> {
    dispatcher()?.register(event, handler, options)
}

/// Registers a handler for the event with the given name.
///
/// See [`Dispatcher::register_name`].
pub fn register_name(
    event: &str,
    handler: Handler,
    options: RegisterOptions,
) -> Result<HandlerId, RegisterError> {
    dispatcher()?.register_name(event, handler, options)
}

/// Removes a handler.
///
/// Returns false if the handler is not registered or the dispatcher is not
/// initialized.
pub fn unregister(id: &HandlerId) -> bool {
    dispatcher().is_ok_and(|dispatcher| dispatcher.unregister(id))
}

/// Returns the events that have handlers registered.
pub fn events() -> Result<Vec<Event>, RegisterError> {
    Ok(dispatcher()?.events())
}

/// Describes the handlers registered for the event.
pub fn list(event: Event) -> Result<Vec<HandlerInfo>, RegisterError> {
    Ok(dispatcher()?.list(event))
}

/// Installs the middleware.
///
/// See [`Dispatcher::configure_middleware`].
pub fn configure_middleware<M: Middleware + 'static>(middleware: M) -> Result<(), RegisterError> {
    dispatcher()?.configure_middleware(middleware);
    Ok(())
}

/// Calls the function with the shared environment.
///
/// The environment is locked while the function runs, so the function must
/// not call [`dispatch`] or [`run_pending`].
pub fn with_env<R, F: FnOnce(&mut Env) -> R>(f: F) -> Result<R, RegisterError> {
    let env = shared_env()?;
    let mut env = env.lock();
    Ok(f(&mut env))
}

/// Runs the handlers registered for the event.
///
/// See [`Dispatcher::dispatch`].
pub fn dispatch(
    event: Event,
    natural: ExitStatus,
    args: &[String],
) -> Result<Report, RegisterError> {
    let dispatcher = dispatcher()?;
    let shared = shared_env()?;
    let mut env = shared.lock().clone();
    let report = dispatcher.dispatch(&mut env, event, natural, args);
    *shared.lock() = env;
    Ok(report)
}

/// Dispatches signals caught since the last call.
///
/// Returns an empty vector if the dispatcher is not initialized.
pub fn run_pending() -> Vec<Report> {
    let (Ok(dispatcher), Ok(shared)) = (dispatcher(), shared_env()) else {
        return Vec::new();
    };
    let mut env = shared.lock().clone();
    let reports = dispatcher.run_pending(&mut env);
    *shared.lock() = env;
    reports
}

/// Returns a guard that dispatches `EXIT` when dropped.
///
/// The natural status of the dispatch is the status set with
/// [`ExitGuard::set_status`], or [`ExitStatus::PANICKED`] if the guard is
/// dropped during a panic.
#[must_use = "EXIT is dispatched when the guard is dropped"]
pub fn exit_guard() -> ExitGuard {
    ExitGuard {
        status: ExitStatus::SUCCESS,
    }
}

/// Guard returned by [`exit_guard`]
#[derive(Debug)]
pub struct ExitGuard {
    status: ExitStatus,
}

impl ExitGuard {
    /// Sets the natural status of the `EXIT` dispatch.
    pub fn set_status(&mut self, status: ExitStatus) {
        self.status = status;
    }
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let natural = if std::thread::panicking() {
            ExitStatus::PANICKED
        } else {
            self.status
        };
        match dispatch(Event::Exit, natural, &[]) {
            Ok(report) => tracing::debug!(status = %report.status, "EXIT dispatched"),
            Err(error) => tracing::debug!(%error, "EXIT not dispatched"),
        }
    }
}
