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

//! Lifecycle of the process-wide dispatcher
//!
//! The singleton is process-wide state, so this file contains a single test.

#![cfg(unix)]

use assert_matches::assert_matches;
use tether_dispatch::global::{self, InitError};
use tether_dispatch::middleware::PreviewOnStatus;
use tether_dispatch::replay::MemorySink;
use tether_env::handler::Handler;
use tether_env::option::{On, Preview};
use tether_env::registry::{RegisterError, RegisterOptions};
use tether_env::signal::Name;
use tether_env::system::{Binding, Foreign, RealSystem, System};
use tether_env::timeline::Stream;
use tether_env::{Env, Event, ExitStatus};

#[test]
fn global_dispatcher_lifecycle() {
    let options = RegisterOptions::default();

    // Before init
    let result = global::register(Event::Exit, Handler::shell("early", "true"), options);
    assert_matches!(result, Err(RegisterError::Uninitialized));
    assert!(global::run_pending().is_empty());
    assert_matches!(global::list(Event::Exit), Err(RegisterError::Uninitialized));

    // A binding made by other code before the dispatcher takes over
    let usr1 = Event::Signal(Name::Usr1);
    let legacy = Binding::Foreign(Foreign::Command("echo legacy".to_owned()));
    let original = RealSystem::new().bind(usr1, legacy.clone()).unwrap();

    let sink = MemorySink::new();
    global::init_with_sink(Env::new(), sink.clone()).unwrap();
    assert_eq!(global::init(Env::new()), Err(InitError::AlreadyInitialized));
    assert!(global::is_initialized());

    let id = global::register_name("usr1", Handler::shell("mine", "echo mine"), options).unwrap();
    let list = global::list(usr1).unwrap();
    assert_eq!(list.len(), 2);
    assert!(!list[0].removable);
    assert_eq!(RealSystem::new().binding(usr1).unwrap(), Binding::Catch);

    // SAFETY: USR1 is caught by the dispatcher.
    unsafe { libc::raise(libc::SIGUSR1) };
    let reports = global::run_pending();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].outcomes.len(), 2);
    let replayed = sink.timeline();
    assert_eq!(
        replayed.lines(Stream::Out).collect::<Vec<_>>(),
        ["legacy", "mine"]
    );
    assert!(global::unregister(&id));
    assert!(!global::unregister(&id));

    // The middleware's side effect persists with retaineffects.
    global::with_env(|env| env.options.apply_list("retaineffects").unwrap()).unwrap();
    global::configure_middleware(PreviewOnStatus {
        trigger: ExitStatus(3),
    })
    .unwrap();
    global::register(Event::Error, Handler::shell("ask", "exit 3"), options).unwrap();
    let report = global::dispatch(Event::Error, ExitStatus::SUCCESS, &[]).unwrap();
    assert_eq!(report.status, ExitStatus::SUCCESS);
    assert_eq!(
        global::with_env(|env| env.options.get(Preview)).unwrap(),
        On
    );

    // EXIT is dispatched when the guard is dropped.
    let ran = global::register(
        Event::Exit,
        Handler::shell("bye", "echo \"bye $TETHER_PREVIEW\""),
        options,
    );
    assert!(ran.is_ok());
    {
        let mut guard = global::exit_guard();
        guard.set_status(ExitStatus(5));
    }
    assert_eq!(global::with_env(|env| env.exit_status).unwrap(), ExitStatus(5));
    assert_eq!(sink.timeline().lines(Stream::Out).last(), Some("bye 1"));

    let env = global::teardown().unwrap().unwrap();
    assert_eq!(env.exit_status, ExitStatus(5));
    assert!(!global::is_initialized());
    assert_eq!(RealSystem::new().binding(usr1).unwrap(), legacy);
    assert_eq!(RealSystem::new().binding(Event::Exit).unwrap(), Binding::Default);
    assert_matches!(global::teardown(), Ok(None));

    RealSystem::new().bind(usr1, original).unwrap();
}
