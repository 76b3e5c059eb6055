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

//! Behavioral properties of the dispatcher

use assert_matches::assert_matches;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use tether_dispatch::Dispatcher;
use tether_dispatch::middleware::{Invocation, Outcome};
use tether_dispatch::replay::MemorySink;
use tether_env::handler::{Context, Handler, Kind};
use tether_env::registry::{RegisterError, RegisterOptions};
use tether_env::signal::Name;
use tether_env::system::{Binding, Foreign, System, VirtualSystem};
use tether_env::timeline::Stream;
use tether_env::{Env, Event, ExitStatus};

struct Fixture {
    dispatcher: Dispatcher<VirtualSystem>,
    system: VirtualSystem,
    sink: MemorySink,
    dir: TempDir,
    env: Env,
}

impl Fixture {
    fn new() -> Self {
        let system = VirtualSystem::new();
        let sink = MemorySink::new();
        let dispatcher = Dispatcher::with_sink(system.clone(), sink.clone());
        let dir = tempfile::tempdir().unwrap();
        let mut env = Env::new();
        env.variables.insert(
            "LOG".to_owned(),
            dir.path().join("log").to_string_lossy().into_owned(),
        );
        Fixture {
            dispatcher,
            system,
            sink,
            dir,
            env,
        }
    }

    fn log(&self) -> Vec<String> {
        read_lines(&self.dir.path().join("log"))
    }

    fn dispatch(&mut self, event: Event) -> tether_dispatch::Report {
        self.dispatcher
            .dispatch(&mut self.env, event, ExitStatus::SUCCESS, &[])
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_owned)
        .collect()
}

/// Command handler that appends its name to `$LOG` and exits with the status.
fn logger(name: &str, status: i32) -> Handler {
    Handler::shell(name, format!("echo {name} >> \"$LOG\"; exit {status}"))
}

#[test]
fn legacy_handler_runs_before_explicit_handlers_in_registration_order() {
    let mut fixture = Fixture::new();
    let legacy = Foreign::Command("echo L >> \"$LOG\"".to_owned());
    fixture
        .system
        .bind(Event::Exit, Binding::Foreign(legacy))
        .unwrap();
    let options = RegisterOptions::default();
    fixture
        .dispatcher
        .register(Event::Exit, logger("H1", 0), options)
        .unwrap();
    fixture
        .dispatcher
        .register(Event::Exit, logger("H2", 0), options)
        .unwrap();

    let report = fixture.dispatch(Event::Exit);
    assert_eq!(fixture.log(), ["L", "H1", "H2"]);
    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(&*report.outcomes[0].id.label, "legacy:EXIT");
}

#[test]
fn failing_handler_does_not_prevent_later_handlers() {
    let mut fixture = Fixture::new();
    let options = RegisterOptions::default();
    fixture
        .dispatcher
        .register(Event::Exit, logger("H1", 1), options)
        .unwrap();
    fixture
        .dispatcher
        .register(Event::Exit, logger("H2", 0), options)
        .unwrap();

    let report = fixture.dispatch(Event::Exit);
    assert_eq!(fixture.log(), ["H1", "H2"]);
    assert_eq!(report.outcome("H1").unwrap().effective, ExitStatus(1));
    assert_eq!(report.outcome("H2").unwrap().effective, ExitStatus::SUCCESS);
    assert_eq!(report.status, ExitStatus(1));
}

#[test]
fn legacy_function_is_invoked_exactly_once_as_first_handler() {
    let mut fixture = Fixture::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let legacy = {
        let calls = Arc::clone(&calls);
        let order = Arc::clone(&order);
        Foreign::Function(Arc::new(move |_: &mut Context<'_>| {
            calls.fetch_add(1, Ordering::SeqCst);
            order.lock().push("legacy");
            ExitStatus::SUCCESS
        }))
    };
    let event = Event::Signal(Name::Int);
    fixture
        .system
        .bind(event, Binding::Foreign(legacy))
        .unwrap();

    let options = RegisterOptions::default();
    for label in ["first", "second"] {
        let order = Arc::clone(&order);
        let handler = Handler::function(label, move |_| {
            order.lock().push(label);
            ExitStatus::SUCCESS
        });
        fixture.dispatcher.register(event, handler, options).unwrap();
    }

    let list = fixture.dispatcher.list(event);
    assert_eq!(list.len(), 3);
    assert!(!list[0].removable);
    assert_eq!(list[0].kind, Kind::Function);

    fixture.dispatch(event);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*order.lock(), ["legacy", "first", "second"]);
}

#[test]
fn duplicates_require_opt_in() {
    let mut fixture = Fixture::new();
    let handler = logger("dup", 0);
    fixture
        .dispatcher
        .register(Event::Exit, handler.clone(), RegisterOptions::default())
        .unwrap();

    let result = fixture
        .dispatcher
        .register(Event::Exit, handler.clone(), RegisterOptions::default());
    assert_matches!(result, Err(RegisterError::Duplicate { .. }));
    assert_eq!(fixture.dispatcher.list(Event::Exit).len(), 1);

    let options = RegisterOptions {
        allow_duplicates: true,
    };
    fixture
        .dispatcher
        .register(Event::Exit, handler, options)
        .unwrap();
    assert_eq!(fixture.dispatcher.list(Event::Exit).len(), 2);

    fixture.dispatch(Event::Exit);
    assert_eq!(fixture.log(), ["dup", "dup"]);
}

#[test]
fn default_middleware_preserves_status_and_output() {
    let mut fixture = Fixture::new();
    let handler = Handler::shell("noisy", "echo one; echo two >&2; echo three; exit 3");
    fixture
        .dispatcher
        .register(Event::Exit, handler, RegisterOptions::default())
        .unwrap();

    let report = fixture.dispatch(Event::Exit);
    let outcome = report.outcome("noisy").unwrap();
    assert_eq!(outcome.raw, ExitStatus(3));
    assert_eq!(outcome.effective, ExitStatus(3));
    assert!(!outcome.middleware_failed);

    let replayed = fixture.sink.timeline();
    assert_eq!(replayed.lines(Stream::Out).collect::<Vec<_>>(), ["one", "three"]);
    assert_eq!(replayed.lines(Stream::Err).collect::<Vec<_>>(), ["two"]);
    assert_eq!(outcome.first_error_line.as_deref(), Some("two"));
}

#[test]
fn replayed_bytes_match_command_output() {
    let mut fixture = Fixture::new();
    let handler = Handler::shell("partial", "printf 'line\\nno-newline'");
    fixture
        .dispatcher
        .register(Event::Exit, handler, RegisterOptions::default())
        .unwrap();

    fixture.dispatch(Event::Exit);
    let mut out = Vec::new();
    let mut err = Vec::new();
    fixture.sink.timeline().replay(&mut out, &mut err).unwrap();
    assert_eq!(out, b"line\nno-newline");
    assert_eq!(err, b"");
}

#[test]
fn function_output_is_replayed_in_emission_order() {
    let mut fixture = Fixture::new();
    let handler = Handler::function("writer", |context| {
        writeln!(context.out(), "a").unwrap();
        writeln!(context.err(), "b").unwrap();
        writeln!(context.out(), "c").unwrap();
        ExitStatus::SUCCESS
    });
    fixture
        .dispatcher
        .register(Event::Exit, handler, RegisterOptions::default())
        .unwrap();

    fixture.dispatch(Event::Exit);
    let replayed = fixture.sink.timeline();
    let lines: Vec<_> = replayed
        .entries()
        .iter()
        .map(|entry| (entry.stream, entry.line.as_str()))
        .collect();
    assert_eq!(lines, [(Stream::Out, "a"), (Stream::Err, "b"), (Stream::Out, "c")]);
}

#[test]
fn middleware_can_override_failure() {
    let mut fixture = Fixture::new();
    fixture
        .dispatcher
        .configure_middleware(|_: &mut Env, invocation: Invocation<'_>| {
            Ok(Outcome {
                exit_status: ExitStatus::SUCCESS,
                timeline: invocation.timeline,
            })
        });
    fixture
        .dispatcher
        .register(Event::Exit, logger("fails", 9), RegisterOptions::default())
        .unwrap();

    let report = fixture.dispatch(Event::Exit);
    let outcome = report.outcome("fails").unwrap();
    assert_eq!(outcome.raw, ExitStatus(9));
    assert_eq!(outcome.effective, ExitStatus::SUCCESS);
    assert_eq!(report.status, ExitStatus::SUCCESS);
}

#[test]
fn unregister_is_idempotent_and_isolated() {
    let mut fixture = Fixture::new();
    let options = RegisterOptions::default();
    let first = fixture
        .dispatcher
        .register(Event::Exit, logger("first", 0), options)
        .unwrap();
    fixture
        .dispatcher
        .register(Event::Exit, logger("second", 0), options)
        .unwrap();

    assert!(fixture.dispatcher.unregister(&first));
    assert!(!fixture.dispatcher.unregister(&first));
    let mut unknown = first.clone();
    unknown.sequence = 1000;
    assert!(!fixture.dispatcher.unregister(&unknown));

    fixture.dispatch(Event::Exit);
    assert_eq!(fixture.log(), ["second"]);
}

#[test]
fn natural_status_takes_precedence() {
    let mut fixture = Fixture::new();
    fixture
        .dispatcher
        .register(Event::Exit, logger("fails", 1), RegisterOptions::default())
        .unwrap();
    let report = fixture
        .dispatcher
        .dispatch(&mut fixture.env, Event::Exit, ExitStatus(42), &[]);
    assert_eq!(report.status, ExitStatus(42));
    assert_eq!(fixture.env.exit_status, ExitStatus(42));
}
