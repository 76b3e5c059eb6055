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

//! Dispatcher
//!
//! The [`Dispatcher`] owns a [`Registry`] and the [`System`] it binds events
//! in. When an event fires, [`dispatch`](Dispatcher::dispatch) runs every
//! handler registered for the event:
//!
//! 1. The handler list is snapshotted under the lock. A handler registered
//!    while the dispatch is in progress does not run in this pass.
//! 2. The legacy handler runs first, then the explicit handlers in
//!    registration order (or the reverse if the `lifo` option is on).
//!    Source-mode handlers run directly in the dispatching [`Env`]. Other
//!    handlers run in the [capture harness](crate::capture) and their results
//!    go through the [middleware](crate::middleware). If the `replay` option
//!    is on, the timeline returned by the middleware is replayed to the
//!    [`Sink`].
//! 3. A failing handler never prevents the next one from running. The
//!    aggregate status is computed as described in [`aggregate`].
//!
//! Source-mode handlers change the dispatching environment durably. Option
//! changes made by the middleware are reverted when the pass ends unless the
//! `retaineffects` option is on at that point. Later handlers in the same
//! pass see them either way.
//!
//! The lock is never held while a handler, the middleware, or the sink runs,
//! so handlers may register and unregister handlers and even dispatch events
//! themselves.
//!
//! [`aggregate`]: crate::report::aggregate

use crate::capture::{self, Capture, Request};
use crate::middleware::{self, Invocation, Middleware, PassThrough};
use crate::replay::{Sink, StdSink};
use crate::report::{HandlerOutcome, Report};
use crate::source;
use itertools::Itertools as _;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tether_env::Env;
use tether_env::Event;
use tether_env::ExitStatus;
use tether_env::handler::{Callable, Handler, HandlerEntry, HandlerId, InvocationId};
use tether_env::option::{Lifo, Off, On, OptionSet, Replay, RetainEffects};
use tether_env::registry::{HandlerInfo, Phase, RegisterError, RegisterOptions, Registry};
use tether_env::system::System;
use tether_env::timeline::{Stream, Timeline};

struct State<S> {
    system: S,
    registry: Registry,
    middleware: Arc<dyn Middleware>,
    invocation_counts: HashMap<Arc<str>, u64>,
}

/// Lifecycle event dispatcher
pub struct Dispatcher<S> {
    state: Mutex<State<S>>,
    sink: Mutex<Box<dyn Sink>>,
}

impl<S> std::fmt::Debug for Dispatcher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

impl<S: System> Dispatcher<S> {
    /// Creates a dispatcher that replays output to the standard output and
    /// standard error.
    pub fn new(system: S) -> Self {
        Self::with_sink(system, StdSink)
    }

    /// Creates a dispatcher that replays output to the sink.
    pub fn with_sink<K: Sink + 'static>(system: S, sink: K) -> Self {
        let state = State {
            system,
            registry: Registry::new(),
            middleware: Arc::new(PassThrough),
            invocation_counts: HashMap::new(),
        };
        Dispatcher {
            state: Mutex::new(state),
            sink: Mutex::new(Box::new(sink)),
        }
    }

    /// Registers a handler for the event.
    ///
    /// See [`Registry::register`].
    pub fn register(
        &self,
        event: Event,
        handler: Handler,
        options: RegisterOptions,
    ) -> Result<HandlerId, RegisterError> {
        let mut state = self.state.lock();
        let State {
            system, registry, ..
        } = &mut *state;
        registry.register(system, event, handler, options)
    }

    /// Registers a handler for the event with the given name.
    ///
    /// The name is parsed as described in [`Event`]'s `FromStr`
    /// implementation.
    pub fn register_name(
        &self,
        event: &str,
        handler: Handler,
        options: RegisterOptions,
    ) -> Result<HandlerId, RegisterError> {
        self.register(event.parse()?, handler, options)
    }

    /// Removes a handler.
    ///
    /// See [`Registry::unregister`].
    pub fn unregister(&self, id: &HandlerId) -> bool {
        self.state.lock().registry.unregister(id)
    }

    /// Describes the handlers registered for the event.
    #[must_use]
    pub fn list(&self, event: Event) -> Vec<HandlerInfo> {
        self.state.lock().registry.list(event)
    }

    /// Returns the events that have handlers registered.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.state.lock().registry.events().collect()
    }

    /// Returns the current phase of the event.
    #[must_use]
    pub fn phase(&self, event: Event) -> Phase {
        self.state.lock().registry.phase(event)
    }

    /// Installs the middleware, replacing the current one.
    ///
    /// The middleware applies to the function and command handlers of all
    /// events. A dispatch pass in progress keeps using the middleware that
    /// was active when it started.
    pub fn configure_middleware<M: Middleware + 'static>(&self, middleware: M) {
        self.state.lock().middleware = Arc::new(middleware);
    }

    /// Reinstalls the pass-through middleware.
    pub fn reset_middleware(&self) {
        self.configure_middleware(PassThrough)
    }

    /// Calls the function with the system.
    pub fn with_system<R, F: FnOnce(&mut S) -> R>(&self, f: F) -> R {
        f(&mut self.state.lock().system)
    }

    /// Restores the original bindings of all events and forgets all handlers.
    ///
    /// The middleware is reset to the pass-through.
    pub fn teardown(&self) -> std::io::Result<()> {
        let mut state = self.state.lock();
        let State {
            system,
            registry,
            middleware,
            invocation_counts,
        } = &mut *state;
        *middleware = Arc::new(PassThrough);
        invocation_counts.clear();
        registry.teardown(system)
    }

    /// Dispatches signals caught since the last call.
    ///
    /// Each caught signal is dispatched with a natural status of zero.
    pub fn run_pending(&self, env: &mut Env) -> Vec<Report> {
        let signals = self.state.lock().system.caught_signals();
        signals
            .into_iter()
            .map(|signal| self.dispatch(env, signal.into(), ExitStatus::SUCCESS, &[]))
            .collect()
    }

    /// Runs the handlers registered for the event.
    ///
    /// `natural` is the status the process already has for the event, such
    /// as the exit status of the main program for `EXIT`. `args` are passed
    /// to every handler. The aggregate status of the returned report is also
    /// stored in `env.exit_status`.
    ///
    /// Dispatching an event that has no registration does nothing.
    pub fn dispatch(
        &self,
        env: &mut Env,
        event: Event,
        natural: ExitStatus,
        args: &[String],
    ) -> Report {
        let snapshot = {
            let mut state = self.state.lock();
            match state.registry.enter(event) {
                None => None,
                Some(depth) => {
                    let entries = state.registry.snapshot(event, env.options.get(Lifo));
                    Some((depth, entries, Arc::clone(&state.middleware)))
                }
            }
        };
        let Some((depth, entries, middleware)) = snapshot else {
            tracing::debug!(%event, "no handlers registered");
            let report = Report::new(event, natural, Vec::new());
            env.exit_status = report.status;
            return report;
        };
        tracing::debug!(
            %event,
            depth,
            handlers = %entries.iter().map(|entry| &entry.id).join(", "),
            "dispatching"
        );

        // Options as they would be without the middleware's changes
        let mut durable_options = env.options;
        let mut outcomes = Vec::with_capacity(entries.len());
        for entry in &entries {
            let before = env.options;
            let outcome = self.run_handler(env, event, entry, &*middleware, args);
            if matches!(entry.callable, Callable::Source(_)) {
                carry_changes(&mut durable_options, &before, &env.options);
            }
            if outcome.is_successful() {
                tracing::debug!(%event, handler = %outcome.id, "handler succeeded");
            } else {
                tracing::warn!(
                    %event,
                    handler = %outcome.id,
                    kind = %outcome.kind,
                    raw = %outcome.raw,
                    status = %outcome.effective,
                    first_error_line = outcome.first_error_line.as_deref(),
                    "handler failed"
                );
            }
            outcomes.push(outcome);
        }

        if env.options.get(RetainEffects) == Off {
            env.options = durable_options;
        }
        self.state.lock().registry.leave(event);

        let report = Report::new(event, natural, outcomes);
        env.exit_status = report.status;
        tracing::debug!(%event, status = %report.status, "dispatch finished");
        report
    }

    fn run_handler(
        &self,
        env: &mut Env,
        event: Event,
        entry: &HandlerEntry,
        middleware: &dyn Middleware,
        args: &[String],
    ) -> HandlerOutcome {
        match &entry.callable {
            Callable::Source(function) => {
                let status = source::run(function.as_ref(), env, event, &entry.id, args);
                HandlerOutcome {
                    id: entry.id.clone(),
                    kind: entry.kind(),
                    invocation: None,
                    raw: status,
                    effective: status,
                    first_error_line: None,
                    middleware_failed: false,
                    timeline: Timeline::new(),
                }
            }
            Callable::Function(function) => {
                let invocation = self.next_invocation(&entry.id.label);
                let request = Request {
                    event,
                    handler: &entry.id,
                    invocation: &invocation,
                    args,
                };
                let capture = capture::run_function(function.as_ref(), env, &request);
                self.intercept(env, entry, &request, capture, middleware)
            }
            Callable::Command(command) => {
                let invocation = self.next_invocation(&entry.id.label);
                let request = Request {
                    event,
                    handler: &entry.id,
                    invocation: &invocation,
                    args,
                };
                let capture = capture::run_command(command, env, &request);
                self.intercept(env, entry, &request, capture, middleware)
            }
        }
    }

    fn next_invocation(&self, label: &Arc<str>) -> InvocationId {
        let mut state = self.state.lock();
        let count = state
            .invocation_counts
            .entry(Arc::clone(label))
            .or_insert(0);
        *count += 1;
        InvocationId {
            label: Arc::clone(label),
            count: *count,
        }
    }

    fn intercept(
        &self,
        env: &mut Env,
        entry: &HandlerEntry,
        request: &Request<'_>,
        capture: Capture,
        middleware: &dyn Middleware,
    ) -> HandlerOutcome {
        let first_error_line = capture
            .timeline
            .first_line(Stream::Err)
            .map(str::to_owned);
        let invocation = Invocation {
            event: request.event,
            handler: request.handler,
            invocation: request.invocation,
            exit_status: capture.status,
            timeline: capture.timeline,
            args: request.args,
        };
        let applied = middleware::apply(middleware, env, invocation);

        if env.options.get(Replay) == On {
            if let Err(error) = self.sink.lock().replay(&applied.outcome.timeline) {
                tracing::warn!(handler = %entry.id, %error, "cannot replay handler output");
            }
        }

        HandlerOutcome {
            id: entry.id.clone(),
            kind: entry.kind(),
            invocation: Some(request.invocation.clone()),
            raw: capture.status,
            effective: applied.outcome.exit_status,
            first_error_line,
            middleware_failed: applied.failed,
            timeline: applied.outcome.timeline,
        }
    }
}

/// Applies the options that differ between `before` and `after` to `target`.
fn carry_changes(target: &mut OptionSet, before: &OptionSet, after: &OptionSet) {
    for option in tether_env::option::Option::iter() {
        let state = after.get(option);
        if before.get(option) != state {
            target.set(option, state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{MiddlewareError, Outcome, PreviewOnStatus};
    use crate::replay::MemorySink;
    use std::io::Write as _;
    use tether_env::option::Preview;
    use tether_env::signal::Name;
    use tether_env::system::{Binding, Foreign, VirtualSystem};

    fn dispatcher() -> (Dispatcher<VirtualSystem>, VirtualSystem, MemorySink) {
        let system = VirtualSystem::new();
        let sink = MemorySink::new();
        let dispatcher = Dispatcher::with_sink(system.clone(), sink.clone());
        (dispatcher, system, sink)
    }

    fn labels(report: &Report) -> Vec<&str> {
        report
            .outcomes
            .iter()
            .map(|outcome| &*outcome.id.label)
            .collect()
    }

    fn status_handler(label: &str, status: i32) -> Handler {
        Handler::function(label, move |_| ExitStatus(status))
    }

    #[test]
    fn dispatching_uninitialized_event_does_nothing() {
        let (dispatcher, _, _) = dispatcher();
        let mut env = Env::new();
        let report = dispatcher.dispatch(&mut env, Event::Exit, ExitStatus(3), &[]);
        assert!(report.outcomes.is_empty());
        assert_eq!(report.status, ExitStatus(3));
        assert_eq!(env.exit_status, ExitStatus(3));
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let (dispatcher, _, _) = dispatcher();
        let options = RegisterOptions::default();
        for label in ["a", "b", "c"] {
            dispatcher
                .register(Event::Exit, status_handler(label, 0), options)
                .unwrap();
        }
        let mut env = Env::new();
        let report = dispatcher.dispatch(&mut env, Event::Exit, ExitStatus::SUCCESS, &[]);
        assert_eq!(labels(&report), ["a", "b", "c"]);

        env.options.set(Lifo, On);
        let report = dispatcher.dispatch(&mut env, Event::Exit, ExitStatus::SUCCESS, &[]);
        assert_eq!(labels(&report), ["c", "b", "a"]);
    }

    #[test]
    fn failures_do_not_stop_dispatch() {
        let (dispatcher, _, _) = dispatcher();
        let options = RegisterOptions::default();
        dispatcher
            .register(Event::Exit, status_handler("a", 4), options)
            .unwrap();
        dispatcher
            .register(Event::Exit, Handler::function("b", |_| panic!("b failed")), options)
            .unwrap();
        dispatcher
            .register(Event::Exit, status_handler("c", 0), options)
            .unwrap();

        let report = dispatcher.dispatch(&mut Env::new(), Event::Exit, ExitStatus::SUCCESS, &[]);
        assert_eq!(labels(&report), ["a", "b", "c"]);
        assert_eq!(report.outcome("b").unwrap().effective, ExitStatus::PANICKED);
        assert_eq!(report.status, ExitStatus::PANICKED);
        assert!(report.outcome("c").unwrap().is_successful());
    }

    #[test]
    fn output_is_replayed_unless_disabled() {
        let (dispatcher, _, sink) = dispatcher();
        let handler = Handler::function("a", |context| {
            writeln!(context.out(), "hello").unwrap();
            writeln!(context.err(), "world").unwrap();
            ExitStatus::SUCCESS
        });
        dispatcher
            .register(Event::Exit, handler, RegisterOptions::default())
            .unwrap();

        let mut env = Env::new();
        dispatcher.dispatch(&mut env, Event::Exit, ExitStatus::SUCCESS, &[]);
        let replayed = sink.timeline();
        assert_eq!(replayed.first_line(Stream::Out), Some("hello"));
        assert_eq!(replayed.first_line(Stream::Err), Some("world"));

        env.options.set(Replay, Off);
        dispatcher.dispatch(&mut env, Event::Exit, ExitStatus::SUCCESS, &[]);
        assert_eq!(sink.timeline().entries().len(), 2);
    }

    #[test]
    fn invocation_ids_count_per_label() {
        let (dispatcher, _, _) = dispatcher();
        let handler = Handler::function("same", |context| {
            let invocation = context.invocation;
            writeln!(context.out(), "{}", invocation).unwrap();
            ExitStatus::SUCCESS
        });
        let options = RegisterOptions {
            allow_duplicates: true,
        };
        dispatcher
            .register(Event::Exit, handler.clone(), options)
            .unwrap();
        dispatcher.register(Event::Exit, handler, options).unwrap();

        let report = dispatcher.dispatch(&mut Env::new(), Event::Exit, ExitStatus::SUCCESS, &[]);
        let invocations: Vec<_> = report
            .outcomes
            .iter()
            .map(|outcome| outcome.invocation.as_ref().unwrap().to_string())
            .collect();
        assert_eq!(invocations, ["same.1", "same.2"]);
        assert_eq!(report.outcomes[1].timeline.first_line(Stream::Out), Some("same.2"));
    }

    #[test]
    fn middleware_side_effect_is_seen_by_later_handlers_in_the_pass() {
        let (dispatcher, _, _) = dispatcher();
        dispatcher.configure_middleware(PreviewOnStatus {
            trigger: ExitStatus(3),
        });
        let options = RegisterOptions::default();
        dispatcher
            .register(Event::Exit, status_handler("request", 3), options)
            .unwrap();
        let observer = Handler::function("observer", |context| {
            ExitStatus((context.env.options.get(Preview) == On).into())
        });
        dispatcher.register(Event::Exit, observer, options).unwrap();

        let mut env = Env::new();
        let report = dispatcher.dispatch(&mut env, Event::Exit, ExitStatus::SUCCESS, &[]);
        assert_eq!(report.outcome("request").unwrap().raw, ExitStatus(3));
        assert_eq!(report.outcome("request").unwrap().effective, ExitStatus::SUCCESS);
        assert_eq!(report.outcome("observer").unwrap().raw, ExitStatus(1));
        // The option is reverted when the pass ends.
        assert_eq!(env.options.get(Preview), Off);

        env.options.set(RetainEffects, On);
        dispatcher.dispatch(&mut env, Event::Exit, ExitStatus::SUCCESS, &[]);
        assert_eq!(env.options.get(Preview), On);
    }

    #[test]
    fn source_handler_changes_persist_without_middleware() {
        let (dispatcher, _, sink) = dispatcher();
        dispatcher.configure_middleware(|_: &mut Env, _: Invocation<'_>| {
            Err::<Outcome, _>(MiddlewareError::new("must not be called"))
        });
        let handler = Handler::source("set", |env, args| {
            env.variables.insert("ARGS".into(), args.join(" "));
            ExitStatus(5)
        });
        dispatcher
            .register(Event::Error, handler, RegisterOptions::default())
            .unwrap();

        let mut env = Env::new();
        let args = ["x".to_owned(), "y".to_owned()];
        let report = dispatcher.dispatch(&mut env, Event::Error, ExitStatus::SUCCESS, &args);
        let outcome = &report.outcomes[0];
        assert_eq!(outcome.effective, ExitStatus(5));
        assert!(!outcome.middleware_failed);
        assert_eq!(outcome.invocation, None);
        assert_eq!(env.variables["ARGS"], "x y");
        assert!(sink.timeline().is_empty());
    }

    #[test]
    fn source_handler_option_changes_outlive_the_pass() {
        let (dispatcher, _, _) = dispatcher();
        dispatcher.configure_middleware(PreviewOnStatus {
            trigger: ExitStatus(3),
        });
        let options = RegisterOptions::default();
        dispatcher
            .register(Event::Exit, status_handler("request", 3), options)
            .unwrap();
        let lifo = Handler::source("lifo", |env, _| {
            env.options.set(Lifo, On);
            ExitStatus::SUCCESS
        });
        dispatcher.register(Event::Exit, lifo, options).unwrap();

        let mut env = Env::new();
        assert_eq!(env.options.get(RetainEffects), Off);
        dispatcher.dispatch(&mut env, Event::Exit, ExitStatus::SUCCESS, &[]);
        assert_eq!(env.options.get(Lifo), On);
        // The middleware's change is still reverted.
        assert_eq!(env.options.get(Preview), Off);
    }

    #[test]
    fn source_handler_can_turn_preview_on() {
        let (dispatcher, _, _) = dispatcher();
        let handler = Handler::source("preview", |env, _| {
            env.options.set(Preview, On);
            ExitStatus::SUCCESS
        });
        dispatcher
            .register(Event::Exit, handler, RegisterOptions::default())
            .unwrap();

        let mut env = Env::new();
        dispatcher.dispatch(&mut env, Event::Exit, ExitStatus::SUCCESS, &[]);
        assert_eq!(env.options.get(Preview), On);
    }

    #[test]
    fn handler_registered_during_dispatch_runs_next_time() {
        let dispatcher = Arc::new(dispatcher().0);
        let inner = Arc::downgrade(&dispatcher);
        let registrar = Handler::function("registrar", move |_| {
            if let Some(dispatcher) = inner.upgrade() {
                let late = status_handler("late", 0);
                let options = RegisterOptions {
                    allow_duplicates: true,
                };
                dispatcher.register(Event::Exit, late, options).unwrap();
            }
            ExitStatus::SUCCESS
        });
        dispatcher
            .register(Event::Exit, registrar, RegisterOptions::default())
            .unwrap();

        let mut env = Env::new();
        let report = dispatcher.dispatch(&mut env, Event::Exit, ExitStatus::SUCCESS, &[]);
        assert_eq!(labels(&report), ["registrar"]);
        let report = dispatcher.dispatch(&mut env, Event::Exit, ExitStatus::SUCCESS, &[]);
        assert_eq!(labels(&report), ["registrar", "late"]);
    }

    #[test]
    fn phase_is_dispatching_while_handlers_run() {
        let dispatcher = Arc::new(dispatcher().0);
        let inner = Arc::downgrade(&dispatcher);
        let probe = Handler::function("probe", move |_| match inner.upgrade() {
            Some(dispatcher) if dispatcher.phase(Event::Exit) == Phase::Dispatching(1) => {
                ExitStatus::SUCCESS
            }
            _ => ExitStatus::FAILURE,
        });
        assert_eq!(dispatcher.phase(Event::Exit), Phase::Uninitialized);
        dispatcher
            .register(Event::Exit, probe, RegisterOptions::default())
            .unwrap();
        assert_eq!(dispatcher.phase(Event::Exit), Phase::Initialized);

        let report = dispatcher.dispatch(&mut Env::new(), Event::Exit, ExitStatus::SUCCESS, &[]);
        assert_eq!(report.status, ExitStatus::SUCCESS);
        assert_eq!(dispatcher.phase(Event::Exit), Phase::Initialized);
    }

    #[test]
    fn run_pending_dispatches_caught_signals() {
        let (dispatcher, system, _) = dispatcher();
        dispatcher
            .register(Name::Usr1.into(), status_handler("usr1", 0), RegisterOptions::default())
            .unwrap();
        assert_eq!(system.raise(Name::Usr1), Binding::Catch);
        assert_eq!(system.raise(Name::Usr2), Binding::Default);

        let reports = dispatcher.run_pending(&mut Env::new());
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].event, Event::Signal(Name::Usr1));
        assert!(dispatcher.run_pending(&mut Env::new()).is_empty());
    }

    #[test]
    fn teardown_restores_bindings() {
        let (dispatcher, mut system, _) = dispatcher();
        let foreign = Binding::Foreign(Foreign::Command("echo legacy".into()));
        system.bind(Name::Hup.into(), foreign.clone()).unwrap();
        dispatcher
            .register_name("hangup", status_handler("a", 0), RegisterOptions::default())
            .unwrap();
        assert_eq!(system.binding(Name::Hup.into()).unwrap(), Binding::Catch);

        dispatcher.teardown().unwrap();
        assert_eq!(system.binding(Name::Hup.into()).unwrap(), foreign);
        assert!(dispatcher.events().is_empty());
    }

    #[test]
    fn register_name_rejects_unknown_events() {
        let (dispatcher, _, _) = dispatcher();
        let options = RegisterOptions::default();
        let result = dispatcher.register_name("BOGUS", status_handler("a", 0), options);
        assert!(matches!(result, Err(RegisterError::Event(_))));
        let result = dispatcher.register_name("kill", status_handler("a", 0), options);
        assert!(matches!(result, Err(RegisterError::Event(_))));
    }
}
