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

//! Handlers and their identities
//!
//! A [`Handler`] is a unit of behavior that can be registered against
//! lifecycle events. It is one of three [`Kind`]s:
//!
//! - A *function* handler is a Rust closure that runs with a private copy of
//!   the dispatching [`Env`] and writes its output through a [`Context`].
//! - A *command* handler runs an external process.
//! - A *source-mode* handler is a Rust closure that runs with the dispatching
//!   `Env` itself. Its changes to the environment persist.
//!
//! The registry holds a [`HandlerEntry`] for each registration. Entries share
//! the callable with the `Handler` they were made from.

use crate::env::Env;
use crate::event::Event;
use crate::status::ExitStatus;
use crate::timeline::{LineWriter, Recorder, Stream};
use std::sync::Arc;

/// Type of closures for function handlers
pub type FunctionFn = dyn Fn(&mut Context<'_>) -> ExitStatus + Send + Sync;

/// Type of closures for source-mode handlers
///
/// The second argument is the list of arguments passed to the dispatch.
pub type SourceFn = dyn Fn(&mut Env, &[String]) -> ExitStatus + Send + Sync;

/// Kind of handler
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Kind {
    /// Rust closure run in isolation with its output captured
    Function,
    /// External process run with its output captured
    Command,
    /// Rust closure run in the dispatching environment without capture
    Source,
}

impl Kind {
    /// Returns a lowercase name of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Function => "function",
            Kind::Command => "external-process",
            Kind::Source => "source",
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str().fmt(f)
    }
}

/// External command run by a command handler
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Command {
    /// Command string interpreted by `sh -c`
    ///
    /// The arguments of the dispatch are available as positional parameters.
    Shell(String),
    /// Program executed directly with the given arguments
    ///
    /// The arguments of the dispatch are appended to `args`.
    Program {
        /// Name or path of the program
        program: String,
        /// Leading arguments
        args: Vec<String>,
    },
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Shell(script) => script.fmt(f),
            Command::Program { program, args } => {
                program.fmt(f)?;
                args.iter().try_for_each(|arg| write!(f, " {arg}"))
            }
        }
    }
}

/// Code invoked by a handler
#[derive(Clone)]
pub enum Callable {
    /// See [`Kind::Function`].
    Function(Arc<FunctionFn>),
    /// See [`Kind::Command`].
    Command(Arc<Command>),
    /// See [`Kind::Source`].
    Source(Arc<SourceFn>),
}

impl std::fmt::Debug for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Callable::Function(function) => f
                .debug_tuple("Function")
                .field(&Arc::as_ptr(function))
                .finish(),
            Callable::Command(command) => f.debug_tuple("Command").field(command).finish(),
            Callable::Source(function) => f
                .debug_tuple("Source")
                .field(&Arc::as_ptr(function))
                .finish(),
        }
    }
}

impl Callable {
    /// Returns the kind of the callable.
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Callable::Function(_) => Kind::Function,
            Callable::Command(_) => Kind::Command,
            Callable::Source(_) => Kind::Source,
        }
    }

    /// Tests whether two callables denote the same code.
    ///
    /// Closures are identical if they share the same allocation, that is, if
    /// one handler was cloned from the other. Commands are identical if they
    /// are equal.
    #[must_use]
    pub fn is_same(&self, other: &Callable) -> bool {
        match (self, other) {
            (Callable::Function(a), Callable::Function(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            (Callable::Source(a), Callable::Source(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            (Callable::Command(a), Callable::Command(b)) => a == b,
            _ => false,
        }
    }
}

/// Handler to be registered
#[derive(Clone, Debug)]
pub struct Handler {
    /// Human-readable name of the handler
    pub label: Arc<str>,
    /// Code to run
    pub callable: Callable,
}

impl Handler {
    /// Creates a function handler.
    pub fn function<F>(label: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> ExitStatus + Send + Sync + 'static,
    {
        let callable = Callable::Function(Arc::new(f));
        Handler {
            label: label.into(),
            callable,
        }
    }

    /// Creates a command handler that runs a command string with `sh -c`.
    pub fn shell(label: impl Into<Arc<str>>, script: impl Into<String>) -> Self {
        let callable = Callable::Command(Arc::new(Command::Shell(script.into())));
        Handler {
            label: label.into(),
            callable,
        }
    }

    /// Creates a command handler that runs a program directly.
    pub fn program<I, S>(label: impl Into<Arc<str>>, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command = Command::Program {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        };
        Handler {
            label: label.into(),
            callable: Callable::Command(Arc::new(command)),
        }
    }

    /// Creates a source-mode handler.
    pub fn source<F>(label: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(&mut Env, &[String]) -> ExitStatus + Send + Sync + 'static,
    {
        let callable = Callable::Source(Arc::new(f));
        Handler {
            label: label.into(),
            callable,
        }
    }

    /// Returns the kind of the handler.
    #[must_use]
    pub fn kind(&self) -> Kind {
        self.callable.kind()
    }
}

/// Identifier of a registered handler
///
/// The identifier combines the registration sequence number, which is unique
/// in the registry, with the label of the handler. It is displayed as
/// `label#sequence`.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct HandlerId {
    /// Registration sequence number
    pub sequence: u64,
    /// Label of the handler
    pub label: Arc<str>,
}

impl std::fmt::Display for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.label, self.sequence)
    }
}

/// Registered handler
#[derive(Clone, Debug)]
pub struct HandlerEntry {
    /// Identifier assigned on registration
    pub id: HandlerId,
    /// Code to run
    pub callable: Callable,
    /// Whether the entry was registered with duplicates allowed
    pub allow_duplicates: bool,
    /// Whether the entry wraps the behavior bound before the dispatcher
    pub is_legacy: bool,
}

impl HandlerEntry {
    /// Returns the kind of the handler.
    #[must_use]
    pub fn kind(&self) -> Kind {
        self.callable.kind()
    }
}

/// Identifier of one invocation of a handler
///
/// Repeated invocations of handlers with the same label are numbered from 1
/// so that their timelines can be told apart. It is displayed as
/// `label.count`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct InvocationId {
    /// Label of the invoked handler
    pub label: Arc<str>,
    /// Number of invocations of handlers with the label so far
    pub count: u64,
}

impl std::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.label, self.count)
    }
}

/// Execution context of a function handler
///
/// The context owns a copy of the dispatching environment. Changes made to
/// [`env`](Self::env) are discarded when the handler returns.
#[derive(Debug)]
pub struct Context<'a> {
    /// Private copy of the dispatching environment
    pub env: Env,
    /// Event being dispatched
    pub event: Event,
    /// Arguments passed to the dispatch
    pub args: &'a [String],
    /// Identifier of the current invocation
    pub invocation: &'a InvocationId,
    out: LineWriter,
    err: LineWriter,
}

impl<'a> Context<'a> {
    /// Creates a context that records output to the recorder.
    #[must_use]
    pub fn new(
        env: Env,
        event: Event,
        args: &'a [String],
        invocation: &'a InvocationId,
        recorder: &Recorder,
    ) -> Self {
        Context {
            env,
            event,
            args,
            invocation,
            out: recorder.writer(Stream::Out),
            err: recorder.writer(Stream::Err),
        }
    }

    /// Returns the writer for the standard output.
    pub fn out(&mut self) -> &mut LineWriter {
        &mut self.out
    }

    /// Returns the writer for the standard error.
    pub fn err(&mut self) -> &mut LineWriter {
        &mut self.err
    }
}
