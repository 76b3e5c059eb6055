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

//! Capture harness
//!
//! The harness runs one function or command handler in an isolated context
//! and records every line the handler writes into a [`Timeline`]. The exit
//! status of the handler is returned unmodified; nothing the handler does,
//! including panicking, escapes the harness.
//!
//! A function handler runs in the current thread with a private copy of the
//! dispatching [`Env`]. A command handler runs as a child process whose
//! standard output and standard error are drained by two threads while the
//! child runs. Both threads write to the same [`Recorder`], so the timeline
//! reflects the order in which lines were read. The interleaving of the two
//! streams is best-effort because the child may buffer its output.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::process::{Child, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;
use tether_env::Env;
use tether_env::Event;
use tether_env::ExitStatus;
use tether_env::handler::{Command, Context, FunctionFn, HandlerId, InvocationId};
use tether_env::option::{On, Preview};
use tether_env::signal::Name;
use tether_env::timeline::{LineWriter, Recorder, Stream, Timeline};
use wait_timeout::ChildExt;

/// Name of the variable that tells command handlers the dispatched event
pub const EVENT_VAR: &str = "TETHER_EVENT";
/// Name of the variable that tells command handlers their handler ID
pub const HANDLER_VAR: &str = "TETHER_HANDLER";
/// Name of the variable that tells command handlers their invocation ID
pub const INVOCATION_VAR: &str = "TETHER_INVOCATION";
/// Name of the variable set to `1` for command handlers in preview mode
pub const PREVIEW_VAR: &str = "TETHER_PREVIEW";

/// Name given to `$0` of shell command handlers
const SHELL_ARG0: &str = "tether";

/// Invocation being captured
#[derive(Clone, Copy, Debug)]
pub struct Request<'a> {
    /// Event being dispatched
    pub event: Event,
    /// Handler being invoked
    pub handler: &'a HandlerId,
    /// Identifier of this invocation
    pub invocation: &'a InvocationId,
    /// Arguments passed to the dispatch
    pub args: &'a [String],
}

/// Result of a captured invocation
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Capture {
    /// Raw exit status of the handler
    pub status: ExitStatus,
    /// Lines the handler wrote
    pub timeline: Timeline,
}

/// Extracts a human-readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Runs a function handler.
///
/// The handler receives a clone of `env`. If the handler panics, the panic
/// message is recorded to the error stream and the status is
/// [`ExitStatus::PANICKED`].
pub fn run_function(function: &FunctionFn, env: &Env, request: &Request<'_>) -> Capture {
    let recorder = Recorder::new();
    let result = {
        let mut context = Context::new(
            env.clone(),
            request.event,
            request.args,
            request.invocation,
            &recorder,
        );
        catch_unwind(AssertUnwindSafe(|| function(&mut context)))
    };
    let status = match result {
        Ok(status) => status,
        Err(payload) => {
            let message = panic_message(&*payload);
            tracing::warn!(
                event = %request.event,
                handler = %request.handler,
                panic = message,
                "function handler panicked"
            );
            recorder.record(Stream::Err, format!("{SHELL_ARG0}: panicked: {message}"));
            ExitStatus::PANICKED
        }
    };
    Capture {
        status,
        timeline: recorder.take(),
    }
}

/// Runs a command handler.
///
/// The child inherits the process environment plus the variables in
/// `env.variables`, [`EVENT_VAR`], [`HANDLER_VAR`], [`INVOCATION_VAR`], and,
/// if the preview option is on, [`PREVIEW_VAR`]. Its standard input is
/// `/dev/null`.
///
/// If the child cannot be started, an error message is recorded and the
/// status is [`ExitStatus::NOEXEC`]. If `env.handler_timeout` elapses before
/// the child exits, the child is killed.
pub fn run_command(command: &Command, env: &Env, request: &Request<'_>) -> Capture {
    let recorder = Recorder::new();
    let status = spawn_and_wait(command, env, request, &recorder);
    Capture {
        status,
        timeline: recorder.take(),
    }
}

fn build(command: &Command, env: &Env, request: &Request<'_>) -> std::process::Command {
    let mut process = match command {
        Command::Shell(script) => {
            let mut process = std::process::Command::new("sh");
            process.arg("-c").arg(script).arg(SHELL_ARG0);
            process
        }
        Command::Program { program, args } => {
            let mut process = std::process::Command::new(program);
            process.args(args);
            process
        }
    };
    process
        .args(request.args)
        .envs(&env.variables)
        .env(EVENT_VAR, request.event.as_str())
        .env(HANDLER_VAR, request.handler.to_string())
        .env(INVOCATION_VAR, request.invocation.to_string());
    if env.options.get(Preview) == On {
        process.env(PREVIEW_VAR, "1");
    } else {
        process.env_remove(PREVIEW_VAR);
    }
    process
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    // Put the child in its own process group so that a timeout can kill
    // everything the child started.
    #[cfg(unix)]
    if env.handler_timeout.is_some() {
        use std::os::unix::process::CommandExt as _;
        process.process_group(0);
    }

    process
}

fn spawn_and_wait(
    command: &Command,
    env: &Env,
    request: &Request<'_>,
    recorder: &Recorder,
) -> ExitStatus {
    let mut child = match build(command, env, request).spawn() {
        Ok(child) => child,
        Err(error) => {
            tracing::warn!(
                event = %request.event,
                handler = %request.handler,
                %command,
                %error,
                "cannot start command handler"
            );
            recorder.record(
                Stream::Err,
                format!("{SHELL_ARG0}: cannot run `{command}`: {error}"),
            );
            return ExitStatus::NOEXEC;
        }
    };

    let readers = [
        child
            .stdout
            .take()
            .map(|pipe| drain(pipe, recorder.writer(Stream::Out))),
        child
            .stderr
            .take()
            .map(|pipe| drain(pipe, recorder.writer(Stream::Err))),
    ];

    let status = wait(&mut child, env.handler_timeout, request);

    for reader in readers.into_iter().flatten() {
        if reader.join().is_err() {
            tracing::warn!(handler = %request.handler, "output reader thread panicked");
        }
    }
    status
}

fn drain<R>(mut pipe: R, mut writer: LineWriter) -> JoinHandle<()>
where
    R: std::io::Read + Send + 'static,
{
    std::thread::spawn(move || {
        // A read error ends the output. The partial line is recorded when
        // the writer is dropped.
        let _ = std::io::copy(&mut pipe, &mut writer);
    })
}

fn wait(child: &mut Child, timeout: Option<Duration>, request: &Request<'_>) -> ExitStatus {
    let result = match timeout {
        None => child.wait().map(Some),
        Some(duration) => child.wait_timeout(duration),
    };
    match result {
        Ok(Some(status)) => status.into(),
        Ok(None) => {
            tracing::warn!(
                event = %request.event,
                handler = %request.handler,
                timeout = ?timeout,
                "command handler timed out; killing it"
            );
            kill(child);
            match child.wait() {
                Ok(status) => status.into(),
                Err(_) => ExitStatus::from(Name::Kill),
            }
        }
        Err(error) => {
            tracing::warn!(handler = %request.handler, %error, "cannot wait for command handler");
            kill(child);
            let _ = child.wait();
            ExitStatus::FAILURE
        }
    }
}

#[cfg(unix)]
fn kill(child: &mut Child) {
    match libc::pid_t::try_from(child.id()) {
        // SAFETY: kill has no memory safety requirements.
        Ok(pid) if unsafe { libc::kill(-pid, libc::SIGKILL) } == 0 => (),
        _ => {
            let _ = child.kill();
        }
    }
}

#[cfg(not(unix))]
fn kill(child: &mut Child) {
    let _ = child.kill();
}
