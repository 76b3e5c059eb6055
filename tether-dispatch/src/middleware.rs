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

//! Middleware invocation contract
//!
//! The middleware is the single extension point that can reinterpret the
//! raw result of a captured handler. For every function or command handler,
//! the dispatcher passes an [`Invocation`] to the active [`Middleware`] and
//! uses the returned [`Outcome`] in place of the raw result: the outcome's
//! exit status is what the report and the aggregate status see, and the
//! outcome's timeline is what gets replayed to the output.
//!
//! The middleware also receives the dispatching [`Env`] mutably. This is the
//! only supported channel through which one handler's result can affect
//! handlers that run later, for example by turning on the preview option.
//!
//! A middleware that returns an error or panics *fails open*: the raw exit
//! status and the original timeline are used, changes the middleware made to
//! the environment are rolled back, and the failure is logged with the
//! `tether::middleware` target.

use crate::capture::panic_message;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tether_env::Env;
use tether_env::Event;
use tether_env::ExitStatus;
use tether_env::handler::{HandlerId, InvocationId};
use tether_env::option::{On, Preview};
use tether_env::timeline::Timeline;
use thiserror::Error;

/// Target of log events about middleware failures
pub const LOG_TARGET: &str = "tether::middleware";

/// Captured handler invocation presented to the middleware
#[derive(Clone, Debug)]
pub struct Invocation<'a> {
    /// Event being dispatched
    pub event: Event,
    /// Handler that was invoked
    pub handler: &'a HandlerId,
    /// Identifier of the invocation
    pub invocation: &'a InvocationId,
    /// Raw exit status of the handler
    pub exit_status: ExitStatus,
    /// Lines the handler wrote
    pub timeline: Timeline,
    /// Arguments passed to the dispatch
    pub args: &'a [String],
}

/// Effective result of a handler as decided by the middleware
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Outcome {
    /// Exit status recorded for the handler
    pub exit_status: ExitStatus,
    /// Lines to replay to the output
    pub timeline: Timeline,
}

/// Error returned by a middleware
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("{message}")]
pub struct MiddlewareError {
    /// Description of the error
    pub message: String,
}

impl MiddlewareError {
    /// Creates an error with the message.
    pub fn new(message: impl Into<String>) -> Self {
        MiddlewareError {
            message: message.into(),
        }
    }
}

/// Interpreter of captured handler results
pub trait Middleware: Send + Sync {
    /// Decides the effective result of a handler invocation.
    fn intercept(
        &self,
        env: &mut Env,
        invocation: Invocation<'_>,
    ) -> Result<Outcome, MiddlewareError>;
}

impl<F> Middleware for F
where
    F: Fn(&mut Env, Invocation<'_>) -> Result<Outcome, MiddlewareError> + Send + Sync,
{
    fn intercept(
        &self,
        env: &mut Env,
        invocation: Invocation<'_>,
    ) -> Result<Outcome, MiddlewareError> {
        self(env, invocation)
    }
}

/// Default middleware
///
/// `PassThrough` returns the raw exit status unchanged and the timeline for
/// verbatim replay.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct PassThrough;

impl Middleware for PassThrough {
    fn intercept(
        &self,
        _: &mut Env,
        invocation: Invocation<'_>,
    ) -> Result<Outcome, MiddlewareError> {
        Ok(Outcome {
            exit_status: invocation.exit_status,
            timeline: invocation.timeline,
        })
    }
}

/// Middleware that switches to preview mode on a particular exit status
///
/// When a handler exits with `trigger`, this middleware turns on the
/// [`Preview`] option in the dispatching environment and reports the handler
/// as successful. Handlers that run later in the same dispatch pass observe
/// the preview option. Other results pass through unchanged.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct PreviewOnStatus {
    /// Exit status that requests preview mode
    pub trigger: ExitStatus,
}

impl Middleware for PreviewOnStatus {
    fn intercept(
        &self,
        env: &mut Env,
        invocation: Invocation<'_>,
    ) -> Result<Outcome, MiddlewareError> {
        if invocation.exit_status != self.trigger {
            return PassThrough.intercept(env, invocation);
        }
        tracing::debug!(handler = %invocation.handler, "switching to preview mode");
        env.options.set(Preview, On);
        Ok(Outcome {
            exit_status: ExitStatus::SUCCESS,
            timeline: invocation.timeline,
        })
    }
}

/// Result of [`apply`]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Applied {
    /// Effective result
    pub outcome: Outcome,
    /// Whether the middleware failed and the raw result was used
    pub failed: bool,
}

/// Passes an invocation to the middleware, failing open.
pub fn apply(middleware: &dyn Middleware, env: &mut Env, invocation: Invocation<'_>) -> Applied {
    let event = invocation.event;
    let handler = invocation.handler;
    let raw = Outcome {
        exit_status: invocation.exit_status,
        timeline: invocation.timeline.clone(),
    };
    let saved_env = env.clone();

    let result = catch_unwind(AssertUnwindSafe(|| middleware.intercept(env, invocation)));
    let error = match result {
        Ok(Ok(outcome)) => {
            return Applied {
                outcome,
                failed: false,
            };
        }
        Ok(Err(error)) => error.message,
        Err(payload) => format!("panicked: {}", panic_message(&*payload)),
    };

    tracing::warn!(
        target: LOG_TARGET,
        %event,
        %handler,
        exit_status = %raw.exit_status,
        %error,
        "middleware failed; using the raw result"
    );
    *env = saved_env;
    Applied {
        outcome: raw,
        failed: true,
    }
}
