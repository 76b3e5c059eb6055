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

//! Results of a dispatch pass

use std::fmt::Display;
use tether_env::Event;
use tether_env::ExitStatus;
use tether_env::handler::{HandlerId, InvocationId, Kind};
use tether_env::timeline::Timeline;

/// Result of one handler in a dispatch pass
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HandlerOutcome {
    /// Handler that ran
    pub id: HandlerId,
    /// Kind of the handler
    pub kind: Kind,
    /// Identifier of the invocation, absent for source-mode handlers
    pub invocation: Option<InvocationId>,
    /// Exit status the handler returned
    pub raw: ExitStatus,
    /// Exit status after the middleware
    pub effective: ExitStatus,
    /// First line the handler wrote to the error stream
    pub first_error_line: Option<String>,
    /// Whether the middleware failed for this handler
    pub middleware_failed: bool,
    /// Timeline returned by the middleware, empty for source-mode handlers
    pub timeline: Timeline,
}

impl HandlerOutcome {
    /// Whether the effective exit status is successful.
    #[must_use]
    pub fn is_successful(&self) -> bool {
        self.effective.is_successful()
    }
}

/// Computes the status of a dispatch pass.
///
/// The result is `natural` if it is non-zero. Otherwise, it is the greatest
/// non-zero status in `statuses`, or zero if there is none.
#[must_use]
pub fn aggregate<I>(natural: ExitStatus, statuses: I) -> ExitStatus
where
    I: IntoIterator<Item = ExitStatus>,
{
    if !natural.is_successful() {
        return natural;
    }
    statuses
        .into_iter()
        .filter(|status| !status.is_successful())
        .max()
        .unwrap_or(ExitStatus::SUCCESS)
}

/// Result of a dispatch pass
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Report {
    /// Event that was dispatched
    pub event: Event,
    /// Status of the event before the handlers ran
    pub natural: ExitStatus,
    /// Results of the handlers in execution order
    pub outcomes: Vec<HandlerOutcome>,
    /// Aggregate status (see [`aggregate`])
    pub status: ExitStatus,
}

impl Report {
    /// Creates a report, computing the aggregate status.
    #[must_use]
    pub fn new(event: Event, natural: ExitStatus, outcomes: Vec<HandlerOutcome>) -> Self {
        let status = aggregate(natural, outcomes.iter().map(|outcome| outcome.effective));
        Report {
            event,
            natural,
            outcomes,
            status,
        }
    }

    /// Returns the outcomes of the handlers that failed.
    pub fn failures(&self) -> impl Iterator<Item = &HandlerOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.is_successful())
    }

    /// Returns the outcome of the handler with the label, if it ran.
    #[must_use]
    pub fn outcome(&self, label: &str) -> Option<&HandlerOutcome> {
        self.outcomes
            .iter()
            .find(|outcome| &*outcome.id.label == label)
    }

    /// Returns a value that displays one diagnostic line per failed handler.
    #[must_use]
    pub fn diagnostics(&self) -> impl Display + '_ {
        Diagnostics(self)
    }
}

struct Diagnostics<'a>(&'a Report);

impl Display for Diagnostics<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for outcome in self.0.failures() {
            write!(
                f,
                "{}: handler `{}` ({}) exited with status {}",
                self.0.event, outcome.id, outcome.kind, outcome.effective
            )?;
            if let Some(line) = &outcome.first_error_line {
                write!(f, ": {line}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
