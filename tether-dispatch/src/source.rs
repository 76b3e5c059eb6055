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

//! Source-mode path
//!
//! A source-mode handler runs directly in the dispatching environment. It is
//! neither captured nor passed to the middleware, and its changes to the
//! [`Env`] persist after it returns.

use crate::capture::panic_message;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tether_env::Env;
use tether_env::Event;
use tether_env::ExitStatus;
use tether_env::handler::{HandlerId, SourceFn};

/// Runs a source-mode handler.
///
/// A panic in the handler is reported as [`ExitStatus::PANICKED`]. Changes
/// the handler made to the environment before panicking are kept.
pub fn run(
    function: &SourceFn,
    env: &mut Env,
    event: Event,
    handler: &HandlerId,
    args: &[String],
) -> ExitStatus {
    match catch_unwind(AssertUnwindSafe(|| function(env, args))) {
        Ok(status) => status,
        Err(payload) => {
            tracing::warn!(
                %event,
                %handler,
                panic = panic_message(&*payload),
                "source-mode handler panicked"
            );
            ExitStatus::PANICKED
        }
    }
}
