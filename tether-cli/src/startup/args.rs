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

//! Command-line arguments

use clap::Parser;
use std::str::FromStr;
use tether_env::Event;
use tether_env::event::ParseEventError;
use thiserror::Error;

/// Command handler specified with `--on`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OnSpec {
    /// Event to register the handler for
    pub event: Event,
    /// Command string run by `sh -c`
    pub command: String,
}

/// Error in parsing an `--on` value
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum OnSpecError {
    /// The value does not contain `=`.
    #[error("expected EVENT=COMMAND")]
    MissingSeparator,
    /// The event name is invalid.
    #[error(transparent)]
    Event(#[from] ParseEventError),
    /// The command is empty.
    #[error("empty command")]
    EmptyCommand,
}

impl FromStr for OnSpec {
    type Err = OnSpecError;

    fn from_str(s: &str) -> Result<Self, OnSpecError> {
        let (event, command) = s.split_once('=').ok_or(OnSpecError::MissingSeparator)?;
        let event = event.parse()?;
        if command.trim().is_empty() {
            return Err(OnSpecError::EmptyCommand);
        }
        let command = command.to_owned();
        Ok(OnSpec { event, command })
    }
}

/// Runs a program with lifecycle event handlers.
///
/// Handlers registered with `--on` run when the program exits (EXIT), when
/// it exits with a non-zero status (ERR, before EXIT), or when tether
/// receives a signal while the program is running. Handler output is
/// captured and replayed after each handler finishes.
#[derive(Clone, Debug, Parser)]
#[command(name = "tether", version)]
pub struct Args {
    /// Runs COMMAND with `sh -c` when EVENT occurs
    #[arg(long = "on", value_name = "EVENT=COMMAND")]
    pub on: Vec<OnSpec>,

    /// Runs handlers in reverse registration order
    #[arg(long)]
    pub lifo: bool,

    /// Starts in preview mode (handlers see TETHER_PREVIEW=1)
    #[arg(long)]
    pub preview: bool,

    /// Keeps option changes made by the middleware across events
    #[arg(long)]
    pub retain_effects: bool,

    /// Discards handler output instead of replaying it
    #[arg(long)]
    pub no_replay: bool,

    /// Kills a handler that runs longer than SECONDS
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<f64>,

    /// Switches to preview mode when a handler exits with STATUS
    #[arg(long, value_name = "STATUS")]
    pub preview_on_status: Option<i32>,

    /// Lists the registered handlers before running the program
    #[arg(long)]
    pub list: bool,

    /// Program to run, followed by its arguments
    #[arg(
        trailing_var_arg = true,
        allow_hyphen_values = true,
        required_unless_present = "list",
        value_name = "PROGRAM"
    )]
    pub command: Vec<String>,
}
