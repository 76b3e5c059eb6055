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

//! This is an internal library crate for the `tether` command. **This crate
//! is not intended to be used as a library by other crates.**
//!
//! The entry point is the [`main`] function, which is to be used as the
//! `main` function in the binary crate. It registers the handlers given on
//! the command line with the process-wide dispatcher, runs the program, and
//! dispatches `ERR` (if the program failed) and `EXIT` when it finishes.

pub mod runner;
pub mod startup;

use self::startup::args::Args;
use clap::Parser as _;
use std::process::ExitCode;
use tether_dispatch::global;
use tether_dispatch::middleware::PreviewOnStatus;
use tether_env::handler::Handler;
use tether_env::registry::{RegisterError, RegisterOptions};
use tether_env::{Event, ExitStatus};

/// Variable that tells `ERR` and `EXIT` handlers the status of the program
pub const STATUS_VAR: &str = "TETHER_STATUS";

fn register_handlers(args: &Args) -> Result<(), RegisterError> {
    for (index, spec) in args.on.iter().enumerate() {
        let handler = Handler::shell(format!("on-{}", index + 1), spec.command.clone());
        global::register(spec.event, handler, RegisterOptions::default())?;
    }
    if let Some(trigger) = args.preview_on_status {
        global::configure_middleware(PreviewOnStatus {
            trigger: ExitStatus(trigger),
        })?;
    }
    Ok(())
}

fn print_handlers() -> Result<(), RegisterError> {
    for event in global::events()? {
        for info in global::list(event)? {
            let removable = if info.removable { "" } else { " (legacy)" };
            println!("{event}\t{}\t{}{removable}", info.id, info.kind);
        }
    }
    Ok(())
}

fn run(args: &Args) -> Result<ExitStatus, RegisterError> {
    register_handlers(args)?;
    if args.list {
        print_handlers()?;
        if args.command.is_empty() {
            return Ok(ExitStatus::SUCCESS);
        }
    }

    let natural = runner::run_program(&args.command);
    global::with_env(|env| {
        env.variables
            .insert(STATUS_VAR.to_owned(), natural.to_string())
    })?;
    if !natural.is_successful() {
        global::dispatch(Event::Error, natural, &[])?;
    }
    let report = global::dispatch(Event::Exit, natural, &[])?;
    Ok(report.status)
}

/// Returns the low-order byte of the exit status, which is what the parent
/// process observes.
#[must_use]
pub fn exit_byte(status: ExitStatus) -> u8 {
    (status.0 & 0xFF) as u8
}

fn exit_code(status: ExitStatus) -> ExitCode {
    ExitCode::from(exit_byte(status))
}

/// Entry point of the `tether` command
pub fn main() -> ExitCode {
    let args = Args::parse();
    startup::init_logging();

    let env = match startup::configure_environment(std::env::vars(), &args) {
        Ok(env) => env,
        Err(error) => {
            eprintln!("tether: {error}");
            return exit_code(ExitStatus::ERROR);
        }
    };
    if let Err(error) = global::init(env) {
        eprintln!("tether: {error}");
        return exit_code(ExitStatus::ERROR);
    }

    let status = run(&args).unwrap_or_else(|error| {
        eprintln!("tether: {error}");
        ExitStatus::ERROR
    });

    if let Err(error) = global::teardown() {
        eprintln!("tether: cannot restore signal handling: {error}");
    }
    exit_code(status)
}
