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

//! Running the hosted program

use std::time::Duration;
use tether_dispatch::global;
use tether_env::ExitStatus;
use wait_timeout::ChildExt as _;

/// Interval between checks for caught signals while the program runs
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs the program and returns its exit status.
///
/// The program inherits the standard input, output, and error. While it
/// runs, signals caught by the process-wide dispatcher are dispatched to
/// their handlers. The program itself is not signaled by tether.
///
/// If the program cannot be started, an error message is printed and the
/// result is [`ExitStatus::NOEXEC`].
pub fn run_program(command: &[String]) -> ExitStatus {
    let Some((program, args)) = command.split_first() else {
        return ExitStatus::SUCCESS;
    };
    let mut child = match std::process::Command::new(program).args(args).spawn() {
        Ok(child) => child,
        Err(error) => {
            eprintln!("tether: cannot run `{program}`: {error}");
            return ExitStatus::NOEXEC;
        }
    };
    tracing::debug!(%program, pid = child.id(), "started program");

    loop {
        let result = child.wait_timeout(POLL_INTERVAL);
        for report in global::run_pending() {
            tracing::debug!(event = %report.event, status = %report.status, "handled signal");
        }
        match result {
            Ok(Some(status)) => return status.into(),
            Ok(None) => (),
            Err(error) if error.kind() == std::io::ErrorKind::Interrupted => (),
            Err(error) => {
                eprintln!("tether: cannot wait for `{program}`: {error}");
                let _ = child.kill();
                let _ = child.wait();
                return ExitStatus::FAILURE;
            }
        }
    }
}
