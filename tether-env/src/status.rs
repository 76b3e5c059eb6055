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

//! Exit status of handlers and dispatches

use crate::signal::Name;
use std::ffi::c_int;

/// Number that summarizes the result of running a handler.
///
/// Handlers return an exit status of zero when successful and non-zero
/// otherwise. `ExitStatus` implements `Ord`, and the dispatcher regards a
/// greater exit status as a more abnormal outcome when it aggregates the
/// results of handlers. Statuses resulting from signals (128 plus the signal
/// number) are thus considered worse than ordinary failures.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ExitStatus(pub c_int);

impl std::fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<c_int> for ExitStatus {
    fn from(value: c_int) -> ExitStatus {
        ExitStatus(value)
    }
}

impl From<ExitStatus> for c_int {
    fn from(exit_status: ExitStatus) -> c_int {
        exit_status.0
    }
}

/// Converts a signal to the corresponding exit status.
///
/// The result is 128 plus the signal number, which is what POSIX shells report
/// for a process killed by the signal.
impl From<Name> for ExitStatus {
    fn from(name: Name) -> Self {
        let number = name.number().map_or(0, |number| number.as_raw());
        Self(0x80 + number)
    }
}

/// Converts the status of a terminated child process.
///
/// A process that exited normally yields its exit code. A process killed by a
/// signal yields 128 plus the signal number.
impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt as _;
            if let Some(signal) = status.signal() {
                return Self(0x80 + signal);
            }
        }
        Self::FAILURE
    }
}

impl ExitStatus {
    /// Exit status of 0: success.
    pub const SUCCESS: ExitStatus = ExitStatus(0);

    /// Exit status of 1: failure.
    pub const FAILURE: ExitStatus = ExitStatus(1);

    /// Exit status of 2: error severer than failure.
    pub const ERROR: ExitStatus = ExitStatus(2);

    /// Exit status of 126: the handler could not even be started.
    ///
    /// The dispatcher reports this status when the execution context for a
    /// handler could not be created.
    pub const NOEXEC: ExitStatus = ExitStatus(126);

    /// Exit status reported for a handler that panicked.
    ///
    /// This is the same status as a process aborted by `SIGABRT`.
    pub const PANICKED: ExitStatus = ExitStatus(0x80 + 6);

    /// Returns true if and only if `self` is zero.
    pub const fn is_successful(&self) -> bool {
        self.0 == 0
    }

    /// Returns the signal that would have terminated a process with this exit
    /// status, if any.
    #[must_use]
    pub fn to_signal(self) -> Option<Name> {
        self.0.checked_sub(0x80).and_then(Name::from_raw)
    }
}
