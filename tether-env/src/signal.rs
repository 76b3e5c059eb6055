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

//! Type definitions for signals
//!
//! This module defines [`Name`], which identifies a signal by its name, and
//! [`Number`], which is the signal number the underlying system uses for it.
//! Names are portable and user-facing; numbers are what the `sigaction` system
//! call understands. Conversion from a name to a number is done by
//! [`Name::number`], which depends on the platform.
//!
//! All proper signal names start with `"SIG"`. The names defined and displayed
//! in this module do not include the prefix, but the [`FromStr`]
//! implementation accepts it.

use std::ffi::c_int;
use std::num::NonZeroI32;
use std::str::FromStr;
use strum::{EnumIter, IntoEnumIterator};
use thiserror::Error;

/// Raw signal number
pub type RawNumber = c_int;

/// Signal name
///
/// This enum contains the signals that are available on all the Unix-like
/// platforms this crate supports.
#[derive(Clone, Copy, Debug, EnumIter, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[non_exhaustive]
pub enum Name {
    /// `SIGABRT` (process abort signal)
    Abrt,
    /// `SIGALRM` (alarm clock)
    Alrm,
    /// `SIGBUS` (access to an undefined portion of a memory object)
    Bus,
    /// `SIGCHLD` (child process terminated, stopped, or continued)
    Chld,
    /// `SIGCONT` (continue executing, if stopped)
    Cont,
    /// `SIGFPE` (erroneous arithmetic operation)
    Fpe,
    /// `SIGHUP` (hangup)
    Hup,
    /// `SIGILL` (illegal instruction)
    Ill,
    /// `SIGINT` (interrupt)
    Int,
    /// `SIGIO` (I/O is possible on a file descriptor)
    Io,
    /// `SIGKILL` (kill)
    Kill,
    /// `SIGPIPE` (write on a pipe with no one to read it)
    Pipe,
    /// `SIGPROF` (profiling timer expired)
    Prof,
    /// `SIGQUIT` (quit)
    Quit,
    /// `SIGSEGV` (invalid memory reference)
    Segv,
    /// `SIGSTOP` (stop executing)
    Stop,
    /// `SIGSYS` (bad system call)
    Sys,
    /// `SIGTERM` (termination)
    Term,
    /// `SIGTRAP` (trace trap)
    Trap,
    /// `SIGTSTP` (stop executing)
    Tstp,
    /// `SIGTTIN` (background process attempting read)
    Ttin,
    /// `SIGTTOU` (background process attempting write)
    Ttou,
    /// `SIGURG` (high bandwidth data is available at a socket)
    Urg,
    /// `SIGUSR1` (user-defined signal 1)
    Usr1,
    /// `SIGUSR2` (user-defined signal 2)
    Usr2,
    /// `SIGVTALRM` (virtual timer expired)
    Vtalrm,
    /// `SIGWINCH` (window size change)
    Winch,
    /// `SIGXCPU` (CPU time limit exceeded)
    Xcpu,
    /// `SIGXFSZ` (file size limit exceeded)
    Xfsz,
}

impl Name {
    /// Returns an iterator over all signal names in alphabetical order.
    #[inline(always)]
    pub fn iter() -> NameIter {
        <Self as IntoEnumIterator>::iter()
    }

    /// Returns the name as a string.
    ///
    /// The result is the signal name in uppercase without the `"SIG"` prefix,
    /// such as `"TERM"`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Abrt => "ABRT",
            Self::Alrm => "ALRM",
            Self::Bus => "BUS",
            Self::Chld => "CHLD",
            Self::Cont => "CONT",
            Self::Fpe => "FPE",
            Self::Hup => "HUP",
            Self::Ill => "ILL",
            Self::Int => "INT",
            Self::Io => "IO",
            Self::Kill => "KILL",
            Self::Pipe => "PIPE",
            Self::Prof => "PROF",
            Self::Quit => "QUIT",
            Self::Segv => "SEGV",
            Self::Stop => "STOP",
            Self::Sys => "SYS",
            Self::Term => "TERM",
            Self::Trap => "TRAP",
            Self::Tstp => "TSTP",
            Self::Ttin => "TTIN",
            Self::Ttou => "TTOU",
            Self::Urg => "URG",
            Self::Usr1 => "USR1",
            Self::Usr2 => "USR2",
            Self::Vtalrm => "VTALRM",
            Self::Winch => "WINCH",
            Self::Xcpu => "XCPU",
            Self::Xfsz => "XFSZ",
        }
    }

    /// Whether a handler can be installed for this signal.
    ///
    /// `SIGKILL` and `SIGSTOP` can be neither caught nor ignored.
    #[must_use]
    pub const fn is_catchable(self) -> bool {
        !matches!(self, Self::Kill | Self::Stop)
    }

    /// Returns the signal number the current platform uses for this signal.
    #[cfg(unix)]
    #[must_use]
    pub fn number(self) -> Option<Number> {
        let raw = match self {
            Self::Abrt => libc::SIGABRT,
            Self::Alrm => libc::SIGALRM,
            Self::Bus => libc::SIGBUS,
            Self::Chld => libc::SIGCHLD,
            Self::Cont => libc::SIGCONT,
            Self::Fpe => libc::SIGFPE,
            Self::Hup => libc::SIGHUP,
            Self::Ill => libc::SIGILL,
            Self::Int => libc::SIGINT,
            Self::Io => libc::SIGIO,
            Self::Kill => libc::SIGKILL,
            Self::Pipe => libc::SIGPIPE,
            Self::Prof => libc::SIGPROF,
            Self::Quit => libc::SIGQUIT,
            Self::Segv => libc::SIGSEGV,
            Self::Stop => libc::SIGSTOP,
            Self::Sys => libc::SIGSYS,
            Self::Term => libc::SIGTERM,
            Self::Trap => libc::SIGTRAP,
            Self::Tstp => libc::SIGTSTP,
            Self::Ttin => libc::SIGTTIN,
            Self::Ttou => libc::SIGTTOU,
            Self::Urg => libc::SIGURG,
            Self::Usr1 => libc::SIGUSR1,
            Self::Usr2 => libc::SIGUSR2,
            Self::Vtalrm => libc::SIGVTALRM,
            Self::Winch => libc::SIGWINCH,
            Self::Xcpu => libc::SIGXCPU,
            Self::Xfsz => libc::SIGXFSZ,
        };
        NonZeroI32::new(raw).map(Number)
    }

    /// Returns the signal number the current platform uses for this signal.
    #[cfg(not(unix))]
    #[must_use]
    pub fn number(self) -> Option<Number> {
        None
    }

    /// Finds the signal name for a raw signal number.
    #[must_use]
    pub fn from_raw(raw: RawNumber) -> Option<Self> {
        Self::iter().find(|name| name.number().map(Number::as_raw) == Some(raw))
    }
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str().fmt(f)
    }
}

/// Error value for an unknown signal name
#[derive(Clone, Debug, Eq, Error, Hash, PartialEq)]
#[error("unknown signal name")]
pub struct UnknownNameError;

/// Parses a signal name from a string.
///
/// The input is case-insensitive and may include the `"SIG"` prefix, so
/// `"TERM"`, `"term"`, and `"SIGTERM"` all yield [`Name::Term`].
impl FromStr for Name {
    type Err = UnknownNameError;

    fn from_str(s: &str) -> Result<Self, UnknownNameError> {
        let upper = s.to_ascii_uppercase();
        let bare = upper.strip_prefix("SIG").unwrap_or(&upper);
        Self::iter()
            .find(|name| name.as_str() == bare)
            .ok_or(UnknownNameError)
    }
}

/// Signal number
///
/// This is a wrapper type for signal numbers. It is guaranteed to be a positive
/// integer, so it optimizes the size of `Option<Number>`, etc.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialOrd, PartialEq)]
#[repr(transparent)]
pub struct Number(NonZeroI32);

impl Number {
    /// Returns the raw signal number.
    #[inline(always)]
    #[must_use]
    pub fn as_raw(self) -> RawNumber {
        self.0.get()
    }

    /// Creates a new `Number` from a raw signal number.
    ///
    /// The caller must ensure that the raw signal number is valid on the
    /// current platform. Prefer [`Name::number`].
    #[inline(always)]
    #[must_use]
    pub fn from_raw_unchecked(raw: NonZeroI32) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for Number {
    #[inline(always)]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
