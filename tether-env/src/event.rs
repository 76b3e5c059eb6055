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

//! Lifecycle events
//!
//! An [`Event`] is a point in the life of a process at which registered
//! handlers run: the normal exit of the process, a failed command reported by
//! the hosting program, or the delivery of a signal. The set of events is fixed
//! at compile time. Names are parsed case-insensitively and common aliases are
//! folded into one canonical event, so `"int"`, `"SIGINT"`, and `"INTERRUPT"`
//! all denote the same event.

use crate::signal::{Name, RawNumber};
use std::str::FromStr;
use thiserror::Error;

/// Point in the process lifecycle that triggers handlers
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Event {
    /// When the process exits
    Exit,
    /// When the hosting program reports a failed command
    Error,
    /// When the specified signal is delivered to the process
    Signal(Name),
}

impl From<Name> for Event {
    fn from(name: Name) -> Self {
        Self::Signal(name)
    }
}

impl Event {
    /// Returns the canonical key of the event.
    ///
    /// The result is an uppercase string such as `"EXIT"`, `"ERR"`, and
    /// `"TERM"`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exit => "EXIT",
            Self::Error => "ERR",
            Self::Signal(name) => name.as_str(),
        }
    }

    /// Returns the signal this event corresponds to, if any.
    #[must_use]
    pub fn signal(&self) -> Option<Name> {
        match *self {
            Self::Signal(name) => Some(name),
            Self::Exit | Self::Error => None,
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str().fmt(f)
    }
}

/// Error in conversion from a string to an [`Event`]
#[derive(Clone, Debug, Eq, Error, Hash, PartialEq)]
pub enum ParseEventError {
    /// The string does not name any event.
    #[error("unknown lifecycle event `{0}`")]
    Unknown(String),
    /// The string names a signal that cannot be caught.
    #[error("cannot install a handler for SIG{0}")]
    Uncatchable(Name),
}

/// Spellings that do not follow the signal naming convention
const ALIASES: &[(&str, Event)] = &[
    ("ERR", Event::Error),
    ("ERROR", Event::Error),
    ("EXIT", Event::Exit),
    ("HANGUP", Event::Signal(Name::Hup)),
    ("INTERRUPT", Event::Signal(Name::Int)),
    ("TERMINATE", Event::Signal(Name::Term)),
];

/// Parses an event name.
///
/// The name is case-insensitive. In addition to `EXIT`, `ERR`, and signal
/// names with or without the `SIG` prefix, this implementation accepts the
/// aliases `ERROR`, `HANGUP`, `INTERRUPT`, and `TERMINATE`, and signal numbers.
/// The number `0` denotes [`Event::Exit`].
impl FromStr for Event {
    type Err = ParseEventError;

    fn from_str(s: &str) -> Result<Self, ParseEventError> {
        let trimmed = s.trim();
        let unknown = || ParseEventError::Unknown(s.to_owned());

        let name = if let Ok(number) = trimmed.parse::<RawNumber>() {
            if number == 0 {
                return Ok(Self::Exit);
            }
            Name::from_raw(number).ok_or_else(unknown)?
        } else {
            let upper = trimmed.to_ascii_uppercase();
            if let Ok(index) = ALIASES.binary_search_by_key(&upper.as_str(), |&(alias, _)| alias) {
                return Ok(ALIASES[index].1);
            }
            upper.parse::<Name>().map_err(|_| unknown())?
        };

        if name.is_catchable() {
            Ok(Self::Signal(name))
        } else {
            Err(ParseEventError::Uncatchable(name))
        }
    }
}
