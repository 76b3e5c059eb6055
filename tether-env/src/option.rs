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

//! Dispatcher options
//!
//! An [`OptionSet`] records which [`Option`]s are on. It lives in the
//! dispatching [`Env`](crate::Env), where handlers read it and the middleware
//! may change it.
//!
//! Names in an option list are [canonicalized](canonicalize) first. A name
//! may be abbreviated to any unique prefix and take a `no` prefix to turn the
//! option off, so `Retain-Effects`, `ret`, and `noreplay` are all valid.

use enumset::{EnumSet, EnumSetType};
use std::str::FromStr;
use thiserror::Error;

/// Whether an option is on or off
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum State {
    On,
    Off,
}

pub use State::*;

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            On => "on".fmt(f),
            Off => "off".fmt(f),
        }
    }
}

/// Dispatcher option
#[derive(Clone, Copy, Debug, EnumSetType, Eq, Hash, PartialEq)]
#[enumset(no_super_impls)]
#[non_exhaustive]
pub enum Option {
    /// Runs explicitly registered handlers in the reverse order of
    /// registration.
    ///
    /// The legacy handler of an event runs first regardless of this option.
    Lifo,
    /// Puts the process into preview mode.
    ///
    /// The dispatcher itself does not change its behavior in preview mode.
    /// Handlers are expected to check the option and refrain from making
    /// changes. Command handlers see `TETHER_PREVIEW=1` in their environment.
    Preview,
    /// Replays the output of captured handlers to the output sinks.
    Replay,
    /// Keeps option changes made by the middleware after the dispatch ends.
    ///
    /// If this option is off, those changes are reverted when the dispatch
    /// finishes. Changes made by source-mode handlers are kept either way.
    RetainEffects,
}

pub use self::Option::*;

impl Option {
    /// Returns the canonical name of the option.
    #[must_use]
    pub fn long_name(self) -> &'static str {
        match self {
            Lifo => "lifo",
            Preview => "preview",
            Replay => "replay",
            RetainEffects => "retaineffects",
        }
    }

    /// Returns an iterator over all options in alphabetical order.
    pub fn iter() -> impl DoubleEndedIterator<Item = Option> + ExactSizeIterator {
        EnumSet::<Option>::all().iter()
    }
}

impl std::fmt::Display for Option {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.long_name().fmt(f)
    }
}

/// Error in resolving an option name
#[derive(Clone, Copy, Debug, Eq, Error, Hash, PartialEq)]
pub enum FromStrError {
    #[error("no such option")]
    NoSuchOption,
    /// The name is a prefix of more than one option name.
    #[error("ambiguous option name")]
    Ambiguous,
}

pub use FromStrError::*;

/// Resolves a canonical option name or a unique prefix of one.
///
/// The name is case-sensitive; [canonicalize] it first if needed.
impl FromStr for Option {
    type Err = FromStrError;

    fn from_str(name: &str) -> Result<Self, FromStrError> {
        let mut candidates = Self::iter().filter(|option| option.long_name().starts_with(name));
        match (candidates.next(), candidates.next()) {
            (None, _) => Err(NoSuchOption),
            (Some(option), None) => Ok(option),
            (Some(_), Some(_)) => Self::iter()
                .find(|option| option.long_name() == name)
                .ok_or(Ambiguous),
        }
    }
}

/// Resolves an option name that may carry a `no` prefix.
///
/// ```
/// # use tether_env::option::{parse_long, FromStrError::NoSuchOption, Option::*, State::*};
/// assert_eq!(parse_long("preview"), Ok((Preview, On)));
/// assert_eq!(parse_long("noreplay"), Ok((Replay, Off)));
/// assert_eq!(parse_long("view"), Err(NoSuchOption));
/// ```
pub fn parse_long(name: &str) -> Result<(Option, State), FromStrError> {
    if "no".starts_with(name) {
        return Err(Ambiguous);
    }
    let negated = name.strip_prefix("no").map(str::parse::<Option>);
    match (name.parse::<Option>(), negated) {
        (Ok(option), None | Some(Err(NoSuchOption))) => Ok((option, On)),
        (Err(NoSuchOption), Some(Ok(option))) => Ok((option, Off)),
        (Err(NoSuchOption), None | Some(Err(NoSuchOption))) => Err(NoSuchOption),
        _ => Err(Ambiguous),
    }
}

/// Lowercases the name and drops everything but ASCII letters and digits.
#[must_use]
pub fn canonicalize(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Error in parsing a list of option names
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("invalid option `{name}`: {error}")]
pub struct ParseListError {
    /// Option name as it appeared in the list
    pub name: String,
    pub error: FromStrError,
}

/// States of all dispatcher options
///
/// By default only [`Replay`] is on.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct OptionSet {
    enabled: EnumSet<Option>,
}

impl Default for OptionSet {
    fn default() -> Self {
        OptionSet {
            enabled: EnumSet::only(Replay),
        }
    }
}

impl OptionSet {
    #[must_use]
    pub fn get(&self, option: Option) -> State {
        if self.enabled.contains(option) { On } else { Off }
    }

    pub fn set(&mut self, option: Option, state: State) {
        match state {
            On => self.enabled.insert(option),
            Off => self.enabled.remove(option),
        };
    }

    /// Applies a list of option names separated by commas or whitespace.
    ///
    /// Each name goes through [`canonicalize`] and [`parse_long`], so
    /// `"lifo, no-replay"` turns `Lifo` on and `Replay` off. Nothing is
    /// changed if any name is invalid.
    pub fn apply_list(&mut self, list: &str) -> Result<(), ParseListError> {
        let mut result = *self;
        let names = list
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|name| !name.is_empty());
        for name in names {
            let (option, state) =
                parse_long(&canonicalize(name)).map_err(|error| ParseListError {
                    name: name.to_owned(),
                    error,
                })?;
            result.set(option, state);
        }
        *self = result;
        Ok(())
    }
}
