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

//! Dispatching environment

use crate::option::{OptionSet, ParseListError};
use crate::status::ExitStatus;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Name of the environment variable that lists options to apply on startup
pub const OPTIONS_VAR: &str = "TETHER_OPTIONS";

/// Name of the environment variable that sets the handler timeout in seconds
pub const TIMEOUT_VAR: &str = "TETHER_HANDLER_TIMEOUT";

/// State of the dispatching process that handlers may observe
///
/// Function handlers run with a private copy of the environment, so their
/// changes are discarded when they return. Source-mode handlers and the
/// middleware receive the dispatching environment itself, which is the only
/// way to affect handlers that run later.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Env {
    /// Options in effect
    pub options: OptionSet,

    /// Variables exported to command handlers
    pub variables: BTreeMap<String, String>,

    /// Exit status of the last dispatch
    pub exit_status: ExitStatus,

    /// Time limit for each command handler
    ///
    /// A command handler that does not finish in time is killed and reported
    /// with the exit status of `SIGKILL`. `None` means no limit.
    pub handler_timeout: Option<Duration>,
}

/// Error in configuring an [`Env`] from environment variables
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigError {
    /// The option list is invalid.
    #[error("TETHER_OPTIONS: {0}")]
    Options(#[from] ParseListError),
    /// The timeout is not a non-negative number of seconds.
    #[error("TETHER_HANDLER_TIMEOUT: invalid number of seconds `{0}`")]
    Timeout(String),
}

impl Env {
    /// Creates an environment with the default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies configuration found in the given variables.
    ///
    /// This function reads [`OPTIONS_VAR`] and [`TIMEOUT_VAR`]. Other
    /// variables are ignored. The environment is left unchanged on error.
    pub fn configure_from<I, K, V>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = self.options;
        let mut handler_timeout = self.handler_timeout;
        for (key, value) in vars {
            let value = value.as_ref();
            match key.as_ref() {
                OPTIONS_VAR => options.apply_list(value)?,
                TIMEOUT_VAR => {
                    let seconds = value
                        .trim()
                        .parse::<f64>()
                        .ok()
                        .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
                        .ok_or_else(|| ConfigError::Timeout(value.to_owned()))?;
                    handler_timeout = Some(seconds);
                }
                _ => (),
            }
        }
        self.options = options;
        self.handler_timeout = handler_timeout;
        Ok(())
    }
}
