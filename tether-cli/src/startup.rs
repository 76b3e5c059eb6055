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

//! Startup of the tether process

use self::args::Args;
use std::time::Duration;
use tether_env::Env;
use tether_env::env::ConfigError;
use tether_env::option::{Lifo, Off, On, Preview, Replay, RetainEffects};
use tracing_subscriber::EnvFilter;

pub mod args;

/// Environment variable that configures the log filter
pub const LOG_VAR: &str = "TETHER_LOG";

/// Installs the log subscriber.
///
/// Log events are written to the standard error. The filter is read from
/// [`LOG_VAR`] and defaults to `warn`.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Creates the dispatching environment.
///
/// The environment is configured from the variables first, and then the
/// command-line flags override it.
pub fn configure_environment<I, K, V>(vars: I, args: &Args) -> Result<Env, ConfigError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut env = Env::new();
    env.configure_from(vars)?;

    if args.lifo {
        env.options.set(Lifo, On);
    }
    if args.preview {
        env.options.set(Preview, On);
    }
    if args.retain_effects {
        env.options.set(RetainEffects, On);
    }
    if args.no_replay {
        env.options.set(Replay, Off);
    }
    if let Some(seconds) = args.timeout {
        let timeout = Duration::try_from_secs_f64(seconds)
            .map_err(|_| ConfigError::Timeout(seconds.to_string()))?;
        env.handler_timeout = Some(timeout);
    }
    Ok(env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use clap::Parser as _;

    #[test]
    fn flags_override_variables() {
        let args =
            Args::try_parse_from(["tether", "--no-replay", "--timeout", "2", "true"]).unwrap();
        let vars = [
            ("TETHER_OPTIONS", "lifo"),
            ("TETHER_HANDLER_TIMEOUT", "10"),
        ];
        let env = configure_environment(vars, &args).unwrap();
        assert_eq!(env.options.get(Lifo), On);
        assert_eq!(env.options.get(Replay), Off);
        assert_eq!(env.handler_timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn invalid_configuration() {
        let args = Args::try_parse_from(["tether", "true"]).unwrap();
        let vars = [("TETHER_OPTIONS", "bogus")];
        assert_matches!(
            configure_environment(vars, &args),
            Err(ConfigError::Options(_))
        );

        let args = Args::try_parse_from(["tether", "--timeout=-1", "true"]).unwrap();
        let vars: [(&str, &str); 0] = [];
        assert_matches!(
            configure_environment(vars, &args),
            Err(ConfigError::Timeout(_))
        );
    }
}
