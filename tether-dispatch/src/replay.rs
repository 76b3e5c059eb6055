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

//! Destinations of replayed output

use parking_lot::Mutex;
use std::sync::Arc;
use tether_env::timeline::{Entry, Timeline};

/// Destination of timelines replayed after the middleware
pub trait Sink: Send {
    /// Writes the lines of the timeline to their streams.
    fn replay(&mut self, timeline: &Timeline) -> std::io::Result<()>;
}

/// Sink that writes to the standard output and standard error of the
/// process
#[derive(Clone, Copy, Debug, Default)]
pub struct StdSink;

impl Sink for StdSink {
    fn replay(&mut self, timeline: &Timeline) -> std::io::Result<()> {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = stdout.lock();
        let mut err = stderr.lock();
        timeline.replay(&mut out, &mut err)
    }
}

/// Sink that keeps the replayed lines in memory
///
/// Clones share the same buffer.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<Entry>>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lines replayed so far.
    ///
    /// Sequence numbers are renumbered to reflect the order of replay across
    /// all timelines.
    #[must_use]
    pub fn timeline(&self) -> Timeline {
        Timeline::renumbered(self.entries.lock().iter().cloned())
    }
}

impl Sink for MemorySink {
    fn replay(&mut self, timeline: &Timeline) -> std::io::Result<()> {
        self.entries
            .lock()
            .extend(timeline.entries().iter().cloned());
        Ok(())
    }
}
