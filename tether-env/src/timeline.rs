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

//! Capture timelines
//!
//! A [`Timeline`] is the ordered record of every line a handler wrote during
//! one invocation. Each [`Entry`] is tagged with the [`Stream`] it was written
//! to and a sequence number that reflects the order of emission across both
//! streams.
//!
//! Timelines are built by a [`Recorder`], which can be shared between threads
//! so that the two output pipes of a child process can be drained
//! concurrently. The sequence number is assigned when a complete line reaches
//! the recorder, so the interleaving of the two streams is only as faithful as
//! the buffering of the writer allows.
//!
//! Lines are stored as strings. Bytes that are not valid UTF-8 are replaced
//! with U+FFFD when recorded, so replaying output that is not UTF-8 does not
//! reproduce it byte for byte. Whether a line ended with a newline is kept,
//! so a final unterminated line is replayed without one.

use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;

/// Output channel of a handler
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Stream {
    /// Standard output
    Out,
    /// Standard error
    Err,
}

impl std::fmt::Display for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stream::Out => "out".fmt(f),
            Stream::Err => "err".fmt(f),
        }
    }
}

/// Line recorded in a timeline
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Entry {
    /// Stream the line was written to
    pub stream: Stream,
    /// Position of the line in the order of emission
    pub sequence: u64,
    /// Content of the line without the trailing newline
    pub line: String,
    /// Whether the line ended with a newline
    pub terminated: bool,
}

impl Entry {
    fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(self.line.as_bytes())?;
        if self.terminated {
            writer.write_all(b"\n")?;
        }
        Ok(())
    }
}

/// Ordered record of the output of one handler invocation
///
/// Sequence numbers of the entries are strictly increasing.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Timeline {
    entries: Vec<Entry>,
}

impl Timeline {
    /// Creates an empty timeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a timeline from lines in the order of emission.
    ///
    /// Sequence numbers are assigned from zero. Every line is terminated.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = (Stream, S)>,
        S: Into<String>,
    {
        let entries = lines
            .into_iter()
            .zip(0..)
            .map(|((stream, line), sequence)| Entry {
                stream,
                sequence,
                line: line.into(),
                terminated: true,
            })
            .collect();
        Timeline { entries }
    }

    /// Creates a timeline from entries, renumbering them from zero.
    pub fn renumbered<I: IntoIterator<Item = Entry>>(entries: I) -> Self {
        let entries = entries
            .into_iter()
            .zip(0..)
            .map(|(entry, sequence)| Entry { sequence, ..entry })
            .collect();
        Timeline { entries }
    }

    /// Returns the entries in the order of emission.
    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns an iterator over the lines written to the given stream.
    pub fn lines(&self, stream: Stream) -> impl Iterator<Item = &str> + '_ {
        self.entries
            .iter()
            .filter(move |entry| entry.stream == stream)
            .map(|entry| entry.line.as_str())
    }

    /// Returns the first line written to the given stream.
    #[must_use]
    pub fn first_line(&self, stream: Stream) -> Option<&str> {
        self.lines(stream).next()
    }

    /// Removes entries for which the predicate returns false.
    ///
    /// The remaining entries keep their sequence numbers.
    pub fn retain<F: FnMut(&Entry) -> bool>(&mut self, f: F) {
        self.entries.retain(f)
    }

    /// Writes every line to the writer for its stream, in the order of
    /// emission.
    ///
    /// A newline is written after each line that had one.
    pub fn replay<O, E>(&self, out: &mut O, err: &mut E) -> std::io::Result<()>
    where
        O: Write + ?Sized,
        E: Write + ?Sized,
    {
        for entry in &self.entries {
            match entry.stream {
                Stream::Out => entry.write_to(out)?,
                Stream::Err => entry.write_to(err)?,
            }
        }
        out.flush()?;
        err.flush()
    }
}

#[derive(Debug, Default)]
struct Record {
    next_sequence: u64,
    entries: Vec<Entry>,
}

/// Shared builder of a [`Timeline`]
///
/// Cloning a recorder yields another handle to the same timeline.
#[derive(Clone, Debug, Default)]
pub struct Recorder {
    record: Arc<Mutex<Record>>,
}

impl Recorder {
    /// Creates a recorder with an empty timeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a complete line.
    pub fn record(&self, stream: Stream, line: impl Into<String>) {
        self.push(stream, line.into(), true)
    }

    fn push(&self, stream: Stream, line: String, terminated: bool) {
        let mut record = self.record.lock();
        let sequence = record.next_sequence;
        record.next_sequence += 1;
        record.entries.push(Entry {
            stream,
            sequence,
            line,
            terminated,
        });
    }

    /// Returns a writer that records lines to the given stream.
    #[must_use]
    pub fn writer(&self, stream: Stream) -> LineWriter {
        LineWriter {
            recorder: self.clone(),
            stream,
            pending: Vec::new(),
        }
    }

    /// Takes the recorded entries out as a timeline.
    ///
    /// The recorder is left empty but keeps counting sequence numbers.
    #[must_use]
    pub fn take(&self) -> Timeline {
        let entries = std::mem::take(&mut self.record.lock().entries);
        Timeline { entries }
    }
}

/// Writer that splits its input into lines and records them
///
/// A line is recorded when its terminating newline is written. A pending
/// incomplete line is recorded when the writer is dropped.
#[derive(Debug)]
pub struct LineWriter {
    recorder: Recorder,
    stream: Stream,
    pending: Vec<u8>,
}

impl LineWriter {
    /// Records the pending incomplete line, if any.
    ///
    /// The line is recorded as unterminated.
    pub fn finish_line(&mut self) {
        if !self.pending.is_empty() {
            self.emit(false);
        }
    }

    fn emit(&mut self, terminated: bool) {
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        self.recorder.push(self.stream, line, terminated);
    }
}

impl Write for LineWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut rest = buf;
        while let Some(index) = rest.iter().position(|&b| b == b'\n') {
            self.pending.extend_from_slice(&rest[..index]);
            self.emit(true);
            rest = &rest[index + 1..];
        }
        self.pending.extend_from_slice(rest);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for LineWriter {
    fn drop(&mut self) {
        self.finish_line();
    }
}
