//! Sequenced output sink.
//!
//! All job bytes reach the real stdout through this type, strictly in
//! submission order. In the default (non-quiet) mode it also weaves in a
//! yellow `finished/started done` progress note, but only at line boundaries:
//! the `needs_newline` flag tracks whether the last byte written was a
//! newline, and notes are suppressed mid-line so they can never land inside a
//! job's own output. The note is drawn with `\r\x1b[K` (carriage return +
//! erase line) so the next write paints over it.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

const CLEAR_LINE: &str = "\r\x1b[K";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

/// Writes job output and progress notes to a sink, in order.
pub struct SequencedOutput<W> {
    sink: W,
    quiet: bool,
    /// True while the stream is mid-line (last byte was not a newline).
    needs_newline: bool,
    scratch: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> SequencedOutput<W> {
    pub fn new(sink: W, quiet: bool) -> Self {
        Self {
            sink,
            quiet,
            needs_newline: false,
            scratch: Vec::with_capacity(4096),
        }
    }

    /// Write one chunk of the current job's output verbatim.
    ///
    /// In non-quiet mode the chunk is framed by a line-erase (to paint over a
    /// pending progress note) and, when it ends on a newline, a fresh note.
    pub async fn write_chunk(
        &mut self,
        chunk: &[u8],
        finished: u64,
        started: u64,
    ) -> io::Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.scratch.clear();
        if !self.quiet && !self.needs_newline {
            self.scratch.extend_from_slice(CLEAR_LINE.as_bytes());
        }
        self.scratch.extend_from_slice(chunk);
        self.needs_newline = chunk.last() != Some(&b'\n');
        if !self.quiet && !self.needs_newline {
            self.push_note(finished, started);
        }
        self.sink.write_all(&self.scratch).await?;
        self.sink.flush().await
    }

    /// Refresh the progress note after children were reaped.
    ///
    /// Suppressed mid-line; the note will reappear once the draining job's
    /// output reaches a line boundary.
    pub async fn note_progress(&mut self, finished: u64, started: u64) -> io::Result<()> {
        if self.quiet || self.needs_newline {
            return Ok(());
        }
        self.scratch.clear();
        self.scratch.extend_from_slice(CLEAR_LINE.as_bytes());
        self.push_note(finished, started);
        self.sink.write_all(&self.scratch).await?;
        self.sink.flush().await
    }

    /// Mark the boundary between two jobs (the current pipe hit EOF).
    ///
    /// A job that ended mid-line gets a closing newline so the next job
    /// starts on a fresh line; otherwise the stale progress note is erased.
    pub async fn job_boundary(&mut self) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        if self.needs_newline {
            self.sink.write_all(b"\n").await?;
            self.needs_newline = false;
        } else {
            self.sink.write_all(CLEAR_LINE.as_bytes()).await?;
        }
        self.sink.flush().await
    }

    /// Erase the final progress note once the run is over.
    pub async fn finish(&mut self) -> io::Result<()> {
        if !self.quiet && !self.needs_newline {
            self.sink.write_all(CLEAR_LINE.as_bytes()).await?;
        }
        self.sink.flush().await
    }

    fn push_note(&mut self, finished: u64, started: u64) {
        let note = format!("{YELLOW}{finished}/{started} done{RESET}");
        self.scratch.extend_from_slice(note.as_bytes());
    }
}
