//! The single-threaded event loop that drives a run.
//!
//! The loop alternates between two phases, like the classic readiness loop it
//! models:
//!
//! - **fill**: while below the concurrency limit, with ring space and input
//!   remaining, read a line and launch its job.
//! - **wait**: `select!` on the reaper channel and — only when a launched job
//!   is ahead of the drain cursor — a read of the current job's pipe. Reaper
//!   events fold exit codes into the aggregate and free a running slot; pipe
//!   data is passed through verbatim; pipe EOF retires the slot and advances
//!   the cursor.
//!
//! The run is over when input is exhausted, no child is running, and every
//! launched job has been drained. All bookkeeping (ring, cursors, counters)
//! is owned by this one task; the children provide all the parallelism.

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncReadExt, AsyncWrite};
use tokio::net::unix::pipe;
use tokio::sync::mpsc;

use crate::config::{Config, MAX_JOBS};
use crate::output::SequencedOutput;
use crate::ring::SlotRing;
use crate::source::{CommandSource, SourceError};
use crate::spawn::{ExitNotice, JobOutcome, Launcher, SpawnError};

/// Read size for draining the current pipe; matches the kernel pipe buffer.
const CHUNK_SIZE: usize = 64 * 1024;

/// Fatal run errors. Child failures are not errors — they only feed the
/// aggregate exit code.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Input(#[from] SourceError),
    #[error(transparent)]
    Launch(#[from] SpawnError),
    #[error("could not wait for child: {0}")]
    Wait(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

enum Event {
    Exit(Option<ExitNotice>),
    Pipe(std::io::Result<usize>),
}

/// A whole parallel run: source, launcher, ring, sequencer, and counters.
pub struct JobRunner<R, W> {
    source: CommandSource<R>,
    launcher: Launcher,
    ring: SlotRing<pipe::Receiver>,
    out: SequencedOutput<W>,
    reaper_rx: mpsc::UnboundedReceiver<ExitNotice>,
    /// Pipe of the job at `current`, once taken out of the ring.
    active: Option<pipe::Receiver>,

    limit: usize,
    /// Sequence index whose output currently goes to the sink.
    current: u64,
    /// Sequence index of the next job to launch.
    next: u64,
    running: usize,
    started: u64,
    finished: u64,
    exit_code: i32,
    input_done: bool,
}

impl<R, W> JobRunner<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(config: Config, input: R, sink: W) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            source: CommandSource::new(input, config.prefix),
            launcher: Launcher::new(config.quiet, tx),
            ring: SlotRing::new(MAX_JOBS),
            out: SequencedOutput::new(sink, config.quiet),
            reaper_rx: rx,
            active: None,
            limit: config.jobs,
            current: 0,
            next: 0,
            running: 0,
            started: 0,
            finished: 0,
            exit_code: 0,
            input_done: false,
        }
    }

    /// Drive the run to completion and return the aggregate exit code.
    pub async fn run(mut self) -> Result<i32, RunError> {
        let mut chunk = vec![0u8; CHUNK_SIZE];

        loop {
            self.fill().await?;

            if self.input_done && self.running == 0 && self.current == self.next {
                break;
            }

            if self.active.is_none() && self.current != self.next {
                self.active = self.ring.take(self.current);
            }
            let wait_pipe = self.active.is_some();

            let event = {
                let reaper_rx = &mut self.reaper_rx;
                let active = &mut self.active;
                tokio::select! {
                    notice = reaper_rx.recv() => Event::Exit(notice),
                    read = read_active(active, &mut chunk), if wait_pipe => Event::Pipe(read),
                }
            };

            match event {
                // The launcher holds a sender for the whole run, so the
                // channel cannot close before we are done.
                Event::Exit(None) => {}
                Event::Exit(Some(notice)) => {
                    // One wakeup may cover several exits; drain them all
                    // before printing a single progress note.
                    self.reap(notice)?;
                    while let Ok(notice) = self.reaper_rx.try_recv() {
                        self.reap(notice)?;
                    }
                    self.out.note_progress(self.finished, self.started).await?;
                }
                Event::Pipe(read) => {
                    let n = read?;
                    if n == 0 {
                        // EOF: every write end is closed, the job's bytes
                        // are fully through. Retire the slot.
                        self.active = None;
                        self.out.job_boundary().await?;
                        tracing::trace!(seq = self.current, "job drained");
                        self.current += 1;
                    } else {
                        self.out
                            .write_chunk(&chunk[..n], self.finished, self.started)
                            .await?;
                    }
                }
            }
        }

        self.out.finish().await?;
        tracing::debug!(
            started = self.started,
            exit_code = self.exit_code,
            "run complete"
        );
        Ok(self.exit_code)
    }

    /// Launch jobs until the limit, the ring, or the input runs out.
    async fn fill(&mut self) -> Result<(), RunError> {
        while !self.input_done
            && self.running < self.limit
            && self.next - self.current < self.ring.capacity() as u64
        {
            match self.source.next_command().await? {
                Some(argv) => {
                    let reader = self.launcher.spawn(self.next, &argv)?;
                    self.ring.store(self.next, reader);
                    self.next += 1;
                    self.running += 1;
                    self.started += 1;
                }
                None => self.input_done = true,
            }
        }
        Ok(())
    }

    /// Fold one exit notice into the counters and the aggregate code.
    fn reap(&mut self, notice: ExitNotice) -> Result<(), RunError> {
        tracing::debug!(seq = notice.seq, outcome = ?notice.outcome, "reaped child");
        match notice.outcome {
            JobOutcome::Exited(code) => {
                if code > self.exit_code {
                    self.exit_code = code;
                }
            }
            JobOutcome::Signaled => {
                if self.exit_code < 1 {
                    self.exit_code = 1;
                }
            }
            JobOutcome::WaitFailed(msg) => return Err(RunError::Wait(msg)),
        }
        self.running -= 1;
        self.finished += 1;
        Ok(())
    }
}

/// Read from the current job's pipe, or park forever if there is none.
/// The caller's `select!` guard keeps the parked branch disabled.
async fn read_active(
    active: &mut Option<pipe::Receiver>,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    match active.as_mut() {
        Some(rx) => rx.read(buf).await,
        None => std::future::pending().await,
    }
}
