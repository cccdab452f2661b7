//! Job launcher: spawn one child per command with its output on an OS pipe.
//!
//! Each job gets a fresh `pipe2(O_CLOEXEC)` pair. The child's stdout and
//! stderr are both dup'd onto the write end, so the kernel's pipe buffer is
//! the job's only output storage; a job that races ahead of the drain cursor
//! simply blocks in its own writes once the buffer fills. Unless quiet mode
//! is on, the child prints its own argv (in yellow) to the pipe before exec,
//! which puts the echoed command line exactly where the job's output will
//! appear in the sequenced stream.
//!
//! Children never see the controller's stdin (`Stdio::null()`), and both the
//! controller and its children arm `PR_SET_PDEATHSIG(SIGTERM)` so nobody is
//! left running as an orphan.

use std::io;
use std::os::fd::{AsFd, BorrowedFd};
use std::process::Stdio;

use nix::fcntl::OFlag;
use nix::sys::prctl;
use nix::sys::signal::Signal;
use thiserror::Error;
use tokio::net::unix::pipe;
use tokio::process::Command;
use tokio::sync::mpsc;

const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

/// How a child ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Normal exit with this status code.
    Exited(i32),
    /// Killed by a signal.
    Signaled,
    /// `wait()` itself failed; fatal for the whole run.
    WaitFailed(String),
}

/// One termination notification, delivered on the reaper channel.
#[derive(Debug, Clone)]
pub struct ExitNotice {
    pub seq: u64,
    pub outcome: JobOutcome,
}

/// Errors while setting up or spawning a job. All are fatal for the run.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("could not create pipe: {0}")]
    Pipe(#[from] nix::errno::Errno),
    #[error("could not spawn {command}: {source}")]
    Spawn {
        command: String,
        source: io::Error,
    },
    #[error("i/o error while launching job: {0}")]
    Io(#[from] io::Error),
}

/// Spawns children and feeds their exit notices to the reaper channel.
pub struct Launcher {
    quiet: bool,
    notices: mpsc::UnboundedSender<ExitNotice>,
}

impl Launcher {
    pub fn new(quiet: bool, notices: mpsc::UnboundedSender<ExitNotice>) -> Self {
        Self { quiet, notices }
    }

    /// Launch `argv` as job `seq`, returning the read end of its output pipe.
    ///
    /// A missing or non-executable program is a failure of that job alone
    /// (127/126, shell convention): the diagnostic goes into the job's own
    /// pipe and a synthetic exit notice is sent, so the run carries on.
    /// Everything else (pipe or fork failure) is fatal.
    pub fn spawn(&self, seq: u64, argv: &[String]) -> Result<pipe::Receiver, SpawnError> {
        let (read_fd, write_fd) = nix::unistd::pipe2(OFlag::O_CLOEXEC)?;
        let reader = pipe::Receiver::from_owned_fd(read_fd)?;

        let banner = if self.quiet {
            None
        } else {
            Some(echo_line(argv))
        };

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::from(write_fd.try_clone()?))
            .stderr(Stdio::from(write_fd.try_clone()?))
            .kill_on_drop(true);
        // Runs in the forked child after its stdio is wired to the pipe.
        // The banner write may block on a full pipe; that blocks the child,
        // never the controller.
        let in_child = move || {
            prctl::set_pdeathsig(Signal::SIGTERM).map_err(io::Error::from)?;
            if let Some(line) = &banner {
                // fd 1 is the pipe write end by now.
                let stdout = unsafe { BorrowedFd::borrow_raw(1) };
                write_all_fd(stdout, line)?;
            }
            Ok(())
        };
        unsafe {
            cmd.pre_exec(in_child);
        }

        match cmd.spawn() {
            Ok(mut child) => {
                drop(write_fd);
                tracing::debug!(seq, pid = ?child.id(), command = %argv.join(" "), "spawned job");
                let tx = self.notices.clone();
                tokio::spawn(async move {
                    let outcome = match child.wait().await {
                        Ok(status) => match status.code() {
                            Some(code) => JobOutcome::Exited(code),
                            None => JobOutcome::Signaled,
                        },
                        Err(e) => JobOutcome::WaitFailed(e.to_string()),
                    };
                    let _ = tx.send(ExitNotice { seq, outcome });
                });
                Ok(reader)
            }
            Err(e) if exec_failure(&e) => {
                // The child already echoed its banner (if any) before the
                // exec failed; append the diagnostic in its place in the
                // stream. The standard library has reaped the child for us.
                let code = if e.kind() == io::ErrorKind::PermissionDenied {
                    126
                } else {
                    127
                };
                tracing::debug!(seq, command = %argv[0], error = %e, "exec failed");
                let msg = format!("{}: {}\n", argv[0], e);
                let _ = write_all_fd(write_fd.as_fd(), msg.as_bytes());
                drop(write_fd);
                let _ = self.notices.send(ExitNotice {
                    seq,
                    outcome: JobOutcome::Exited(code),
                });
                Ok(reader)
            }
            Err(e) => Err(SpawnError::Spawn {
                command: argv[0].clone(),
                source: e,
            }),
        }
    }
}

/// Arm the controller's own parent-death signal so a dying parent shell
/// takes the whole run down instead of leaving children behind.
pub fn arm_parent_death_signal() -> io::Result<()> {
    prctl::set_pdeathsig(Signal::SIGTERM).map_err(io::Error::from)
}

/// Spawn errors that mean "the program could not be exec'd", which the
/// original child would have reported from inside the pipe.
fn exec_failure(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
    )
}

/// The echoed command line: every argument followed by a space, in yellow.
fn echo_line(argv: &[String]) -> Vec<u8> {
    let mut line = Vec::with_capacity(64);
    line.extend_from_slice(YELLOW.as_bytes());
    for arg in argv {
        line.extend_from_slice(arg.as_bytes());
        line.push(b' ');
    }
    line.extend_from_slice(RESET.as_bytes());
    line.push(b'\n');
    line
}

/// Write a whole buffer to a raw fd, retrying on short writes and EINTR.
/// Async-signal-safe: only calls `write(2)`.
fn write_all_fd(fd: BorrowedFd<'_>, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        match nix::unistd::write(fd, buf) {
            Ok(n) => buf = &buf[n..],
            Err(nix::errno::Errno::EINTR) => continue,
            Err(e) => return Err(io::Error::from(e)),
        }
    }
    Ok(())
}
