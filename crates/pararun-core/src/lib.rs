//! pararun-core: the engine behind `pararun`.
//!
//! pararun reads one command per line from an input stream and runs the
//! commands in parallel while keeping stdout byte-identical to running them
//! in sequence. The trick is that pararun itself holds no output buffers at
//! all: every child writes into its own OS pipe, and the kernel's pipe
//! buffers do all the storage. The controller drains exactly one pipe at a
//! time, in submission order.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         JobRunner                            │
//! │                                                              │
//! │  stdin ──▶ CommandSource ──▶ Launcher ──▶ child₀ ──▶ pipe₀ ─┐│
//! │                                   │       child₁ ──▶ pipe₁ ─┤│
//! │                                   │       child₂ ──▶ pipe₂ ─┤│
//! │                                   ▼                         ││
//! │                       reaper tasks ──▶ mpsc channel         ││
//! │                                   │                         ││
//! │              select! ◀────────────┴── SlotRing ◀────────────┘│
//! │                 │                                            │
//! │                 ▼  (drain pipe for `current` only)           │
//! │          SequencedOutput ──▶ stdout                          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! A job that finishes early but is not at the head of the stream simply
//! blocks in its own writes once its pipe fills — kernel backpressure is the
//! only throttle. The run's exit code is the maximum across all jobs, with
//! signaled children counting as 1.

pub mod config;
pub mod output;
pub mod ring;
pub mod runner;
pub mod source;
pub mod spawn;

pub use config::{Config, MAX_ARGS, MAX_JOBS, MAX_LINE};
pub use runner::{JobRunner, RunError};
pub use source::{CommandSource, SourceError};
pub use spawn::arm_parent_death_signal;
