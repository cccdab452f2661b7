//! Startup configuration and command-line flag parsing.
//!
//! Flags follow the traditional terse style: `-j<num>` carries its value
//! attached (`-j8`), `-q` suppresses echoed command lines, `-h` asks for the
//! usage text. Everything after the flags is the fixed prefix argv that every
//! input line is appended to.

use thiserror::Error;

/// Hard cap on the concurrency limit, and the slot-ring capacity.
pub const MAX_JOBS: usize = 9999;

/// Maximum input line length in bytes, including the terminating newline.
pub const MAX_LINE: usize = 99_999;

/// Maximum number of argv entries for a single job (prefix + line tokens).
pub const MAX_ARGS: usize = 999;

/// Startup configuration. Read once; never re-read at runtime.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of children running simultaneously (`-j`).
    pub jobs: usize,
    /// Suppress echoed command lines and progress notes (`-q`).
    pub quiet: bool,
    /// Fixed arguments prepended to every input line's tokens.
    pub prefix: Vec<String>,
}

/// Result of parsing the command line: either run, or just print usage.
#[derive(Debug)]
pub enum Invocation {
    Run(Config),
    Help,
}

/// Errors from command-line parsing.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("bad argument to -j. must be between 1 and {MAX_JOBS}.")]
    BadJobs,
    #[error("prefix arguments too long. combined length must be at most {MAX_LINE}.")]
    PrefixTooLong,
}

impl Config {
    /// Parse flags and prefix arguments (`argv[1..]`).
    pub fn from_args(args: &[String]) -> Result<Invocation, ConfigError> {
        let mut jobs = default_jobs();
        let mut quiet = false;

        let mut rest = args;
        while let Some(arg) = rest.first() {
            if arg == "-h" {
                return Ok(Invocation::Help);
            }
            if let Some(value) = arg.strip_prefix("-j") {
                jobs = value.parse().map_err(|_| ConfigError::BadJobs)?;
                if jobs < 1 || jobs > MAX_JOBS {
                    return Err(ConfigError::BadJobs);
                }
                rest = &rest[1..];
                continue;
            }
            if arg == "-q" {
                quiet = true;
                rest = &rest[1..];
                continue;
            }
            break;
        }

        let prefix: Vec<String> = rest.to_vec();
        let prefix_len: usize = prefix.iter().map(String::len).sum();
        if prefix_len > MAX_LINE {
            return Err(ConfigError::PrefixTooLong);
        }

        Ok(Invocation::Run(Config {
            jobs,
            quiet,
            prefix,
        }))
    }
}

/// Default concurrency limit: twice the number of cores, capped at MAX_JOBS.
pub fn default_jobs() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (2 * cores).min(MAX_JOBS)
}
