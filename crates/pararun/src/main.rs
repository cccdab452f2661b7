//! pararun CLI entry point.
//!
//! Usage:
//!   ls | pararun wc                  # parallel wordcount
//!   pararun -j99 <urls.txt wget      # download a bunch of files
//!   ... | pararun -q                 # run lines verbatim, no echo

use std::env;
use std::io::IsTerminal;
use std::process::ExitCode;

use anyhow::{Context, Result};
use pararun_core::config::Invocation;
use pararun_core::{Config, JobRunner};
use tokio::io::BufReader;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USAGE: &str = "\
pararun - parallel run
usage: pararun [flags] [prefix]
pararun reads commands from stdin and runs them in parallel. one command
per line. pararun buffers the outputs so that the command is equivalent
of running the commands in sequence. the return code is the maximum among
all the runs. if all returned successfully then it is 0. flags:
  -h     : this help text
  -j[num]: maximum number of jobs to run at once. defaults to 2 times the
           number of cores the computer has.
  -q     : omit printing the commands (omit printing the yellow text).
examples:
parallel wordcount:
  ls | pararun wc
to download bunch of files:
  pararun -j99 <urls.txt wget
to compile bunch of files:
  for f in *.c; do echo gcc -o ${f%.c} $f; done | pararun -q
";

fn main() -> ExitCode {
    // Logs go to stderr (stdout carries job output verbatim); silent unless
    // RUST_LOG is set.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("pararun: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    // Without piped input there is nothing to run; show the help instead.
    if std::io::stdin().is_terminal() {
        print!("{USAGE}");
        return Ok(ExitCode::SUCCESS);
    }

    let args: Vec<String> = env::args().skip(1).collect();
    let config = match Config::from_args(&args) {
        Ok(Invocation::Run(config)) => config,
        Ok(Invocation::Help) => {
            print!("{USAGE}");
            return Ok(ExitCode::SUCCESS);
        }
        Err(e) => {
            eprintln!("{e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    // If whatever started us dies, take the whole run down with it rather
    // than leaving children behind.
    pararun_core::arm_parent_death_signal()
        .context("could not arm parent-death signal")?;

    // All parallelism lives in child processes; the controller itself is a
    // single cooperative thread.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("could not build runtime")?;

    let code = rt.block_on(async {
        let input = BufReader::new(tokio::io::stdin());
        JobRunner::new(config, input, tokio::io::stdout()).run().await
    })?;

    Ok(ExitCode::from(code.clamp(0, 255) as u8))
}
