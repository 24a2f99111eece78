//! CLI entrypoint for supervising a single plugin bundle.
//!
//! The binary delegates to [`hookwire_cli::run`], which parses arguments,
//! installs telemetry, and drives one supervisor session.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    hookwire_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
