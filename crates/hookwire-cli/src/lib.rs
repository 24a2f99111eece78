//! Operator CLI for out-of-process plugin supervision.
//!
//! `hookwire check` validates a bundle's executable path. `hookwire run`
//! launches the plugin under a [`hookwire::Supervisor`], invokes the
//! requested hooks, reports one JSON line per hook on stdout and stops the
//! plugin again. Logs go to stderr through `tracing`.

mod cli;
mod session;
pub mod telemetry;

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tracing::error;

use self::cli::{Cli, CliCommand};
use self::telemetry::TelemetryError;

/// Errors that abort a CLI invocation.
#[derive(Debug, Error)]
pub enum CliError {
    /// Telemetry could not be configured.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// The plugin configuration file could not be read.
    #[error("failed to read plugin configuration {path}: {source}")]
    ReadConfig {
        /// Configuration file path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The plugin configuration file is not valid JSON.
    #[error("failed to parse plugin configuration {path}: {source}")]
    ParseConfig {
        /// Configuration file path.
        path: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A supervisor operation failed.
    #[error(transparent)]
    Supervisor(#[from] hookwire::SupervisorError),

    /// Output could not be written.
    #[error("failed to write output: {0}")]
    Output(#[source] Arc<std::io::Error>),

    /// Signal handlers could not be installed.
    #[error("failed to install signal handlers: {0}")]
    Signal(#[source] Arc<std::io::Error>),

    /// At least one requested hook failed.
    #[error("{failed} of {total} hook calls failed")]
    HooksFailed {
        /// Failed hook calls.
        failed: usize,
        /// Requested hook calls.
        total: usize,
    },
}

/// Parses `args`, runs the requested action and returns the process exit
/// code. Command output goes to `stdout`, diagnostics to `stderr`.
pub fn run<I, T>(args: I, stdout: &mut dyn Write, stderr: &mut dyn Write) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(clap_error) => {
            let code = if clap_error.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
            let rendered = clap_error.render().to_string();
            let target: &mut dyn Write = if clap_error.use_stderr() {
                stderr
            } else {
                stdout
            };
            if target.write_all(rendered.as_bytes()).is_err() {
                return ExitCode::FAILURE;
            }
            return code;
        }
    };

    match execute(&cli, stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(target: CLI_TARGET, error = %err, "hookwire failed");
            // Best effort: the process is exiting with a failure code anyway.
            drop(writeln!(stderr, "hookwire: {err}"));
            ExitCode::FAILURE
        }
    }
}

/// Log target for CLI operations.
const CLI_TARGET: &str = "hookwire_cli";

fn execute(cli: &Cli, stdout: &mut dyn Write) -> Result<(), CliError> {
    telemetry::initialise(&cli.log_filter, cli.log_format)?;
    match &cli.command {
        CliCommand::Check(bundle) => session::check(bundle, stdout),
        CliCommand::Run(args) => session::run(args, stdout),
    }
}
