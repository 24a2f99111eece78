//! Command-line argument definitions.

use std::time::Duration;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};
use hookwire::{BundleDescriptor, SupervisorConfig};

use crate::telemetry::{DEFAULT_LOG_FILTER, LogFormat};

/// Supervises a plugin bundle from the command line.
#[derive(Parser, Debug)]
#[command(name = "hookwire", version, disable_help_subcommand = true)]
pub(crate) struct Cli {
    /// Tracing filter expression, for example `hookwire=debug`.
    #[arg(long, global = true, default_value = DEFAULT_LOG_FILTER)]
    pub(crate) log_filter: String,
    /// Log output format (`json` or `compact`).
    #[arg(long, global = true, default_value_t = LogFormat::Compact)]
    pub(crate) log_format: LogFormat,
    /// The action to perform.
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Top-level actions.
#[derive(Subcommand, Debug)]
pub(crate) enum CliCommand {
    /// Validates a bundle's executable path without launching anything.
    Check(BundleArgs),
    /// Launches a plugin, invokes hooks on it, then stops it.
    Run(RunArgs),
}

/// Identifies a plugin bundle.
#[derive(Args, Debug, Clone)]
pub(crate) struct BundleArgs {
    /// Bundle root directory.
    #[arg(long)]
    pub(crate) root: Utf8PathBuf,
    /// Plugin identity.
    #[arg(long)]
    pub(crate) id: String,
    /// Executable path relative to the root.
    #[arg(long)]
    pub(crate) executable: String,
}

impl BundleArgs {
    pub(crate) fn descriptor(&self) -> BundleDescriptor {
        BundleDescriptor::new(self.id.clone(), self.root.clone(), self.executable.clone())
    }
}

/// Hooks that can be invoked from the command line.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum HookName {
    /// `on_deactivate`.
    Deactivate,
    /// `on_configuration_change`.
    ConfigurationChange,
    /// `execute_command`, using `--command`.
    ExecuteCommand,
    /// `message_will_be_posted`, using `--message`.
    MessageWillBePosted,
}

/// Arguments of the `run` action.
#[derive(Args, Debug, Clone)]
pub(crate) struct RunArgs {
    /// The bundle to run.
    #[command(flatten)]
    pub(crate) bundle: BundleArgs,
    /// JSON file served to the plugin as its configuration.
    #[arg(long)]
    pub(crate) config: Option<Utf8PathBuf>,
    /// Hooks to invoke, in order. May be repeated.
    #[arg(long = "hook", value_enum)]
    pub(crate) hooks: Vec<HookName>,
    /// Command text for `execute-command`.
    #[arg(long, default_value = "/help")]
    pub(crate) command: String,
    /// Post body for `message-will-be-posted`.
    #[arg(long, default_value = "")]
    pub(crate) message: String,
    /// Bound on spawn plus handshake, in milliseconds.
    #[arg(long)]
    pub(crate) startup_timeout_ms: Option<u64>,
    /// Graceful shutdown window, in milliseconds.
    #[arg(long)]
    pub(crate) shutdown_grace_ms: Option<u64>,
    /// Bound on each hook call, in milliseconds.
    #[arg(long)]
    pub(crate) call_timeout_ms: Option<u64>,
    /// Keeps the plugin running until SIGINT or SIGTERM after the hooks ran.
    #[arg(long)]
    pub(crate) until_signal: bool,
}

impl RunArgs {
    pub(crate) fn supervisor_config(&self) -> SupervisorConfig {
        let mut config = SupervisorConfig::default();
        if let Some(ms) = self.startup_timeout_ms {
            config = config.with_startup_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.shutdown_grace_ms {
            config = config.with_shutdown_grace(Duration::from_millis(ms));
        }
        config.with_call_timeout(self.call_timeout_ms.map(Duration::from_millis))
    }
}
