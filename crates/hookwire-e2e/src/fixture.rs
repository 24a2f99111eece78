//! A configurable plugin process for end-to-end tests.
//!
//! The process reads [`MODE_FILE`] from its working directory to decide how
//! to behave and appends its PID to [`PID_FILE`] before doing anything else,
//! so tests can prove that every process a supervisor launched is gone.
//!
//! When served, the plugin counts its activations in the host's KV store
//! under [`ACTIVATIONS_KEY`] and registers the [`COMMAND_TRIGGER`] command.
//! Further behaviour comes from the [`FixtureSettings`] the host hands out
//! as plugin configuration.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use hookwire::plugin::{Plugin, PluginRuntimeError, serve};
use hookwire::{
    ApiClient, ApiError, CommandArgs, CommandRegistration, CommandResponse, HookError, HostApi,
    LogLevel, Post, PostVerdict,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File in the bundle root naming the fixture's [`FixtureMode`].
pub const MODE_FILE: &str = "fixture-mode";

/// File in the bundle root collecting one PID per launched process.
pub const PID_FILE: &str = "fixture.pid";

/// Host KV key holding the activation count as decimal text.
pub const ACTIVATIONS_KEY: &str = "activations";

/// Command registered on every activation.
pub const COMMAND_TRIGGER: &str = "fixture";

/// How the fixture process behaves once launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FixtureMode {
    /// Serves hooks normally.
    #[default]
    Serve,
    /// Never answers the handshake.
    Spin,
    /// Refuses activation with a hook error.
    FailActivate,
    /// Exits before reading anything.
    ExitImmediately,
}

impl FixtureMode {
    const ALL: [Self; 4] = [
        Self::Serve,
        Self::Spin,
        Self::FailActivate,
        Self::ExitImmediately,
    ];

    /// Returns the name written to [`MODE_FILE`].
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Serve => "serve",
            Self::Spin => "spin",
            Self::FailActivate => "fail-activate",
            Self::ExitImmediately => "exit-immediately",
        }
    }

    /// Reads the mode from `path`, defaulting to [`FixtureMode::Serve`] when
    /// the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::Io`] if the file cannot be read and
    /// [`FixtureError::UnknownMode`] if it names no mode.
    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        match fs::read_to_string(path) {
            Ok(text) => text.parse(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(FixtureError::Io(Arc::new(err))),
        }
    }

    /// Writes the mode file into `bundle_root`.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::Io`] if the file cannot be written.
    pub fn write_to(self, bundle_root: &Path) -> Result<(), FixtureError> {
        fs::write(bundle_root.join(MODE_FILE), self.as_str())
            .map_err(|err| FixtureError::Io(Arc::new(err)))
    }
}

impl fmt::Display for FixtureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FixtureMode {
    type Err = FixtureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == name)
            .ok_or_else(|| FixtureError::UnknownMode(name.to_owned()))
    }
}

/// Errors that stop the fixture process.
#[derive(Debug, Error)]
pub enum FixtureError {
    /// A fixture file could not be read or written.
    #[error("fixture file error: {0}")]
    Io(#[source] Arc<io::Error>),

    /// The mode file named no known mode.
    #[error("unknown fixture mode: '{0}'")]
    UnknownMode(String),

    /// The plugin runtime failed.
    #[error(transparent)]
    Runtime(#[from] PluginRuntimeError),
}

/// Plugin configuration served by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureSettings {
    /// Exit the process from `on_deactivate` during the first activation.
    #[serde(default)]
    pub exit_on_first_deactivate: bool,
    /// Text returned by the `greet` command.
    #[serde(default)]
    pub greeting: Option<String>,
}

/// The fixture's hook implementation.
#[derive(Debug)]
pub struct FixturePlugin {
    mode: FixtureMode,
    settings: Mutex<FixtureSettings>,
    activation: AtomicU64,
}

impl FixturePlugin {
    /// Builds a plugin for `mode`.
    #[must_use]
    pub fn new(mode: FixtureMode) -> Self {
        Self {
            mode,
            settings: Mutex::new(FixtureSettings::default()),
            activation: AtomicU64::new(0),
        }
    }

    fn settings(&self) -> FixtureSettings {
        self.settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn count_activation(api: &ApiClient) -> Result<u64, ApiError> {
        let previous = api
            .kv_get(ACTIVATIONS_KEY)?
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .and_then(|text| text.parse::<u64>().ok())
            .unwrap_or(0);
        let current = previous + 1;
        api.kv_set(ACTIVATIONS_KEY, current.to_string().as_bytes())?;
        Ok(current)
    }

    fn activate_with_host(&self, api: &ApiClient) -> Result<(), ApiError> {
        let settings = api
            .load_configuration::<Option<FixtureSettings>>()?
            .unwrap_or_default();
        *self.settings.lock().unwrap_or_else(PoisonError::into_inner) = settings;

        let activation = Self::count_activation(api)?;
        self.activation.store(activation, Ordering::Relaxed);

        let mut command = CommandRegistration::new(COMMAND_TRIGGER);
        command.description = String::from("Reports fixture state");
        api.register_command(&command)?;
        api.log(LogLevel::Info, &format!("fixture activated ({activation})"))
    }
}

impl Plugin for FixturePlugin {
    fn on_activate(&self, api: &ApiClient) -> Result<(), HookError> {
        if self.mode == FixtureMode::FailActivate {
            return Err(HookError::new("fixture refused activation"));
        }
        match self.activate_with_host(api) {
            Ok(()) | Err(ApiError::Unavailable) => Ok(()),
            Err(err) => Err(HookError::new(err.to_string())),
        }
    }

    fn on_deactivate(&self) -> Result<(), HookError> {
        if self.settings().exit_on_first_deactivate && self.activation.load(Ordering::Relaxed) == 1
        {
            std::process::exit(1);
        }
        Ok(())
    }

    fn execute_command(&self, args: &CommandArgs) -> Result<CommandResponse, HookError> {
        let rest = args
            .command
            .split_once(char::is_whitespace)
            .map_or("", |(_, rest)| rest.trim());
        match args.trigger() {
            "echo" => Ok(CommandResponse::text(rest)),
            "greet" => self
                .settings()
                .greeting
                .map(CommandResponse::text)
                .ok_or_else(|| HookError::new("no greeting configured")),
            COMMAND_TRIGGER => Ok(CommandResponse::text(format!(
                "activation {}",
                self.activation.load(Ordering::Relaxed)
            ))),
            other => Err(HookError::new(format!("unknown command: {other}"))),
        }
    }

    fn message_will_be_posted(&self, post: &Post) -> Result<PostVerdict, HookError> {
        if post.message.contains("forbidden") {
            return Ok(PostVerdict::Reject {
                reason: String::from("message contains a forbidden word"),
            });
        }
        match post.message.strip_prefix('!') {
            Some(shouted) => Ok(PostVerdict::Replace {
                post: Post {
                    message: shouted.to_uppercase(),
                    ..post.clone()
                },
            }),
            None => Ok(PostVerdict::Allow),
        }
    }
}

fn record_pid(path: &Path) -> Result<(), FixtureError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| FixtureError::Io(Arc::new(err)))?;
    writeln!(file, "{}", std::process::id()).map_err(|err| FixtureError::Io(Arc::new(err)))
}

/// Reads every PID recorded in `bundle_root`, oldest first.
///
/// # Errors
///
/// Returns [`FixtureError::Io`] if the PID file exists but cannot be read.
pub fn recorded_pids(bundle_root: &Path) -> Result<Vec<i32>, FixtureError> {
    match fs::read_to_string(bundle_root.join(PID_FILE)) {
        Ok(text) => Ok(text
            .lines()
            .filter_map(|line| line.trim().parse().ok())
            .collect()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(FixtureError::Io(Arc::new(err))),
    }
}

/// Entry point of the `fixture-plugin` binary.
///
/// # Errors
///
/// Returns [`FixtureError`] if the fixture files cannot be handled or the
/// plugin runtime fails to start.
pub fn run() -> Result<(), FixtureError> {
    let mode = FixtureMode::load(Path::new(MODE_FILE))?;
    record_pid(Path::new(PID_FILE))?;
    match mode {
        FixtureMode::Spin => loop {
            thread::sleep(Duration::from_secs(1));
        },
        FixtureMode::ExitImmediately => Ok(()),
        FixtureMode::Serve | FixtureMode::FailActivate => {
            serve(FixturePlugin::new(mode)).map_err(FixtureError::from)
        }
    }
}
