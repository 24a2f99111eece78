//! Host API surface injected into plugins.
//!
//! The host implements [`HostApi`]; the supervisor retains it and serves it
//! to every plugin process through an [`ApiServer`]. Inside the plugin,
//! [`ApiClient`] implements the same trait by calling back over the channel.

mod client;
mod memory;
mod server;

#[cfg(all(test, unix))]
mod tests;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use self::client::ApiClient;
pub use self::memory::InMemoryHostApi;
pub use self::server::ApiServer;

/// Log target for messages plugins write through [`HostApi::log`].
pub const PLUGIN_LOG_TARGET: &str = "hookwire::plugin_log";

/// Capabilities the host exposes to a plugin.
pub trait HostApi: Send + Sync {
    /// Returns the plugin's configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the host cannot serve the call.
    fn load_plugin_configuration(&self) -> Result<Value, ApiError>;

    /// Registers a slash command owned by the plugin.
    ///
    /// # Errors
    ///
    /// As [`HostApi::load_plugin_configuration`].
    fn register_command(&self, command: &CommandRegistration) -> Result<(), ApiError>;

    /// Removes a previously registered command.
    ///
    /// # Errors
    ///
    /// As [`HostApi::load_plugin_configuration`].
    fn unregister_command(&self, trigger: &str) -> Result<(), ApiError>;

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// As [`HostApi::load_plugin_configuration`].
    fn kv_set(&self, key: &str, value: &[u8]) -> Result<(), ApiError>;

    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// As [`HostApi::load_plugin_configuration`].
    fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>, ApiError>;

    /// Deletes the value stored under `key`.
    ///
    /// # Errors
    ///
    /// As [`HostApi::load_plugin_configuration`].
    fn kv_delete(&self, key: &str) -> Result<(), ApiError>;

    /// Writes a message to the host log.
    ///
    /// # Errors
    ///
    /// As [`HostApi::load_plugin_configuration`].
    fn log(&self, level: LogLevel, message: &str) -> Result<(), ApiError>;
}

/// Errors raised by host API calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The host did not supply an API surface.
    #[error("host API unavailable")]
    Unavailable,

    /// The host rejected the call.
    #[error("host API call failed: {message}")]
    Host {
        /// Failure description.
        message: String,
    },

    /// The call could not be carried to the host.
    #[error("host API call '{method}' failed in transit: {message}")]
    Transport {
        /// Wire method.
        method: String,
        /// Failure description.
        message: String,
    },
}

impl ApiError {
    /// Builds a host-side rejection.
    #[must_use]
    pub fn host(message: impl Into<String>) -> Self {
        Self::Host {
            message: message.into(),
        }
    }
}

/// A slash command a plugin asks the host to route to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRegistration {
    /// Trigger word without the leading slash.
    pub trigger: String,
    /// Help text.
    #[serde(default)]
    pub description: String,
    /// Whether the host offers autocompletion for the command.
    #[serde(default)]
    pub auto_complete: bool,
}

impl CommandRegistration {
    /// Builds a registration with no description.
    #[must_use]
    pub fn new(trigger: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
            description: String::new(),
            auto_complete: false,
        }
    }
}

/// Severity of a plugin log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Failures.
    Error,
    /// Suspicious conditions.
    Warn,
    /// Routine events.
    Info,
    /// Diagnostic detail.
    Debug,
}
