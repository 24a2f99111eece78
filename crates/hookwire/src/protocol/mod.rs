//! Wire vocabulary shared by host and plugin.
//!
//! Method names are grouped by direction: `plugin.*` methods are served by
//! the plugin process, `api.*` methods are served by the host.

use serde::{Deserialize, Serialize};

use crate::api::LogLevel;

/// Host to plugin: handshake carrying the plugin identity. Always the first
/// exchange on a fresh process.
pub const ACTIVATE: &str = "plugin.activate";
/// Host to plugin: lifecycle hook run before the plugin is disabled.
pub const DEACTIVATE: &str = "plugin.deactivate";
/// Host to plugin: the plugin's configuration changed.
pub const CONFIGURATION_CHANGE: &str = "plugin.configuration_change";
/// Host to plugin: run a slash command registered by the plugin.
pub const EXECUTE_COMMAND: &str = "plugin.execute_command";
/// Host to plugin: inspect a post before it is stored.
pub const MESSAGE_WILL_BE_POSTED: &str = "plugin.message_will_be_posted";
/// Host to plugin notification: exit gracefully.
pub const SHUTDOWN: &str = "plugin.shutdown";

/// Plugin to host: fetch the plugin's configuration.
pub const API_LOAD_PLUGIN_CONFIGURATION: &str = "api.load_plugin_configuration";
/// Plugin to host: register a slash command.
pub const API_REGISTER_COMMAND: &str = "api.register_command";
/// Plugin to host: unregister a slash command.
pub const API_UNREGISTER_COMMAND: &str = "api.unregister_command";
/// Plugin to host: store a value.
pub const API_KV_SET: &str = "api.kv_set";
/// Plugin to host: read a value.
pub const API_KV_GET: &str = "api.kv_get";
/// Plugin to host: delete a value.
pub const API_KV_DELETE: &str = "api.kv_delete";
/// Plugin to host: write to the host log.
pub const API_LOG: &str = "api.log";

/// Parameters of [`ACTIVATE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateParams {
    /// Identity the host knows the plugin by.
    pub plugin_id: String,
}

/// Parameters of [`API_KV_SET`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvSetParams {
    /// Key scoped to the calling plugin.
    pub key: String,
    /// Raw value.
    pub value: Vec<u8>,
}

/// Parameters of [`API_KV_GET`] and [`API_KV_DELETE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvKeyParams {
    /// Key scoped to the calling plugin.
    pub key: String,
}

/// Parameters of [`API_UNREGISTER_COMMAND`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnregisterCommandParams {
    /// Command trigger word.
    pub trigger: String,
}

/// Parameters of [`API_LOG`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogParams {
    /// Severity.
    pub level: LogLevel,
    /// Message text.
    pub message: String,
}
