//! In-process host API backed by plain collections.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::{ApiError, CommandRegistration, HostApi, LogLevel, PLUGIN_LOG_TARGET};

/// Host API that keeps configuration, commands and KV data in memory.
///
/// Plugin log messages are re-emitted through `tracing` and kept for
/// inspection.
#[derive(Debug, Default)]
pub struct InMemoryHostApi {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    configuration: Value,
    commands: BTreeMap<String, CommandRegistration>,
    kv: HashMap<String, Vec<u8>>,
    logs: Vec<(LogLevel, String)>,
}

impl InMemoryHostApi {
    /// Builds an API serving `configuration` to the plugin.
    #[must_use]
    pub fn with_configuration(configuration: Value) -> Self {
        Self {
            state: Mutex::new(State {
                configuration,
                ..State::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the configuration document.
    pub fn set_configuration(&self, configuration: Value) {
        self.state().configuration = configuration;
    }

    /// Returns registered commands ordered by trigger.
    #[must_use]
    pub fn commands(&self) -> Vec<CommandRegistration> {
        self.state().commands.values().cloned().collect()
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn kv_value(&self, key: &str) -> Option<Vec<u8>> {
        self.state().kv.get(key).cloned()
    }

    /// Returns every message the plugin logged, oldest first.
    #[must_use]
    pub fn log_entries(&self) -> Vec<(LogLevel, String)> {
        self.state().logs.clone()
    }
}

impl HostApi for InMemoryHostApi {
    fn load_plugin_configuration(&self) -> Result<Value, ApiError> {
        Ok(self.state().configuration.clone())
    }

    fn register_command(&self, command: &CommandRegistration) -> Result<(), ApiError> {
        let trigger = command.trigger.trim_start_matches('/');
        if trigger.is_empty() {
            return Err(ApiError::host("command trigger must not be empty"));
        }
        self.state()
            .commands
            .insert(trigger.to_owned(), command.clone());
        Ok(())
    }

    fn unregister_command(&self, trigger: &str) -> Result<(), ApiError> {
        self.state()
            .commands
            .remove(trigger.trim_start_matches('/'));
        Ok(())
    }

    fn kv_set(&self, key: &str, value: &[u8]) -> Result<(), ApiError> {
        self.state().kv.insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>, ApiError> {
        Ok(self.kv_value(key))
    }

    fn kv_delete(&self, key: &str) -> Result<(), ApiError> {
        self.state().kv.remove(key);
        Ok(())
    }

    fn log(&self, level: LogLevel, message: &str) -> Result<(), ApiError> {
        match level {
            LogLevel::Error => error!(target: PLUGIN_LOG_TARGET, "{message}"),
            LogLevel::Warn => warn!(target: PLUGIN_LOG_TARGET, "{message}"),
            LogLevel::Info => info!(target: PLUGIN_LOG_TARGET, "{message}"),
            LogLevel::Debug => debug!(target: PLUGIN_LOG_TARGET, "{message}"),
        }
        self.state().logs.push((level, message.to_owned()));
        Ok(())
    }
}
