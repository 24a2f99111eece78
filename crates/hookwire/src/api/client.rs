//! Plugin-side host API client.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{ApiError, CommandRegistration, HostApi, LogLevel};
use crate::channel::{Channel, ChannelError, codes};
use crate::protocol::{self, KvKeyParams, KvSetParams, LogParams, UnregisterCommandParams};

/// Calls the host's API over the plugin's channel.
#[derive(Debug, Clone)]
pub struct ApiClient {
    channel: Channel,
}

impl ApiClient {
    /// Wraps the plugin end of a channel.
    #[must_use]
    pub const fn new(channel: Channel) -> Self {
        Self { channel }
    }

    /// Loads and decodes the plugin's configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Host`] if the configuration does not decode as `T`,
    /// otherwise as [`HostApi::load_plugin_configuration`].
    pub fn load_configuration<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let value = self.load_plugin_configuration()?;
        serde_json::from_value(value)
            .map_err(|err| ApiError::host(format!("invalid plugin configuration: {err}")))
    }

    fn call<P: Serialize>(&self, method: &str, params: &P) -> Result<Value, ApiError> {
        let encoded = serde_json::to_value(params).map_err(|err| ApiError::Transport {
            method: method.to_owned(),
            message: err.to_string(),
        })?;
        self.channel
            .invoke(method, Some(encoded))
            .map_err(|err| map_channel_error(method, err))
    }
}

fn map_channel_error(method: &str, error: ChannelError) -> ApiError {
    match error {
        ChannelError::Remote {
            code: codes::HOST_API_UNAVAILABLE,
            ..
        } => ApiError::Unavailable,
        ChannelError::Remote {
            code: codes::APPLICATION_ERROR,
            message,
            ..
        } => ApiError::Host { message },
        other => ApiError::Transport {
            method: method.to_owned(),
            message: other.to_string(),
        },
    }
}

impl HostApi for ApiClient {
    fn load_plugin_configuration(&self) -> Result<Value, ApiError> {
        self.call(protocol::API_LOAD_PLUGIN_CONFIGURATION, &Value::Null)
    }

    fn register_command(&self, command: &CommandRegistration) -> Result<(), ApiError> {
        self.call(protocol::API_REGISTER_COMMAND, command).map(drop)
    }

    fn unregister_command(&self, trigger: &str) -> Result<(), ApiError> {
        let params = UnregisterCommandParams {
            trigger: trigger.to_owned(),
        };
        self.call(protocol::API_UNREGISTER_COMMAND, &params)
            .map(drop)
    }

    fn kv_set(&self, key: &str, value: &[u8]) -> Result<(), ApiError> {
        let params = KvSetParams {
            key: key.to_owned(),
            value: value.to_vec(),
        };
        self.call(protocol::API_KV_SET, &params).map(drop)
    }

    fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>, ApiError> {
        let params = KvKeyParams {
            key: key.to_owned(),
        };
        let value = self.call(protocol::API_KV_GET, &params)?;
        serde_json::from_value(value).map_err(|err| ApiError::Transport {
            method: String::from(protocol::API_KV_GET),
            message: err.to_string(),
        })
    }

    fn kv_delete(&self, key: &str) -> Result<(), ApiError> {
        let params = KvKeyParams {
            key: key.to_owned(),
        };
        self.call(protocol::API_KV_DELETE, &params).map(drop)
    }

    fn log(&self, level: LogLevel, message: &str) -> Result<(), ApiError> {
        let params = LogParams {
            level,
            message: message.to_owned(),
        };
        self.call(protocol::API_LOG, &params).map(drop)
    }
}
